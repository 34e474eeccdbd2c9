//! The CouchDB client and its request dispatcher.
//!
//! # Design
//! `CouchClient` holds a base address and a shared `Transport`, nothing else,
//! and is never mutated after construction. Service handles borrow it. Every
//! operation goes through `CouchClient::send`, which joins the URL, applies
//! the caller's authenticator, forces a JSON content type and executes the
//! exchange. Status codes are never inspected there: each operation
//! classifies the response with `expect_status` against its own table.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::configuration::Configuration;
use crate::database::Databases;
use crate::design::DesignDocuments;
use crate::document::Documents;
use crate::error::{ApiError, ErrorResponse};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::security::Security;
use crate::server::Server;
use crate::session::Sessions;
use crate::user::Users;

/// Synchronous client for a single CouchDB node.
///
/// Cheap to clone; clones share the transport. Safe to use from several
/// threads at once because it holds no mutable state.
#[derive(Clone)]
pub struct CouchClient {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for CouchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CouchClient {
    /// Client using the default `ureq` transport with no timeout.
    pub fn new(base_url: &str) -> Self {
        Self::with_transport(base_url, Arc::new(UreqTransport::new()))
    }

    /// Client executing every request through `transport`.
    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_transport(
            &config.base_url,
            Arc::new(UreqTransport::with_timeout(config.timeout())),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one HTTP exchange.
    ///
    /// `path` must already be escaped and carry its query string. Credential
    /// failures are reported before anything is sent. Any status, including
    /// 4xx/5xx, comes back as `Ok`.
    pub fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        auth: Option<&Authenticator>,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = HttpRequest::new(method, format!("{}{}", self.base_url, path));
        request.body = body;

        if let Some(authenticator) = auth {
            authenticator.apply(&mut request)?;
        }
        request.set_header("content-type", "application/json");

        tracing::debug!(
            method = %method,
            url = %request.url,
            auth = auth.map(Authenticator::scheme).unwrap_or("none"),
            "dispatching request"
        );

        match self.transport.execute(request) {
            Ok(response) => {
                tracing::debug!(method = %method, path, status = response.status, "response received");
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(method = %method, path, error = %err, "transport failure");
                Err(err.into())
            }
        }
    }

    pub(crate) fn send_json<T: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &T,
        auth: Option<&Authenticator>,
    ) -> Result<HttpResponse, ApiError> {
        self.send(method, path, Some(encode(body)?), auth)
    }

    pub fn databases(&self) -> Databases<'_> {
        Databases::new(self)
    }

    pub fn documents(&self) -> Documents<'_> {
        Documents::new(self)
    }

    pub fn design_documents(&self) -> DesignDocuments<'_> {
        DesignDocuments::new(self)
    }

    pub fn users(&self) -> Users<'_> {
        Users::new(self)
    }

    pub fn sessions(&self) -> Sessions<'_> {
        Sessions::new(self)
    }

    pub fn security(&self) -> Security<'_> {
        Security::new(self)
    }

    pub fn server(&self) -> Server<'_> {
        Server::new(self)
    }

    pub fn configuration(&self) -> Configuration<'_> {
        Configuration::new(self)
    }
}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(ApiError::SerializationError)
}

/// Map a status outside `expected` to `CouchError`, or to `HttpError` when the
/// body is not an `{error, reason}` envelope.
pub(crate) fn expect_status(
    response: &HttpResponse,
    expected: &[u16],
    operation: &'static str,
) -> Result<(), ApiError> {
    if expected.contains(&response.status) {
        return Ok(());
    }
    match serde_json::from_str::<ErrorResponse>(&response.body) {
        Ok(envelope) => Err(ApiError::CouchError {
            operation,
            status: response.status,
            error: envelope.error,
            reason: envelope.reason,
        }),
        Err(_) => Err(ApiError::HttpError {
            operation,
            status: response.status,
            body: response.body.clone(),
        }),
    }
}

/// 404 on a single-entity fetch.
pub(crate) fn check_not_found(
    response: &HttpResponse,
    resource: &'static str,
    id: impl Into<String>,
) -> Result<(), ApiError> {
    if response.status == 404 {
        return Err(ApiError::NotFound {
            resource,
            id: id.into(),
        });
    }
    Ok(())
}

pub(crate) fn decode<T: DeserializeOwned>(
    response: &HttpResponse,
    operation: &'static str,
) -> Result<T, ApiError> {
    serde_json::from_str(&response.body)
        .map_err(|source| ApiError::DeserializationError { operation, source })
}
