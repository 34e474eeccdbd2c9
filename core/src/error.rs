//! Error types for the CouchDB client.
//!
//! # Design
//! Transport failures and HTTP-level failures come from different places.
//! The transport reports connection, timeout and I/O problems as
//! `TransportError`. Every status code arrives as a normal response, and each
//! operation classifies it against its own table of expected codes.
//!
//! `NotFound` gets a dedicated variant because CouchDB's 404 body for a missing
//! database, document or user is not reliably a well-formed error envelope,
//! and callers routinely branch on "does not exist".

use serde::Deserialize;
use thiserror::Error;

/// A failed HTTP exchange: the request never produced a response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The exchange exceeded the transport's configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection, DNS, TLS or I/O failure.
    #[error("{0}")]
    Io(String),
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => TransportError::Timeout(err.to_string()),
            other => TransportError::Io(other.to_string()),
        }
    }
}

/// Credentials could not be applied to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("value for header {header} contains a forbidden control character")]
    InvalidHeaderValue { header: &'static str },

    #[error("invalid cookie: {0}")]
    InvalidCookie(String),
}

/// The `{error, reason}` envelope CouchDB sends with most failures.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub reason: String,
}

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// A single-entity fetch returned 404.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Unexpected status with a decodable `{error, reason}` body.
    #[error("failed to {operation}: {error} - {reason}")]
    CouchError {
        operation: &'static str,
        status: u16,
        error: String,
        reason: String,
    },

    /// Unexpected status whose body is not an error envelope.
    #[error("failed to {operation}: request failed with status {status}: {body}")]
    HttpError {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("failed to {operation}: could not decode response: {source}")]
    DeserializationError {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The request payload could not be serialized to JSON.
    #[error("failed to encode request body: {0}")]
    SerializationError(#[source] serde_json::Error),
}

impl ApiError {
    /// HTTP status behind the error, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::CouchError { status, .. } | ApiError::HttpError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// True for a revision conflict (409), e.g. an update carrying a stale rev.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}
