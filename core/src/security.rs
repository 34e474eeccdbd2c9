//! Per-database security objects.

use serde::{Deserialize, Serialize};

use crate::auth::Authenticator;
use crate::client::{decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::segment;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Members {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `/{db}/_security`. A database that never had one returns `{}`, which
/// decodes to empty admins and members.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityObject {
    #[serde(default)]
    pub admins: Members,
    #[serde(default)]
    pub members: Members,
}

/// Security operations, obtained from `CouchClient::security`.
#[derive(Debug, Clone, Copy)]
pub struct Security<'a> {
    client: &'a CouchClient,
}

impl<'a> Security<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn get(&self, db: &str, auth: Option<&Authenticator>) -> Result<SecurityObject, ApiError> {
        let path = format!("/{}/_security", segment(db));
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        expect_status(&response, &[200], "get security")?;
        decode(&response, "get security")
    }

    pub fn set(
        &self,
        db: &str,
        security: &SecurityObject,
        auth: Option<&Authenticator>,
    ) -> Result<(), ApiError> {
        let path = format!("/{}/_security", segment(db));
        let response = self.client.send_json(HttpMethod::Put, &path, security, auth)?;
        expect_status(&response, &[200], "set security")?;
        Ok(())
    }
}
