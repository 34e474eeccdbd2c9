//! Server-level endpoints.

use serde::{Deserialize, Serialize};

use crate::auth::Authenticator;
use crate::client::{decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::QueryString;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UuidsResponse {
    #[serde(default)]
    pub uuids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vendor {
    #[serde(default)]
    pub name: String,
}

/// Welcome message from `GET /`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    #[serde(default)]
    pub couchdb: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub vendor: Vendor,
}

/// Server operations, obtained from `CouchClient::server`.
#[derive(Debug, Clone, Copy)]
pub struct Server<'a> {
    client: &'a CouchClient,
}

impl<'a> Server<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn info(&self, auth: Option<&Authenticator>) -> Result<ServerInfo, ApiError> {
        let response = self.client.send(HttpMethod::Get, "/", None, auth)?;
        expect_status(&response, &[200], "get server info")?;
        decode(&response, "get server info")
    }

    pub fn all_dbs(&self, auth: Option<&Authenticator>) -> Result<Vec<String>, ApiError> {
        let response = self.client.send(HttpMethod::Get, "/_all_dbs", None, auth)?;
        expect_status(&response, &[200], "list databases")?;
        decode(&response, "list databases")
    }

    /// Ask the server for `count` UUIDs; `None` or `Some(0)` lets it pick (one).
    pub fn uuids(
        &self,
        count: Option<u32>,
        auth: Option<&Authenticator>,
    ) -> Result<UuidsResponse, ApiError> {
        let mut query = QueryString::new();
        query.number("count", count.filter(|c| *c > 0).map(u64::from));
        let path = query.append_to("/_uuids".to_string());
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        expect_status(&response, &[200], "get uuids")?;
        decode(&response, "get uuids")
    }
}
