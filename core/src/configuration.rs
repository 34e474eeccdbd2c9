//! Node configuration under `/_node/{node}/_config`.
//!
//! Values travel as JSON strings in both directions: setting `5` sends the
//! body `"5"`, and the previous value comes back the same way. Use `_local`
//! as the node name to address the node the client is talking to.

use std::collections::BTreeMap;

use crate::auth::Authenticator;
use crate::client::{decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::segment;

/// The node the request lands on.
pub const LOCAL_NODE: &str = "_local";

const ADMINS_SECTION: &str = "admins";

pub type ConfigSection = BTreeMap<String, String>;

/// Configuration operations, obtained from `CouchClient::configuration`.
#[derive(Debug, Clone, Copy)]
pub struct Configuration<'a> {
    client: &'a CouchClient,
}

impl<'a> Configuration<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn get_all(
        &self,
        node: &str,
        auth: Option<&Authenticator>,
    ) -> Result<BTreeMap<String, ConfigSection>, ApiError> {
        let response = self.client.send(HttpMethod::Get, &config_path(node), None, auth)?;
        expect_status(&response, &[200], "get configuration")?;
        decode(&response, "get configuration")
    }

    pub fn get_section(
        &self,
        node: &str,
        section: &str,
        auth: Option<&Authenticator>,
    ) -> Result<ConfigSection, ApiError> {
        let path = format!("{}/{}", config_path(node), segment(section));
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        expect_status(&response, &[200], "get configuration section")?;
        decode(&response, "get configuration section")
    }

    pub fn get_value(
        &self,
        node: &str,
        section: &str,
        key: &str,
        auth: Option<&Authenticator>,
    ) -> Result<String, ApiError> {
        let path = value_path(node, section, key);
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        expect_status(&response, &[200], "get configuration value")?;
        decode(&response, "get configuration value")
    }

    /// Set `section/key` to `value` and return the previous value (empty if
    /// there was none).
    pub fn set_value(
        &self,
        node: &str,
        section: &str,
        key: &str,
        value: &str,
        auth: Option<&Authenticator>,
    ) -> Result<String, ApiError> {
        let path = value_path(node, section, key);
        let response = self.client.send_json(HttpMethod::Put, &path, value, auth)?;
        expect_status(&response, &[200], "set configuration value")?;
        decode(&response, "set configuration value")
    }

    /// Remove `section/key` and return the value it had.
    pub fn delete_value(
        &self,
        node: &str,
        section: &str,
        key: &str,
        auth: Option<&Authenticator>,
    ) -> Result<String, ApiError> {
        let path = value_path(node, section, key);
        let response = self.client.send(HttpMethod::Delete, &path, None, auth)?;
        expect_status(&response, &[200], "delete configuration value")?;
        decode(&response, "delete configuration value")
    }

    /// Re-read the configuration files from disk.
    pub fn reload(&self, node: &str, auth: Option<&Authenticator>) -> Result<(), ApiError> {
        let path = format!("{}/_reload", config_path(node));
        let response = self.client.send(HttpMethod::Post, &path, None, auth)?;
        expect_status(&response, &[200], "reload configuration")?;
        Ok(())
    }

    /// Add a server admin. The server hashes the password on write.
    pub fn create_admin(
        &self,
        node: &str,
        username: &str,
        password: &str,
        auth: Option<&Authenticator>,
    ) -> Result<(), ApiError> {
        self.set_value(node, ADMINS_SECTION, username, password, auth)
            .map(drop)
    }

    pub fn update_admin_password(
        &self,
        node: &str,
        username: &str,
        new_password: &str,
        auth: Option<&Authenticator>,
    ) -> Result<(), ApiError> {
        self.set_value(node, ADMINS_SECTION, username, new_password, auth)
            .map(drop)
    }

    pub fn delete_admin(
        &self,
        node: &str,
        username: &str,
        auth: Option<&Authenticator>,
    ) -> Result<(), ApiError> {
        self.delete_value(node, ADMINS_SECTION, username, auth)
            .map(drop)
    }

    /// Admin names mapped to their password hashes.
    pub fn get_admins(
        &self,
        node: &str,
        auth: Option<&Authenticator>,
    ) -> Result<ConfigSection, ApiError> {
        self.get_section(node, ADMINS_SECTION, auth)
    }
}

fn config_path(node: &str) -> String {
    format!("/_node/{}/_config", segment(node))
}

fn value_path(node: &str, section: &str, key: &str) -> String {
    format!("{}/{}/{}", config_path(node), segment(section), segment(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_path_escapes_each_part() {
        assert_eq!(
            value_path(LOCAL_NODE, "log", "level"),
            "/_node/_local/_config/log/level"
        );
        assert_eq!(
            value_path("couchdb@127.0.0.1", "a b", "k/v"),
            "/_node/couchdb%40127.0.0.1/_config/a%20b/k%2Fv"
        );
    }
}
