//! Cookie sessions via `/_session`.
//!
//! The client does not keep the session cookie. `login` hands it back and the
//! caller passes it to later calls with `Authenticator::cookie`.

use serde::{Deserialize, Serialize};

use crate::auth::{Authenticator, Cookie, SESSION_COOKIE_NAME};
use crate::client::{decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthInfo {
    /// Handler that authenticated this request, e.g. `cookie` or `default`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_db: Option<String>,
    #[serde(default)]
    pub authentication_handlers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserContext {
    /// `None` for an anonymous request.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub info: AuthInfo,
    #[serde(rename = "userCtx", default)]
    pub user_ctx: UserContext,
}

#[derive(Serialize)]
struct Credentials<'a> {
    name: &'a str,
    password: &'a str,
}

/// Session operations, obtained from `CouchClient::sessions`.
#[derive(Debug, Clone, Copy)]
pub struct Sessions<'a> {
    client: &'a CouchClient,
}

impl<'a> Sessions<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    /// Start a session. The returned cookie is `None` if the server did not
    /// send an `AuthSession` cookie.
    pub fn login(
        &self,
        name: &str,
        password: &str,
        auth: Option<&Authenticator>,
    ) -> Result<(LoginResponse, Option<Cookie>), ApiError> {
        let credentials = Credentials { name, password };
        let response = self
            .client
            .send_json(HttpMethod::Post, "/_session", &credentials, auth)?;
        expect_status(&response, &[200], "login")?;
        let login: LoginResponse = decode(&response, "login")?;

        let cookie = response
            .header_values("set-cookie")
            .filter_map(Cookie::parse_set_cookie)
            .find(|cookie| cookie.name == SESSION_COOKIE_NAME);
        Ok((login, cookie))
    }

    pub fn logout(&self, auth: Option<&Authenticator>) -> Result<(), ApiError> {
        let response = self.client.send(HttpMethod::Delete, "/_session", None, auth)?;
        expect_status(&response, &[200], "logout")?;
        Ok(())
    }

    pub fn get(&self, auth: Option<&Authenticator>) -> Result<SessionInfo, ApiError> {
        let response = self.client.send(HttpMethod::Get, "/_session", None, auth)?;
        expect_status(&response, &[200], "get session")?;
        decode(&response, "get session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_info_decodes_anonymous_context() {
        let info: SessionInfo = serde_json::from_str(
            r#"{"ok":true,"userCtx":{"name":null,"roles":[]},"info":{"authentication_handlers":["cookie","default"]}}"#,
        )
        .unwrap();
        assert!(info.ok);
        assert!(info.user_ctx.name.is_none());
        assert_eq!(info.info.authentication_handlers, vec!["cookie", "default"]);
    }
}
