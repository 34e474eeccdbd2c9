//! Per-request authentication.
//!
//! # Design
//! Credentials are not stored on the client. Every operation takes an
//! `Option<&Authenticator>`, so two calls through the same client can run as
//! different principals. Applying an authenticator only mutates headers on
//! the outgoing `HttpRequest`.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};

use crate::error::AuthError;
use crate::http::HttpRequest;

/// Name of the session cookie issued by `POST /_session`.
pub const SESSION_COOKIE_NAME: &str = "AuthSession";

const AUTHORIZATION: &str = "authorization";
const COOKIE: &str = "cookie";
const PROXY_USERNAME: &str = "x-auth-couchdb-username";
const PROXY_ROLES: &str = "x-auth-couchdb-roles";
const PROXY_TOKEN: &str = "x-auth-couchdb-token";

/// A `name=value` cookie as issued by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse the leading `name=value` pair of a `Set-Cookie` header value.
    /// Attributes such as `Path` or `HttpOnly` are ignored.
    pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim().trim_matches('"');
        Some(Cookie::new(name, value))
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.name.is_empty() {
            return Err(AuthError::InvalidCookie("empty name".to_string()));
        }
        let bad_name = self
            .name
            .chars()
            .any(|c| c.is_ascii_control() || c.is_whitespace() || "()<>@,;:\\\"/[]?={}".contains(c));
        if bad_name {
            return Err(AuthError::InvalidCookie(format!("bad name {:?}", self.name)));
        }
        let bad_value = self
            .value
            .chars()
            .any(|c| c.is_ascii_control() || c.is_whitespace() || c == ';' || c == '"' || c == ',' || c == '\\');
        if bad_value {
            return Err(AuthError::InvalidCookie(format!("bad value for {}", self.name)));
        }
        Ok(())
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// One of CouchDB's authentication schemes.
#[derive(Clone, PartialEq, Eq)]
pub enum Authenticator {
    /// `Authorization: Basic ...`
    Basic { username: String, password: String },
    /// A session cookie, normally the one returned by `Sessions::login`.
    Cookie(Cookie),
    /// Proxy authentication headers. Requires the proxy handler to be enabled
    /// on the server; `token` is the shared secret when one is configured.
    Proxy {
        username: String,
        roles: Vec<String>,
        token: Option<String>,
    },
    /// `Authorization: Bearer ...`. Requires the JWT handler on the server.
    Jwt { token: String },
}

impl Authenticator {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Authenticator::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn cookie(cookie: Cookie) -> Self {
        Authenticator::Cookie(cookie)
    }

    pub fn proxy(username: impl Into<String>, roles: Vec<String>, token: Option<String>) -> Self {
        Authenticator::Proxy {
            username: username.into(),
            roles,
            token,
        }
    }

    pub fn jwt(token: impl Into<String>) -> Self {
        Authenticator::Jwt {
            token: token.into(),
        }
    }

    /// Short variant name, safe to log.
    pub fn scheme(&self) -> &'static str {
        match self {
            Authenticator::Basic { .. } => "basic",
            Authenticator::Cookie(_) => "cookie",
            Authenticator::Proxy { .. } => "proxy",
            Authenticator::Jwt { .. } => "jwt",
        }
    }

    /// Add this authenticator's credentials to `request`.
    ///
    /// Only the headers owned by the scheme are touched.
    pub fn apply(&self, request: &mut HttpRequest) -> Result<(), AuthError> {
        match self {
            Authenticator::Basic { username, password } => {
                let encoded = general_purpose::STANDARD.encode(format!("{username}:{password}"));
                request.set_header(AUTHORIZATION, format!("Basic {encoded}"));
            }
            Authenticator::Cookie(cookie) => {
                cookie.validate()?;
                let value = match request.header(COOKIE) {
                    Some(existing) if !existing.is_empty() => format!("{existing}; {cookie}"),
                    _ => cookie.to_string(),
                };
                request.set_header(COOKIE, value);
            }
            Authenticator::Proxy {
                username,
                roles,
                token,
            } => {
                request.set_header(PROXY_USERNAME, checked(PROXY_USERNAME, username)?);
                if !roles.is_empty() {
                    request.set_header(PROXY_ROLES, checked(PROXY_ROLES, &roles.join(","))?);
                }
                if let Some(token) = token.as_deref().filter(|t| !t.is_empty()) {
                    request.set_header(PROXY_TOKEN, checked(PROXY_TOKEN, token)?);
                }
            }
            Authenticator::Jwt { token } => {
                if !token.is_empty() {
                    let value = checked(AUTHORIZATION, token)?;
                    request.set_header(AUTHORIZATION, format!("Bearer {value}"));
                }
            }
        }
        Ok(())
    }
}

// Credentials never reach the logs.
impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Authenticator::Cookie(cookie) => f
                .debug_struct("Cookie")
                .field("name", &cookie.name)
                .finish_non_exhaustive(),
            Authenticator::Proxy {
                username, roles, ..
            } => f
                .debug_struct("Proxy")
                .field("username", username)
                .field("roles", roles)
                .finish_non_exhaustive(),
            Authenticator::Jwt { .. } => f.debug_struct("Jwt").finish_non_exhaustive(),
        }
    }
}

fn checked<'a>(header: &'static str, value: &'a str) -> Result<&'a str, AuthError> {
    if value.chars().any(|c| c == '\r' || c == '\n' || c == '\0') {
        return Err(AuthError::InvalidHeaderValue { header });
    }
    Ok(value)
}

/// Pick the authenticator to use from several candidates: the last one wins.
///
/// Useful when credentials come from layered sources (defaults, then a
/// per-call override) and are collected into a list before the call.
pub fn select_authenticator<'a, I>(candidates: I) -> Option<&'a Authenticator>
where
    I: IntoIterator<Item = &'a Authenticator>,
{
    candidates.into_iter().last()
}
