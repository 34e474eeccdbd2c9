//! Users in the `_users` system database.
//!
//! A user named `jan` lives in document `org.couchdb.user:jan`. The server
//! replaces a plaintext `password` with `salt`/`derived_key`/`iterations`/
//! `password_scheme` on write, so any update that should keep the password
//! has to send those fields back unchanged.

use serde::{Deserialize, Serialize};

use crate::auth::Authenticator;
use crate::client::{check_not_found, decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::{segment, QueryString};
use crate::types::{Document, DocumentResponse};

pub const USERS_DB: &str = "_users";
pub const USER_ID_PREFIX: &str = "org.couchdb.user:";

/// Hash function name stored next to `derived_key` by CouchDB 3.4+.
const PBKDF2_PRF: &str = "pbkdf2_prf";

/// Document id of the user called `name`.
pub fn user_doc_id(name: &str) -> String {
    format!("{USER_ID_PREFIX}{name}")
}

/// A `_users` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub user_type: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_scheme: Option<String>,
    /// Stored fields not modelled above, e.g. `pbkdf2_prf` or profile data.
    #[serde(flatten)]
    pub extra: Document,
}

impl User {
    fn new(name: &str, roles: &[String]) -> Self {
        Self {
            id: user_doc_id(name),
            name: name.to_string(),
            user_type: "user".to_string(),
            roles: roles.to_vec(),
            ..Self::default()
        }
    }

    /// Copy the stored password hash from `current`, along with every field
    /// this type does not model (such as `pbkdf2_prf`).
    fn keep_credentials_of(&mut self, current: &User) {
        self.salt = current.salt.clone();
        self.derived_key = current.derived_key.clone();
        self.iterations = current.iterations;
        self.password_scheme = current.password_scheme.clone();
        self.extra = current.extra.clone();
    }
}

#[derive(Deserialize)]
struct UserRows {
    #[serde(default)]
    rows: Vec<UserRow>,
}

#[derive(Deserialize)]
struct UserRow {
    #[serde(default)]
    doc: Option<User>,
}

/// User operations, obtained from `CouchClient::users`.
#[derive(Debug, Clone, Copy)]
pub struct Users<'a> {
    client: &'a CouchClient,
}

impl<'a> Users<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn create(
        &self,
        name: &str,
        password: &str,
        roles: &[String],
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut user = User::new(name, roles);
        user.password = Some(password.to_string());

        let path = format!("/{USERS_DB}");
        let response = self.client.send_json(HttpMethod::Post, &path, &user, auth)?;
        expect_status(&response, &[201, 202, 200], "create user")?;
        decode(&response, "create user")
    }

    pub fn get(&self, name: &str, auth: Option<&Authenticator>) -> Result<User, ApiError> {
        let path = user_path(name);
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        check_not_found(&response, "user", name)?;
        expect_status(&response, &[200], "get user")?;
        decode(&response, "get user")
    }

    /// Write `roles` and, when given, a new password. With `password` set to
    /// `None` the current document is read first and its password hash is
    /// carried over, so the user can still log in afterwards.
    pub fn update(
        &self,
        name: &str,
        rev: &str,
        password: Option<&str>,
        roles: &[String],
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut user = User::new(name, roles);
        user.rev = rev.to_string();
        match password {
            Some(password) => user.password = Some(password.to_string()),
            None => {
                let current = self.get(name, auth)?;
                user.keep_credentials_of(&current);
            }
        }
        self.put(&user, "update user", auth)
    }

    /// Change the password, keeping the current roles and unmodelled fields.
    /// The old hash parameters are dropped; the server derives new ones.
    pub fn update_password(
        &self,
        name: &str,
        rev: &str,
        new_password: &str,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let current = self.get(name, auth)?;
        let mut user = User::new(name, &current.roles);
        user.rev = rev.to_string();
        user.password = Some(new_password.to_string());
        user.extra = current.extra;
        user.extra.remove(PBKDF2_PRF);
        self.put(&user, "update password", auth)
    }

    /// Change the roles, keeping the current password.
    pub fn update_roles(
        &self,
        name: &str,
        rev: &str,
        roles: &[String],
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        self.update(name, rev, None, roles, auth)
    }

    pub fn delete(
        &self,
        name: &str,
        rev: &str,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut query = QueryString::new();
        query.push("rev", rev);
        let path = query.append_to(user_path(name));
        let response = self.client.send(HttpMethod::Delete, &path, None, auth)?;
        expect_status(&response, &[200, 202], "delete user")?;
        decode(&response, "delete user")
    }

    /// Every user document; design documents in `_users` are skipped.
    pub fn list(&self, auth: Option<&Authenticator>) -> Result<Vec<User>, ApiError> {
        let mut query = QueryString::new();
        query.flag("include_docs", true);
        let path = query.append_to(format!("/{USERS_DB}/_all_docs"));
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        expect_status(&response, &[200], "list users")?;
        let rows: UserRows = decode(&response, "list users")?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .filter(|user| user.user_type == "user")
            .collect())
    }

    fn put(
        &self,
        user: &User,
        operation: &'static str,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let path = user_path(&user.name);
        let response = self.client.send_json(HttpMethod::Put, &path, user, auth)?;
        expect_status(&response, &[201, 202, 200], operation)?;
        decode(&response, operation)
    }
}

fn user_path(name: &str) -> String {
    format!("/{USERS_DB}/{}", segment(&user_doc_id(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_user_serializes_with_type_and_empty_roles() {
        let user = User::new("jan", &[]);
        let body = serde_json::to_value(&user).unwrap();
        assert_eq!(
            body,
            json!({"_id": "org.couchdb.user:jan", "name": "jan", "type": "user", "roles": []})
        );
    }

    #[test]
    fn credentials_are_copied_without_password() {
        let mut current = User {
            salt: Some("s".to_string()),
            derived_key: Some("dk".to_string()),
            iterations: Some(10),
            password_scheme: Some("pbkdf2".to_string()),
            ..User::new("jan", &[])
        };
        current.extra.insert(PBKDF2_PRF.to_string(), json!("sha256"));
        let mut next = User::new("jan", &["admin".to_string()]);
        next.keep_credentials_of(&current);
        assert_eq!(next.derived_key.as_deref(), Some("dk"));
        assert_eq!(next.iterations, Some(10));
        assert_eq!(next.extra[PBKDF2_PRF], "sha256");
        assert!(next.password.is_none());
    }

    #[test]
    fn unmodelled_fields_round_trip() {
        let user: User = serde_json::from_value(json!({
            "_id": "org.couchdb.user:jan", "_rev": "1-a", "name": "jan", "type": "user",
            "roles": [], "derived_key": "dk", "pbkdf2_prf": "sha256", "email": "jan@example.com"
        }))
        .unwrap();
        assert_eq!(user.extra.len(), 2);
        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["pbkdf2_prf"], "sha256");
        assert_eq!(back["email"], "jan@example.com");
    }

    #[test]
    fn user_path_escapes_colon() {
        assert_eq!(user_path("jan"), "/_users/org.couchdb.user%3Ajan");
    }
}
