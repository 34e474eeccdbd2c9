//! In-memory model of a single CouchDB node.
//!
//! Revisions follow CouchDB's `{generation}-{hash}` shape; every write must
//! name the revision it replaces or it is rejected as a conflict.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub type Body = Map<String, Value>;

pub const USERS_DB: &str = "_users";
pub const USER_PREFIX: &str = "org.couchdb.user:";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub rev: String,
    pub body: Body,
    pub deleted: bool,
}

impl StoredDoc {
    /// The document as CouchDB returns it, with `_id` and `_rev` added.
    pub fn to_json(&self, id: &str) -> Value {
        let mut out = Map::new();
        out.insert("_id".to_string(), Value::from(id));
        out.insert("_rev".to_string(), Value::from(self.rev.as_str()));
        out.extend(self.body.clone());
        Value::Object(out)
    }
}

/// Why a write was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    Conflict,
    NotFound,
    BadRequest(String),
}

impl WriteError {
    pub fn status(&self) -> u16 {
        match self {
            WriteError::Conflict => 409,
            WriteError::NotFound => 404,
            WriteError::BadRequest(_) => 400,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            WriteError::Conflict => json!({"error": "conflict", "reason": "Document update conflict."}),
            WriteError::NotFound => json!({"error": "not_found", "reason": "missing"}),
            WriteError::BadRequest(reason) => json!({"error": "bad_request", "reason": reason}),
        }
    }
}

#[derive(Debug, Default)]
pub struct Database {
    pub docs: BTreeMap<String, StoredDoc>,
    pub security: Option<Value>,
    pub indexes: BTreeSet<String>,
    pub update_seq: u64,
}

impl Database {
    /// A document that exists and is not deleted.
    pub fn live(&self, id: &str) -> Option<&StoredDoc> {
        self.docs.get(id).filter(|doc| !doc.deleted)
    }

    /// Create, update or (with `deleted`) tombstone `id`, returning the new rev.
    pub fn write(
        &mut self,
        id: &str,
        rev: Option<&str>,
        body: Body,
        deleted: bool,
    ) -> Result<String, WriteError> {
        if id.is_empty() {
            return Err(WriteError::BadRequest("Document id must not be empty".to_string()));
        }
        let generation = match (self.docs.get(id), rev) {
            (Some(current), Some(rev)) if current.rev == rev => generation_of(&current.rev),
            (Some(current), None) if current.deleted && !deleted => generation_of(&current.rev),
            (Some(_), _) => return Err(WriteError::Conflict),
            (None, _) if deleted => return Err(WriteError::NotFound),
            (None, Some(_)) => return Err(WriteError::Conflict),
            (None, None) => 0,
        };
        let rev = new_rev(generation + 1);
        self.docs.insert(
            id.to_string(),
            StoredDoc {
                rev: rev.clone(),
                body: if deleted { Body::new() } else { body },
                deleted,
            },
        );
        self.update_seq += 1;
        Ok(rev)
    }

    pub fn info(&self, name: &str) -> Value {
        let doc_count = self.docs.values().filter(|d| !d.deleted).count();
        let doc_del_count = self.docs.len() - doc_count;
        json!({
            "db_name": name,
            "doc_count": doc_count,
            "doc_del_count": doc_del_count,
            "update_seq": format!("{}-mock", self.update_seq),
            "purge_seq": "0-mock",
            "compact_running": false,
            "disk_format_version": 8,
            "instance_start_time": "0",
            "cluster": {"n": 1, "q": 2, "r": 1, "w": 1},
            "sizes": {"active": 0, "external": 0, "file": 0},
            "props": {}
        })
    }
}

/// The whole node: databases, configuration and live sessions.
#[derive(Debug)]
pub struct Couch {
    pub dbs: BTreeMap<String, Database>,
    pub config: BTreeMap<String, BTreeMap<String, String>>,
    /// Session token to user name.
    pub sessions: HashMap<String, String>,
}

impl Default for Couch {
    fn default() -> Self {
        let mut dbs = BTreeMap::new();
        dbs.insert(USERS_DB.to_string(), Database::default());

        let mut config = BTreeMap::new();
        config.insert(
            "admins".to_string(),
            BTreeMap::from([("admin".to_string(), "password".to_string())]),
        );
        config.insert(
            "couchdb".to_string(),
            BTreeMap::from([("max_document_size".to_string(), "8000000".to_string())]),
        );
        config.insert(
            "log".to_string(),
            BTreeMap::from([("level".to_string(), "info".to_string())]),
        );

        Self {
            dbs,
            config,
            sessions: HashMap::new(),
        }
    }
}

impl Couch {
    /// Roles of `name` if `password` is right, checking server admins first
    /// and then `_users`.
    pub fn authenticate(&self, name: &str, password: &str) -> Option<Vec<String>> {
        if let Some(admin_password) = self.config.get("admins").and_then(|a| a.get(name)) {
            return (admin_password == password).then(|| vec!["_admin".to_string()]);
        }
        let user = self.dbs.get(USERS_DB)?.live(&format!("{USER_PREFIX}{name}"))?;
        let salt = user.body.get("salt")?.as_str()?;
        let derived_key = user.body.get("derived_key")?.as_str()?;
        (derive_key(salt, password) == derived_key).then(|| roles_of(&user.body))
    }

    /// Roles of an already authenticated user.
    pub fn roles(&self, name: &str) -> Vec<String> {
        if self.config.get("admins").is_some_and(|a| a.contains_key(name)) {
            return vec!["_admin".to_string()];
        }
        self.dbs
            .get(USERS_DB)
            .and_then(|db| db.live(&format!("{USER_PREFIX}{name}")))
            .map(|user| roles_of(&user.body))
            .unwrap_or_default()
    }

    pub fn open_session(&mut self, name: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), name.to_string());
        token
    }
}

fn roles_of(body: &Body) -> Vec<String> {
    body.get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Replace a plaintext `password` with salt and derived key, the way the
/// server does for `_users` documents.
pub fn hash_password(body: &mut Body) {
    if let Some(Value::String(password)) = body.remove("password") {
        let salt = Uuid::new_v4().simple().to_string();
        body.insert("derived_key".to_string(), Value::from(derive_key(&salt, &password)));
        body.insert("salt".to_string(), Value::from(salt));
        body.insert("iterations".to_string(), Value::from(10));
        body.insert("password_scheme".to_string(), Value::from("pbkdf2"));
    }
}

fn derive_key(salt: &str, password: &str) -> String {
    general_purpose::STANDARD.encode(format!("{salt}:{password}"))
}

/// Pull `_id`, `_rev` and `_deleted` out of an incoming document.
pub fn split_doc(value: Value) -> Result<(Option<String>, Option<String>, bool, Body), WriteError> {
    let Value::Object(mut body) = value else {
        return Err(WriteError::BadRequest("Document must be a JSON object".to_string()));
    };
    let id = body
        .remove("_id")
        .and_then(|v| v.as_str().map(str::to_string));
    let rev = body
        .remove("_rev")
        .and_then(|v| v.as_str().map(str::to_string));
    let deleted = body
        .remove("_deleted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok((id, rev, deleted, body))
}

pub fn new_rev(generation: u64) -> String {
    format!("{generation}-{}", Uuid::new_v4().simple())
}

fn generation_of(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Body {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn revisions_increase_by_generation() {
        let mut db = Database::default();
        let rev1 = db.write("a", None, body(json!({"x": 1})), false).unwrap();
        assert!(rev1.starts_with("1-"));
        let rev2 = db.write("a", Some(&rev1), body(json!({"x": 2})), false).unwrap();
        assert!(rev2.starts_with("2-"));
        assert_eq!(db.live("a").unwrap().body["x"], 2);
    }

    #[test]
    fn stale_revision_conflicts() {
        let mut db = Database::default();
        let rev1 = db.write("a", None, Body::new(), false).unwrap();
        db.write("a", Some(&rev1), Body::new(), false).unwrap();
        let err = db.write("a", Some(&rev1), Body::new(), false).unwrap_err();
        assert_eq!(err, WriteError::Conflict);
        assert_eq!(db.write("a", None, Body::new(), false).unwrap_err(), WriteError::Conflict);
    }

    #[test]
    fn deleted_documents_can_be_recreated() {
        let mut db = Database::default();
        let rev1 = db.write("a", None, Body::new(), false).unwrap();
        let rev2 = db.write("a", Some(&rev1), Body::new(), true).unwrap();
        assert!(db.live("a").is_none());
        let rev3 = db.write("a", None, Body::new(), false).unwrap();
        assert!(rev2.starts_with("2-"));
        assert!(rev3.starts_with("3-"));
    }

    #[test]
    fn deleting_missing_document_is_not_found() {
        let mut db = Database::default();
        assert_eq!(db.write("nope", Some("1-x"), Body::new(), true).unwrap_err(), WriteError::NotFound);
    }

    #[test]
    fn hashed_password_authenticates() {
        let mut couch = Couch::default();
        let mut user = body(json!({"name": "jan", "type": "user", "roles": ["dev"], "password": "apple"}));
        hash_password(&mut user);
        assert!(!user.contains_key("password"));
        couch
            .dbs
            .get_mut(USERS_DB)
            .unwrap()
            .write("org.couchdb.user:jan", None, user, false)
            .unwrap();

        assert_eq!(couch.authenticate("jan", "apple"), Some(vec!["dev".to_string()]));
        assert_eq!(couch.authenticate("jan", "pear"), None);
        assert_eq!(couch.authenticate("admin", "password"), Some(vec!["_admin".to_string()]));
    }

    #[test]
    fn split_doc_extracts_meta_fields() {
        let (id, rev, deleted, rest) =
            split_doc(json!({"_id": "a", "_rev": "1-x", "_deleted": true, "k": "v"})).unwrap();
        assert_eq!(id.as_deref(), Some("a"));
        assert_eq!(rev.as_deref(), Some("1-x"));
        assert!(deleted);
        assert_eq!(rest.len(), 1);
        assert!(split_doc(json!([1, 2])).is_err());
    }
}
