//! Design documents and view queries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Authenticator;
use crate::client::{check_not_found, decode, expect_status, CouchClient};
use crate::database::KeysBody;
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::{segment, QueryString};
use crate::types::{Document, DocumentResponse};

/// A map function and optional reduce (`_sum`, `_count`, `_stats` or JS).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// A `_design/{name}` document. Fields this type does not model (`updates`,
/// `filters`, `validate_doc_update`, ...) are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DesignDocument {
    /// Full id including the `_design/` prefix.
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub views: BTreeMap<String, ViewDefinition>,
    #[serde(flatten)]
    pub extra: Document,
}

impl DesignDocument {
    pub fn new(name: &str) -> Self {
        Self {
            id: format!("{DESIGN_PREFIX}{name}"),
            ..Self::default()
        }
    }

    /// The name without the `_design/` prefix.
    pub fn name(&self) -> &str {
        self.id.strip_prefix(DESIGN_PREFIX).unwrap_or(&self.id)
    }
}

const DESIGN_PREFIX: &str = "_design/";

/// Options for a view query. `reduce` and `inclusive_end` are tri-state:
/// `None` leaves the server default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOptions {
    pub conflicts: bool,
    pub descending: bool,
    pub end_key: Option<Value>,
    pub end_key_doc_id: Option<String>,
    pub group: bool,
    pub group_level: Option<u64>,
    pub include_docs: bool,
    pub inclusive_end: Option<bool>,
    pub key: Option<Value>,
    /// When non-empty the request becomes a `POST` with `{"keys": [...]}`.
    pub keys: Vec<Value>,
    pub limit: Option<u64>,
    pub reduce: Option<bool>,
    pub skip: Option<u64>,
    pub sorted: bool,
    pub stable: bool,
    pub stale: Option<String>,
    pub start_key: Option<Value>,
    pub start_key_doc_id: Option<String>,
    /// `true`, `false` or `lazy`.
    pub update: Option<String>,
    pub update_seq: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewRow {
    /// Absent on reduced rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewResponse {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_seq: Option<Value>,
}

/// Design-document operations, obtained from `CouchClient::design_documents`.
#[derive(Debug, Clone, Copy)]
pub struct DesignDocuments<'a> {
    client: &'a CouchClient,
}

impl<'a> DesignDocuments<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn query_view(
        &self,
        db: &str,
        ddoc: &str,
        view: &str,
        options: Option<&ViewOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<ViewResponse, ApiError> {
        let defaults = ViewOptions::default();
        let options = options.unwrap_or(&defaults);

        let mut query = QueryString::new();
        query
            .flag("conflicts", options.conflicts)
            .flag("descending", options.descending)
            .text("endkey_docid", options.end_key_doc_id.as_deref())
            .flag("group", options.group)
            .number("group_level", options.group_level.filter(|l| *l > 0))
            .flag("include_docs", options.include_docs)
            .tri_state("inclusive_end", options.inclusive_end)
            .number("limit", options.limit)
            .tri_state("reduce", options.reduce)
            .number("skip", options.skip)
            .flag("sorted", options.sorted)
            .flag("stable", options.stable)
            .text("stale", options.stale.as_deref())
            .text("startkey_docid", options.start_key_doc_id.as_deref())
            .text("update", options.update.as_deref())
            .flag("update_seq", options.update_seq);

        let base = format!(
            "/{}/_design/{}/_view/{}",
            segment(db),
            segment(ddoc),
            segment(view)
        );
        let response = if options.keys.is_empty() {
            query
                .json("endkey", options.end_key.as_ref())?
                .json("key", options.key.as_ref())?
                .json("startkey", options.start_key.as_ref())?;
            let path = query.append_to(base);
            self.client.send(HttpMethod::Get, &path, None, auth)?
        } else {
            let path = query.append_to(base);
            let body = KeysBody {
                keys: &options.keys,
            };
            self.client.send_json(HttpMethod::Post, &path, &body, auth)?
        };

        expect_status(&response, &[200], "query view")?;
        decode(&response, "query view")
    }

    pub fn get(
        &self,
        db: &str,
        ddoc: &str,
        auth: Option<&Authenticator>,
    ) -> Result<DesignDocument, ApiError> {
        let path = design_path(db, ddoc);
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        check_not_found(&response, "design document", format!("{db}/{DESIGN_PREFIX}{ddoc}"))?;
        expect_status(&response, &[200], "get design document")?;
        decode(&response, "get design document")
    }

    /// Create or replace a design document. Updating needs `doc.rev` set to
    /// the current revision.
    pub fn put(
        &self,
        db: &str,
        doc: &DesignDocument,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let path = design_path(db, doc.name());
        let response = self.client.send_json(HttpMethod::Put, &path, doc, auth)?;
        expect_status(&response, &[201, 202], "put design document")?;
        decode(&response, "put design document")
    }

    pub fn delete(
        &self,
        db: &str,
        ddoc: &str,
        rev: &str,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut query = QueryString::new();
        query.push("rev", rev);
        let path = query.append_to(design_path(db, ddoc));
        let response = self.client.send(HttpMethod::Delete, &path, None, auth)?;
        expect_status(&response, &[200, 202], "delete design document")?;
        decode(&response, "delete design document")
    }
}

fn design_path(db: &str, ddoc: &str) -> String {
    format!("/{}/_design/{}", segment(db), segment(ddoc))
}
