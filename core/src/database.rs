//! Database-level operations: lifecycle, bulk writes, Mango queries and
//! `_all_docs`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Authenticator;
use crate::client::{check_not_found, decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::{segment, QueryString};
use crate::types::{Document, OkResponse};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseInfoCluster {
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub q: u32,
    #[serde(default)]
    pub r: u32,
    #[serde(default)]
    pub w: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseInfoSizes {
    #[serde(default)]
    pub active: u64,
    #[serde(default)]
    pub file: u64,
    #[serde(default)]
    pub external: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseInfoProps {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partitioned: bool,
}

/// Response of `GET /{db}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub db_name: String,
    #[serde(default)]
    pub cluster: DatabaseInfoCluster,
    #[serde(default)]
    pub compact_running: bool,
    #[serde(default)]
    pub disk_format_version: u32,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default)]
    pub instance_start_time: String,
    #[serde(default)]
    pub purge_seq: Value,
    #[serde(default)]
    pub sizes: DatabaseInfoSizes,
    #[serde(default)]
    pub update_seq: Value,
    #[serde(default)]
    pub props: DatabaseInfoProps,
}

/// Query options for `PUT /{db}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseCreateOptions {
    /// Shard count.
    pub q: Option<u32>,
    /// Replica count.
    pub n: Option<u32>,
    pub partitioned: bool,
}

/// Per-document outcome of a `_bulk_docs` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkDocItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A Mango query for `POST /{db}/_find`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindRequest {
    pub selector: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    /// Sort specs, e.g. `[{"year": "asc"}]` or `["name"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// A design document name or a `[ddoc, index]` pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_index: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub conflicts: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub execution_stats: bool,
}

impl FindRequest {
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            limit: None,
            skip: None,
            sort: Vec::new(),
            fields: Vec::new(),
            use_index: None,
            r: None,
            bookmark: None,
            update: None,
            stable: None,
            conflicts: false,
            execution_stats: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FindExecutionStats {
    #[serde(default)]
    pub total_keys_examined: u64,
    #[serde(default)]
    pub total_docs_examined: u64,
    #[serde(default)]
    pub total_quorum_docs_examined: u64,
    #[serde(default)]
    pub results_returned: u64,
    #[serde(default)]
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FindResponse {
    #[serde(default)]
    pub docs: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_stats: Option<FindExecutionStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A Mango index for `POST /{db}/_index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexDefinition {
    /// Index body, e.g. `{"fields": ["type", "year"]}`.
    pub index: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddoc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitioned: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexResponse {
    /// `created` or `exists`.
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Options for `_all_docs`. Keys are JSON values and are JSON-encoded on the
/// wire, so `Value::from("abc")` is sent as `"abc"` and `Value::from(5)` as `5`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllDocsOptions {
    pub conflicts: bool,
    pub descending: bool,
    pub end_key: Option<Value>,
    pub end_key_doc_id: Option<String>,
    pub include_docs: bool,
    pub inclusive_end: Option<bool>,
    pub key: Option<Value>,
    /// When non-empty the request becomes a `POST` with `{"keys": [...]}`.
    pub keys: Vec<Value>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub start_key: Option<Value>,
    pub start_key_doc_id: Option<String>,
    pub update_seq: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllDocsRow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    /// Set for requested keys that do not exist (`not_found`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllDocsResponse {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<AllDocsRow>,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_seq: Option<Value>,
}

#[derive(Serialize)]
pub(crate) struct KeysBody<'a> {
    pub(crate) keys: &'a [Value],
}

#[derive(Serialize)]
struct BulkDocsBody<'a> {
    docs: &'a [Document],
}

/// Database operations, obtained from `CouchClient::databases`.
#[derive(Debug, Clone, Copy)]
pub struct Databases<'a> {
    client: &'a CouchClient,
}

impl<'a> Databases<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn get(&self, db: &str, auth: Option<&Authenticator>) -> Result<DatabaseInfo, ApiError> {
        let path = format!("/{}", segment(db));
        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        check_not_found(&response, "database", db)?;
        expect_status(&response, &[200], "get database")?;
        decode(&response, "get database")
    }

    pub fn create(
        &self,
        db: &str,
        options: Option<&DatabaseCreateOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<OkResponse, ApiError> {
        let mut query = QueryString::new();
        if let Some(options) = options {
            query
                .number("q", options.q.filter(|q| *q > 0).map(u64::from))
                .number("n", options.n.filter(|n| *n > 0).map(u64::from))
                .flag("partitioned", options.partitioned);
        }
        let path = query.append_to(format!("/{}", segment(db)));
        let response = self.client.send(HttpMethod::Put, &path, None, auth)?;
        expect_status(&response, &[201, 202, 200], "create database")?;
        decode(&response, "create database")
    }

    pub fn delete(&self, db: &str, auth: Option<&Authenticator>) -> Result<OkResponse, ApiError> {
        let path = format!("/{}", segment(db));
        let response = self.client.send(HttpMethod::Delete, &path, None, auth)?;
        expect_status(&response, &[200, 202], "delete database")?;
        decode(&response, "delete database")
    }

    /// `HEAD /{db}`: 200 means it exists, 404 that it does not.
    pub fn exists(&self, db: &str, auth: Option<&Authenticator>) -> Result<bool, ApiError> {
        let path = format!("/{}", segment(db));
        let response = self.client.send(HttpMethod::Head, &path, None, auth)?;
        match response.status {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(ApiError::HttpError {
                operation: "check database",
                status,
                body: response.body,
            }),
        }
    }

    /// Submit several documents at once. Per-document failures (conflicts,
    /// forbidden) are reported in the returned items, not as an error.
    pub fn bulk_insert(
        &self,
        db: &str,
        docs: &[Document],
        auth: Option<&Authenticator>,
    ) -> Result<Vec<BulkDocItem>, ApiError> {
        self.bulk_docs(db, docs, "bulk insert", auth)
    }

    /// Same wire operation as `bulk_insert`. Each document carries its `_rev`;
    /// set `"_deleted": true` on a document to delete it.
    pub fn bulk_update(
        &self,
        db: &str,
        docs: &[Document],
        auth: Option<&Authenticator>,
    ) -> Result<Vec<BulkDocItem>, ApiError> {
        self.bulk_docs(db, docs, "bulk update", auth)
    }

    fn bulk_docs(
        &self,
        db: &str,
        docs: &[Document],
        operation: &'static str,
        auth: Option<&Authenticator>,
    ) -> Result<Vec<BulkDocItem>, ApiError> {
        let path = format!("/{}/_bulk_docs", segment(db));
        let response = self
            .client
            .send_json(HttpMethod::Post, &path, &BulkDocsBody { docs }, auth)?;
        expect_status(&response, &[201, 200], operation)?;
        decode(&response, operation)
    }

    pub fn find(
        &self,
        db: &str,
        query: &FindRequest,
        auth: Option<&Authenticator>,
    ) -> Result<FindResponse, ApiError> {
        let path = format!("/{}/_find", segment(db));
        let response = self.client.send_json(HttpMethod::Post, &path, query, auth)?;
        expect_status(&response, &[200], "execute find")?;
        decode(&response, "execute find")
    }

    pub fn create_index(
        &self,
        db: &str,
        index: &IndexDefinition,
        auth: Option<&Authenticator>,
    ) -> Result<IndexResponse, ApiError> {
        let path = format!("/{}/_index", segment(db));
        let response = self.client.send_json(HttpMethod::Post, &path, index, auth)?;
        expect_status(&response, &[200], "create index")?;
        decode(&response, "create index")
    }

    pub fn all_docs(
        &self,
        db: &str,
        options: Option<&AllDocsOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<AllDocsResponse, ApiError> {
        let defaults = AllDocsOptions::default();
        let options = options.unwrap_or(&defaults);

        let mut query = QueryString::new();
        query
            .flag("conflicts", options.conflicts)
            .flag("descending", options.descending)
            .text("endkey_docid", options.end_key_doc_id.as_deref())
            .flag("include_docs", options.include_docs)
            .tri_state("inclusive_end", options.inclusive_end)
            .number("limit", options.limit)
            .number("skip", options.skip)
            .text("startkey_docid", options.start_key_doc_id.as_deref())
            .flag("update_seq", options.update_seq);

        let base = format!("/{}/_all_docs", segment(db));
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

        expect_status(&response, &[200], "get all docs")?;
        decode(&response, "get all docs")
    }
}
