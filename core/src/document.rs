//! Single-document operations.

use serde::Serialize;

use crate::auth::Authenticator;
use crate::client::{check_not_found, decode, expect_status, CouchClient};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::query::{segment, QueryString};
use crate::types::{Document, DocumentResponse};

/// Query options for `GET /{db}/{docid}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentGetOptions {
    pub rev: Option<String>,
    pub revs: bool,
    pub revs_info: bool,
    /// Leaf revisions to return; sent as a JSON array.
    pub open_revs: Vec<String>,
    pub latest: bool,
    pub conflicts: bool,
    pub deleted_conflicts: bool,
    pub local_seq: bool,
    pub meta: bool,
}

/// Query options for document writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPutOptions {
    pub rev: Option<String>,
    /// `Some("ok")` enables batch mode (the server answers 202).
    pub batch: Option<String>,
}

/// Document operations, obtained from `CouchClient::documents`.
#[derive(Debug, Clone, Copy)]
pub struct Documents<'a> {
    client: &'a CouchClient,
}

impl<'a> Documents<'a> {
    pub fn new(client: &'a CouchClient) -> Self {
        Self { client }
    }

    pub fn get(
        &self,
        db: &str,
        doc_id: &str,
        options: Option<&DocumentGetOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<Document, ApiError> {
        let path = get_query(options)?.append_to(doc_path(db, doc_id));

        let response = self.client.send(HttpMethod::Get, &path, None, auth)?;
        check_not_found(&response, "document", format!("{db}/{doc_id}"))?;
        expect_status(&response, &[200], "get document")?;
        decode(&response, "get document")
    }

    /// Current revision of a document, read from the `ETag` header. Takes the
    /// same options as `get`.
    pub fn head(
        &self,
        db: &str,
        doc_id: &str,
        options: Option<&DocumentGetOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<String, ApiError> {
        let path = get_query(options)?.append_to(doc_path(db, doc_id));

        let response = self.client.send(HttpMethod::Head, &path, None, auth)?;
        check_not_found(&response, "document", format!("{db}/{doc_id}"))?;
        if response.status != 200 {
            return Err(ApiError::HttpError {
                operation: "head document",
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.header("etag").map(strip_etag).unwrap_or_default())
    }

    /// `POST /{db}`. The server assigns an id unless the body has `_id`.
    pub fn create<T: Serialize + ?Sized>(
        &self,
        db: &str,
        doc: &T,
        options: Option<&DocumentPutOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut query = QueryString::new();
        if let Some(options) = options {
            query.text("batch", options.batch.as_deref());
        }
        let path = query.append_to(format!("/{}", segment(db)));

        let response = self.client.send_json(HttpMethod::Post, &path, doc, auth)?;
        expect_status(&response, &[201, 202], "create document")?;
        decode(&response, "create document")
    }

    /// `PUT /{db}/{docid}`. Pass the current revision either in the body's
    /// `_rev` or in `options.rev`; a stale one fails with a 409 conflict.
    pub fn update<T: Serialize + ?Sized>(
        &self,
        db: &str,
        doc_id: &str,
        doc: &T,
        options: Option<&DocumentPutOptions>,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut query = QueryString::new();
        if let Some(options) = options {
            query
                .text("rev", options.rev.as_deref())
                .text("batch", options.batch.as_deref());
        }
        let path = query.append_to(doc_path(db, doc_id));

        let response = self.client.send_json(HttpMethod::Put, &path, doc, auth)?;
        expect_status(&response, &[201, 202], "update document")?;
        decode(&response, "update document")
    }

    pub fn delete(
        &self,
        db: &str,
        doc_id: &str,
        rev: &str,
        auth: Option<&Authenticator>,
    ) -> Result<DocumentResponse, ApiError> {
        let mut query = QueryString::new();
        query.push("rev", rev);
        let path = query.append_to(doc_path(db, doc_id));

        let response = self.client.send(HttpMethod::Delete, &path, None, auth)?;
        expect_status(&response, &[200, 202], "delete document")?;
        decode(&response, "delete document")
    }
}

fn get_query(options: Option<&DocumentGetOptions>) -> Result<QueryString, ApiError> {
    let mut query = QueryString::new();
    let Some(options) = options else {
        return Ok(query);
    };
    query
        .text("rev", options.rev.as_deref())
        .flag("revs", options.revs)
        .flag("revs_info", options.revs_info);
    if !options.open_revs.is_empty() {
        let encoded =
            serde_json::to_string(&options.open_revs).map_err(ApiError::SerializationError)?;
        query.push("open_revs", encoded);
    }
    query
        .flag("latest", options.latest)
        .flag("conflicts", options.conflicts)
        .flag("deleted_conflicts", options.deleted_conflicts)
        .flag("local_seq", options.local_seq)
        .flag("meta", options.meta);
    Ok(query)
}

fn doc_path(db: &str, doc_id: &str) -> String {
    format!("/{}/{}", segment(db), segment(doc_id))
}

/// CouchDB wraps the revision in quotes: `"1-abc"` becomes `1-abc`.
pub(crate) fn strip_etag(etag: &str) -> String {
    let etag = etag.trim();
    etag.strip_prefix('"')
        .and_then(|e| e.strip_suffix('"'))
        .unwrap_or(etag)
        .to_string()
}
