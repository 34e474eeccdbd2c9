//! Typed, blocking client for the CouchDB 3.x HTTP API.
//!
//! # Overview
//! `CouchClient` holds a base address and an injectable `Transport`. Each
//! resource category (databases, documents, design documents and views,
//! users, sessions, security, server, configuration) is reached through a
//! lightweight handle borrowed from the client. Every call is a single
//! request/response exchange; nothing is cached, retried or remembered
//! between calls, including document revisions and session cookies.
//!
//! # Design
//! - Credentials are chosen per call: every operation takes
//!   `Option<&Authenticator>`.
//! - `CouchClient::send` is the one dispatch point. It never looks at status
//!   codes; each operation checks its own table of expected codes and turns
//!   anything else into a typed `ApiError`.
//! - Free-form documents are `serde_json` objects, so unknown shapes stay
//!   representable.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.
//!
//! ```no_run
//! use couchdb_core::{Authenticator, CouchClient};
//!
//! let client = CouchClient::new("http://localhost:5984");
//! let admin = Authenticator::basic("admin", "password");
//! client.databases().create("recipes", None, Some(&admin))?;
//! let created = client
//!     .documents()
//!     .create("recipes", &serde_json::json!({"name": "soup"}), None, Some(&admin))?;
//! let doc = client.documents().get("recipes", &created.id, None, Some(&admin))?;
//! assert_eq!(doc["name"], "soup");
//! # Ok::<(), couchdb_core::ApiError>(())
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod configuration;
pub mod database;
pub mod design;
pub mod document;
pub mod error;
pub mod http;
mod query;
pub mod security;
pub mod server;
pub mod session;
pub mod types;
pub mod user;

pub use auth::{select_authenticator, Authenticator, Cookie, SESSION_COOKIE_NAME};
pub use client::CouchClient;
pub use config::ClientConfig;
pub use configuration::{Configuration, LOCAL_NODE};
pub use database::{
    AllDocsOptions, AllDocsResponse, AllDocsRow, BulkDocItem, DatabaseCreateOptions,
    DatabaseInfo, Databases, FindRequest, FindResponse, IndexDefinition, IndexResponse,
};
pub use design::{DesignDocument, DesignDocuments, ViewDefinition, ViewOptions, ViewResponse, ViewRow};
pub use document::{DocumentGetOptions, DocumentPutOptions, Documents};
pub use error::{ApiError, AuthError, ErrorResponse, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use security::{Members, Security, SecurityObject};
pub use server::{Server, ServerInfo, UuidsResponse};
pub use session::{LoginResponse, SessionInfo, Sessions, UserContext};
pub use types::{Document, DocumentResponse, OkResponse};
pub use user::{User, Users};
