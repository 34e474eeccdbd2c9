//! DTOs shared by several services.
//!
//! Resource-specific request and response records live next to the service
//! that uses them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A free-form CouchDB document: any JSON object, including `_id`/`_rev`.
pub type Document = Map<String, Value>;

/// `{"ok": true}` acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OkResponse {
    #[serde(default)]
    pub ok: bool,
}

/// Result of writing a single document: the new id and revision.
///
/// The revision must be passed to the next update or delete of the same
/// document; the client never remembers it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub rev: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_response_tolerates_missing_fields() {
        let resp: DocumentResponse = serde_json::from_str(r#"{"ok":true,"id":"a"}"#).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.id, "a");
        assert_eq!(resp.rev, "");
    }
}
