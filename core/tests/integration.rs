//! End-to-end lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the client through
//! the default `ureq` transport over real HTTP. Validates that request
//! shaping and response parsing agree with the server's wire format.

mod common;

use std::time::{Duration, Instant};

use couchdb_core::{
    AllDocsOptions, ApiError, Authenticator, ClientConfig, CouchClient, FindRequest,
    IndexDefinition, Members, SecurityObject, TransportError, LOCAL_NODE,
};
use serde_json::json;

fn admin() -> Authenticator {
    Authenticator::basic("admin", "password")
}

fn connect() -> CouchClient {
    let config = ClientConfig {
        base_url: common::spawn_mock_server(),
        timeout_secs: Some(10),
    };
    CouchClient::from_config(&config)
}

#[test]
fn database_and_document_lifecycle() {
    let client = connect();
    let auth = admin();
    let auth = Some(&auth);

    // Step 1: create the database, then fail to create it again.
    assert!(!client.databases().exists("recipes", auth).unwrap());
    assert!(client.databases().create("recipes", None, auth).unwrap().ok);
    let err = client.databases().create("recipes", None, auth).unwrap_err();
    assert!(matches!(err, ApiError::CouchError { status: 412, ref error, .. } if error == "file_exists"));
    assert!(client.databases().exists("recipes", auth).unwrap());

    // Step 2: create a document with a server-assigned id.
    let docs = client.documents();
    let created = docs.create("recipes", &json!({"name": "soup", "kind": "starter"}), None, auth).unwrap();
    assert!(created.ok);
    assert!(created.rev.starts_with("1-"));

    // Step 3: fetch it and check head agrees on the revision.
    let mut doc = docs.get("recipes", &created.id, None, auth).unwrap();
    assert_eq!(doc["name"], "soup");
    assert_eq!(docs.head("recipes", &created.id, None, auth).unwrap(), created.rev);

    // Step 4: update, then retry with the stale revision.
    doc.insert("name".into(), json!("stew"));
    let updated = docs.update("recipes", &created.id, &doc, None, auth).unwrap();
    assert!(updated.rev.starts_with("2-"));
    let err = docs.update("recipes", &created.id, &doc, None, auth).unwrap_err();
    assert!(err.is_conflict());

    // Step 5: bulk insert two more, one of which clashes.
    let batch = vec![
        json!({"_id": "cake", "kind": "dessert"}).as_object().unwrap().clone(),
        json!({"_id": "tart", "kind": "dessert"}).as_object().unwrap().clone(),
    ];
    let items = client.databases().bulk_insert("recipes", &batch, auth).unwrap();
    assert!(items.iter().all(|item| item.ok));
    let items = client.databases().bulk_insert("recipes", &batch[..1], auth).unwrap();
    assert_eq!(items[0].error.as_deref(), Some("conflict"));

    // Step 6: all_docs by range and by keys.
    let range = AllDocsOptions {
        start_key: Some(json!("cake")),
        end_key: Some(json!("tart")),
        inclusive_end: Some(false),
        ..AllDocsOptions::default()
    };
    let rows = client.databases().all_docs("recipes", Some(&range), auth).unwrap();
    assert_eq!(rows.total_rows, 3);
    let ids: Vec<&str> = rows.rows.iter().map(|row| row.id.as_str()).collect();
    assert!(ids.contains(&"cake"));
    assert!(!ids.contains(&"tart"));

    let by_keys = AllDocsOptions {
        keys: vec![json!("tart"), json!("missing")],
        include_docs: true,
        ..AllDocsOptions::default()
    };
    let rows = client.databases().all_docs("recipes", Some(&by_keys), auth).unwrap();
    assert_eq!(rows.rows[0].doc.as_ref().unwrap()["kind"], "dessert");
    assert_eq!(rows.rows[1].error.as_deref(), Some("not_found"));

    // Step 7: Mango index and query.
    let index = IndexDefinition {
        index: json!({"fields": ["kind"]}),
        name: Some("by-kind".to_string()),
        ..IndexDefinition::default()
    };
    assert_eq!(client.databases().create_index("recipes", &index, auth).unwrap().result, "created");
    let mut query = FindRequest::new(json!({"kind": "dessert"}));
    query.fields = vec!["_id".to_string()];
    query.execution_stats = true;
    let found = client.databases().find("recipes", &query, auth).unwrap();
    assert_eq!(found.docs.len(), 2);
    assert_eq!(found.execution_stats.unwrap().results_returned, 2);

    // Step 8: delete the document; it is then not found.
    docs.delete("recipes", &created.id, &updated.rev, auth).unwrap();
    let err = docs.get("recipes", &created.id, None, auth).unwrap_err();
    assert!(matches!(err, ApiError::NotFound { resource: "document", .. }));

    // Step 9: database info, then drop it.
    let info = client.databases().get("recipes", auth).unwrap();
    assert_eq!(info.db_name, "recipes");
    assert_eq!(info.doc_count, 2);
    assert_eq!(info.doc_del_count, 1);
    client.databases().delete("recipes", auth).unwrap();
    assert!(client.databases().get("recipes", auth).unwrap_err().is_not_found());
}

#[test]
fn design_document_lifecycle() {
    let client = connect();
    let auth = admin();
    let auth = Some(&auth);
    client.databases().create("blog", None, auth).unwrap();

    let mut ddoc = couchdb_core::DesignDocument::new("posts");
    ddoc.views.insert(
        "by_date".to_string(),
        couchdb_core::ViewDefinition {
            map: "function(doc) { emit(doc.date, 1); }".to_string(),
            reduce: Some("_count".to_string()),
        },
    );
    let written = client.design_documents().put("blog", &ddoc, auth).unwrap();

    let stored = client.design_documents().get("blog", "posts", auth).unwrap();
    assert_eq!(stored.id, "_design/posts");
    assert_eq!(stored.rev.as_deref(), Some(written.rev.as_str()));
    assert_eq!(stored.views["by_date"].reduce.as_deref(), Some("_count"));

    client
        .design_documents()
        .delete("blog", "posts", &written.rev, auth)
        .unwrap();
    let err = client.design_documents().get("blog", "posts", auth).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn security_object_round_trip() {
    let client = connect();
    let auth = admin();
    let auth = Some(&auth);
    client.databases().create("vault", None, auth).unwrap();

    assert_eq!(client.security().get("vault", auth).unwrap(), SecurityObject::default());
    let security = SecurityObject {
        admins: Members {
            names: vec!["ann".to_string()],
            roles: Vec::new(),
        },
        members: Members {
            names: Vec::new(),
            roles: vec!["staff".to_string()],
        },
    };
    client.security().set("vault", &security, auth).unwrap();
    assert_eq!(client.security().get("vault", auth).unwrap(), security);
}

#[test]
fn users_and_sessions() {
    let client = connect();
    let auth = admin();
    let auth = Some(&auth);
    let users = client.users();

    // Step 1: create a user and read it back.
    let created = users.create("jan", "apple", &[], auth).unwrap();
    assert_eq!(created.id, "org.couchdb.user:jan");
    let jan = users.get("jan", auth).unwrap();
    assert_eq!(jan.user_type, "user");
    assert!(jan.password.is_none());
    assert!(jan.derived_key.is_some());

    // Step 2: changing roles keeps the password working.
    let updated = users
        .update_roles("jan", &jan.rev, &["dev".to_string()], auth)
        .unwrap();
    let (login, cookie) = client.sessions().login("jan", "apple", None).unwrap();
    assert_eq!(login.roles, vec!["dev"]);
    let cookie = cookie.expect("session cookie");

    // Step 3: the cookie authenticates later requests.
    let as_jan = Authenticator::cookie(cookie);
    let session = client.sessions().get(Some(&as_jan)).unwrap();
    assert_eq!(session.user_ctx.name.as_deref(), Some("jan"));
    assert_eq!(session.info.authenticated.as_deref(), Some("cookie"));
    client.sessions().logout(Some(&as_jan)).unwrap();
    let anonymous = client.sessions().get(Some(&as_jan)).unwrap();
    assert!(anonymous.user_ctx.name.is_none());

    // Step 4: a new password replaces the old one.
    users.update_password("jan", &updated.rev, "pear", auth).unwrap();
    let err = client.sessions().login("jan", "apple", None).unwrap_err();
    assert_eq!(err.status(), Some(401));
    client.sessions().login("jan", "pear", None).unwrap();

    // Step 5: list, then delete.
    let listed = users.list(auth).unwrap();
    assert_eq!(listed.len(), 1);
    users.delete("jan", &listed[0].rev, auth).unwrap();
    assert!(users.get("jan", auth).unwrap_err().is_not_found());
}

#[test]
fn server_and_configuration() {
    let client = connect();
    let auth = admin();
    let auth = Some(&auth);

    let info = client.server().info(None).unwrap();
    assert_eq!(info.couchdb, "Welcome");
    assert!(client.server().all_dbs(auth).unwrap().contains(&"_users".to_string()));
    assert_eq!(client.server().uuids(Some(4), None).unwrap().uuids.len(), 4);

    let config = client.configuration();
    assert_eq!(config.set_value(LOCAL_NODE, "couchdb", "max_dbs_open", "5", auth).unwrap(), "");
    assert_eq!(config.set_value(LOCAL_NODE, "couchdb", "max_dbs_open", "7", auth).unwrap(), "5");
    assert_eq!(config.get_value(LOCAL_NODE, "couchdb", "max_dbs_open", auth).unwrap(), "7");
    assert!(config.get_section(LOCAL_NODE, "couchdb", auth).unwrap().contains_key("max_dbs_open"));
    assert_eq!(config.delete_value(LOCAL_NODE, "couchdb", "max_dbs_open", auth).unwrap(), "7");
    assert!(config.get_all(LOCAL_NODE, auth).unwrap().contains_key("log"));
    config.reload(LOCAL_NODE, auth).unwrap();

    config.create_admin(LOCAL_NODE, "root", "toor", auth).unwrap();
    assert!(config.get_admins(LOCAL_NODE, auth).unwrap().contains_key("root"));
    let (login, _) = client.sessions().login("root", "toor", None).unwrap();
    assert_eq!(login.roles, vec!["_admin"]);
    config.update_admin_password(LOCAL_NODE, "root", "n3w", auth).unwrap();
    client.sessions().login("root", "n3w", None).unwrap();
    config.delete_admin(LOCAL_NODE, "root", auth).unwrap();
    assert!(!config.get_admins(LOCAL_NODE, auth).unwrap().contains_key("root"));
}

#[test]
fn unresponsive_server_times_out() {
    let config = ClientConfig {
        base_url: common::spawn_silent_server(),
        timeout_secs: Some(1),
    };
    let client = CouchClient::from_config(&config);

    let started = Instant::now();
    let err = client.server().info(None).unwrap_err();
    assert!(
        matches!(err, ApiError::Transport(TransportError::Timeout(_))),
        "expected timeout, got {err:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}
