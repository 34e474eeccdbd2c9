//! In-memory stand-in for a CouchDB 3.x node.
//!
//! Speaks the subset of the HTTP API the client crate uses: databases,
//! documents with revision checks, `_all_docs`, `_bulk_docs`, equality-only
//! `_find`, `_index`, `_security`, `_session` cookies, `_uuids` and node
//! configuration. Views are not evaluated.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

use store::{hash_password, new_id, split_doc, Body, Couch, WriteError, USERS_DB};

pub type SharedState = Arc<RwLock<Couch>>;

const SESSION_COOKIE: &str = "AuthSession";

/// Same default as CouchDB's `[uuids] max_count`.
const MAX_UUID_COUNT: u64 = 1000;

pub fn app() -> Router {
    let state: SharedState = Arc::new(RwLock::new(Couch::default()));
    Router::new()
        .route("/", get(welcome))
        .route("/_all_dbs", get(all_dbs))
        .route("/_uuids", get(uuids))
        .route("/_session", get(get_session).post(login).delete(logout))
        .route("/_node/{node}/_config", get(get_config))
        .route("/_node/{node}/_config/_reload", post(reload_config))
        .route("/_node/{node}/_config/{section}", get(get_config_section))
        .route(
            "/_node/{node}/_config/{section}/{key}",
            get(get_config_value)
                .put(set_config_value)
                .delete(delete_config_value),
        )
        .route(
            "/{db}",
            get(get_db).put(create_db).delete(delete_db).post(create_doc),
        )
        .route("/{db}/_all_docs", get(all_docs).post(all_docs_by_keys))
        .route("/{db}/_bulk_docs", post(bulk_docs))
        .route("/{db}/_find", post(find))
        .route("/{db}/_index", post(create_index))
        .route("/{db}/_security", get(get_security).put(put_security))
        .route(
            "/{db}/_design/{ddoc}",
            get(get_design).put(put_design).delete(delete_design),
        )
        .route(
            "/{db}/{doc_id}",
            get(get_doc).put(put_doc).delete(delete_doc),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

type Params = Query<HashMap<String, String>>;

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn couch_error(status: StatusCode, error: &str, reason: &str) -> Response {
    reply(status, json!({"error": error, "reason": reason}))
}

fn missing_db() -> Response {
    couch_error(StatusCode::NOT_FOUND, "not_found", "Database does not exist.")
}

fn write_error(err: &WriteError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    reply(status, err.to_json())
}

/// Documents written to `_users` have their password hashed.
fn prepare(db: &str, body: &mut Body) {
    if db == USERS_DB {
        hash_password(body);
    }
}

// --- server ---

async fn welcome() -> Json<Value> {
    Json(json!({
        "couchdb": "Welcome",
        "version": "3.5.0",
        "git_sha": "mock",
        "uuid": "85fb71bf700c17267fef77535820e371",
        "features": ["access-ready", "partitioned", "pluggable-storage-engines", "scheduler"],
        "vendor": {"name": "mock-server"}
    }))
}

async fn all_dbs(State(state): State<SharedState>) -> Json<Vec<String>> {
    let couch = state.read().await;
    Json(couch.dbs.keys().cloned().collect())
}

async fn uuids(Query(params): Params) -> Response {
    let count = params
        .get("count")
        .and_then(|c| c.parse::<u64>().ok())
        .unwrap_or(1);
    if count > MAX_UUID_COUNT {
        return couch_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "count parameter too large",
        );
    }
    let uuids: Vec<String> = (0..count).map(|_| new_id()).collect();
    reply(StatusCode::OK, json!({ "uuids": uuids }))
}

// --- sessions ---

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Who is making this request, and through which handler.
fn identify(couch: &Couch, headers: &HeaderMap) -> Option<(String, Vec<String>, &'static str)> {
    if let Some(name) = session_token(headers).and_then(|t| couch.sessions.get(&t).cloned()) {
        let roles = couch.roles(&name);
        return Some((name, roles, "cookie"));
    }
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if let Some(encoded) = authorization.and_then(|v| v.strip_prefix("Basic ")) {
        let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (name, password) = decoded.split_once(':')?;
        let roles = couch.authenticate(name, password)?;
        return Some((name.to_string(), roles, "default"));
    }
    let proxy_user = headers
        .get("x-auth-couchdb-username")
        .and_then(|v| v.to_str().ok())?;
    let roles = headers
        .get("x-auth-couchdb-roles")
        .and_then(|v| v.to_str().ok())
        .map(|r| r.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    Some((proxy_user.to_string(), roles, "proxy"))
}

async fn login(State(state): State<SharedState>, Json(credentials): Json<Value>) -> Response {
    let name = credentials["name"].as_str().unwrap_or_default();
    let password = credentials["password"].as_str().unwrap_or_default();

    let mut couch = state.write().await;
    let Some(roles) = couch.authenticate(name, password) else {
        return couch_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Name or password is incorrect.",
        );
    };
    let token = couch.open_session(name);
    let cookie = format!("{SESSION_COOKIE}={token}; Version=1; Path=/; HttpOnly");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({"ok": true, "name": name, "roles": roles})),
    )
        .into_response()
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.write().await.sessions.remove(&token);
    }
    let cookie = format!("{SESSION_COOKIE}=; Version=1; Path=/; HttpOnly; Max-Age=0");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({"ok": true})),
    )
        .into_response()
}

async fn get_session(State(state): State<SharedState>, headers: HeaderMap) -> Json<Value> {
    let couch = state.read().await;
    let handlers = json!(["cookie", "default"]);
    match identify(&couch, &headers) {
        Some((name, roles, handler)) => Json(json!({
            "ok": true,
            "userCtx": {"name": name, "roles": roles},
            "info": {"authentication_handlers": handlers, "authenticated": handler}
        })),
        None => Json(json!({
            "ok": true,
            "userCtx": {"name": null, "roles": []},
            "info": {"authentication_handlers": handlers}
        })),
    }
}

// --- configuration ---

async fn get_config(State(state): State<SharedState>, Path(_node): Path<String>) -> Json<Value> {
    let couch = state.read().await;
    Json(json!(couch.config))
}

async fn reload_config(Path(_node): Path<String>) -> Json<Value> {
    Json(json!({"ok": true}))
}

async fn get_config_section(
    State(state): State<SharedState>,
    Path((_node, section)): Path<(String, String)>,
) -> Json<Value> {
    let couch = state.read().await;
    Json(json!(couch.config.get(&section).cloned().unwrap_or_default()))
}

async fn get_config_value(
    State(state): State<SharedState>,
    Path((_node, section, key)): Path<(String, String, String)>,
) -> Response {
    let couch = state.read().await;
    match couch.config.get(&section).and_then(|s| s.get(&key)) {
        Some(value) => reply(StatusCode::OK, json!(value)),
        None => couch_error(StatusCode::NOT_FOUND, "not_found", "unknown_config_value"),
    }
}

async fn set_config_value(
    State(state): State<SharedState>,
    Path((_node, section, key)): Path<(String, String, String)>,
    Json(value): Json<Value>,
) -> Response {
    let Value::String(value) = value else {
        return couch_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "request body must be a JSON string",
        );
    };
    let mut couch = state.write().await;
    let previous = couch
        .config
        .entry(section)
        .or_default()
        .insert(key, value)
        .unwrap_or_default();
    reply(StatusCode::OK, json!(previous))
}

async fn delete_config_value(
    State(state): State<SharedState>,
    Path((_node, section, key)): Path<(String, String, String)>,
) -> Response {
    let mut couch = state.write().await;
    match couch.config.get_mut(&section).and_then(|s| s.remove(&key)) {
        Some(previous) => reply(StatusCode::OK, json!(previous)),
        None => couch_error(StatusCode::NOT_FOUND, "not_found", "unknown_config_value"),
    }
}

// --- databases ---

fn valid_db_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c)
        }),
        _ => false,
    }
}

async fn get_db(State(state): State<SharedState>, Path(db): Path<String>) -> Response {
    let couch = state.read().await;
    match couch.dbs.get(&db) {
        Some(database) => reply(StatusCode::OK, database.info(&db)),
        None => missing_db(),
    }
}

async fn create_db(State(state): State<SharedState>, Path(db): Path<String>) -> Response {
    if !valid_db_name(&db) {
        return couch_error(
            StatusCode::BAD_REQUEST,
            "illegal_database_name",
            "Name must begin with a letter.",
        );
    }
    let mut couch = state.write().await;
    if couch.dbs.contains_key(&db) {
        return couch_error(
            StatusCode::PRECONDITION_FAILED,
            "file_exists",
            "The database could not be created, the file already exists.",
        );
    }
    couch.dbs.insert(db, Default::default());
    reply(StatusCode::CREATED, json!({"ok": true}))
}

async fn delete_db(State(state): State<SharedState>, Path(db): Path<String>) -> Response {
    let mut couch = state.write().await;
    match couch.dbs.remove(&db) {
        Some(_) => reply(StatusCode::OK, json!({"ok": true})),
        None => missing_db(),
    }
}

async fn get_security(State(state): State<SharedState>, Path(db): Path<String>) -> Response {
    let couch = state.read().await;
    match couch.dbs.get(&db) {
        Some(database) => reply(
            StatusCode::OK,
            database.security.clone().unwrap_or_else(|| json!({})),
        ),
        None => missing_db(),
    }
}

async fn put_security(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(security): Json<Value>,
) -> Response {
    let mut couch = state.write().await;
    match couch.dbs.get_mut(&db) {
        Some(database) => {
            database.security = Some(security);
            reply(StatusCode::OK, json!({"ok": true}))
        }
        None => missing_db(),
    }
}

// --- documents ---

async fn get_doc(
    State(state): State<SharedState>,
    Path((db, doc_id)): Path<(String, String)>,
) -> Response {
    read_doc(&state, &db, &doc_id).await
}

async fn read_doc(state: &SharedState, db: &str, doc_id: &str) -> Response {
    let couch = state.read().await;
    let Some(database) = couch.dbs.get(db) else {
        return missing_db();
    };
    match database.docs.get(doc_id) {
        Some(doc) if !doc.deleted => (
            StatusCode::OK,
            [(header::ETAG, format!("\"{}\"", doc.rev))],
            Json(doc.to_json(doc_id)),
        )
            .into_response(),
        Some(_) => couch_error(StatusCode::NOT_FOUND, "not_found", "deleted"),
        None => couch_error(StatusCode::NOT_FOUND, "not_found", "missing"),
    }
}

async fn create_doc(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Query(params): Params,
    Json(doc): Json<Value>,
) -> Response {
    let (id, rev, _, mut body) = match split_doc(doc) {
        Ok(parts) => parts,
        Err(err) => return write_error(&err),
    };
    prepare(&db, &mut body);
    let id = id.unwrap_or_else(new_id);

    let mut couch = state.write().await;
    let Some(database) = couch.dbs.get_mut(&db) else {
        return missing_db();
    };
    match database.write(&id, rev.as_deref(), body, false) {
        Ok(rev) => {
            let status = if params.get("batch").map(String::as_str) == Some("ok") {
                StatusCode::ACCEPTED
            } else {
                StatusCode::CREATED
            };
            reply(status, json!({"ok": true, "id": id, "rev": rev}))
        }
        Err(err) => write_error(&err),
    }
}

async fn put_doc(
    State(state): State<SharedState>,
    Path((db, doc_id)): Path<(String, String)>,
    Query(params): Params,
    Json(doc): Json<Value>,
) -> Response {
    store_doc(&state, &db, &doc_id, params.get("rev").cloned(), doc).await
}

async fn store_doc(
    state: &SharedState,
    db: &str,
    doc_id: &str,
    query_rev: Option<String>,
    doc: Value,
) -> Response {
    let (_, body_rev, deleted, mut body) = match split_doc(doc) {
        Ok(parts) => parts,
        Err(err) => return write_error(&err),
    };
    prepare(db, &mut body);
    let rev = query_rev.or(body_rev);

    let mut couch = state.write().await;
    let Some(database) = couch.dbs.get_mut(db) else {
        return missing_db();
    };
    match database.write(doc_id, rev.as_deref(), body, deleted) {
        Ok(rev) => reply(
            StatusCode::CREATED,
            json!({"ok": true, "id": doc_id, "rev": rev}),
        ),
        Err(err) => write_error(&err),
    }
}

async fn delete_doc(
    State(state): State<SharedState>,
    Path((db, doc_id)): Path<(String, String)>,
    Query(params): Params,
) -> Response {
    remove_doc(&state, &db, &doc_id, params.get("rev").map(String::as_str)).await
}

async fn remove_doc(state: &SharedState, db: &str, doc_id: &str, rev: Option<&str>) -> Response {
    let mut couch = state.write().await;
    let Some(database) = couch.dbs.get_mut(db) else {
        return missing_db();
    };
    match database.write(doc_id, rev, Body::new(), true) {
        Ok(rev) => reply(StatusCode::OK, json!({"ok": true, "id": doc_id, "rev": rev})),
        Err(err) => write_error(&err),
    }
}

// --- design documents ---

async fn get_design(
    State(state): State<SharedState>,
    Path((db, ddoc)): Path<(String, String)>,
) -> Response {
    read_doc(&state, &db, &format!("_design/{ddoc}")).await
}

async fn put_design(
    State(state): State<SharedState>,
    Path((db, ddoc)): Path<(String, String)>,
    Query(params): Params,
    Json(doc): Json<Value>,
) -> Response {
    store_doc(
        &state,
        &db,
        &format!("_design/{ddoc}"),
        params.get("rev").cloned(),
        doc,
    )
    .await
}

async fn delete_design(
    State(state): State<SharedState>,
    Path((db, ddoc)): Path<(String, String)>,
    Query(params): Params,
) -> Response {
    let id = format!("_design/{ddoc}");
    remove_doc(&state, &db, &id, params.get("rev").map(String::as_str)).await
}

// --- queries ---

/// JSON-encoded key parameter as a document id.
fn key_param(params: &HashMap<String, String>, name: &str) -> Option<String> {
    let raw = params.get(name)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(s)) => Some(s),
        _ => Some(raw.clone()),
    }
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params.get(name).map(String::as_str) == Some("true")
}

async fn all_docs(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Query(params): Params,
) -> Response {
    let couch = state.read().await;
    let Some(database) = couch.dbs.get(&db) else {
        return missing_db();
    };

    let include_docs = flag(&params, "include_docs");
    let descending = flag(&params, "descending");
    let key = key_param(&params, "key");
    let start = key_param(&params, "startkey");
    let end = key_param(&params, "endkey");
    let inclusive_end = params.get("inclusive_end").map(String::as_str) != Some("false");
    let skip = params.get("skip").and_then(|s| s.parse().ok()).unwrap_or(0);
    let limit = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(usize::MAX);

    let mut live: Vec<(&String, &store::StoredDoc)> =
        database.docs.iter().filter(|(_, doc)| !doc.deleted).collect();
    let total_rows = live.len();
    if descending {
        live.reverse();
    }
    let in_range = |id: &str| {
        if let Some(key) = &key {
            return id == key;
        }
        let after_start = start.as_deref().map_or(true, |s| {
            if descending { id <= s } else { id >= s }
        });
        let before_end = end.as_deref().map_or(true, |e| match (descending, inclusive_end) {
            (false, true) => id <= e,
            (false, false) => id < e,
            (true, true) => id >= e,
            (true, false) => id > e,
        });
        after_start && before_end
    };

    let rows: Vec<Value> = live
        .into_iter()
        .filter(|(id, _)| in_range(id.as_str()))
        .skip(skip)
        .take(limit)
        .map(|(id, doc)| {
            let mut row = json!({"id": id, "key": id, "value": {"rev": doc.rev}});
            if include_docs {
                row["doc"] = doc.to_json(id);
            }
            row
        })
        .collect();

    reply(
        StatusCode::OK,
        json!({"total_rows": total_rows, "offset": skip, "rows": rows}),
    )
}

async fn all_docs_by_keys(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Query(params): Params,
    Json(body): Json<Value>,
) -> Response {
    let couch = state.read().await;
    let Some(database) = couch.dbs.get(&db) else {
        return missing_db();
    };
    let Some(keys) = body["keys"].as_array() else {
        return couch_error(StatusCode::BAD_REQUEST, "bad_request", "`keys` must be an array");
    };
    let include_docs = flag(&params, "include_docs");

    let rows: Vec<Value> = keys
        .iter()
        .map(|key| {
            let doc = key.as_str().and_then(|id| database.docs.get(id).map(|doc| (id, doc)));
            match doc {
                Some((id, doc)) if doc.deleted => json!({
                    "id": id, "key": id, "value": {"rev": doc.rev, "deleted": true}, "doc": null
                }),
                Some((id, doc)) => {
                    let mut row = json!({"id": id, "key": id, "value": {"rev": doc.rev}});
                    if include_docs {
                        row["doc"] = doc.to_json(id);
                    }
                    row
                }
                None => json!({"key": key, "error": "not_found"}),
            }
        })
        .collect();

    let total_rows = database.docs.values().filter(|d| !d.deleted).count();
    reply(
        StatusCode::OK,
        json!({"total_rows": total_rows, "offset": null, "rows": rows}),
    )
}

async fn bulk_docs(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(docs) = body.get("docs").and_then(Value::as_array).cloned() else {
        return couch_error(StatusCode::BAD_REQUEST, "bad_request", "POST body must include `docs` parameter.");
    };
    let mut couch = state.write().await;
    let Some(database) = couch.dbs.get_mut(&db) else {
        return missing_db();
    };

    let results: Vec<Value> = docs
        .into_iter()
        .map(|doc| {
            let (id, rev, deleted, mut body) = match split_doc(doc) {
                Ok(parts) => parts,
                Err(err) => return err.to_json(),
            };
            prepare(&db, &mut body);
            let id = id.unwrap_or_else(new_id);
            match database.write(&id, rev.as_deref(), body, deleted) {
                Ok(rev) => json!({"ok": true, "id": id, "rev": rev}),
                Err(err) => {
                    let mut failure = err.to_json();
                    failure["id"] = Value::from(id);
                    failure
                }
            }
        })
        .collect();

    reply(StatusCode::CREATED, Value::Array(results))
}

fn matches_selector(doc: &Value, selector: &Map<String, Value>) -> bool {
    selector.iter().all(|(field, expected)| {
        let actual = doc.get(field).unwrap_or(&Value::Null);
        match expected.as_object().and_then(|op| op.get("$eq")) {
            Some(value) => actual == value,
            None => actual == expected,
        }
    })
}

async fn find(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(query): Json<Value>,
) -> Response {
    let couch = state.read().await;
    let Some(database) = couch.dbs.get(&db) else {
        return missing_db();
    };
    let Some(selector) = query.get("selector").and_then(Value::as_object) else {
        return couch_error(StatusCode::BAD_REQUEST, "missing_required_key", "Missing required key: selector");
    };
    let skip = query["skip"].as_u64().unwrap_or(0) as usize;
    let limit = query["limit"].as_u64().unwrap_or(25) as usize;
    let fields: Option<Vec<&str>> = query["fields"]
        .as_array()
        .map(|f| f.iter().filter_map(Value::as_str).collect());

    let docs: Vec<Value> = database
        .docs
        .iter()
        .filter(|(id, doc)| !doc.deleted && !id.starts_with("_design/"))
        .map(|(id, doc)| doc.to_json(id))
        .filter(|doc| matches_selector(doc, selector))
        .skip(skip)
        .take(limit)
        .map(|doc| match &fields {
            Some(fields) => {
                let projected: Map<String, Value> = fields
                    .iter()
                    .filter_map(|f| doc.get(*f).map(|v| (f.to_string(), v.clone())))
                    .collect();
                Value::Object(projected)
            }
            None => doc,
        })
        .collect();

    let mut response = json!({"docs": docs, "bookmark": "nil"});
    if query["execution_stats"].as_bool() == Some(true) {
        let returned = response["docs"].as_array().map_or(0, Vec::len);
        response["execution_stats"] = json!({
            "total_keys_examined": 0,
            "total_docs_examined": database.docs.len(),
            "total_quorum_docs_examined": 0,
            "results_returned": returned,
            "execution_time_ms": 0.1
        });
    }
    reply(StatusCode::OK, response)
}

async fn create_index(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(definition): Json<Value>,
) -> Response {
    let mut couch = state.write().await;
    let Some(database) = couch.dbs.get_mut(&db) else {
        return missing_db();
    };
    if !definition["index"]["fields"].is_array() {
        return couch_error(StatusCode::BAD_REQUEST, "invalid_index", "Index must have fields");
    }
    let name = definition["name"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(new_id);
    let ddoc = definition["ddoc"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());
    let result = if database.indexes.insert(name.clone()) {
        "created"
    } else {
        "exists"
    };
    reply(
        StatusCode::OK,
        json!({"result": result, "id": format!("_design/{ddoc}"), "name": name}),
    )
}
