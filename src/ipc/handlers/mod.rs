pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod membership;
pub mod users;

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Principal, Request};
use rusqlite::Connection;
use serde::de::DeserializeOwned;

/// Runs a data handler against the open workspace store, converting the
/// result into the response envelope.
pub(super) fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Request) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub(super) fn get_required_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub(super) fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The capability gate admits only methods whose principal requirement is
/// met, so a missing principal past that point is a caller bug.
pub(super) fn required_principal(req: &Request) -> Result<&Principal, HandlerErr> {
    req.principal
        .as_ref()
        .ok_or_else(|| HandlerErr::unauthorized("authentication required"))
}

pub(super) fn parse_doc<T: DeserializeOwned>(
    doc: serde_json::Value,
    what: &str,
) -> Result<T, HandlerErr> {
    serde_json::from_value(doc)
        .map_err(|e| HandlerErr::db_query(format!("stored {} document is malformed: {}", what, e)))
}
