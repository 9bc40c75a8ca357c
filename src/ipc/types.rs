use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::model::Role;

/// Authenticated caller, resolved by the session layer before the request
/// reaches the daemon. Everything after the capability gate trusts it.
#[derive(Debug, Deserialize, Clone)]
pub struct Principal {
    pub id: String,
    #[allow(dead_code)]
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub principal: Option<Principal>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
