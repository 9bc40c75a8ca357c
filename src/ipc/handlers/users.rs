use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{get_optional_str, get_required_str, parse_doc, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, UserDoc};
use crate::store::{self, Collection};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn parse_role(raw: &str) -> Result<Role, HandlerErr> {
    match raw {
        "student" => Ok(Role::Student),
        "teacher" => Ok(Role::Teacher),
        "admin" => Ok(Role::Admin),
        other => Err(HandlerErr::bad_params(format!("unknown role: {}", other))),
    }
}

/// Salted SHA-256, stored as `sha256:<salt>:<hex>`. Verification happens in
/// the session layer, which splits on the same format.
fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let digest: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("sha256:{}:{}", salt, digest)
}

fn users_register(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(&req.params, "name")?;
    let email = get_required_str(&req.params, "email")?.to_lowercase();
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return Err(HandlerErr::bad_params("missing password")),
    };
    let role = parse_role(&get_required_str(&req.params, "role")?)?;

    let existing = store::find_by_field(conn, Collection::Users, "email", &email)
        .map_err(HandlerErr::db_query)?;
    if existing.is_some() {
        return Err(HandlerErr::conflict("email already registered"));
    }

    let user = UserDoc {
        name,
        email,
        role,
        password_hash: hash_password(&password),
        student_id: get_optional_str(&req.params, "studentId"),
        teacher_id: get_optional_str(&req.params, "teacherId"),
        gender: get_optional_str(&req.params, "gender"),
        classes: Vec::new(),
    };

    let user_id = Uuid::new_v4().to_string();
    let doc = serde_json::to_value(&user)
        .map_err(|e| HandlerErr::db_update(format!("serialize user: {}", e)))?;
    store::insert(conn, Collection::Users, &user_id, &doc).map_err(HandlerErr::db_update)?;

    Ok(json!({ "userId": user_id, "role": user.role.as_str() }))
}

fn users_get(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(&req.params, "userId")?;
    let Some(doc) = store::get(conn, Collection::Users, &user_id).map_err(HandlerErr::db_query)?
    else {
        return Err(HandlerErr::not_found("user not found"));
    };
    let user: UserDoc = parse_doc(doc, "user")?;

    // The password hash never leaves the store.
    let memberships: Vec<serde_json::Value> = user
        .classes
        .iter()
        .map(|m| json!({ "classCode": m.class_code, "section": m.section }))
        .collect();
    Ok(json!({
        "userId": user_id,
        "name": user.name,
        "email": user.email,
        "role": user.role.as_str(),
        "studentId": user.student_id,
        "teacherId": user.teacher_id,
        "gender": user.gender,
        "memberships": memberships,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.register" => Some(with_conn(state, req, users_register)),
        "users.get" => Some(with_conn(state, req, users_get)),
        _ => None,
    }
}
