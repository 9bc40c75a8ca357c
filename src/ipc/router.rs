use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::{err, HandlerErr};
use crate::model::Role;

/// What a method demands of the caller. Checked once, here, before any
/// handler runs; handlers never re-check roles.
enum Capability {
    Open,
    Any,
    Roles(&'static [Role]),
}

fn required_capability(method: &str) -> Capability {
    match method {
        "health" | "workspace.select" | "users.register" => Capability::Open,
        "backup.exportWorkspaceBundle" | "backup.importWorkspaceBundle" => Capability::Open,

        "classes.create" | "classes.delete" => Capability::Roles(&[Role::Admin]),
        "classes.attach" | "attendance.save" | "attendance.sheetOpen" => {
            Capability::Roles(&[Role::Teacher])
        }
        "sections.ensure" | "sections.assignTeacher" => {
            Capability::Roles(&[Role::Teacher, Role::Admin])
        }
        "sections.join" => Capability::Roles(&[Role::Student]),

        "users.get" | "classes.list" | "classes.counts" | "sections.list" | "sections.roster"
        | "attendance.summary" => Capability::Any,

        // Unknown methods fall through to the not_implemented reply below.
        _ => Capability::Open,
    }
}

fn check_capability(req: &Request) -> Result<(), HandlerErr> {
    match required_capability(&req.method) {
        Capability::Open => Ok(()),
        Capability::Any => match req.principal {
            Some(_) => Ok(()),
            None => Err(HandlerErr::unauthorized("authentication required")),
        },
        Capability::Roles(allowed) => {
            let Some(principal) = req.principal.as_ref() else {
                return Err(HandlerErr::unauthorized("authentication required"));
            };
            if allowed.contains(&principal.role) {
                Ok(())
            } else {
                Err(HandlerErr::unauthorized(format!(
                    "role {} may not call {}",
                    principal.role.as_str(),
                    req.method
                )))
            }
        }
    }
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Err(e) = check_capability(&req) {
        return e.response(&req.id);
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::membership::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
