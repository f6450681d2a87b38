use crate::dashboard;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::permissions::lookup_blocking;
use crate::ipc::helpers::{get_required_role, get_required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn dashboard_sections(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let user_id = get_required_str(&req.params, "userId")?;
    let role = get_required_role(&req.params, "role")?;

    let lookup = lookup_blocking(state, &user_id);
    if let Err(e) = &lookup {
        tracing::warn!(user = %user_id, error = %e, "permission lookup failed; hiding all sections");
    }
    let sections = dashboard::resolve(role, lookup.as_ref().ok());

    let mut out = json!({
        "role": role,
        "landingRoute": dashboard::landing_route(role),
        "sections": sections,
    });
    if let Err(e) = lookup {
        out["error"] = json!({ "kind": e.code(), "message": e.to_string() });
    }
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.sections" => dashboard_sections(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
