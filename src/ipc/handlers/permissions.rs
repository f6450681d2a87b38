use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::lookup::{lookup_with_timeout, LookupResult, Viewer};
use crate::permissions::{has_permission, PermissionCode, CATALOG};
use serde_json::json;

/// One lookup for `user_id`, bounded by the configured timeout.
pub fn lookup_blocking(state: &AppState, user_id: &str) -> LookupResult {
    let viewer = Viewer::new(user_id);
    let timeout = state.config.lookup_timeout();
    state
        .rt
        .block_on(lookup_with_timeout(state.lookup.as_ref(), &viewer, timeout))
}

fn handle_catalog(_state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "codes": CATALOG }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user_id = match get_required_str(&req.params, "userId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match lookup_blocking(state, &user_id) {
        Ok(set) => ok(
            &req.id,
            json!({ "userId": set.user_id(), "codes": set.to_strings() }),
        ),
        Err(e) => {
            tracing::warn!(user = %user_id, error = %e, "permission lookup failed");
            HandlerErr::new("lookup_failed", e.to_string())
                .with_details(json!({ "kind": e.code() }))
                .response(&req.id)
        }
    }
}

fn handle_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user_id = match get_required_str(&req.params, "userId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let code = match get_required_str(&req.params, "code") {
        Ok(v) => PermissionCode::new(v),
        Err(e) => return e.response(&req.id),
    };

    // Fails closed: a lookup error is an answer (not granted), not an IPC error.
    match lookup_blocking(state, &user_id) {
        Ok(set) => ok(
            &req.id,
            json!({
                "userId": user_id,
                "code": code,
                "known": code.is_known(),
                "granted": has_permission(&code, &set),
            }),
        ),
        Err(e) => {
            tracing::warn!(user = %user_id, code = %code, error = %e, "permission lookup failed; denying");
            ok(
                &req.id,
                json!({
                    "userId": user_id,
                    "code": code,
                    "known": code.is_known(),
                    "granted": false,
                    "error": { "kind": e.code(), "message": e.to_string() },
                }),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "permissions.catalog" => Some(handle_catalog(state, req)),
        "permissions.get" => Some(handle_get(state, req)),
        "permissions.check" => Some(handle_check(state, req)),
        _ => None,
    }
}
