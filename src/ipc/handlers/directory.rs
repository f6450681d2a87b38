use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    db_err, get_catalog_code, get_optional_str, get_required_role, get_required_str, require_db,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn roles_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let roles = db::roles_list(conn).map_err(db_err("db_query_failed"))?;
    let roles: Vec<_> = roles
        .into_iter()
        .map(|(role, codes)| json!({ "role": role, "codes": codes }))
        .collect();
    Ok(json!({ "roles": roles }))
}

fn roles_grant(state: &AppState, req: &Request, grant: bool) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let role = get_required_role(&req.params, "role")?;
    let code = get_catalog_code(&req.params, "code")?;
    let written = if grant {
        db::role_grant(conn, role, code.as_str())
    } else {
        db::role_revoke(conn, role, code.as_str())
    };
    let changed = written.map_err(db_err("db_update_failed"))?;
    tracing::info!(role = %role, code = %code, grant, changed, "role permissions changed");
    Ok(json!({ "role": role, "code": code, "changed": changed }))
}

fn users_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let users = db::users_list(conn).map_err(db_err("db_query_failed"))?;
    let users: Vec<_> = users
        .into_iter()
        .map(|u| {
            json!({
                "id": u.id,
                "displayName": u.display_name,
                "role": u.role,
                "active": u.active,
            })
        })
        .collect();
    Ok(json!({ "users": users }))
}

fn users_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let display_name = get_required_str(&req.params, "displayName")?;
    let role = get_required_role(&req.params, "role")?;
    let user_id =
        get_optional_str(&req.params, "userId").unwrap_or_else(|| Uuid::new_v4().to_string());

    if db::user_exists(conn, &user_id).map_err(db_err("db_query_failed"))? {
        return Err(HandlerErr::new("conflict", format!("user already exists: {}", user_id)));
    }
    db::user_create(conn, &user_id, &display_name, role)
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", format!("{e:#}"))
                .with_details(json!({ "table": "users" }))
        })?;
    tracing::info!(user = %user_id, role = %role, "user created");
    Ok(json!({ "userId": user_id, "displayName": display_name, "role": role }))
}

fn users_set_role(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = get_required_str(&req.params, "userId")?;
    let role = get_required_role(&req.params, "role")?;
    if !db::user_set_role(conn, &user_id, role).map_err(db_err("db_update_failed"))? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }
    Ok(json!({ "userId": user_id, "role": role }))
}

fn users_set_active(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = get_required_str(&req.params, "userId")?;
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing active"))?;
    if !db::user_set_active(conn, &user_id, active).map_err(db_err("db_update_failed"))? {
        return Err(HandlerErr::new("not_found", "user not found"));
    }
    Ok(json!({ "userId": user_id, "active": active }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roles.list" => roles_list(state, req),
        "roles.grant" => roles_grant(state, req, true),
        "roles.revoke" => roles_grant(state, req, false),
        "users.list" => users_list(state, req),
        "users.create" => users_create(state, req),
        "users.setRole" => users_set_role(state, req),
        "users.setActive" => users_set_active(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
