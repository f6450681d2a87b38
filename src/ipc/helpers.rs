use rusqlite::Connection;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::permissions::{PermissionCode, Role};

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))?;
    if v.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("{} must not be empty", key),
        ));
    }
    Ok(v)
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_role(params: &serde_json::Value, key: &str) -> Result<Role, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Role::parse(&raw).ok_or_else(|| {
        HandlerErr::new("bad_params", format!("unknown role: {}", raw))
            .with_details(serde_json::json!({ "roles": ["admin", "teacher", "student"] }))
    })
}

/// A code that is about to be stored must come from the catalog.
pub fn get_catalog_code(params: &serde_json::Value, key: &str) -> Result<PermissionCode, HandlerErr> {
    let code = PermissionCode::new(get_required_str(params, key)?);
    if !code.is_known() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("unknown permission code: {}", code),
        ));
    }
    Ok(code)
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn db_err(code: &'static str) -> impl Fn(anyhow::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, format!("{e:#}"))
}
