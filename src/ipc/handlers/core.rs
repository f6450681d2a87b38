use crate::config::ShineConfig;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_db;
use crate::ipc::types::{AppState, Request};
use crate::lookup::{DirectoryLookup, StaticLookup};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "mountedGates": state.gates.len(),
        }),
    )
}

fn install_lookup(state: &mut AppState, workspace: &std::path::Path) {
    state.lookup = Arc::new(DirectoryLookup::new(
        db::db_path(workspace),
        state.config.simulated_latency(),
    ));
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let config = match ShineConfig::load(&path, &conn) {
        Ok(cfg) => cfg,
        Err(e) => {
            return err(
                &req.id,
                "config_invalid",
                format!("{e:#}"),
                Some(json!({ "file": crate::config::CONFIG_FILE_NAME })),
            )
        }
    };

    // Gates mounted against the previous directory must not settle from it.
    state.gates.clear();
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.config = config;
    install_lookup(state, &path);
    tracing::info!(workspace = %path.display(), "workspace selected");

    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

/// In-memory demo directory (the three seeded accounts), no workspace on disk.
fn handle_workspace_demo(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.gates.clear();
    state.workspace = None;
    state.db = None;
    state.config = ShineConfig::default();
    state.lookup = Arc::new(StaticLookup::demo().with_latency(state.config.simulated_latency()));
    tracing::info!("demo directory installed");
    ok(&req.id, json!({ "workspacePath": null, "demo": true }))
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match serde_json::to_value(&state.config) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let next = match state.config.update(conn, patch) {
        Ok(cfg) => cfg,
        Err(e) => return err(&req.id, "bad_params", format!("{e:#}"), None),
    };
    state.config = next;
    if let Some(workspace) = state.workspace.clone() {
        install_lookup(state, &workspace);
    }
    tracing::info!(config = ?state.config, "config updated");
    handle_config_get(state, req)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.demo" => Some(handle_workspace_demo(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
