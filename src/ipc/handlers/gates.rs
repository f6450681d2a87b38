use crate::gate::{AccessGate, GateProps, RedirectPolicy};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::lookup::Viewer;
use crate::permissions::PermissionCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_WAIT_MS: u64 = 15_000;
const MAX_WAIT_MS: u64 = 120_000;

fn snapshot(gate: &AccessGate) -> serde_json::Value {
    let status = gate.status();
    json!({
        "gateId": gate.id(),
        "generation": status.generation,
        "required": status.required,
        "state": status.state,
        "fallback": gate.props().fallback,
        "view": gate.view(),
    })
}

fn not_mounted(gate_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", format!("gate not mounted: {}", gate_id))
}

fn gates_mount(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let gate_id = get_required_str(&req.params, "gateId")?;
    let user_id = get_required_str(&req.params, "userId")?;
    let required = PermissionCode::new(get_required_str(&req.params, "required")?);

    let mut props = GateProps::new(required);
    if let Some(fallback) = get_optional_str(&req.params, "fallback") {
        props = props.with_fallback(fallback);
    }
    if let Some(route) = get_optional_str(&req.params, "requestedRoute") {
        props = props.with_requested_route(route);
    }

    let gate = AccessGate::mount(
        &state.rt,
        gate_id.clone(),
        Viewer::new(user_id),
        props,
        Arc::clone(&state.lookup),
        state.config.lookup_timeout(),
        RedirectPolicy::from_config(&state.config),
    );
    let out = snapshot(&gate);
    state.gates.insert(gate);
    tracing::debug!(gate = %gate_id, "gate mounted");
    Ok(out)
}

fn gates_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let gate_id = get_required_str(&req.params, "gateId")?;
    let required = PermissionCode::new(get_required_str(&req.params, "required")?);
    let rt = state.rt.clone();
    let gate = state
        .gates
        .get_mut(&gate_id)
        .ok_or_else(|| not_mounted(&gate_id))?;
    let restarted = gate.set_required(&rt, required);
    let mut out = snapshot(gate);
    out["restarted"] = json!(restarted);
    Ok(out)
}

fn gates_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let gate_id = get_required_str(&req.params, "gateId")?;
    let gate = state.gates.get(&gate_id).ok_or_else(|| not_mounted(&gate_id))?;
    Ok(snapshot(gate))
}

fn gates_wait(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let gate_id = get_required_str(&req.params, "gateId")?;
    let wait_ms = req
        .params
        .get("timeoutMs")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_WAIT_MS)
        .min(MAX_WAIT_MS);
    let gate = state.gates.get(&gate_id).ok_or_else(|| not_mounted(&gate_id))?;
    let settled = state
        .rt
        .block_on(gate.wait_settled(Some(Duration::from_millis(wait_ms))))
        .is_some();
    let mut out = snapshot(gate);
    out["settled"] = json!(settled);
    Ok(out)
}

fn gates_unmount(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let gate_id = get_required_str(&req.params, "gateId")?;
    let unmounted = state.gates.remove(&gate_id);
    Ok(json!({ "gateId": gate_id, "unmounted": unmounted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gates.mount" => gates_mount(state, req),
        "gates.update" => gates_update(state, req),
        "gates.get" => gates_get(state, req),
        "gates.wait" => gates_wait(state, req),
        "gates.unmount" => gates_unmount(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
