use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;
use tokio::runtime::Handle;

use crate::config::ShineConfig;
use crate::gate::GateRegistry;
use crate::lookup::{PermissionLookup, Unconfigured};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: ShineConfig,
    pub lookup: Arc<dyn PermissionLookup>,
    pub gates: GateRegistry,
    /// Lookups run here; handlers block on it from the IPC thread.
    pub rt: Handle,
}

impl AppState {
    pub fn new(rt: Handle) -> Self {
        Self {
            workspace: None,
            db: None,
            config: ShineConfig::default(),
            lookup: Arc::new(Unconfigured),
            gates: GateRegistry::default(),
            rt,
        }
    }
}
