use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::db;

pub const CONFIG_FILE_NAME: &str = "shine.json";
pub const SETTINGS_KEY: &str = "gate.config";

/// Gate and lookup settings for one workspace.
///
/// Resolved as: built-in defaults, then `shine.json` in the workspace, then the
/// object stored under `gate.config` in the workspace settings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShineConfig {
    /// Where a denied gate without a fallback sends the viewer.
    pub landing_route: String,
    /// `None` disables the bound entirely.
    pub lookup_timeout_ms: Option<u64>,
    /// Artificial delay added to every directory lookup.
    pub simulated_latency_ms: u64,
    /// Append `?returnTo=<requested route>` to redirects.
    pub preserve_return_to: bool,
}

impl Default for ShineConfig {
    fn default() -> Self {
        Self {
            landing_route: "/dashboard".to_string(),
            lookup_timeout_ms: Some(10_000),
            simulated_latency_ms: 0,
            preserve_return_to: false,
        }
    }
}

impl ShineConfig {
    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.lookup_timeout_ms.map(Duration::from_millis)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    pub fn load(workspace: &Path, conn: &Connection) -> anyhow::Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let file = workspace.join(CONFIG_FILE_NAME);
        if file.is_file() {
            let text = std::fs::read_to_string(&file)?;
            let from_file: serde_json::Value = serde_json::from_str(&text)?;
            merge_object(&mut merged, &from_file);
            tracing::debug!(path = %file.display(), "loaded workspace config file");
        }

        if let Some(stored) = db::settings_get_json(conn, SETTINGS_KEY)? {
            merge_object(&mut merged, &stored);
        }

        let cfg: Self = serde_json::from_value(merged)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies a partial update and persists the overrides.
    pub fn update(
        &self,
        conn: &Connection,
        patch: &serde_json::Value,
    ) -> anyhow::Result<Self> {
        if !patch.is_object() {
            anyhow::bail!("config patch must be an object");
        }
        let mut merged = serde_json::to_value(self)?;
        merge_object(&mut merged, patch);
        let next: Self = serde_json::from_value(merged)?;
        next.validate()?;

        let mut stored = db::settings_get_json(conn, SETTINGS_KEY)?
            .unwrap_or_else(|| serde_json::json!({}));
        merge_object(&mut stored, patch);
        db::settings_set_json(conn, SETTINGS_KEY, &stored)?;
        Ok(next)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.landing_route.starts_with('/') {
            anyhow::bail!("landingRoute must start with '/': {}", self.landing_route);
        }
        if self.lookup_timeout_ms == Some(0) {
            anyhow::bail!("lookupTimeoutMs must be positive or null");
        }
        Ok(())
    }
}

/// Shallow merge of `patch` keys into `base`; both are expected to be objects.
fn merge_object(base: &mut serde_json::Value, patch: &serde_json::Value) {
    let (Some(base), Some(patch)) = (base.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (k, v) in patch {
        base.insert(k.clone(), v.clone());
    }
}
