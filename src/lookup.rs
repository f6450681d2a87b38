//! Permission lookup service.
//!
//! A lookup resolves a viewer to the set of permission codes they hold right
//! now. Every call is an independent query: nothing is cached between calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db;
use crate::permissions::{PermissionCode, Role, UserPermissionSet};

/// Who is asking. Passed explicitly to every lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("permission directory unavailable: {0}")]
    Unavailable(String),

    #[error("permission lookup timed out after {0:?}")]
    TimedOut(Duration),
}

impl LookupError {
    pub fn code(&self) -> &'static str {
        match self {
            LookupError::UnknownUser(_) => "unknown_user",
            LookupError::Unavailable(_) => "unavailable",
            LookupError::TimedOut(_) => "timed_out",
        }
    }
}

pub type LookupResult = Result<UserPermissionSet, LookupError>;

#[async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn get_user_permissions(&self, viewer: &Viewer) -> LookupResult;
}

/// Runs a lookup bounded by `timeout`, if any.
pub async fn lookup_with_timeout(
    lookup: &dyn PermissionLookup,
    viewer: &Viewer,
    timeout: Option<Duration>,
) -> LookupResult {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, lookup.get_user_permissions(viewer))
            .await
            .unwrap_or(Err(LookupError::TimedOut(limit))),
        None => lookup.get_user_permissions(viewer).await,
    }
}

/// Installed until a workspace is selected. Always fails closed.
pub struct Unconfigured;

#[async_trait]
impl PermissionLookup for Unconfigured {
    async fn get_user_permissions(&self, _viewer: &Viewer) -> LookupResult {
        Err(LookupError::Unavailable("no workspace selected".to_string()))
    }
}

/// Reads the workspace SQLite directory, one fresh connection per call.
pub struct DirectoryLookup {
    db_path: PathBuf,
    latency: Duration,
}

impl DirectoryLookup {
    pub fn new(db_path: PathBuf, latency: Duration) -> Self {
        Self { db_path, latency }
    }
}

#[async_trait]
impl PermissionLookup for DirectoryLookup {
    async fn get_user_permissions(&self, viewer: &Viewer) -> LookupResult {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let path = self.db_path.clone();
        let user_id = viewer.user_id.clone();
        let read = tokio::task::spawn_blocking(move || {
            let conn = db::open_directory_readonly(&path)?;
            db::user_permission_codes(&conn, &user_id)
        })
        .await
        .map_err(|e| LookupError::Unavailable(format!("lookup task failed: {e}")))?;

        match read {
            Ok(Some(codes)) => Ok(UserPermissionSet::new(
                viewer.user_id.clone(),
                codes.into_iter().map(PermissionCode::new),
            )),
            Ok(None) => Err(LookupError::UnknownUser(viewer.user_id.clone())),
            Err(e) => Err(LookupError::Unavailable(format!("{e:#}"))),
        }
    }
}

/// In-memory directory: user id -> granted codes.
#[derive(Clone, Default)]
pub struct StaticLookup {
    users: Arc<HashMap<String, Vec<PermissionCode>>>,
    latency: Duration,
}

impl StaticLookup {
    pub fn new<I, C>(users: I) -> Self
    where
        I: IntoIterator<Item = (String, C)>,
        C: IntoIterator<Item = PermissionCode>,
    {
        Self {
            users: Arc::new(
                users
                    .into_iter()
                    .map(|(id, codes)| (id, codes.into_iter().collect()))
                    .collect(),
            ),
            latency: Duration::ZERO,
        }
    }

    /// The demo accounts, one per role, with the built-in grants.
    pub fn demo() -> Self {
        Self::new(Role::ALL.into_iter().map(|role| {
            (format!("{}-1", role.as_str()), role.default_codes())
        }))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl PermissionLookup for StaticLookup {
    async fn get_user_permissions(&self, viewer: &Viewer) -> LookupResult {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.users.get(&viewer.user_id) {
            Some(codes) => Ok(UserPermissionSet::new(
                viewer.user_id.clone(),
                codes.iter().cloned(),
            )),
            None => Err(LookupError::UnknownUser(viewer.user_id.clone())),
        }
    }
}
