//! Access gate: decides whether a viewer may see a protected dashboard section.
//!
//! A gate starts `Pending` on mount and whenever its required code changes, runs
//! one lookup per check, and settles to `Granted` or `Denied`. Each check carries
//! a generation number; a result whose generation is no longer current is
//! dropped, so a slow answer for an old code can never overwrite a newer check.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ShineConfig;
use crate::lookup::{lookup_with_timeout, LookupResult, PermissionLookup, Viewer};
use crate::permissions::{has_permission, PermissionCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Pending,
    Granted,
    Denied,
}

impl GateState {
    pub fn is_settled(self) -> bool {
        self != GateState::Pending
    }
}

/// What the caller should put on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GateView {
    /// Full-screen spinner; nothing else may render.
    Loading,
    Children,
    Fallback { fallback: String },
    Redirect { to: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateProps {
    pub required: PermissionCode,
    pub fallback: Option<String>,
    pub requested_route: Option<String>,
}

impl GateProps {
    pub fn new(required: impl Into<PermissionCode>) -> Self {
        Self {
            required: required.into(),
            fallback: None,
            requested_route: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn with_requested_route(mut self, route: impl Into<String>) -> Self {
        self.requested_route = Some(route.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub generation: u64,
    pub required: PermissionCode,
    pub state: GateState,
}

/// Where denial redirects go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub landing_route: String,
    pub preserve_return_to: bool,
}

impl RedirectPolicy {
    pub fn from_config(cfg: &ShineConfig) -> Self {
        Self {
            landing_route: cfg.landing_route.clone(),
            preserve_return_to: cfg.preserve_return_to,
        }
    }

    fn target(&self, requested: Option<&str>) -> String {
        match requested {
            Some(route) if self.preserve_return_to && !route.is_empty() => {
                let sep = if self.landing_route.contains('?') { '&' } else { '?' };
                format!("{}{}returnTo={}", self.landing_route, sep, encode_route(route))
            }
            _ => self.landing_route.clone(),
        }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::from_config(&ShineConfig::default())
    }
}

/// Settles a finished lookup. Failures deny.
pub fn decide(required: &PermissionCode, outcome: &LookupResult) -> GateState {
    match outcome {
        Ok(granted) if has_permission(required, granted) => GateState::Granted,
        Ok(_) => GateState::Denied,
        Err(_) => GateState::Denied,
    }
}

pub struct AccessGate {
    id: String,
    viewer: Viewer,
    props: GateProps,
    lookup: Arc<dyn PermissionLookup>,
    timeout: Option<Duration>,
    redirect: RedirectPolicy,
    status: Arc<watch::Sender<GateStatus>>,
    task: Option<JoinHandle<()>>,
}

impl AccessGate {
    /// Mounts the gate and starts the first check on `rt`.
    pub fn mount(
        rt: &Handle,
        id: impl Into<String>,
        viewer: Viewer,
        props: GateProps,
        lookup: Arc<dyn PermissionLookup>,
        timeout: Option<Duration>,
        redirect: RedirectPolicy,
    ) -> Self {
        let (tx, _rx) = watch::channel(GateStatus {
            generation: 0,
            required: props.required.clone(),
            state: GateState::Pending,
        });
        let mut gate = Self {
            id: id.into(),
            viewer,
            props,
            lookup,
            timeout,
            redirect,
            status: Arc::new(tx),
            task: None,
        };
        gate.start_check(rt);
        gate
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn props(&self) -> &GateProps {
        &self.props
    }

    pub fn status(&self) -> GateStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> GateState {
        self.status.borrow().state
    }

    /// Changing the required code restarts the check; the same code is a no-op.
    pub fn set_required(&mut self, rt: &Handle, required: PermissionCode) -> bool {
        if required == self.props.required {
            return false;
        }
        self.props.required = required;
        self.start_check(rt);
        true
    }

    pub fn view(&self) -> GateView {
        match self.state() {
            GateState::Pending => GateView::Loading,
            GateState::Granted => GateView::Children,
            GateState::Denied => match &self.props.fallback {
                Some(fallback) => GateView::Fallback {
                    fallback: fallback.clone(),
                },
                None => GateView::Redirect {
                    to: self
                        .redirect
                        .target(self.props.requested_route.as_deref()),
                },
            },
        }
    }

    /// Waits until the current check settles. Returns `None` if `limit` elapses
    /// first; the gate itself keeps waiting on the lookup.
    pub async fn wait_settled(&self, limit: Option<Duration>) -> Option<GateStatus> {
        let mut rx = self.status.subscribe();
        let settled = async move {
            rx.wait_for(|s| s.state.is_settled())
                .await
                .map(|s| (*s).clone())
                .ok()
        };
        match limit {
            Some(limit) => tokio::time::timeout(limit, settled).await.ok().flatten(),
            None => settled.await,
        }
    }

    /// Stops any in-flight check. Nothing updates the gate after this.
    pub fn unmount(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.status.send_modify(|s| s.generation += 1);
        tracing::debug!(gate = %self.id, "gate unmounted");
    }

    fn start_check(&mut self, rt: &Handle) {
        if let Some(previous) = self.task.take() {
            previous.abort();
        }

        let required = self.props.required.clone();
        if !required.is_known() {
            tracing::warn!(
                gate = %self.id,
                code = %required,
                "required permission code is not in the catalog; gate will deny"
            );
        }

        let mut generation = 0;
        self.status.send_modify(|s| {
            s.generation += 1;
            s.required = required.clone();
            s.state = GateState::Pending;
            generation = s.generation;
        });

        let status = Arc::clone(&self.status);
        let lookup = Arc::clone(&self.lookup);
        let viewer = self.viewer.clone();
        let timeout = self.timeout;
        let gate_id = self.id.clone();

        self.task = Some(rt.spawn(async move {
            let outcome = lookup_with_timeout(lookup.as_ref(), &viewer, timeout).await;
            if let Err(e) = &outcome {
                tracing::warn!(
                    gate = %gate_id,
                    user = %viewer.user_id,
                    code = %required,
                    error = %e,
                    "permission lookup failed; denying"
                );
            }
            let next = decide(&required, &outcome);
            settle(&status, &gate_id, generation, next);
        }));
    }
}

impl Drop for AccessGate {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn settle(status: &watch::Sender<GateStatus>, gate_id: &str, generation: u64, next: GateState) {
    let applied = status.send_if_modified(|s| {
        if s.generation != generation || s.state.is_settled() {
            return false;
        }
        s.state = next;
        true
    });
    if applied {
        tracing::debug!(gate = %gate_id, generation, state = ?next, "gate settled");
    } else {
        tracing::debug!(gate = %gate_id, generation, "discarded stale permission result");
    }
}

fn encode_route(route: &str) -> String {
    let mut out = String::with_capacity(route.len());
    for b in route.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Mounted gates keyed by caller-chosen id.
#[derive(Default)]
pub struct GateRegistry {
    gates: HashMap<String, AccessGate>,
}

impl GateRegistry {
    /// Mounting over an existing id unmounts the old gate first.
    pub fn insert(&mut self, gate: AccessGate) {
        if let Some(mut old) = self.gates.insert(gate.id().to_string(), gate) {
            old.unmount();
        }
    }

    pub fn get(&self, id: &str) -> Option<&AccessGate> {
        self.gates.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AccessGate> {
        self.gates.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.gates.remove(id) {
            Some(mut gate) => {
                gate.unmount();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        for (_, mut gate) in self.gates.drain() {
            gate.unmount();
        }
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{LookupError, StaticLookup};
    use crate::permissions::UserPermissionSet;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    fn codes(list: &[&str]) -> Vec<PermissionCode> {
        list.iter().copied().map(PermissionCode::from).collect()
    }

    fn lookup_for(user: &str, list: &[&str]) -> Arc<dyn PermissionLookup> {
        Arc::new(StaticLookup::new([(user.to_string(), codes(list))]))
    }

    fn mount(lookup: Arc<dyn PermissionLookup>, props: GateProps) -> AccessGate {
        AccessGate::mount(
            &Handle::current(),
            "g1",
            Viewer::new("u1"),
            props,
            lookup,
            None,
            RedirectPolicy::default(),
        )
    }

    struct Failing;

    #[async_trait]
    impl PermissionLookup for Failing {
        async fn get_user_permissions(&self, _viewer: &Viewer) -> LookupResult {
            Err(LookupError::Unavailable("backend down".to_string()))
        }
    }

    /// Answers the n-th call after `delays[n]`, with every call granting `codes`.
    struct Scripted {
        delays: Vec<Duration>,
        codes: Vec<PermissionCode>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PermissionLookup for Scripted {
        async fn get_user_permissions(&self, viewer: &Viewer) -> LookupResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.get(n).copied().unwrap_or_default();
            tokio::time::sleep(delay).await;
            Ok(UserPermissionSet::new(
                viewer.user_id.clone(),
                self.codes.iter().cloned(),
            ))
        }
    }

    #[tokio::test]
    async fn granted_renders_children() {
        let gate = mount(
            lookup_for("u1", &["student.view", "student.create"]),
            GateProps::new("student.view"),
        );
        let status = gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(status.state, GateState::Granted);
        assert_eq!(gate.view(), GateView::Children);
    }

    #[tokio::test]
    async fn denied_prefers_fallback() {
        let gate = mount(
            lookup_for("u1", &["student.view"]),
            GateProps::new("user.delete").with_fallback("no-access-card"),
        );
        gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(gate.state(), GateState::Denied);
        assert_eq!(
            gate.view(),
            GateView::Fallback {
                fallback: "no-access-card".to_string()
            }
        );
    }

    #[tokio::test]
    async fn denied_without_fallback_redirects_to_landing() {
        let gate = mount(lookup_for("u1", &["student.view"]), GateProps::new("user.delete"));
        gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(
            gate.view(),
            GateView::Redirect {
                to: "/dashboard".to_string()
            }
        );
    }

    #[tokio::test]
    async fn lookup_failure_denies_and_never_shows_children() {
        let gate = mount(Arc::new(Failing), GateProps::new("student.view"));
        assert_ne!(gate.view(), GateView::Children);
        let status = gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(status.state, GateState::Denied);
        assert!(matches!(gate.view(), GateView::Redirect { .. }));
    }

    #[tokio::test]
    async fn unknown_user_denies() {
        let gate = mount(lookup_for("someone-else", &["student.view"]), GateProps::new("student.view"));
        let status = gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(status.state, GateState::Denied);
    }

    #[tokio::test]
    async fn pending_shows_loading_until_settled() {
        let lookup: Arc<dyn PermissionLookup> = Arc::new(
            StaticLookup::new([("u1".to_string(), codes(&["class.view"]))])
                .with_latency(Duration::from_millis(100)),
        );
        let gate = mount(lookup, GateProps::new("class.view"));
        assert_eq!(gate.state(), GateState::Pending);
        assert_eq!(gate.view(), GateView::Loading);
        gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(gate.view(), GateView::Children);
    }

    #[tokio::test]
    async fn stale_result_for_old_code_is_ignored() {
        // First check (class.view) is slow and would grant; the second
        // (class.edit) answers fast and must deny.
        let lookup = Arc::new(Scripted {
            delays: vec![Duration::from_millis(200), Duration::from_millis(10)],
            codes: codes(&["class.view"]),
            calls: AtomicUsize::new(0),
        });
        let mut gate = mount(lookup.clone(), GateProps::new("class.view"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gate.set_required(&Handle::current(), "class.edit".into()));

        let status = gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(status.generation, 2);
        assert_eq!(status.required, PermissionCode::from("class.edit"));
        assert_eq!(status.state, GateState::Denied);

        // Give the first call time to finish if it had not been aborted.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(gate.state(), GateState::Denied);
        assert_eq!(gate.status().generation, 2);
    }

    #[tokio::test]
    async fn settle_with_old_generation_is_rejected() {
        let (tx, _rx) = watch::channel(GateStatus {
            generation: 3,
            required: "class.edit".into(),
            state: GateState::Pending,
        });
        settle(&tx, "g", 2, GateState::Granted);
        assert_eq!(tx.borrow().state, GateState::Pending);
        settle(&tx, "g", 3, GateState::Denied);
        assert_eq!(tx.borrow().state, GateState::Denied);
        // Terminal: a second settle for the same generation changes nothing.
        settle(&tx, "g", 3, GateState::Granted);
        assert_eq!(tx.borrow().state, GateState::Denied);
    }

    #[tokio::test]
    async fn same_required_code_does_not_restart() {
        let mut gate = mount(lookup_for("u1", &["class.view"]), GateProps::new("class.view"));
        gate.wait_settled(WAIT).await.expect("settles");
        assert!(!gate.set_required(&Handle::current(), "class.view".into()));
        assert_eq!(gate.status().generation, 1);
        assert_eq!(gate.state(), GateState::Granted);
    }

    #[tokio::test]
    async fn unmount_suppresses_late_results() {
        let lookup: Arc<dyn PermissionLookup> = Arc::new(
            StaticLookup::new([("u1".to_string(), codes(&["class.view"]))])
                .with_latency(Duration::from_millis(50)),
        );
        let mut gate = mount(lookup, GateProps::new("class.view"));
        gate.unmount();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(gate.state(), GateState::Pending);
        assert!(gate.wait_settled(Some(Duration::from_millis(20))).await.is_none());
    }

    #[tokio::test]
    async fn timeout_denies() {
        let lookup: Arc<dyn PermissionLookup> = Arc::new(
            StaticLookup::new([("u1".to_string(), codes(&["class.view"]))])
                .with_latency(Duration::from_secs(5)),
        );
        let gate = AccessGate::mount(
            &Handle::current(),
            "g1",
            Viewer::new("u1"),
            GateProps::new("class.view"),
            lookup,
            Some(Duration::from_millis(30)),
            RedirectPolicy::default(),
        );
        let status = gate.wait_settled(WAIT).await.expect("settles");
        assert_eq!(status.state, GateState::Denied);
    }

    #[test]
    fn redirect_can_carry_return_route() {
        let policy = RedirectPolicy {
            landing_route: "/dashboard".to_string(),
            preserve_return_to: true,
        };
        assert_eq!(
            policy.target(Some("/dashboard/admin/users?tab=roles")),
            "/dashboard?returnTo=/dashboard/admin/users%3Ftab%3Droles"
        );
        assert_eq!(policy.target(None), "/dashboard");

        let off = RedirectPolicy::default();
        assert_eq!(off.target(Some("/dashboard/admin/users")), "/dashboard");
    }

    #[test]
    fn decide_is_fail_closed() {
        let required = PermissionCode::from("student.view");
        let granted = UserPermissionSet::new("u1", codes(&["student.view"]));
        assert_eq!(decide(&required, &Ok(granted)), GateState::Granted);
        assert_eq!(
            decide(&required, &Ok(UserPermissionSet::new("u1", Vec::new()))),
            GateState::Denied
        );
        for err in [
            LookupError::UnknownUser("u1".to_string()),
            LookupError::Unavailable("down".to_string()),
            LookupError::TimedOut(Duration::from_secs(1)),
        ] {
            assert_eq!(decide(&required, &Err(err)), GateState::Denied);
        }
    }

    #[tokio::test]
    async fn registry_replaces_and_removes() {
        let mut reg = GateRegistry::default();
        reg.insert(mount(lookup_for("u1", &["class.view"]), GateProps::new("class.view")));
        reg.insert(mount(lookup_for("u1", &["class.view"]), GateProps::new("class.edit")));
        assert_eq!(reg.len(), 1);
        let gate = reg.get("g1").expect("mounted");
        assert_eq!(gate.props().required, PermissionCode::from("class.edit"));
        assert!(reg.remove("g1"));
        assert!(!reg.remove("g1"));
    }
}
