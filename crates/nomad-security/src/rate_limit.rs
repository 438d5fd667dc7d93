//! Sliding-window admission control.
//!
//! Two windows are kept: one per scope (usually the session id) and one for
//! the whole process. Both are pruned to the trailing window before counting,
//! and the check-then-record step happens under a single lock so two racing
//! requests can never both take the last slot.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Default)]
struct Windows {
    per_scope: HashMap<String, VecDeque<Instant>>,
    global: VecDeque<Instant>,
}

pub struct RateLimiter {
    windows: Mutex<Windows>,
    per_scope_limit: usize,
    global_limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(per_scope_limit: usize, global_limit: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(Windows::default()),
            per_scope_limit,
            global_limit,
            window,
        }
    }

    pub fn admit(&self, scope: &str) -> Admission {
        self.admit_at(scope, Instant::now())
    }

    pub fn admit_at(&self, scope: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        prune(&mut windows.global, now, self.window);
        if windows.global.len() >= self.global_limit {
            warn!(scope, limit = self.global_limit, "global rate limit reached");
            return Admission::denied(format!(
                "Server is busy: more than {} requests in the last {} seconds",
                self.global_limit,
                self.window.as_secs()
            ));
        }

        let scoped = windows.per_scope.entry(scope.to_string()).or_default();
        prune(scoped, now, self.window);
        if scoped.len() >= self.per_scope_limit {
            warn!(scope, limit = self.per_scope_limit, "session rate limit reached");
            return Admission::denied(format!(
                "Rate limit exceeded: at most {} requests per {} seconds",
                self.per_scope_limit,
                self.window.as_secs()
            ));
        }

        scoped.push_back(now);
        windows.global.push_back(now);
        Admission::allowed()
    }

    /// Drop scopes whose windows have fully drained.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.per_scope.len();
        windows.per_scope.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        before - windows.per_scope.len()
    }

    pub fn tracked_scopes(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .per_scope
            .len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(20, 100, Duration::from_secs(60))
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}
