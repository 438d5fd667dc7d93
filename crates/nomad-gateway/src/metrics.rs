use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Recent samples kept per stage for percentile estimates.
const LATENCY_WINDOW: usize = 200;

pub const CHAT_REQUESTS: &str = "chat_requests";
pub const VOICE_REQUESTS: &str = "voice_requests";
pub const TRANSCRIBE_REQUESTS: &str = "transcribe_requests";
pub const RESET_REQUESTS: &str = "reset_requests";
pub const ERRORS: &str = "errors";
pub const RATE_LIMITED: &str = "rate_limited";
pub const CACHE_ANSWERS: &str = "cache_answers";
pub const AGENT_ANSWERS: &str = "agent_answers";
pub const FALLBACK_ANSWERS: &str = "fallback_answers";
pub const TOOL_CALLS: &str = "tool_calls";
pub const TTS_FAILURES: &str = "tts_failures";

/// Pipeline stage whose latency is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Stt,
    Agent,
    Tts,
    Total,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Stt => "stt",
            Stage::Agent => "agent",
            Stage::Tts => "tts",
            Stage::Total => "total",
        }
    }
}

#[derive(Default)]
struct Latency {
    count: u64,
    total_ms: f64,
    max_ms: f64,
    recent: VecDeque<f64>,
}

impl Latency {
    fn record(&mut self, ms: f64) {
        self.count += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
        if self.recent.len() == LATENCY_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(ms);
    }

    fn summary(&self) -> LatencySummary {
        let mut sorted: Vec<f64> = self.recent.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        LatencySummary {
            count: self.count,
            avg_ms: if self.count == 0 {
                0.0
            } else {
                self.total_ms / self.count as f64
            },
            max_ms: self.max_ms,
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub since: DateTime<Utc>,
    pub uptime_secs: i64,
    pub counters: BTreeMap<&'static str, u64>,
    pub latency: BTreeMap<&'static str, LatencySummary>,
}

#[derive(Default)]
struct Inner {
    counters: BTreeMap<&'static str, u64>,
    latency: BTreeMap<Stage, Latency>,
}

/// In-process request counters and per-stage latency.
pub struct MetricsSink {
    inner: Mutex<Inner>,
    since: DateTime<Utc>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            since: Utc::now(),
        }
    }

    pub fn incr(&self, counter: &'static str) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: &'static str, n: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner.counters.entry(counter).or_default() += n;
    }

    pub fn record_latency(&self, stage: Stage, elapsed: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .latency
            .entry(stage)
            .or_default()
            .record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn counter(&self, counter: &str) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        MetricsSnapshot {
            since: self.since,
            uptime_secs: (Utc::now() - self.since).num_seconds(),
            counters: inner.counters.clone(),
            latency: inner
                .latency
                .iter()
                .map(|(stage, latency)| (stage.as_str(), latency.summary()))
                .collect(),
        }
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}
