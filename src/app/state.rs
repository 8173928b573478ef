use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::VERSION;
use crate::model::StaticMetrics;

/// Lifecycle of the control loop. `AuthFailed` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    NotStarted,
    Running,
    AuthFailed,
    Stopped,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::AuthFailed => "auth_failed",
            Self::Stopped => "stopped",
        }
    }
}

/// How [`Agent::run`](super::Agent::run) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    AuthFailed,
}

/// Point-in-time view of the agent, safe to hand out.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub hostname: String,
    pub version: &'static str,
    /// Seconds since `run` was entered; zero before that.
    pub uptime: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub last_send: Option<DateTime<Utc>>,
    pub metrics_count: u64,
    pub error_count: u64,
    pub state: AgentState,
}

/// Mutable agent bookkeeping, behind one lock.
pub(crate) struct Status {
    pub state: AgentState,
    pub hostname: String,
    pub started: Option<Instant>,
    pub last_collection: Option<DateTime<Utc>>,
    pub last_send: Option<DateTime<Utc>>,
    pub metrics_count: u64,
    pub error_count: u64,
    /// Static facts not yet delivered; attached to every payload until a
    /// send succeeds.
    pub pending_static: Option<Arc<StaticMetrics>>,
}

impl Status {
    pub fn new(hostname: String) -> Self {
        Self {
            state: AgentState::NotStarted,
            hostname,
            started: None,
            last_collection: None,
            last_send: None,
            metrics_count: 0,
            error_count: 0,
            pending_static: None,
        }
    }

    /// Take in freshly collected static facts.
    pub fn absorb_static(&mut self, facts: Arc<StaticMetrics>) {
        if let Some(name) = facts.hostname() {
            self.hostname = name.to_string();
        }
        self.pending_static = Some(facts);
    }

    /// Record a delivered payload. `sent` is the static snapshot it carried;
    /// a newer one collected meanwhile stays pending.
    pub fn record_send(
        &mut self,
        collected_at: DateTime<Utc>,
        sent: Option<&Arc<StaticMetrics>>,
    ) {
        self.last_collection = Some(collected_at);
        self.last_send = Some(Utc::now());
        self.metrics_count += 1;
        let delivered = sent
            .zip(self.pending_static.as_ref())
            .is_some_and(|(sent, pending)| Arc::ptr_eq(sent, pending));
        if delivered {
            self.pending_static = None;
        }
    }

    pub fn snapshot(&self) -> AgentStatus {
        AgentStatus {
            hostname: self.hostname.clone(),
            version: VERSION,
            uptime: self.started.map_or(0, |at| at.elapsed().as_secs()),
            last_collection: self.last_collection,
            last_send: self.last_send,
            metrics_count: self.metrics_count,
            error_count: self.error_count,
            state: self.state,
        }
    }
}
