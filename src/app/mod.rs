//! The agent control loop: collect on a fixed cadence, ship, react to the
//! collector's reply.

mod commands;
mod state;

use std::sync::{Arc, Mutex};

use chrono::Utc;
use sysinfo::System;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, Tuning, VERSION};
use crate::controller::{DynamicCollector, StaticCollector};
use crate::error::{AgentError, TransportError};
use crate::model::{MetricPayload, ServerCommand};
use crate::sampler::lock;
use crate::transport::Transport;

pub use commands::{Command, schedule_uninstall};
pub use state::{AgentState, AgentStatus, RunOutcome};
use state::Status;

#[derive(Debug, thiserror::Error)]
enum CycleError {
    #[error("every dynamic metric branch came back empty")]
    NoMetrics,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct Agent {
    dynamic: DynamicCollector,
    statics: StaticCollector,
    transport: Arc<dyn Transport>,
    tuning: Tuning,
    uninstall_command: Option<String>,
    status: Mutex<Status>,
    stop: CancellationToken,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        dynamic: DynamicCollector,
        statics: StaticCollector,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        Self {
            dynamic,
            statics,
            transport,
            tuning: config.tuning,
            uninstall_command: config.uninstall_command.clone(),
            status: Mutex::new(Status::new(hostname)),
            stop: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> AgentStatus {
        lock(&self.status).snapshot()
    }

    /// Ask a running loop to wind down after its current cycle.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Drive the agent until `shutdown` fires, [`stop`](Self::stop) is
    /// called, or the collector rejects our credentials.
    ///
    /// An agent runs at most once; a second call is rejected whatever the
    /// first one's outcome.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<RunOutcome, AgentError> {
        {
            let mut status = lock(&self.status);
            if status.state != AgentState::NotStarted {
                return Err(AgentError::AlreadyStarted(status.state.as_str()));
            }
            status.state = AgentState::Running;
            status.started = Some(Instant::now());
        }
        tracing::info!(
            version = VERSION,
            interval_secs = self.tuning.send_interval.as_secs(),
            "agent starting"
        );

        self.dynamic.start();
        self.refresh_static(Instant::now() + self.tuning.cycle_deadline)
            .await;

        let mut ticker = tokio::time::interval(self.tuning.send_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break RunOutcome::Stopped,
                _ = self.stop.cancelled() => break RunOutcome::Stopped,
                _ = ticker.tick() => match self.cycle().await {
                    Ok(()) => {}
                    Err(CycleError::Transport(e)) if e.is_auth_failure() => {
                        break RunOutcome::AuthFailed;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "collection cycle failed");
                        lock(&self.status).error_count += 1;
                    }
                },
            }
        };

        self.wind_down(outcome);
        Ok(outcome)
    }

    fn wind_down(&self, outcome: RunOutcome) {
        let state = match outcome {
            RunOutcome::Stopped => AgentState::Stopped,
            RunOutcome::AuthFailed => AgentState::AuthFailed,
        };
        lock(&self.status).state = state;
        if outcome == RunOutcome::AuthFailed {
            tracing::error!(
                "the collector rejected the agent token; update HOSTWATCH_TOKEN in the env \
                 file and restart the service"
            );
        }
        self.dynamic.stop();
        self.transport.close();
        tracing::info!(state = state.as_str(), "agent stopped");
    }

    async fn refresh_static(&self, deadline: Instant) {
        match self.statics.collect(deadline).await {
            Ok(facts) => lock(&self.status).absorb_static(facts),
            Err(e) => tracing::warn!(error = %e, "static refresh failed"),
        }
    }

    /// One collect-and-send pass under a single deadline. Static facts get
    /// at most half of it so the dynamic branches always have time left.
    async fn cycle(&self) -> Result<(), CycleError> {
        let started = Instant::now();
        let deadline = started + self.tuning.cycle_deadline;

        if self.statics.should_refresh() {
            self.refresh_static(started + self.tuning.cycle_deadline / 2)
                .await;
        }

        let metrics = self.dynamic.collect(deadline).await;
        if metrics.is_empty() {
            return Err(CycleError::NoMetrics);
        }

        let collected_at = Utc::now();
        let (hostname, pending) = {
            let status = lock(&self.status);
            (status.hostname.clone(), status.pending_static.clone())
        };
        let payload = MetricPayload {
            hostname,
            timestamp: collected_at,
            static_metrics: pending.as_deref().cloned(),
            dynamic_metrics: metrics,
        };

        let response = tokio::time::timeout_at(deadline, self.transport.send(&payload))
            .await
            .map_err(|_| TransportError::Timeout)??;

        lock(&self.status).record_send(collected_at, pending.as_ref());
        tracing::debug!(
            with_static = pending.is_some(),
            commands = response.commands.len(),
            "metrics delivered"
        );

        self.handle_commands(&response.commands);
        Ok(())
    }

    fn handle_commands(&self, commands: &[ServerCommand]) {
        for cmd in commands {
            match Command::parse(cmd) {
                Some(Command::Uninstall { reason }) => match &self.uninstall_command {
                    Some(command) => {
                        tracing::warn!(
                            reason = reason.as_deref().unwrap_or("none given"),
                            delay_secs = self.tuning.uninstall_delay.as_secs(),
                            "collector requested uninstall"
                        );
                        schedule_uninstall(command.clone(), self.tuning.uninstall_delay);
                    }
                    None => tracing::warn!(
                        reason = reason.as_deref().unwrap_or("none given"),
                        "collector requested uninstall but no uninstall command is configured"
                    ),
                },
                None => tracing::debug!(command = %cmd.command, "ignoring unknown server command"),
            }
        }
    }
}
