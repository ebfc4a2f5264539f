//! Periodic status sweep over watched training jobs.
//!
//! The sweep itself is a plain async function so that it can be driven by the
//! server's scheduler or called directly from tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::TrainingOrchestrator;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs queried this sweep
    pub polled: usize,
    /// Jobs that reached a terminal state
    pub finished: usize,
    /// Jobs given up on
    pub timed_out: usize,
    /// Status queries that failed
    pub failed: usize,
}

pub struct TrainingPoller {
    orchestrator: Arc<TrainingOrchestrator>,
    timeout: ChronoDuration,
    pace: Duration,
}

impl TrainingPoller {
    pub fn new(orchestrator: Arc<TrainingOrchestrator>) -> Self {
        let timeout_minutes = orchestrator.config().poll_timeout_minutes;
        Self {
            orchestrator,
            timeout: ChronoDuration::minutes(timeout_minutes as i64),
            pace: Duration::ZERO,
        }
    }

    /// Pause between two status queries within one sweep.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Time between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.orchestrator.config().sweep_interval_secs.max(1))
    }

    /// Poll every watched job that is due, and time out the ones past the deadline.
    pub async fn sweep(&self) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport::default();

        for job in self.orchestrator.watched_jobs() {
            if now - job.submitted_at > self.timeout {
                self.orchestrator.mark_timed_out(&job.job_id).await;
                report.timed_out += 1;
                continue;
            }
            if job.next_poll_at.is_some_and(|due| due > now) {
                continue;
            }

            report.polled += 1;
            match self.orchestrator.poll(&job.job_id).await {
                Ok(state) if state.is_terminal() => report.finished += 1,
                Ok(_) => {},
                Err(e) => {
                    warn!("[TrainingPoller] Poll of {} failed: {}", job.job_id, e);
                    report.failed += 1;
                },
            }

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }

        if report.polled > 0 || report.timed_out > 0 {
            info!(
                "[TrainingPoller] Sweep: polled={}, finished={}, timed_out={}, failed={}",
                report.polled, report.finished, report.timed_out, report.failed
            );
        } else {
            debug!("[TrainingPoller] Nothing due");
        }
        report
    }
}
