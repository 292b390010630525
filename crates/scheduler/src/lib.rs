#![forbid(unsafe_code)]

use cms_core::{OperationStatus, ScheduleEntry};
use cms_engine::{CancellationToken, PublishEngine, SchedulerConfig};
use cms_storage::ScheduleFailure;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub completed: usize,
    pub retried: usize,
    pub parked: usize,
    /// Entries replaced or cancelled between listing and execution.
    pub skipped: usize,
}

impl TickReport {
    pub fn processed(&self) -> usize {
        self.completed + self.retried + self.parked + self.skipped
    }
}

/// Drains due schedule entries through the engine.
///
/// Each entry runs as an ordinary publish/unpublish call, so it takes the
/// node's lock and its own transaction. Deterministic failures park the
/// entry at once; transient ones are retried on later ticks until
/// `max_attempts` is reached.
#[derive(Debug)]
pub struct SchedulerRunner {
    engine: Arc<PublishEngine>,
    max_attempts: u32,
    batch_limit: usize,
}

impl SchedulerRunner {
    pub fn new(engine: Arc<PublishEngine>, config: &SchedulerConfig) -> Self {
        Self {
            engine,
            max_attempts: config.max_attempts.max(1),
            batch_limit: config.batch_limit.max(1),
        }
    }

    pub fn engine(&self) -> &PublishEngine {
        &self.engine
    }

    /// Processes up to `batch_limit` entries that are due at the engine clock.
    pub fn tick(&self, cancel: &CancellationToken) -> Result<TickReport, OperationStatus> {
        let mut report = TickReport::default();
        for entry in self.engine.due_entries(self.batch_limit)? {
            if cancel.is_cancelled() {
                break;
            }
            self.process(&entry, &mut report)?;
        }
        if report.processed() > 0 {
            tracing::info!(
                completed = report.completed,
                retried = report.retried,
                parked = report.parked,
                skipped = report.skipped,
                "scheduler tick"
            );
        }
        Ok(report)
    }

    fn process(&self, entry: &ScheduleEntry, report: &mut TickReport) -> Result<(), OperationStatus> {
        match self.engine.run_entry(entry) {
            Ok(None) => {
                report.skipped += 1;
            }
            Ok(Some(outcome)) => {
                self.engine.complete_entry(entry)?;
                tracing::debug!(
                    content_id = %entry.content_id,
                    culture = %entry.culture,
                    action = entry.action.as_str(),
                    kind = ?outcome.kind,
                    "schedule entry completed"
                );
                report.completed += 1;
            }
            Err(status) => {
                let attempts = entry.attempts.saturating_add(1);
                let park = status.is_deterministic() || attempts >= self.max_attempts;
                let recorded = self.engine.record_entry_failure(
                    entry,
                    ScheduleFailure {
                        error: status.to_string(),
                        park,
                    },
                )?;
                if recorded.is_none() {
                    report.skipped += 1;
                } else if park {
                    tracing::warn!(
                        content_id = %entry.content_id,
                        culture = %entry.culture,
                        action = entry.action.as_str(),
                        attempts,
                        error = %status,
                        "schedule entry parked"
                    );
                    report.parked += 1;
                } else {
                    tracing::info!(
                        content_id = %entry.content_id,
                        culture = %entry.culture,
                        action = entry.action.as_str(),
                        attempts,
                        error = %status,
                        "schedule entry will be retried"
                    );
                    report.retried += 1;
                }
            }
        }
        Ok(())
    }

    /// Ticks every `poll` until `cancel` fires. Tick errors are logged, not fatal.
    pub fn run(&self, poll: Duration, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            if let Err(status) = self.tick(cancel) {
                tracing::error!(error = %status, "scheduler tick failed");
            }
            let wake_at = Instant::now() + poll;
            while !cancel.is_cancelled() {
                let now = Instant::now();
                if now >= wake_at {
                    break;
                }
                std::thread::sleep(SLEEP_SLICE.min(wake_at - now));
            }
        }
    }
}
