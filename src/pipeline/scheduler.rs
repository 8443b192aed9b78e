//! Outer poll loop.
//!
//! Single task, strictly sequential: list → process each id → sleep →
//! repeat. Cancellation is observed between messages and during the sleep,
//! so shutdown never waits out a full batch or interval.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::processor::TriagePipeline;

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Ids returned by the listing.
    pub listed: usize,
    /// Messages dispatched (with or without side-effect failures).
    pub processed: usize,
    /// Messages skipped and left unread.
    pub skipped: usize,
    /// Cancellation cut the batch short.
    pub interrupted: bool,
}

pub struct Scheduler {
    pipeline: Arc<TriagePipeline>,
    interval: Duration,
    batch_size: usize,
}

impl Scheduler {
    pub fn new(pipeline: Arc<TriagePipeline>, interval: Duration, batch_size: usize) -> Self {
        Self {
            pipeline,
            interval,
            batch_size,
        }
    }

    /// Run cycles until `cancel` fires. Returns the number of cycles started.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            batch_size = self.batch_size,
            "Triage loop started"
        );

        let mut cycles = 0_u64;
        while !cancel.is_cancelled() {
            cycles += 1;
            let summary = self.run_cycle(&cancel).await;
            debug!(cycle = cycles, ?summary, "Cycle finished");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles, "Triage loop shutting down");
        cycles
    }

    /// Run a single cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let ids = match self.pipeline.list_unread(self.batch_size).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to list unread messages");
                return summary;
            }
        };
        summary.listed = ids.len();

        if ids.is_empty() {
            debug!("No unread messages");
            return summary;
        }

        info!(count = ids.len(), "Processing unread message(s)");

        for id in &ids {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            match self.pipeline.process(id).await {
                Ok(processed) => {
                    summary.processed += 1;
                    if !processed.dispatch.is_clean() {
                        warn!(
                            id = %processed.id,
                            failures = processed.dispatch.failures.len(),
                            "Message dispatched with failures"
                        );
                    }
                }
                Err(PipelineError::Fetch { id, source }) if source.is_not_found() => {
                    summary.skipped += 1;
                    debug!(id, "Message vanished before fetch, skipping");
                }
                Err(e) => {
                    summary.skipped += 1;
                    warn!(error = %e, "Skipping message, left unread for next cycle");
                }
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            "Cycle complete"
        );
        summary
    }
}
