//! Durable retry queue.
//!
//! Transient provider failures are parked in SQLite and replayed later with
//! exponential backoff, so a resolution that failed because TMDB was briefly
//! down completes once the outage passes, surviving process restarts in
//! between. Each task type registers a [`RetryHandler`] that knows how to
//! replay its payload.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use framevault_db::models::RetryQueueItem;
use framevault_db::queries::retry as retry_queries;
use framevault_db::queries::retry::{EnqueueOutcome, StatCounter};
use framevault_db::{get_conn, DbPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{backoff_delay, ProviderError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(30);

/// Replays one kind of parked task.
#[async_trait]
pub trait RetryHandler: Send + Sync {
    /// Stable task-type discriminator stored alongside the payload.
    fn task_type(&self) -> &str;

    /// Replay a payload. A retryable error reschedules the item; any other
    /// error abandons it.
    async fn run(&self, cancel: &CancellationToken, payload: &str) -> Result<(), ProviderError>;
}

/// Totals for one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub exhausted: usize,
}

/// Durable retry queue over the shared connection pool.
pub struct RetryQueue {
    pool: DbPool,
    handlers: HashMap<String, Arc<dyn RetryHandler>>,
    base_delay: Duration,
    max_attempts: u32,
}

impl RetryQueue {
    pub fn new(pool: DbPool, base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            pool,
            handlers: HashMap::new(),
            base_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn RetryHandler>) {
        self.handlers.insert(handler.task_type().to_string(), handler);
    }

    /// Park a task for later replay. The first attempt is scheduled one base
    /// delay out; a task id that is already queued is left untouched. A fired
    /// token fails before anything is written.
    pub fn enqueue(
        &self,
        cancel: &CancellationToken,
        task_id: &str,
        task_type: &str,
        payload: &str,
    ) -> framevault_common::Result<EnqueueOutcome> {
        if cancel.is_cancelled() {
            return Err(framevault_common::Error::cancelled("enqueue cancelled"));
        }
        let conn = get_conn(&self.pool)?;
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(self.base_delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(1));
        let outcome = retry_queries::enqueue(
            &conn,
            task_id,
            task_type,
            payload,
            self.max_attempts,
            next_attempt_at,
        )?;
        match outcome {
            EnqueueOutcome::Queued(id) => {
                info!(task_id = task_id, task_type = task_type, id = id, "Task queued for retry")
            }
            EnqueueOutcome::Duplicate => {
                debug!(task_id = task_id, "Task already queued, leaving existing schedule")
            }
        }
        Ok(outcome)
    }

    /// Number of tasks currently parked.
    pub fn active_count(&self) -> framevault_common::Result<u64> {
        let conn = get_conn(&self.pool)?;
        retry_queries::count_active(&conn)
    }

    /// Replay every item whose schedule has come due. Item failures are
    /// isolated: one bad payload never stops the rest of the pass.
    pub async fn drain(&self, cancel: &CancellationToken) -> framevault_common::Result<DrainSummary> {
        let due = {
            let conn = get_conn(&self.pool)?;
            retry_queries::due_items(&conn, Utc::now())?
        };
        let mut summary = DrainSummary::default();
        if due.is_empty() {
            return Ok(summary);
        }
        debug!(count = due.len(), "Draining retry queue");

        for item in due {
            if cancel.is_cancelled() {
                break;
            }
            let Some(handler) = self.handlers.get(&item.task_type) else {
                warn!(
                    task_id = item.task_id.as_str(),
                    task_type = item.task_type.as_str(),
                    "No handler registered for task type, abandoning"
                );
                self.abandon(&item, "no handler registered")?;
                summary.failed += 1;
                continue;
            };

            match handler.run(cancel, &item.payload).await {
                Ok(()) => {
                    self.complete(&item)?;
                    summary.succeeded += 1;
                }
                Err(ProviderError::Cancelled(_)) => {
                    // Shutdown mid-run: leave the item scheduled as-is.
                    debug!(task_id = item.task_id.as_str(), "Replay cancelled, keeping item");
                    break;
                }
                Err(err) if err.is_retryable() => {
                    if self.reschedule(&item, &err)? {
                        summary.failed += 1;
                    } else {
                        summary.exhausted += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        task_id = item.task_id.as_str(),
                        error = %err,
                        "Replay failed permanently, abandoning"
                    );
                    self.abandon(&item, &err.to_string())?;
                    summary.failed += 1;
                }
            }
        }

        if summary != DrainSummary::default() {
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                exhausted = summary.exhausted,
                "Retry drain pass complete"
            );
        }
        Ok(summary)
    }

    fn complete(&self, item: &RetryQueueItem) -> framevault_common::Result<()> {
        let conn = get_conn(&self.pool)?;
        retry_queries::remove(&conn, item.id)?;
        retry_queries::bump_stat(&conn, &item.task_type, Utc::now().date_naive(), StatCounter::Succeeded)?;
        info!(task_id = item.task_id.as_str(), attempts = item.attempt_count + 1, "Retry succeeded");
        Ok(())
    }

    /// Push the item's schedule out by the next backoff step, or remove it
    /// when its attempts are spent. Returns true when the item was kept.
    fn reschedule(&self, item: &RetryQueueItem, err: &ProviderError) -> framevault_common::Result<bool> {
        let conn = get_conn(&self.pool)?;
        let attempts_after = item.attempt_count + 1;
        if attempts_after >= item.max_attempts {
            retry_queries::remove(&conn, item.id)?;
            retry_queries::bump_stat(&conn, &item.task_type, Utc::now().date_naive(), StatCounter::Exhausted)?;
            error!(
                task_id = item.task_id.as_str(),
                attempts = attempts_after,
                error = %err,
                "Retry attempts exhausted, dropping task"
            );
            return Ok(false);
        }

        let delay = backoff_delay(self.base_delay, attempts_after);
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
        retry_queries::record_failure(&conn, item.id, &err.to_string(), next_attempt_at)?;
        retry_queries::bump_stat(&conn, &item.task_type, Utc::now().date_naive(), StatCounter::Failed)?;
        warn!(
            task_id = item.task_id.as_str(),
            attempt = attempts_after,
            delay_secs = delay.as_secs(),
            error = %err,
            "Retry failed, rescheduled"
        );
        Ok(true)
    }

    fn abandon(&self, item: &RetryQueueItem, reason: &str) -> framevault_common::Result<()> {
        let conn = get_conn(&self.pool)?;
        retry_queries::remove(&conn, item.id)?;
        retry_queries::bump_stat(&conn, &item.task_type, Utc::now().date_naive(), StatCounter::Failed)?;
        debug!(task_id = item.task_id.as_str(), reason = reason, "Task abandoned");
        Ok(())
    }
}

/// Run drain passes on an interval until the token is cancelled.
pub fn spawn_drain_worker(
    queue: Arc<RetryQueue>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Retry drain worker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = queue.drain(&cancel).await {
                        error!(error = %err, "Retry drain pass failed");
                    }
                }
            }
        }
    })
}
