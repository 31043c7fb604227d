//! # Submission Scheduler
//!
//! Two independent periodic jobs that drive every non-terminal document to a
//! terminal state, no matter how its first submission went.
//!
//! ## The Two Jobs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Scheduler Loops                                      │
//! │                                                                         │
//! │  POLL JOB (default every 30 min)                                       │
//! │    SELECT ... WHERE submission_state = 'submitted'                     │
//! │               AND gateway_document_id IS NOT NULL                     │
//! │    for each: service.refresh(id)      ← SUBMITTED → ACCEPTED/REJECTED │
//! │                                                                         │
//! │  RETRY JOB (default every 5 min)                                       │
//! │    SELECT ... WHERE submission_state = 'submit_failed'                 │
//! │               AND next_retry_at <= now                                 │
//! │    ORDER BY next_retry_at ASC LIMIT retry_batch_size                   │
//! │    for each: service.submit(id)       ← full submit+poll flow         │
//! │                                                                         │
//! │  PROPERTIES                                                            │
//! │  • Select-by-state makes both jobs idempotent: a document that         │
//! │    already progressed simply stops matching.                           │
//! │  • Documents are processed SEQUENTIALLY, one network round-trip at     │
//! │    a time; the bounded batch caps worst-case per-run latency.          │
//! │  • A failure on one document is logged with its id and never aborts    │
//! │    the siblings in the same run.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lifecycle is explicit: `start()` spawns the two loops, `shutdown()` stops
//! them. Each loop is a `tokio::select!` over its interval tick and a
//! shutdown channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::gateway::DocumentGateway;
use crate::submission::SubmissionService;

/// Periodic driver for the poll and retry jobs.
pub struct Scheduler<G: DocumentGateway + 'static> {
    service: Arc<SubmissionService<G>>,
    settings: SchedulerSettings,
    /// One shutdown sender per running job.
    shutdown: Vec<mpsc::Sender<()>>,
}

impl<G: DocumentGateway + 'static> Scheduler<G> {
    /// Creates a scheduler over the given submission service.
    pub fn new(service: Arc<SubmissionService<G>>, settings: SchedulerSettings) -> Self {
        Scheduler {
            service,
            settings,
            shutdown: Vec::new(),
        }
    }

    /// Spawns the poll job and the retry job as background tasks.
    ///
    /// Calling `start` twice is a no-op: the first pair keeps running.
    pub fn start(&mut self) {
        if !self.shutdown.is_empty() {
            warn!("Scheduler already started");
            return;
        }

        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            retry_interval_secs = self.settings.retry_interval_secs,
            "Starting submission scheduler"
        );

        let (poll_tx, poll_rx) = mpsc::channel(1);
        self.shutdown.push(poll_tx);
        tokio::spawn(Self::run_poll_job(
            self.service.clone(),
            self.settings.clone(),
            poll_rx,
        ));

        let (retry_tx, retry_rx) = mpsc::channel(1);
        self.shutdown.push(retry_tx);
        tokio::spawn(Self::run_retry_job(
            self.service.clone(),
            self.settings.clone(),
            retry_rx,
        ));
    }

    /// Stops both jobs gracefully.
    pub async fn shutdown(&mut self) {
        info!("Stopping submission scheduler");
        for tx in self.shutdown.drain(..) {
            let _ = tx.send(()).await;
        }
    }

    /// Runs one poll cycle immediately (manual trigger / tests).
    pub async fn poll_cycle_once(&self) {
        Self::poll_cycle(&self.service, &self.settings).await;
    }

    /// Runs one retry cycle immediately (manual trigger / tests).
    pub async fn retry_cycle_once(&self) {
        Self::retry_cycle(&self.service, &self.settings).await;
    }

    // =========================================================================
    // Job Loops
    // =========================================================================

    async fn run_poll_job(
        service: Arc<SubmissionService<G>>,
        settings: SchedulerSettings,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Poll job starting");

        let mut interval = tokio::time::interval(Duration::from_secs(settings.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    Self::poll_cycle(&service, &settings).await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Poll job shutting down");
                    break;
                }
            }
        }

        info!("Poll job stopped");
    }

    async fn run_retry_job(
        service: Arc<SubmissionService<G>>,
        settings: SchedulerSettings,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Retry job starting");

        let mut interval = tokio::time::interval(Duration::from_secs(settings.retry_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    Self::retry_cycle(&service, &settings).await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Retry job shutting down");
                    break;
                }
            }
        }

        info!("Retry job stopped");
    }

    // =========================================================================
    // Cycles
    // =========================================================================

    /// One poll pass: re-check every SUBMITTED document with a correlation
    /// id. Per-document failures are logged and do not stop the batch.
    async fn poll_cycle(service: &Arc<SubmissionService<G>>, settings: &SchedulerSettings) {
        let documents = service.db().documents();

        let batch = match documents.find_pollable(settings.poll_batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "[poll] Could not select submitted documents");
                return;
            }
        };

        if batch.is_empty() {
            debug!("[poll] No submitted documents awaiting decision");
            return;
        }

        info!(count = batch.len(), "[poll] Checking submitted documents");

        for doc in batch {
            match service.refresh(&doc.id).await {
                Ok(state) if state.is_terminal() => {
                    info!(document_id = %doc.id, state = %state, "[poll] Document decided");
                }
                Ok(_) => {
                    debug!(document_id = %doc.id, "[poll] Still awaiting decision");
                }
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "[poll] Status check failed");
                }
            }
        }
    }

    /// One retry pass: re-send SUBMIT_FAILED documents whose retry window
    /// elapsed, earliest due first, bounded batch. The service records the
    /// failure state itself; here a failure is only logged.
    async fn retry_cycle(service: &Arc<SubmissionService<G>>, settings: &SchedulerSettings) {
        let documents = service.db().documents();

        let batch = match documents
            .find_retry_due(Utc::now(), settings.retry_batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "[retry] Could not select failed documents");
                return;
            }
        };

        if batch.is_empty() {
            debug!("[retry] No failed submissions due");
            return;
        }

        info!(count = batch.len(), "[retry] Re-sending failed submissions");

        for doc in batch {
            info!(
                document_id = %doc.id,
                attempt = doc.retries_count + 1,
                "[retry] Re-sending document"
            );

            match service.submit(&doc.id).await {
                Ok(state) => {
                    info!(document_id = %doc.id, state = %state, "[retry] Submission advanced");
                }
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "[retry] Attempt failed");
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
