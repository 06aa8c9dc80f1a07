//! Dispatch loop
//!
//! Periodically claims due events and delivers them, isolating per-event
//! failures so one bad event never stops the batch or the loop.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::delivery::DeliveryExecutor;
use crate::event::{ClaimedEvent, Resolution};
use crate::persistence::{EventStore, StoreError};

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub poll_interval: Duration,

    /// Maximum concurrent deliveries, and the size of each claimed batch
    pub max_concurrency: usize,

    /// How long `shutdown` waits for the in-flight cycle
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_concurrency: 4,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    /// Create a new dispatcher configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Dispatcher errors
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// Dispatcher already running
    #[error("dispatcher is already running")]
    AlreadyRunning,

    /// The in-flight cycle did not finish within the shutdown timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Summary of one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events claimed from the store
    pub fetched: usize,

    /// Events delivered and recorded as such
    pub delivered: usize,

    /// Events that exhausted their retries and were recorded as failed
    pub failed: usize,

    /// Events whose outcome could not be recorded
    pub unrecorded: usize,
}

/// Outcome of dispatching a single claimed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Delivered,
    Failed,
    Unrecorded,
}

/// Background dispatcher
///
/// # Example
///
/// ```ignore
/// let dispatcher = Arc::new(Dispatcher::new(store, executor, DispatcherConfig::default()));
/// dispatcher.start()?;
///
/// // ... later, graceful shutdown
/// dispatcher.shutdown().await?;
/// ```
pub struct Dispatcher {
    store: Arc<dyn EventStore>,
    executor: Arc<DeliveryExecutor>,
    config: DispatcherConfig,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        store: Arc<dyn EventStore>,
        executor: Arc<DeliveryExecutor>,
        config: DispatcherConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            executor,
            config,
            shutdown_tx,
            loop_handle: Mutex::new(None),
        }
    }

    /// Whether the background loop is running
    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the dispatch loop on the current tokio runtime
    pub fn start(self: &Arc<Self>) -> Result<(), DispatcherError> {
        let mut handle = self.loop_handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(DispatcherError::AlreadyRunning);
        }

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_concurrency = self.config.max_concurrency,
            max_attempts = self.executor.policy().max_attempts,
            "Starting dispatcher"
        );

        self.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let dispatcher = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            dispatcher.run(shutdown_rx).await;
        }));

        Ok(())
    }

    /// Stop the dispatch loop
    ///
    /// Lets the in-flight cycle finish for up to `shutdown_timeout`, then
    /// aborts it. Events claimed by an aborted cycle become due again once
    /// their lease expires.
    pub async fn shutdown(&self) -> Result<(), DispatcherError> {
        let Some(mut handle) = self.loop_handle.lock().take() else {
            return Ok(());
        };

        info!("Initiating dispatcher shutdown");
        self.shutdown_tx.send_replace(true);

        match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Dispatcher stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Dispatcher loop terminated abnormally");
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "Shutdown timeout reached, aborting in-flight cycle"
                );
                handle.abort();
                Err(DispatcherError::ShutdownTimeout)
            }
        }
    }

    /// Run cycles until `shutdown_rx` observes `true`
    ///
    /// Never exits on error: a failed cycle is logged and retried after the
    /// normal poll interval.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.fetched > 0 => {
                    info!(
                        fetched = report.fetched,
                        delivered = report.delivered,
                        failed = report.failed,
                        unrecorded = report.unrecorded,
                        "Dispatch cycle complete"
                    );
                }
                Ok(_) => trace!("No due events"),
                Err(e) => error!(error = %e, "Dispatch cycle abandoned"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Dispatch loop exited");
    }

    /// Run a single dispatch cycle
    ///
    /// Drains the due events in batches of `max_concurrency`. Each batch is
    /// claimed only when all of its deliveries can start, so a lease has to
    /// cover one delivery rather than the wait behind a long queue.
    ///
    /// Only a failure to fetch the first batch is returned; per-event
    /// failures are logged and counted. The cycle also ends early when a
    /// batch records no outcome at all or shutdown has been requested.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let batch_size = self.config.max_concurrency.max(1);
        let mut report = CycleReport::default();

        loop {
            let claimed = match self.store.fetch_due_events(batch_size).await {
                Ok(claimed) => claimed,
                Err(e) if report.fetched == 0 => return Err(e),
                Err(e) => {
                    error!(error = %e, "Failed to claim next batch, ending cycle");
                    break;
                }
            };

            let batch_len = claimed.len();
            if batch_len == 0 {
                break;
            }
            report.fetched += batch_len;
            debug!(count = batch_len, "Claimed due events");

            let outcomes: Vec<EventOutcome> = stream::iter(claimed)
                .map(|claimed| self.dispatch_event(claimed))
                .buffer_unordered(batch_size)
                .collect()
                .await;

            let mut recorded = 0;
            for outcome in outcomes {
                match outcome {
                    EventOutcome::Delivered => report.delivered += 1,
                    EventOutcome::Failed => report.failed += 1,
                    EventOutcome::Unrecorded => {
                        report.unrecorded += 1;
                        continue;
                    }
                }
                recorded += 1;
            }

            let stopping = *self.shutdown_tx.borrow();
            // A short batch means nothing else was due
            if batch_len < batch_size || recorded == 0 || stopping {
                break;
            }
        }

        Ok(report)
    }

    async fn dispatch_event(&self, claimed: ClaimedEvent) -> EventOutcome {
        let event_id = claimed.event.id;

        let (resolution, outcome) = match self.executor.deliver(&claimed.event).await {
            Ok(delivered) => {
                info!(
                    %event_id,
                    attempts = delivered.attempts,
                    status = delivered.status,
                    "Event delivered"
                );
                (
                    Resolution::Delivered {
                        attempts: delivered.attempts,
                    },
                    EventOutcome::Delivered,
                )
            }
            Err(e) => {
                warn!(%event_id, target = %claimed.event.target, error = %e, "Event delivery failed");
                (
                    Resolution::Failed {
                        attempts: e.attempts(),
                        error: e.to_string(),
                    },
                    EventOutcome::Failed,
                )
            }
        };

        match self
            .store
            .mark_resolved(event_id, claimed.lease.token, resolution)
            .await
        {
            Ok(()) => outcome,
            Err(e) => {
                error!(%event_id, error = %e, "Failed to record event outcome");
                EventOutcome::Unrecorded
            }
        }
    }
}
