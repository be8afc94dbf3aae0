//! TransportLane - one transport with its connection state, pending queue and worker task

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{FailureHandler, HealthProber, LogRecord, ShipperError, Transport};

use crate::completion::Completion;
use crate::metrics::LaneMetrics;
use crate::pending::{PendingEntry, PendingQueue};

/// Connection state of a lane's transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in flight
    Connecting,
    /// Handshake succeeded
    Connected,
    /// Handshake errored
    Failed,
}

/// How a lane brings its transport up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneStart {
    /// Run `connect` in the background, queueing until it resolves
    Connect,
    /// Transport is already connected
    Ready,
}

/// Collaborators shared by every lane of a dispatcher
#[derive(Clone)]
pub struct LaneContext {
    pub topic: Arc<str>,
    pub grace_period: Duration,
    pub prober: Option<Arc<dyn HealthProber>>,
    pub failure_handler: Option<FailureHandler>,
}

impl LaneContext {
    pub fn new(topic: impl Into<Arc<str>>, grace_period: Duration) -> Self {
        Self {
            topic: topic.into(),
            grace_period,
            prober: None,
            failure_handler: None,
        }
    }
}

struct LaneState {
    connection: ConnectionState,
    pending: PendingQueue,
    /// `None` once the lane is shut down
    tx: Option<mpsc::UnboundedSender<PendingEntry>>,
}

impl LaneState {
    /// Push one entry to the worker, settling it with an error if the lane is closed
    fn forward(&self, name: &str, entry: PendingEntry) {
        let rejected = match &self.tx {
            Some(tx) => match tx.send(entry) {
                Ok(()) => return,
                Err(mpsc::error::SendError(entry)) => entry,
            },
            None => entry,
        };

        if let Some(completion) = rejected.completion {
            completion.settle(Err(ShipperError::not_connected(
                name,
                "transport lane is closed",
            )));
        }
    }

    /// Move every queued entry to the worker, oldest first
    fn flush(&mut self, name: &str) -> usize {
        let mut pending = std::mem::take(&mut self.pending);
        pending.drain_all(|entry| self.forward(name, entry))
    }
}

type Liveness = Box<dyn Fn() -> Option<bool> + Send + Sync>;

struct LaneShared {
    name: String,
    state: Mutex<LaneState>,
    metrics: Arc<LaneMetrics>,
    created_at: Instant,
    grace_period: Duration,
    liveness: Liveness,
}

impl LaneShared {
    fn within_grace(&self) -> bool {
        self.created_at.elapsed() < self.grace_period
    }

    fn grace_remaining(&self) -> Duration {
        self.grace_period.saturating_sub(self.created_at.elapsed())
    }

    /// Hand every parked entry to the worker and reset the depth gauges
    fn flush_pending(&self, state: &mut LaneState) -> usize {
        let flushed = state.flush(&self.name);
        self.metrics.set_pending_len(0);
        observability::record_queue_flushed(&self.name, flushed);
        observability::record_pending_depth(&self.name, 0);
        flushed
    }

    /// A failed handshake is superseded once the transport reports itself up
    fn recover(&self, state: &mut LaneState) {
        if state.connection == ConnectionState::Failed && (self.liveness)() == Some(true) {
            state.connection = ConnectionState::Connected;
            info!(transport = %self.name, "Transport recovered after failed handshake");
        }
    }

    fn on_connect(&self, result: Result<(), ShipperError>) {
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.connection = ConnectionState::Connected;
                let flushed = self.flush_pending(&mut state);
                info!(transport = %self.name, flushed, "Transport connected");
            }
            Err(e) => {
                state.connection = ConnectionState::Failed;
                let purged = state.pending.purge();
                self.metrics.add_purged_count(purged);
                warn!(
                    transport = %self.name,
                    purged,
                    error = %e,
                    "Transport connection failed, pending records dropped"
                );
                observability::record_queue_purged(&self.name, purged);
                self.metrics.set_pending_len(0);
                observability::record_pending_depth(&self.name, 0);
            }
        }
    }
}

/// Handle to a running transport lane
pub struct TransportLane {
    shared: Arc<LaneShared>,
    connect_handle: Mutex<Option<JoinHandle<()>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TransportLane {
    /// Create a lane and spawn its connector and worker tasks on `runtime`
    pub fn spawn<T>(transport: T, start: LaneStart, ctx: LaneContext, runtime: &Handle) -> Self
    where
        T: Transport + Sync + 'static,
    {
        let name = transport.name().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(LaneMetrics::new());

        let connection = match start {
            LaneStart::Connect => ConnectionState::Connecting,
            LaneStart::Ready => ConnectionState::Connected,
        };

        let transport = Arc::new(transport);
        let watched = Arc::clone(&transport);

        let shared = Arc::new(LaneShared {
            name: name.clone(),
            state: Mutex::new(LaneState {
                connection,
                pending: PendingQueue::new(),
                tx: Some(tx),
            }),
            metrics,
            created_at: Instant::now(),
            grace_period: ctx.grace_period,
            liveness: Box::new(move || watched.is_connected()),
        });

        let connect_handle = match start {
            LaneStart::Connect => {
                let transport = Arc::clone(&transport);
                let shared = Arc::clone(&shared);
                Some(runtime.spawn(async move {
                    let result = transport.connect().await;
                    shared.on_connect(result);
                }))
            }
            LaneStart::Ready => None,
        };

        let worker_shared = Arc::clone(&shared);
        let worker_handle = runtime.spawn(async move {
            lane_worker(transport, rx, worker_shared, ctx, name).await;
        });

        Self {
            shared,
            connect_handle: Mutex::new(connect_handle),
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    /// Get transport name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        let mut state = self.shared.state.lock();
        self.shared.recover(&mut state);
        state.connection
    }

    /// Records currently parked
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<LaneMetrics> {
        &self.shared.metrics
    }

    /// Route one record through this lane (non-blocking)
    ///
    /// While connecting inside the grace window the record is parked.
    /// Otherwise anything still parked goes first, then the record itself.
    pub fn submit(&self, record: Arc<LogRecord>, completion: Option<Arc<Completion>>) {
        let entry = PendingEntry::new(record, completion);
        let mut state = self.shared.state.lock();
        self.shared.recover(&mut state);

        if state.connection == ConnectionState::Connecting && self.shared.within_grace() {
            state.pending.enqueue(entry);
            let depth = state.pending.len();
            self.shared.metrics.inc_queued_count();
            self.shared.metrics.set_pending_len(depth);
            observability::record_pending_depth(&self.shared.name, depth);
            return;
        }

        if !state.pending.is_empty() {
            let flushed = self.shared.flush_pending(&mut state);
            debug!(
                transport = %self.shared.name,
                flushed,
                "Grace window elapsed, pending records sent best-effort"
            );
        }

        state.forward(&self.shared.name, entry);
    }

    /// Stop accepting records, finish queued sends and close the transport
    ///
    /// A handshake still in flight gets what is left of the grace window to
    /// resolve; records parked past that are dropped.
    #[instrument(name = "transport_lane_shutdown", skip(self), fields(transport = %self.shared.name))]
    pub async fn shutdown(&self) {
        let connector = self.connect_handle.lock().take();
        if let Some(mut connector) = connector {
            let remaining = self.shared.grace_remaining();
            if self.state() == ConnectionState::Connecting && !remaining.is_zero() {
                debug!(
                    transport = %self.shared.name,
                    wait_ms = remaining.as_millis() as u64,
                    "Waiting for handshake before shutdown"
                );
                if tokio::time::timeout(remaining, &mut connector).await.is_err() {
                    debug!(transport = %self.shared.name, "Handshake still pending at shutdown");
                }
            }
            connector.abort();
        }

        {
            let mut state = self.shared.state.lock();
            let purged = state.pending.purge();
            if purged > 0 {
                self.shared.metrics.add_purged_count(purged);
                observability::record_queue_purged(&self.shared.name, purged);
                debug!(transport = %self.shared.name, purged, "Dropped records parked at shutdown");
            }
            self.shared.metrics.set_pending_len(0);
            observability::record_pending_depth(&self.shared.name, 0);
            // Dropping the sender ends the worker loop
            state.tx = None;
        }

        let worker = self.worker_handle.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(transport = %self.shared.name, error = ?e, "Worker task panicked");
            }
        }
        debug!(transport = %self.shared.name, "TransportLane shutdown complete");
    }
}

/// Worker task that ships records in channel order
#[instrument(
    name = "transport_lane_worker",
    skip(transport, rx, shared, ctx),
    fields(transport = %name)
)]
async fn lane_worker<T: Transport>(
    transport: Arc<T>,
    mut rx: mpsc::UnboundedReceiver<PendingEntry>,
    shared: Arc<LaneShared>,
    ctx: LaneContext,
    name: String,
) {
    debug!(transport = %name, "Lane worker started");

    while let Some(entry) = rx.recv().await {
        let started = Instant::now();
        let outcome = deliver(transport.as_ref(), &ctx, &shared.metrics, &entry.record).await;

        match &outcome {
            Ok(()) => {
                shared.metrics.inc_sent_count();
                observability::record_send(&name, true);
                observability::record_send_latency_ms(
                    &name,
                    started.elapsed().as_secs_f64() * 1000.0,
                );
            }
            Err(e) => {
                shared.metrics.inc_failed_count();
                observability::record_send(&name, false);
                error!(
                    transport = %name,
                    topic = %ctx.topic,
                    error = %e,
                    "Send failed"
                );
                if let Some(handler) = &ctx.failure_handler {
                    handler(e, &entry.record);
                }
                // Continue processing - don't crash on single failure
            }
        }

        if let Some(completion) = entry.completion {
            completion.settle(outcome);
        }
    }

    if let Err(e) = transport.close().await {
        error!(transport = %name, error = %e, "Close failed on shutdown");
    }

    debug!(transport = %name, "Lane worker stopped");
}

/// One send, gated by the prober when present
async fn deliver<T: Transport>(
    transport: &T,
    ctx: &LaneContext,
    metrics: &LaneMetrics,
    record: &LogRecord,
) -> Result<(), ShipperError> {
    let Some(prober) = &ctx.prober else {
        return transport.send(&ctx.topic, record).await;
    };

    let name = transport.name();
    if let Err(e) = prober.admit(name) {
        metrics.inc_rejected_count();
        observability::record_probe_rejected(name);
        return Err(e);
    }

    let outcome = transport.send(&ctx.topic, record).await;
    prober.record_outcome(name, &outcome);
    outcome
}
