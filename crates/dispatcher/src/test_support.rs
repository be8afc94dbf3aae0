//! Mock transports shared by the unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{oneshot, watch};

use contracts::{DeliveryCallback, Fields, LogRecord, ShipperError, Transport};

pub type Sent = Arc<Mutex<Vec<(String, LogRecord)>>>;

/// What `is_connected` reports; `None` means the transport does not track it
pub type Liveness = Arc<Mutex<Option<bool>>>;

/// Releases a gated transport's `connect`
#[derive(Clone)]
pub struct ConnectGate {
    tx: Arc<watch::Sender<Option<Result<(), ShipperError>>>>,
}

impl ConnectGate {
    pub fn open(&self, outcome: Result<(), ShipperError>) {
        self.tx.send_replace(Some(outcome));
    }
}

/// Transport recording every send in memory
pub struct MockTransport {
    name: String,
    sent: Sent,
    gate_tx: Arc<watch::Sender<Option<Result<(), ShipperError>>>>,
    gate_rx: watch::Receiver<Option<Result<(), ShipperError>>>,
    fail: bool,
    closed: Arc<AtomicBool>,
    live: Liveness,
}

impl MockTransport {
    /// Connects immediately, every send succeeds
    pub fn new(name: &str) -> Self {
        let (tx, rx) = watch::channel(Some(Ok(())));
        Self {
            name: name.to_string(),
            sent: Arc::default(),
            gate_tx: Arc::new(tx),
            gate_rx: rx,
            fail: false,
            closed: Arc::default(),
            live: Arc::default(),
        }
    }

    /// `connect` blocks until the gate opens
    pub fn gated(self) -> Self {
        self.gate_tx.send_replace(None);
        self
    }

    /// Every send fails
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn gate(&self) -> ConnectGate {
        ConnectGate {
            tx: Arc::clone(&self.gate_tx),
        }
    }

    pub fn sent(&self) -> Sent {
        Arc::clone(&self.sent)
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn liveness(&self) -> Liveness {
        Arc::clone(&self.live)
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> Option<bool> {
        *self.live.lock()
    }

    async fn connect(&self) -> Result<(), ShipperError> {
        let mut rx = self.gate_rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            Err(_) => Err(ShipperError::not_connected(&self.name, "gate dropped")),
        };
        outcome
    }

    async fn send(&self, topic: &str, record: &LogRecord) -> Result<(), ShipperError> {
        if self.fail {
            return Err(ShipperError::send_failed(&self.name, "mock failure"));
        }
        self.sent.lock().push((topic.to_string(), record.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), ShipperError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Record whose `msg` is `n`
pub fn record(n: u64) -> Arc<LogRecord> {
    Arc::new(LogRecord::new("info", json!(n), Fields::new()))
}

/// Callback forwarding its outcome to a oneshot
pub fn callback() -> (DeliveryCallback, oneshot::Receiver<Result<(), ShipperError>>) {
    let (tx, rx) = oneshot::channel();
    let cb: DeliveryCallback = Box::new(move |outcome| {
        let _ = tx.send(outcome);
    });
    (cb, rx)
}
