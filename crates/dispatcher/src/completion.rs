//! Completion - fan-in of per-lane outcomes into one caller callback

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::trace;

use contracts::{DeliveryCallback, ShipperError};

/// Shared completion for one dispatched record
///
/// Every lane the record was routed to either settles it (a send was
/// attempted) or abandons it (the record was purged). Once the last lane
/// reports, the callback runs on a spawned task with the first error seen.
/// If every lane abandoned the record, the callback is dropped uninvoked.
pub struct Completion {
    callback: Mutex<Option<DeliveryCallback>>,
    remaining: AtomicUsize,
    settled: AtomicBool,
    first_error: Mutex<Option<ShipperError>>,
    runtime: Handle,
}

impl Completion {
    /// Completion expecting `lanes` reports
    pub fn new(callback: DeliveryCallback, lanes: usize, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(Some(callback)),
            remaining: AtomicUsize::new(lanes.max(1)),
            settled: AtomicBool::new(false),
            first_error: Mutex::new(None),
            runtime,
        })
    }

    /// Report the outcome of one lane's send
    pub fn settle(&self, outcome: Result<(), ShipperError>) {
        if let Err(e) = outcome {
            let mut first = self.first_error.lock();
            if first.is_none() {
                *first = Some(e);
            }
        }
        self.settled.store(true, Ordering::Release);
        self.finish_one();
    }

    /// Report that one lane dropped the record without sending
    pub fn abandon(&self) {
        self.finish_one();
    }

    /// Whether the callback has already been handed off or dropped
    pub fn is_done(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    fn finish_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let Some(callback) = self.callback.lock().take() else {
            return;
        };

        if !self.settled.load(Ordering::Acquire) {
            trace!("Record purged on every lane, callback dropped");
            return;
        }

        let outcome = match self.first_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        complete_later(&self.runtime, callback, outcome);
    }
}

/// Run `callback` on a fresh task, never on the caller's stack
pub fn complete_later(
    runtime: &Handle,
    callback: DeliveryCallback,
    outcome: Result<(), ShipperError>,
) {
    runtime.spawn(async move {
        callback(outcome);
    });
}
