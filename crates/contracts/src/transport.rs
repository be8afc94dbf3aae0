//! Transport trait - Dispatcher output interface
//!
//! Defines the abstract interface for broker transports and the callback
//! shapes used on the dispatch path.

use std::sync::Arc;

use crate::{LogRecord, Message, ShipperError};

/// Per-record completion callback
///
/// Invoked at most once, always from a runtime task rather than the caller's stack.
pub type DeliveryCallback = Box<dyn FnOnce(Result<(), ShipperError>) + Send + 'static>;

/// External failure handler, called with the error and the record that failed
pub type FailureHandler = Arc<dyn Fn(&ShipperError, &LogRecord) + Send + Sync>;

/// Externally supplied kill switch; `true` turns dispatch into a no-op
pub type DisablePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Broker transport trait
///
/// Implemented by the REST-proxy transport and by any direct broker client.
/// Methods take `&self`: the handshake and the send loop run concurrently.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Live connection status, for transports that track it after the handshake
    ///
    /// `None` leaves the lane's handshake outcome authoritative.
    fn is_connected(&self) -> Option<bool> {
        None
    }

    /// Establish the connection
    ///
    /// # Errors
    /// Returns connection error; the dispatcher purges its pending queue.
    async fn connect(&self) -> Result<(), ShipperError>;

    /// Ship one record to `topic`
    async fn send(&self, topic: &str, record: &LogRecord) -> Result<(), ShipperError>;

    /// Release connections
    async fn close(&self) -> Result<(), ShipperError>;
}

/// Narrow sink capability consumed by a logging integration
pub trait LogSink: Send + Sync {
    /// Accept one log event; must not block
    fn accept(&self, level: &str, message: Message, callback: Option<DeliveryCallback>);

    /// Whether at least one transport is connected
    fn is_ready(&self) -> bool;
}
