//! HealthProber trait - send gate
//!
//! A prober decides, per send, whether the transport is healthy enough to try.

use crate::ShipperError;

/// Health-probing collaborator
///
/// `admit` runs before every send. A rejection skips the send and routes the
/// returned error to the failure handler and the caller's callback.
pub trait HealthProber: Send + Sync {
    /// Allow or refuse a send on `transport`
    ///
    /// # Errors
    /// Returns the reason the send is refused.
    fn admit(&self, transport: &str) -> Result<(), ShipperError>;

    /// Feed back the outcome of an admitted send
    fn record_outcome(&self, transport: &str, outcome: &Result<(), ShipperError>);
}
