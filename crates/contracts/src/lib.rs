//! # Contracts
//!
//! Frozen interface contracts shared by every log-shipper crate.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Record Model
//! - A `LogRecord` is a flat JSON object that always carries `level` and `msg`
//! - Transports receive records by reference and never mutate them

mod config;
mod error;
mod prober;
mod record;
mod transport;

pub use config::*;
pub use error::*;
pub use prober::HealthProber;
pub use record::*;
pub use transport::*;
