//! Transport implementations
//!
//! Contains RestTransport and LogTransport.

mod log;
mod rest;

pub use self::log::LogTransport;
pub use self::rest::{RestTransport, REST_TRANSPORT};
