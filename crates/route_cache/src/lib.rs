//! # Route Cache
//!
//! REST-proxy side of the shipper.
//!
//! Responsibilities:
//! - Discover the `topic -> broker` mapping from the coordinator
//! - Refresh the mapping on a timer, swapping it atomically
//! - Pool one HTTP connection per broker endpoint
//! - Produce payloads to the broker that owns the topic

pub mod cache;
pub mod connection;
pub mod discovery;
pub mod producer;

#[cfg(any(test, feature = "test-util"))]
pub mod test_server;

pub use cache::{BrokerRouteCache, DISCOVERY_PATH, DISCOVERY_RETRY_INTERVAL};
pub use connection::{BrokerConnection, ContentType};
pub use discovery::RouteTable;
pub use producer::{Envelope, ProduceRequest, RestProducer};
