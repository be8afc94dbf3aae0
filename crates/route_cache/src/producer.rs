//! RestProducer - REST-proxy client facade
//!
//! Owns the route cache when a proxy port is configured and turns raw log
//! lines into enveloped produce requests.

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument};

use contracts::{RestProxyConfig, ShipperError};

use crate::cache::BrokerRouteCache;
use crate::connection::ContentType;

/// One produce call
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub topic: String,
    pub payload: Bytes,
    /// Epoch milliseconds, sent as the `TimeStamp` header
    pub timestamp: i64,
    pub content_type: ContentType,
}

/// Wire shape of a line shipped through [`RestProducer::log_line`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<'a> {
    /// Fractional epoch seconds
    pub ts: f64,
    pub host: &'a str,
    pub msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<&'a str>,
}

/// REST-proxy producer
///
/// Without a proxy port the producer exists but is disabled: `connect` fails
/// and every produce is rejected.
pub struct RestProducer {
    cache: Option<BrokerRouteCache>,
    host: String,
    add_topic_to_message: bool,
}

impl RestProducer {
    /// Create a producer; no I/O until [`connect`](Self::connect)
    pub fn new(config: &RestProxyConfig, host: impl Into<String>) -> Result<Self, ShipperError> {
        let cache = match config.proxy_port {
            Some(_) => Some(BrokerRouteCache::new(config)?),
            None => None,
        };

        Ok(Self {
            cache,
            host: host.into(),
            add_topic_to_message: config.add_topic_to_message,
        })
    }

    /// Route cache backing this producer, if configured
    pub fn cache(&self) -> Option<&BrokerRouteCache> {
        self.cache.as_ref()
    }

    /// Whether the route cache has completed discovery
    pub fn is_enabled(&self) -> bool {
        self.cache.as_ref().is_some_and(BrokerRouteCache::is_enabled)
    }

    /// Start the route cache
    ///
    /// # Errors
    /// `NotConnected` when no proxy port is configured, otherwise the discovery error.
    pub async fn connect(&self) -> Result<(), ShipperError> {
        match &self.cache {
            Some(cache) => cache.start().await,
            None => Err(ShipperError::not_connected(
                "rest",
                "rest producer is not initialized",
            )),
        }
    }

    /// Produce a payload to `topic`
    #[instrument(name = "rest_producer_produce", skip(self, payload))]
    pub async fn produce(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        timestamp: i64,
        content_type: ContentType,
    ) -> Result<String, ShipperError> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            ShipperError::not_connected("rest", "rest client is not initialized")
        })?;

        let request = ProduceRequest {
            topic: topic.to_string(),
            payload: payload.into(),
            timestamp,
            content_type,
        };
        cache.produce(&request).await
    }

    /// Ship a raw line wrapped in an [`Envelope`] stamped with the current time
    pub async fn log_line(&self, topic: &str, message: &str) -> Result<String, ShipperError> {
        let ts = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        self.log_line_with_timestamp(topic, message, ts).await
    }

    /// Ship a raw line with an explicit fractional-second timestamp
    pub async fn log_line_with_timestamp(
        &self,
        topic: &str,
        message: &str,
        ts: f64,
    ) -> Result<String, ShipperError> {
        let body = serde_json::to_vec(&self.envelope(topic, message, ts))?;
        debug!(topic, bytes = body.len(), "Shipping log line");
        self.produce(topic, body, (ts * 1000.0) as i64, ContentType::Binary)
            .await
    }

    /// Build the envelope for a line
    pub fn envelope<'a>(&'a self, topic: &'a str, message: &'a str, ts: f64) -> Envelope<'a> {
        Envelope {
            ts,
            host: &self.host,
            msg: message,
            topic: self.add_topic_to_message.then_some(topic),
        }
    }

    /// Disable the producer and close the route cache
    pub fn close(&self) {
        if let Some(cache) = &self.cache {
            cache.close();
        }
    }
}
