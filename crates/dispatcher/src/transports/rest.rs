//! RestTransport - ships records through the REST proxy

use chrono::Utc;
use tracing::{debug, instrument};

use contracts::{LogRecord, RestProxyConfig, ShipperError, Transport};
use route_cache::{BrokerRouteCache, ContentType, RestProducer};

/// Transport name used in logs and metrics
pub const REST_TRANSPORT: &str = "rest";

/// Transport backed by a [`RestProducer`]
///
/// `connect` runs the initial topic discovery; each send resolves the topic
/// through the route cache and posts the record JSON to the owning broker.
pub struct RestTransport {
    producer: RestProducer,
}

impl RestTransport {
    pub fn new(config: &RestProxyConfig, host: &str) -> Result<Self, ShipperError> {
        Ok(Self {
            producer: RestProducer::new(config, host)?,
        })
    }

    /// Route cache behind the producer
    pub fn cache(&self) -> Option<&BrokerRouteCache> {
        self.producer.cache()
    }
}

impl Transport for RestTransport {
    fn name(&self) -> &str {
        REST_TRANSPORT
    }

    /// Up whenever the route cache holds a discovered table
    fn is_connected(&self) -> Option<bool> {
        Some(self.producer.is_enabled())
    }

    async fn connect(&self) -> Result<(), ShipperError> {
        self.producer.connect().await
    }

    #[instrument(name = "rest_transport_send", skip(self, record))]
    async fn send(&self, topic: &str, record: &LogRecord) -> Result<(), ShipperError> {
        let body = record.to_json_bytes()?;
        let reply = self
            .producer
            .produce(topic, body, Utc::now().timestamp_millis(), ContentType::Binary)
            .await?;
        debug!(topic, reply = %reply, "Record accepted by broker");
        Ok(())
    }

    async fn close(&self) -> Result<(), ShipperError> {
        self.producer.close();
        Ok(())
    }
}
