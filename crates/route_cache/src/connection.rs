//! BrokerConnection - one HTTP-addressable broker endpoint

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, instrument};

use contracts::ShipperError;

/// Header carrying the produce timestamp
pub const TIMESTAMP_HEADER: &str = "TimeStamp";

/// Payload encoding advertised to the REST proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// Opaque bytes
    #[default]
    Binary,
    /// JSON document
    Json,
}

impl ContentType {
    /// MIME type understood by the proxy
    pub fn mime(self) -> &'static str {
        match self {
            Self::Binary => "application/vnd.kafka.binary.v1",
            Self::Json => "application/vnd.kafka.json.v1+json",
        }
    }
}

/// Pooled HTTP client bound to a single `host:port`
///
/// Cheap to clone; clones share the underlying connection pool, which is
/// safe for concurrent use.
#[derive(Debug, Clone)]
pub struct BrokerConnection {
    endpoint: String,
    base_url: String,
    client: reqwest::Client,
}

impl BrokerConnection {
    /// Create a connection for `endpoint` (`host:port`)
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ShipperError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| ShipperError::send_failed(&endpoint, e.to_string()))?;

        Ok(Self {
            base_url: format!("http://{endpoint}"),
            endpoint,
            client,
        })
    }

    /// Endpoint this connection talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `GET path`, returning the body text
    #[instrument(name = "broker_connection_get", skip(self), fields(endpoint = %self.endpoint))]
    pub async fn get(&self, path: &str) -> Result<String, ShipperError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| ShipperError::send_failed(&self.endpoint, e.to_string()))?;

        self.read_body(response).await
    }

    /// `POST /topics/{topic}` with the produce headers
    #[instrument(
        name = "broker_connection_post",
        skip(self, body),
        fields(endpoint = %self.endpoint, bytes = body.len())
    )]
    pub async fn post_topic(
        &self,
        topic: &str,
        content_type: ContentType,
        timestamp: i64,
        body: Bytes,
    ) -> Result<String, ShipperError> {
        let response = self
            .client
            .post(format!("{}/topics/{}", self.base_url, topic))
            .header(CONTENT_TYPE, content_type.mime())
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| ShipperError::send_failed(&self.endpoint, e.to_string()))?;

        self.read_body(response).await
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, ShipperError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShipperError::send_failed(&self.endpoint, e.to_string()))?;

        if !status.is_success() {
            return Err(ShipperError::send_rejected(
                &self.endpoint,
                status.as_u16(),
                format!("broker answered {status}: {body}"),
            ));
        }

        debug!(endpoint = %self.endpoint, status = status.as_u16(), "Broker responded");
        Ok(body)
    }
}
