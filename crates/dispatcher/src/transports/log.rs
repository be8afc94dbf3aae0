//! LogTransport - writes records through tracing

use contracts::{LogRecord, ShipperError, Transport};
use tracing::{info, instrument};

/// Transport that logs records instead of shipping them (dry runs, debugging)
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    /// Create a new LogTransport with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ShipperError> {
        Ok(())
    }

    #[instrument(
        name = "log_transport_send",
        skip(self, record),
        fields(transport = %self.name, level = record.level())
    )]
    async fn send(&self, topic: &str, record: &LogRecord) -> Result<(), ShipperError> {
        let body = serde_json::to_string(record)?;
        info!(transport = %self.name, topic, record = %body, "LogRecord shipped");
        Ok(())
    }

    #[instrument(name = "log_transport_close", skip(self))]
    async fn close(&self) -> Result<(), ShipperError> {
        info!(transport = %self.name, "LogTransport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Fields;
    use serde_json::json;

    #[tokio::test]
    async fn test_log_transport_send() {
        let transport = LogTransport::new("dry_run");
        assert!(transport.connect().await.is_ok());

        let record = LogRecord::new("info", json!("hello"), Fields::new());
        assert!(transport.send("logs", &record).await.is_ok());
        assert!(transport.close().await.is_ok());
    }
}
