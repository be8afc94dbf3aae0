//! Layered error definitions
//!
//! Categorized by source: config / connection / routing / send / encoding

use thiserror::Error;

/// Unified error type
///
/// `Clone` so a single send failure can reach both the failure handler and the
/// caller's completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShipperError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse { message: String },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Connection Errors =====
    /// No transport ready (never initialized, or handshake still pending)
    #[error("transport '{transport}' not connected: {message}")]
    NotConnected { transport: String, message: String },

    /// Coordinator unreachable or returned a malformed topic map
    #[error("topic discovery via '{coordinator}' failed: {message}")]
    DiscoveryFailed {
        coordinator: String,
        message: String,
    },

    // ===== Routing Errors =====
    /// Route table has no broker for the topic
    #[error("topic not found: {topic}")]
    TopicNotFound { topic: String },

    // ===== Send Errors =====
    /// Transport-level send error
    #[error("send to '{endpoint}' failed: {message}")]
    SendFailed {
        endpoint: String,
        message: String,
        status: Option<u16>,
    },

    /// Health prober refused to run the send
    #[error("transport '{transport}' is unhealthy: {message}")]
    Unhealthy { transport: String, message: String },

    // ===== Encoding Errors =====
    /// Record or metadata could not be encoded
    #[error("serialization failed: {message}")]
    SerializationFailed { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {message}")]
    Io { message: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ShipperError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create not-connected error
    pub fn not_connected(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotConnected {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create discovery error
    pub fn discovery_failed(coordinator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            coordinator: coordinator.into(),
            message: message.into(),
        }
    }

    /// Create topic-not-found error
    pub fn topic_not_found(topic: impl Into<String>) -> Self {
        Self::TopicNotFound {
            topic: topic.into(),
        }
    }

    /// Create send error without an HTTP status
    pub fn send_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendFailed {
            endpoint: endpoint.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create send error carrying the broker's HTTP status
    pub fn send_rejected(endpoint: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::SendFailed {
            endpoint: endpoint.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create unhealthy-transport error
    pub fn unhealthy(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unhealthy {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create serialization error
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::SerializationFailed {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ShipperError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ShipperError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_failed(err.to_string())
    }
}
