//! RouteTable - topic discovery result
//!
//! The coordinator answers `GET /topics` with `{"host:port": [topic, ...]}`;
//! the table stores the inverse.

use std::collections::{BTreeMap, HashMap};

/// Immutable `topic -> endpoint` mapping
///
/// Rebuilt from scratch on each discovery cycle and swapped in whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    /// Parse a coordinator response body
    ///
    /// Endpoints are visited in sorted order, so a topic listed under two
    /// endpoints resolves to the lexicographically last one.
    ///
    /// # Errors
    /// Returns the JSON error if the body is not an `endpoint -> [topic]` object.
    pub fn from_discovery(body: &str) -> Result<Self, serde_json::Error> {
        let by_endpoint: BTreeMap<String, Vec<String>> = serde_json::from_str(body)?;
        Ok(Self::from_endpoint_map(by_endpoint))
    }

    /// Invert an `endpoint -> topics` map
    pub fn from_endpoint_map(by_endpoint: BTreeMap<String, Vec<String>>) -> Self {
        let mut routes = HashMap::new();
        for (endpoint, topics) in by_endpoint {
            for topic in topics {
                routes.insert(topic, endpoint.clone());
            }
        }
        Self { routes }
    }

    /// Broker endpoint owning `topic`
    pub fn resolve(&self, topic: &str) -> Option<&str> {
        self.routes.get(topic).map(String::as_str)
    }

    /// Number of routed topics
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no topic is routed
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Distinct broker endpoints
    pub fn endpoints(&self) -> Vec<&str> {
        let mut endpoints: Vec<&str> = self.routes.values().map(String::as_str).collect();
        endpoints.sort_unstable();
        endpoints.dedup();
        endpoints
    }

    /// Routes sorted by topic
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .routes
            .iter()
            .map(|(topic, endpoint)| (topic.as_str(), endpoint.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }
}
