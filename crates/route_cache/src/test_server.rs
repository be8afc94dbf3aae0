//! FakeProxy - in-process REST proxy for tests
//!
//! Serves `GET /topics` and `POST /topics/{topic}` on an ephemeral port.
//! The token `$SELF` in the topics body is replaced with the proxy's own
//! endpoint, so one server can act as coordinator and broker at once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request received on the produce route
#[derive(Debug, Clone)]
pub struct ProducedMessage {
    pub topic: String,
    pub content_type: String,
    pub timestamp: String,
    pub body: Vec<u8>,
}

impl ProducedMessage {
    /// Body decoded as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct ProxyState {
    endpoint: String,
    topics_body: Mutex<String>,
    discovery_delay: Mutex<Duration>,
    fail_discovery: AtomicBool,
    fail_produce: AtomicBool,
    discovery_hits: AtomicUsize,
    produced: Mutex<Vec<ProducedMessage>>,
}

/// Handle to a running fake proxy; the server stops on drop
pub struct FakeProxy {
    addr: SocketAddr,
    state: Arc<ProxyState>,
    task: JoinHandle<()>,
}

impl FakeProxy {
    /// Start serving `topics_body` on `GET /topics`
    pub async fn start(topics_body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake proxy");
        let addr = listener.local_addr().expect("fake proxy address");

        let state = Arc::new(ProxyState {
            endpoint: addr.to_string(),
            topics_body: Mutex::new(topics_body.to_string()),
            ..Default::default()
        });

        let router = Router::new()
            .route("/topics", get(list_topics))
            .route("/topics/{topic}", post(produce))
            .with_state(Arc::clone(&state));

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state, task }
    }

    /// Start a proxy that routes `topics` to itself
    pub async fn routing(topics: &[&str]) -> Self {
        let body = serde_json::json!({ "$SELF": topics }).to_string();
        Self::start(&body).await
    }

    /// `host:port` of this proxy
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Port of this proxy
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Replace the discovery answer
    pub fn set_topics(&self, topics_body: &str) {
        *self.state.topics_body.lock() = topics_body.to_string();
    }

    /// Delay every discovery answer
    pub fn set_discovery_delay(&self, delay: Duration) {
        *self.state.discovery_delay.lock() = delay;
    }

    /// Make discovery answer 503
    pub fn fail_discovery(&self, fail: bool) {
        self.state.fail_discovery.store(fail, Ordering::SeqCst);
    }

    /// Make produce answer 500
    pub fn fail_produce(&self, fail: bool) {
        self.state.fail_produce.store(fail, Ordering::SeqCst);
    }

    /// Number of discovery requests served
    pub fn discovery_hits(&self) -> usize {
        self.state.discovery_hits.load(Ordering::SeqCst)
    }

    /// Everything produced so far, in arrival order
    pub fn produced(&self) -> Vec<ProducedMessage> {
        self.state.produced.lock().clone()
    }

    /// Wait until at least `count` messages arrived or `timeout` passes
    pub async fn wait_for_produced(&self, count: usize, timeout: Duration) -> Vec<ProducedMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let produced = self.produced();
            if produced.len() >= count || tokio::time::Instant::now() >= deadline {
                return produced;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_topics(State(state): State<Arc<ProxyState>>) -> (StatusCode, String) {
    state.discovery_hits.fetch_add(1, Ordering::SeqCst);

    let delay = *state.discovery_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.fail_discovery.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "coordinator down".to_string());
    }

    let body = state.topics_body.lock().replace("$SELF", &state.endpoint);
    (StatusCode::OK, body)
}

async fn produce(
    State(state): State<Arc<ProxyState>>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if state.fail_produce.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "broker error");
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    state.produced.lock().push(ProducedMessage {
        topic,
        content_type: header("content-type"),
        timestamp: header("timestamp"),
        body: body.to_vec(),
    });

    (StatusCode::OK, "ok")
}
