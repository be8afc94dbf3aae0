//! BrokerRouteCache - topic routing with periodic discovery refresh

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use contracts::{RestProxyConfig, ShipperError};

use crate::connection::BrokerConnection;
use crate::discovery::RouteTable;
use crate::producer::ProduceRequest;

/// Coordinator discovery route
pub const DISCOVERY_PATH: &str = "/topics";

/// Poll interval for produce calls that arrive while discovery is in flight
pub const DISCOVERY_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Transport name used in errors raised by the cache
const TRANSPORT: &str = "rest";

/// Topic-to-broker routing cache
///
/// Cheap to clone; clones share the same table, pool and refresh timer.
#[derive(Clone)]
pub struct BrokerRouteCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    coordinator: BrokerConnection,
    /// Swapped whole on every successful discovery
    table: RwLock<Arc<RouteTable>>,
    enabled: AtomicBool,
    /// Discovery rounds currently waiting on the coordinator
    in_flight: AtomicUsize,
    closed: AtomicBool,
    discovery_count: AtomicU64,
    /// Endpoint -> pooled connection, never evicted while open
    pool: Mutex<HashMap<String, BrokerConnection>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    refresh_interval: Option<Duration>,
    request_timeout: Duration,
    max_discovery_retries: u32,
}

impl BrokerRouteCache {
    /// Create a cache for the coordinator in `config`
    ///
    /// No I/O happens until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns `NotConnected` when no proxy port is configured.
    pub fn new(config: &RestProxyConfig) -> Result<Self, ShipperError> {
        let coordinator = config.coordinator().ok_or_else(|| {
            ShipperError::not_connected(TRANSPORT, "rest proxy port is not configured")
        })?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                coordinator: BrokerConnection::new(coordinator, config.request_timeout())?,
                table: RwLock::new(Arc::new(RouteTable::default())),
                enabled: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                discovery_count: AtomicU64::new(0),
                pool: Mutex::new(HashMap::new()),
                refresh_task: Mutex::new(None),
                refresh_interval: config.refresh_interval(),
                request_timeout: config.request_timeout(),
                max_discovery_retries: config.max_discovery_retries,
            }),
        })
    }

    /// Run the initial discovery and schedule the refresh timer
    ///
    /// The timer is scheduled even if the first discovery fails, so the cache
    /// can come up on a later tick.
    ///
    /// # Errors
    /// Returns `DiscoveryFailed`; the cache stays disabled.
    #[instrument(name = "route_cache_start", skip(self), fields(coordinator = %self.coordinator()))]
    pub async fn start(&self) -> Result<(), ShipperError> {
        let result = self.discover().await;
        self.schedule_refresh();

        match result {
            Ok(topics) => {
                info!(topics, "Route cache enabled");
                Ok(())
            }
            Err(e) => {
                self.inner.enabled.store(false, Ordering::SeqCst);
                warn!(error = %e, "Initial topic discovery failed");
                Err(e)
            }
        }
    }

    /// Run one discovery round and swap the table in
    ///
    /// A failure leaves the current table and `enabled` flag untouched.
    ///
    /// # Errors
    /// Returns `DiscoveryFailed` if the coordinator is unreachable or the body is malformed.
    #[instrument(name = "route_cache_discover", skip(self))]
    pub async fn discover(&self) -> Result<usize, ShipperError> {
        let fetched = {
            let _in_flight = InFlight::enter(&self.inner.in_flight);
            self.fetch_table().await
        };

        let table = fetched.inspect_err(|_| observability::record_discovery(false, 0))?;
        let topics = table.len();
        {
            // `close` flips `closed` under the same lock
            let mut slot = self.inner.table.write();
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(ShipperError::not_connected(TRANSPORT, "route cache is closed"));
            }
            *slot = Arc::new(table);
            self.inner.discovery_count.fetch_add(1, Ordering::SeqCst);
            self.inner.enabled.store(true, Ordering::SeqCst);
        }
        observability::record_discovery(true, topics);

        debug!(topics, "Route table swapped");
        Ok(topics)
    }

    async fn fetch_table(&self) -> Result<RouteTable, ShipperError> {
        let coordinator = self.coordinator().to_string();
        let body = self
            .inner
            .coordinator
            .get(DISCOVERY_PATH)
            .await
            .map_err(|e| ShipperError::discovery_failed(&coordinator, e.to_string()))?;

        RouteTable::from_discovery(&body).map_err(|e| {
            ShipperError::discovery_failed(&coordinator, format!("malformed topic map: {e}"))
        })
    }

    fn schedule_refresh(&self) {
        let Some(period) = self.inner.refresh_interval else {
            return;
        };

        let mut slot = self.inner.refresh_task.lock();
        if slot.is_some() || self.inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(refresh_loop(weak, period)));
        debug!(period_ms = period.as_millis() as u64, "Topic refresh scheduled");
    }

    /// Produce a payload to the broker owning `request.topic`
    ///
    /// While discovery is in flight the call polls every
    /// [`DISCOVERY_RETRY_INTERVAL`], up to the configured retry cap.
    ///
    /// # Errors
    /// - `NotConnected` if the cache is disabled, or discovery outlasts the retry cap
    /// - `TopicNotFound` if the table has no route (no request is sent)
    /// - `SendFailed` if the broker rejects the request
    #[instrument(
        name = "route_cache_produce",
        skip(self, request),
        fields(topic = %request.topic)
    )]
    pub async fn produce(&self, request: &ProduceRequest) -> Result<String, ShipperError> {
        let mut retries = 0u32;
        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(ShipperError::not_connected(TRANSPORT, "route cache is closed"));
            }

            if self.inner.enabled.load(Ordering::SeqCst) {
                let endpoint = self
                    .resolve(&request.topic)
                    .ok_or_else(|| ShipperError::topic_not_found(&request.topic))?;
                let connection = self.connection_for(&endpoint)?;
                return connection
                    .post_topic(
                        &request.topic,
                        request.content_type,
                        request.timestamp,
                        request.payload.clone(),
                    )
                    .await;
            }

            if !self.is_connecting() {
                return Err(ShipperError::not_connected(
                    TRANSPORT,
                    "rest client is not enabled yet",
                ));
            }

            if retries >= self.inner.max_discovery_retries {
                return Err(ShipperError::not_connected(
                    TRANSPORT,
                    format!("topic discovery still in flight after {retries} retries"),
                ));
            }
            retries += 1;
            tokio::time::sleep(DISCOVERY_RETRY_INTERVAL).await;
        }
    }

    /// Endpoint currently routed for `topic`
    pub fn resolve(&self, topic: &str) -> Option<String> {
        self.inner.table.read().resolve(topic).map(str::to_string)
    }

    /// Snapshot of the current table
    pub fn table(&self) -> Arc<RouteTable> {
        Arc::clone(&self.inner.table.read())
    }

    fn connection_for(&self, endpoint: &str) -> Result<BrokerConnection, ShipperError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ShipperError::not_connected(TRANSPORT, "route cache is closed"));
        }

        let mut pool = self.inner.pool.lock();
        if let Some(connection) = pool.get(endpoint) {
            return Ok(connection.clone());
        }

        let connection = BrokerConnection::new(endpoint, self.inner.request_timeout)?;
        pool.insert(endpoint.to_string(), connection.clone());
        debug!(endpoint, pool_size = pool.len(), "Pooled new broker connection");
        Ok(connection)
    }

    /// Disable the cache, cancel the refresh timer and release pooled connections
    #[instrument(name = "route_cache_close", skip(self))]
    pub fn close(&self) {
        {
            let _table = self.inner.table.write();
            self.inner.closed.store(true, Ordering::SeqCst);
            self.inner.enabled.store(false, Ordering::SeqCst);
        }

        if let Some(task) = self.inner.refresh_task.lock().take() {
            task.abort();
        }
        let released = {
            let mut pool = self.inner.pool.lock();
            let released = pool.len();
            pool.clear();
            released
        };

        info!(released, "Route cache closed");
    }

    /// Whether a discovery has succeeded and the cache is open
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Whether a discovery round is in flight
    pub fn is_connecting(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Successful discovery rounds so far
    pub fn discovery_count(&self) -> u64 {
        self.inner.discovery_count.load(Ordering::SeqCst)
    }

    /// Pooled broker connections
    pub fn pool_size(&self) -> usize {
        self.inner.pool.lock().len()
    }

    /// Coordinator `host:port`
    pub fn coordinator(&self) -> &str {
        self.inner.coordinator.endpoint()
    }
}

/// Counts one in-flight discovery until dropped, including on cancellation
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn refresh_loop(cache: Weak<CacheInner>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = cache.upgrade() else {
            break;
        };
        let cache = BrokerRouteCache { inner };
        match cache.discover().await {
            Ok(topics) => debug!(topics, "Topic map refreshed"),
            Err(e) => warn!(error = %e, "Topic map refresh failed, keeping previous table"),
        }
    }
}
