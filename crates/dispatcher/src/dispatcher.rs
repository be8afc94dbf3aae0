//! MessageDispatcher - fans each record out to every transport lane

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

use contracts::{
    DeliveryCallback, DisablePredicate, FailureHandler, HealthProber, LogRecord, LogSink, Message,
    ShipperConfig, ShipperError, Transport,
};
use observability::DispatchOutcome;

use crate::completion::{complete_later, Completion};
use crate::lane::{ConnectionState, LaneContext, LaneStart, TransportLane};
use crate::metrics::MetricsSnapshot;
use crate::record_builder::LogRecordBuilder;
use crate::transports::RestTransport;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(20);

type LaneFactory = Box<dyn FnOnce(LaneContext, &Handle) -> TransportLane + Send>;

/// Builder for creating a MessageDispatcher
pub struct DispatcherBuilder {
    config: ShipperConfig,
    factories: Vec<LaneFactory>,
    prober: Option<Arc<dyn HealthProber>>,
    failure_handler: Option<FailureHandler>,
    disabled: Option<DisablePredicate>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    ///
    /// A REST lane is added automatically when `config.rest` carries a proxy port.
    pub fn new(config: ShipperConfig) -> Self {
        Self {
            config,
            factories: Vec::new(),
            prober: None,
            failure_handler: None,
            disabled: None,
        }
    }

    /// Add a transport that still has to connect
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + Sync + 'static,
    {
        self.factories.push(Box::new(move |ctx, runtime| {
            TransportLane::spawn(transport, LaneStart::Connect, ctx, runtime)
        }));
        self
    }

    /// Add a transport that is already connected
    pub fn with_connected_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + Sync + 'static,
    {
        self.factories.push(Box::new(move |ctx, runtime| {
            TransportLane::spawn(transport, LaneStart::Ready, ctx, runtime)
        }));
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn HealthProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_failure_handler(mut self, handler: FailureHandler) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    pub fn with_disable_predicate(mut self, predicate: DisablePredicate) -> Self {
        self.disabled = Some(predicate);
        self
    }

    /// Build the dispatcher and start every lane
    ///
    /// # Errors
    /// Fails outside a tokio runtime or when the REST transport cannot be created.
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(topic = %self.config.topic))]
    pub fn build(self) -> Result<MessageDispatcher, ShipperError> {
        let runtime = Handle::try_current()
            .map_err(|e| ShipperError::Other(format!("dispatcher needs a tokio runtime: {e}")))?;

        let mut factories = self.factories;
        if let Some(rest) = self.config.rest.as_ref().filter(|r| r.proxy_port.is_some()) {
            let transport = RestTransport::new(rest, &self.config.host)?;
            factories.insert(
                0,
                Box::new(move |ctx, runtime| {
                    TransportLane::spawn(transport, LaneStart::Connect, ctx, runtime)
                }),
            );
        }

        let ctx = LaneContext {
            topic: Arc::from(self.config.topic.as_str()),
            grace_period: self.config.grace_period(),
            prober: self.prober,
            failure_handler: self.failure_handler,
        };

        let lanes: Vec<TransportLane> = factories
            .into_iter()
            .map(|factory| factory(ctx.clone(), &runtime))
            .collect();

        info!(
            topic = %self.config.topic,
            transports = lanes.len(),
            grace_ms = self.config.grace_period_ms,
            "MessageDispatcher started"
        );

        Ok(MessageDispatcher {
            topic: self.config.topic.clone(),
            builder: LogRecordBuilder::new(&self.config),
            lanes,
            disabled: self.disabled,
            runtime,
        })
    }
}

/// Dispatcher shared by every log call site
///
/// `dispatch` never blocks and never fails; outcomes reach the optional
/// callback, which always runs on a spawned task.
pub struct MessageDispatcher {
    topic: String,
    builder: LogRecordBuilder,
    lanes: Vec<TransportLane>,
    disabled: Option<DisablePredicate>,
    runtime: Handle,
}

impl MessageDispatcher {
    /// Target topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ship a log event
    pub fn dispatch(
        &self,
        level: &str,
        message: impl Into<Message>,
        callback: Option<DeliveryCallback>,
    ) {
        if self.is_disabled() {
            self.complete_disabled(callback);
            return;
        }
        let record = self.builder.build(level, &message.into());
        self.route(record, callback);
    }

    /// Ship a log event with structured metadata
    pub fn dispatch_with_meta<M>(
        &self,
        level: &str,
        message: impl Into<Message>,
        meta: &M,
        callback: Option<DeliveryCallback>,
    ) where
        M: Serialize + ?Sized,
    {
        if self.is_disabled() {
            self.complete_disabled(callback);
            return;
        }
        let record = self.builder.build_with_meta(level, &message.into(), meta);
        self.route(record, callback);
    }

    /// Ship a log event and wait for its outcome
    ///
    /// A record purged on every lane resolves to `NotConnected`.
    pub async fn dispatch_and_wait(
        &self,
        level: &str,
        message: impl Into<Message>,
    ) -> Result<(), ShipperError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(
            level,
            message,
            Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })),
        );
        rx.await.unwrap_or_else(|_| {
            Err(ShipperError::not_connected(
                "dispatcher",
                "record dropped before delivery",
            ))
        })
    }

    /// Whether at least one transport is connected
    pub fn is_ready(&self) -> bool {
        self.lanes
            .iter()
            .any(|lane| lane.state() == ConnectionState::Connected)
    }

    /// Wait until no transport is still connecting, or `timeout` passes
    ///
    /// Returns whether at least one transport ended up connected.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let connecting = self
                .lanes
                .iter()
                .any(|lane| lane.state() == ConnectionState::Connecting);
            if !connecting || Instant::now() >= deadline {
                return self.is_ready();
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Connection state per transport
    pub fn states(&self) -> Vec<(String, ConnectionState)> {
        self.lanes
            .iter()
            .map(|lane| (lane.name().to_string(), lane.state()))
            .collect()
    }

    /// Records parked across all lanes
    pub fn pending_len(&self) -> usize {
        self.lanes.iter().map(TransportLane::pending_len).sum()
    }

    /// Get metrics for all transports
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.lanes
            .iter()
            .map(|lane| (lane.name().to_string(), lane.metrics().snapshot()))
            .collect()
    }

    /// Finish queued sends and close every transport
    #[instrument(name = "dispatcher_shutdown", skip(self), fields(topic = %self.topic))]
    pub async fn shutdown(&self) {
        for lane in &self.lanes {
            lane.shutdown().await;
        }
        info!(topic = %self.topic, "MessageDispatcher shutdown complete");
    }

    fn is_disabled(&self) -> bool {
        self.disabled.as_ref().is_some_and(|disabled| disabled())
    }

    fn complete_disabled(&self, callback: Option<DeliveryCallback>) {
        observability::record_dispatch(DispatchOutcome::Disabled);
        if let Some(callback) = callback {
            complete_later(&self.runtime, callback, Ok(()));
        }
    }

    fn route(&self, record: LogRecord, callback: Option<DeliveryCallback>) {
        if self.lanes.is_empty() {
            observability::record_dispatch(DispatchOutcome::NoTransport);
            debug!(topic = %self.topic, "No transport configured, record dropped");
            if let Some(callback) = callback {
                complete_later(
                    &self.runtime,
                    callback,
                    Err(ShipperError::not_connected(
                        "dispatcher",
                        "no transport configured",
                    )),
                );
            }
            return;
        }

        let record = Arc::new(record);
        let completion =
            callback.map(|cb| Completion::new(cb, self.lanes.len(), self.runtime.clone()));
        for lane in &self.lanes {
            lane.submit(Arc::clone(&record), completion.clone());
        }
        observability::record_dispatch(DispatchOutcome::Accepted);
    }
}

impl LogSink for MessageDispatcher {
    fn accept(&self, level: &str, message: Message, callback: Option<DeliveryCallback>) {
        self.dispatch(level, message, callback);
    }

    fn is_ready(&self) -> bool {
        MessageDispatcher::is_ready(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::CircuitBreakerProber;
    use crate::test_support::{callback, MockTransport};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::timeout;

    fn config() -> ShipperConfig {
        ShipperConfig {
            topic: "logs".to_string(),
            host: "box".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_completes_async_without_send() {
        let transport = MockTransport::new("mock");
        let sent = transport.sent();
        let dispatcher = DispatcherBuilder::new(config())
            .with_connected_transport(transport)
            .with_disable_predicate(Arc::new(|| true))
            .build()
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (tx, rx) = oneshot::channel();
        let cb: DeliveryCallback = Box::new(move |outcome| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(outcome);
        });

        dispatcher.dispatch_with_meta("error", "boom", &json!({ "x": 1 }), Some(cb));
        // Never on the caller's stack
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        dispatcher.shutdown().await;
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cyclic_meta_still_dispatches() {
        #[derive(serde::Serialize, Clone)]
        struct Node(std::rc::Rc<std::cell::RefCell<Option<Node>>>);

        let transport = MockTransport::new("mock");
        let sent = transport.sent();
        let dispatcher = DispatcherBuilder::new(config())
            .with_connected_transport(transport)
            .build()
            .unwrap();

        let node = Node(Default::default());
        *node.0.borrow_mut() = Some(node.clone());
        let (cb, rx) = callback();
        dispatcher.dispatch_with_meta("error", "boom", &node, Some(cb));
        node.0.borrow_mut().take();

        assert_eq!(rx.await.unwrap(), Ok(()));
        dispatcher.shutdown().await;

        let sent = sent.lock();
        let record = &sent[0].1;
        assert_eq!(record.level(), "error");
        assert!(record
            .msg()
            .as_str()
            .unwrap()
            .starts_with("boom bad meta object of type Node"));
    }

    #[tokio::test]
    async fn test_no_transport_reports_not_connected() {
        let dispatcher = DispatcherBuilder::new(config()).build().unwrap();
        assert!(!dispatcher.is_ready());

        let err = dispatcher.dispatch_and_wait("info", "hi").await.unwrap_err();
        assert!(matches!(err, ShipperError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_both_transports_receive_record() {
        let first = MockTransport::new("first");
        let second = MockTransport::new("second").failing();
        let first_sent = first.sent();

        let dispatcher = DispatcherBuilder::new(config())
            .with_connected_transport(first)
            .with_connected_transport(second)
            .build()
            .unwrap();
        assert!(dispatcher.is_ready());

        // One lane fails, the other still delivers
        let outcome = dispatcher.dispatch_and_wait("info", "hi").await;
        assert!(matches!(outcome, Err(ShipperError::SendFailed { .. })));
        assert_eq!(first_sent.lock().len(), 1);
        assert_eq!(first_sent.lock()[0].0, "logs");
        assert_eq!(first_sent.lock()[0].1.get("host"), Some(&json!("box")));

        let metrics = dispatcher.metrics();
        assert_eq!(metrics[0].1.sent_count, 1);
        assert_eq!(metrics[1].1.failed_count, 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_drains_on_connect() {
        let transport = MockTransport::new("mock").gated();
        let gate = transport.gate();
        let sent = transport.sent();
        let dispatcher = DispatcherBuilder::new(config())
            .with_transport(transport)
            .build()
            .unwrap();

        for n in 0..3 {
            dispatcher.dispatch("info", format!("line {n}"), None);
        }
        assert_eq!(dispatcher.pending_len(), 3);
        assert!(!dispatcher.is_ready());
        assert_eq!(
            dispatcher.states(),
            vec![("mock".to_string(), ConnectionState::Connecting)]
        );

        gate.open(Ok(()));
        let (cb, rx) = callback();
        sleep(Duration::from_millis(20)).await;
        dispatcher.dispatch("info", "line 3", Some(cb));
        timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();

        let lines: Vec<_> = sent.lock().iter().map(|(_, r)| r.msg().clone()).collect();
        assert_eq!(
            lines,
            vec![json!("line 0"), json!("line 1"), json!("line 2"), json!("line 3")]
        );
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_ready() {
        let transport = MockTransport::new("mock").gated();
        let gate = transport.gate();
        let dispatcher = DispatcherBuilder::new(config())
            .with_transport(transport)
            .build()
            .unwrap();

        assert!(!dispatcher.wait_ready(Duration::from_millis(50)).await);

        gate.open(Ok(()));
        assert!(dispatcher.wait_ready(Duration::from_secs(1)).await);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_prober_rejection_reaches_failure_handler() {
        let transport = MockTransport::new("mock").failing();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&failures);
        let handler: FailureHandler = Arc::new(move |e: &ShipperError, _r: &LogRecord| {
            seen.lock().push(e.clone());
        });

        let dispatcher = DispatcherBuilder::new(config())
            .with_connected_transport(transport)
            .with_prober(Arc::new(CircuitBreakerProber::new(1, Duration::from_secs(60))))
            .with_failure_handler(handler)
            .build()
            .unwrap();

        let first = dispatcher.dispatch_and_wait("info", "one").await;
        assert!(matches!(first, Err(ShipperError::SendFailed { .. })));

        let second = dispatcher.dispatch_and_wait("info", "two").await;
        assert!(matches!(second, Err(ShipperError::Unhealthy { .. })));

        assert_eq!(failures.lock().len(), 2);
        assert_eq!(dispatcher.metrics()[0].1.rejected_count, 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_transports() {
        let transport = MockTransport::new("mock");
        let closed = transport.closed();
        let dispatcher = DispatcherBuilder::new(config())
            .with_connected_transport(transport)
            .build()
            .unwrap();

        dispatcher.dispatch("info", "bye", None);
        dispatcher.shutdown().await;
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(dispatcher.metrics()[0].1.sent_count, 1);
    }

    #[tokio::test]
    async fn test_log_sink_capability() {
        let dispatcher = DispatcherBuilder::new(config())
            .with_connected_transport(MockTransport::new("mock"))
            .build()
            .unwrap();
        let sink: &dyn LogSink = &dispatcher;
        assert!(sink.is_ready());

        let delivered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&delivered);
        let (tx, rx) = oneshot::channel();
        sink.accept(
            "warn",
            Message::from(json!({ "event": "disk" })),
            Some(Box::new(move |outcome| {
                flag.store(outcome.is_ok(), Ordering::SeqCst);
                let _ = tx.send(());
            })),
        );
        rx.await.unwrap();
        assert!(delivered.load(Ordering::SeqCst));
        dispatcher.shutdown().await;
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = DispatcherBuilder::new(config()).build().err().unwrap();
        assert!(matches!(err, ShipperError::Other(_)));
    }
}
