//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 -> 分发器 -> REST 代理的完整链路
//! - 连接建立前排队、失败清空、禁用谓词
//! - topic 路由刷新

#[cfg(test)]
mod contract_tests {
    use contracts::{DateFormat, ShipperConfig};

    #[test]
    fn test_contract_defaults() {
        // 默认配置与原始发送端保持一致
        let config = ShipperConfig::default();
        assert_eq!(config.topic, "unknown");
        assert_eq!(config.grace_period_ms, 5000);
        assert_eq!(config.date_formats["isodate"], DateFormat::Iso);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{DeliveryCallback, LogRecord, RestProxyConfig, ShipperConfig, ShipperError};
    use dispatcher::{ConnectionState, DispatcherBuilder, LogTransport};
    use route_cache::test_server::FakeProxy;
    use route_cache::{BrokerRouteCache, ContentType, ProduceRequest, RestProducer};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    const WAIT: Duration = Duration::from_secs(3);

    fn rest_config(proxy: &FakeProxy) -> RestProxyConfig {
        RestProxyConfig {
            proxy_host: "127.0.0.1".to_string(),
            proxy_port: Some(proxy.port()),
            refresh_interval_ms: 0,
            ..Default::default()
        }
    }

    fn shipper_config(proxy: &FakeProxy) -> ShipperConfig {
        ShipperConfig {
            topic: "logs".to_string(),
            host: "web-01".to_string(),
            rest: Some(rest_config(proxy)),
            ..Default::default()
        }
    }

    fn outcome_channel() -> (
        mpsc::UnboundedSender<Result<(), ShipperError>>,
        mpsc::UnboundedReceiver<Result<(), ShipperError>>,
    ) {
        mpsc::unbounded_channel()
    }

    fn report_to(tx: &mpsc::UnboundedSender<Result<(), ShipperError>>) -> Option<DeliveryCallback> {
        let tx = tx.clone();
        Some(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }))
    }

    /// 连接建立前的记录按到达顺序冲刷
    #[tokio::test]
    async fn test_e2e_queued_records_flush_in_order() {
        let proxy = FakeProxy::routing(&["logs"]).await;
        proxy.set_discovery_delay(Duration::from_millis(200));

        let dispatcher = DispatcherBuilder::new(shipper_config(&proxy)).build().unwrap();
        assert_eq!(
            dispatcher.states(),
            vec![("rest".to_string(), ConnectionState::Connecting)]
        );

        for n in 0..5 {
            dispatcher.dispatch("info", format!("line {n}"), None);
        }
        assert_eq!(dispatcher.pending_len(), 5);

        let produced = proxy.wait_for_produced(5, WAIT).await;
        let lines: Vec<_> = produced.iter().map(|m| m.json()["msg"].clone()).collect();
        assert_eq!(
            lines,
            (0..5).map(|n| json!(format!("line {n}"))).collect::<Vec<_>>()
        );
        assert!(produced.iter().all(|m| m.topic == "logs"));
        assert!(produced.iter().all(|m| m.content_type == ContentType::Binary.mime()));
        assert_eq!(dispatcher.pending_len(), 0);
        assert!(dispatcher.is_ready());

        dispatcher.shutdown().await;
    }

    /// 初始连接失败时清空队列，不发送、不回调
    #[tokio::test]
    async fn test_e2e_failed_connect_purges_queue() {
        let proxy = FakeProxy::routing(&["logs"]).await;
        proxy.set_discovery_delay(Duration::from_millis(100));
        proxy.fail_discovery(true);

        let dispatcher = DispatcherBuilder::new(shipper_config(&proxy)).build().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        for n in 0..3 {
            let calls = Arc::clone(&calls);
            dispatcher.dispatch(
                "info",
                format!("line {n}"),
                Some(Box::new(move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }
        assert_eq!(dispatcher.pending_len(), 3);

        assert!(!dispatcher.wait_ready(WAIT).await);
        assert_eq!(
            dispatcher.states(),
            vec![("rest".to_string(), ConnectionState::Failed)]
        );
        assert_eq!(dispatcher.pending_len(), 0);
        assert_eq!(dispatcher.metrics()[0].1.purged_count, 3);

        sleep(Duration::from_millis(50)).await;
        assert!(proxy.produced().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatcher.shutdown().await;
    }

    /// 初始发现失败后由定时刷新恢复
    #[tokio::test]
    async fn test_e2e_refresh_recovers_failed_lane() {
        let proxy = FakeProxy::routing(&["logs"]).await;
        proxy.fail_discovery(true);

        let mut config = shipper_config(&proxy);
        if let Some(rest) = config.rest.as_mut() {
            rest.refresh_interval_ms = 50;
        }
        let dispatcher = DispatcherBuilder::new(config).build().unwrap();
        assert!(!dispatcher.wait_ready(WAIT).await);
        assert_eq!(
            dispatcher.states(),
            vec![("rest".to_string(), ConnectionState::Failed)]
        );

        proxy.fail_discovery(false);
        tokio::time::timeout(WAIT, async {
            while !dispatcher.is_ready() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            dispatcher.states(),
            vec![("rest".to_string(), ConnectionState::Connected)]
        );

        dispatcher.dispatch_and_wait("info", "back online").await.unwrap();
        assert_eq!(proxy.produced()[0].json()["msg"], "back online");

        dispatcher.shutdown().await;
    }

    /// 禁用谓词：回调异步触发一次，无网络发送
    #[tokio::test]
    async fn test_e2e_disable_predicate() {
        let proxy = FakeProxy::routing(&["logs"]).await;
        let dispatcher = DispatcherBuilder::new(shipper_config(&proxy))
            .with_disable_predicate(Arc::new(|| true))
            .build()
            .unwrap();
        assert!(dispatcher.wait_ready(WAIT).await);

        let (tx, mut rx) = outcome_channel();
        dispatcher.dispatch_with_meta("error", "boom", &json!({ "x": 1 }), report_to(&tx));
        drop(tx);

        assert_eq!(rx.recv().await, Some(Ok(())));
        assert_eq!(rx.recv().await, None);

        dispatcher.shutdown().await;
        assert!(proxy.produced().is_empty());
    }

    /// 无法序列化的 meta 不影响分发
    #[tokio::test]
    async fn test_e2e_unserializable_meta() {
        let proxy = FakeProxy::routing(&["logs"]).await;
        let dispatcher = DispatcherBuilder::new(shipper_config(&proxy)).build().unwrap();
        assert!(dispatcher.wait_ready(WAIT).await);

        let meta = BTreeMap::from([((1u8, 2u8), 3u8)]);
        let (tx, mut rx) = outcome_channel();
        dispatcher.dispatch_with_meta("error", "boom", &meta, report_to(&tx));
        assert_eq!(rx.recv().await, Some(Ok(())));

        let body = proxy.produced()[0].json();
        assert_eq!(body["level"], "error");
        assert_eq!(body["host"], "web-01");
        let msg = body["msg"].as_str().unwrap();
        assert!(msg.starts_with("boom bad meta object of type"), "{msg}");
        assert!(body.get("meta").is_none());

        dispatcher.shutdown().await;
    }

    /// 双通道：一个失败不影响另一个
    #[tokio::test]
    async fn test_e2e_dual_transport_isolation() {
        let proxy = FakeProxy::routing(&["other"]).await;
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&failures);

        let dispatcher = DispatcherBuilder::new(shipper_config(&proxy))
            .with_connected_transport(LogTransport::new("debug"))
            .with_failure_handler(Arc::new(move |e: &ShipperError, _r: &LogRecord| {
                assert!(matches!(e, ShipperError::TopicNotFound { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .unwrap();
        assert!(dispatcher.wait_ready(WAIT).await);

        let outcome = dispatcher.dispatch_and_wait("warn", "disk full").await;
        assert_eq!(outcome, Err(ShipperError::topic_not_found("logs")));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(proxy.produced().is_empty());

        let metrics = dispatcher.metrics();
        assert_eq!(metrics[0].0, "rest");
        assert_eq!(metrics[0].1.failed_count, 1);
        assert_eq!(metrics[1].0, "debug");
        assert_eq!(metrics[1].1.sent_count, 1);

        dispatcher.shutdown().await;
    }

    /// 配置文件 -> 分发器 -> 代理
    #[tokio::test]
    async fn test_e2e_config_file_to_broker() {
        let proxy = FakeProxy::routing(&["billing-logs"]).await;
        let content = format!(
            r#"
topic = "billing-logs"
host = "web-02"

[date_formats]
isodate = "iso"
ts = "jsepoch"

[properties]
service = "billing"

[rest]
proxy_host = "127.0.0.1"
proxy_port = {}
refresh_interval_ms = 0
"#,
            proxy.port()
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipper.toml");
        std::fs::write(&path, content).unwrap();

        let config = config_loader::ConfigLoader::load_from_path(&path).unwrap();
        let dispatcher = DispatcherBuilder::new(config).build().unwrap();
        dispatcher.dispatch_and_wait("info", "invoice sent").await.unwrap();

        let body = proxy.produced()[0].json();
        assert_eq!(body["msg"], "invoice sent");
        assert_eq!(body["host"], "web-02");
        assert_eq!(body["service"], "billing");
        assert!(body["isodate"].as_str().unwrap().ends_with('Z'));
        assert!(body["ts"].as_i64().unwrap() > 1_500_000_000_000);

        dispatcher.shutdown().await;
    }

    /// 刷新后按新路由发送
    #[tokio::test]
    async fn test_e2e_refresh_reroutes_topic() {
        let coordinator = FakeProxy::routing(&["logs"]).await;
        let broker = FakeProxy::start("{}").await;

        let config = RestProxyConfig {
            refresh_interval_ms: 50,
            ..rest_config(&coordinator)
        };
        let cache = BrokerRouteCache::new(&config).unwrap();
        cache.start().await.unwrap();

        let request = ProduceRequest {
            topic: "logs".to_string(),
            payload: "first".into(),
            timestamp: 1,
            content_type: ContentType::Json,
        };
        cache.produce(&request).await.unwrap();
        assert_eq!(coordinator.produced().len(), 1);

        coordinator.set_topics(&json!({ broker.endpoint(): ["logs"] }).to_string());
        let before = cache.discovery_count();
        tokio::time::timeout(WAIT, async {
            while cache.discovery_count() < before + 2 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(cache.resolve("logs"), Some(broker.endpoint()));
        cache.produce(&request).await.unwrap();
        assert_eq!(broker.produced().len(), 1);
        assert_eq!(coordinator.produced().len(), 1);
        assert_eq!(cache.pool_size(), 2);

        cache.close();
    }

    /// 原始行封装
    #[tokio::test]
    async fn test_e2e_log_line_envelope() {
        let proxy = FakeProxy::routing(&["raw"]).await;
        let config = RestProxyConfig {
            add_topic_to_message: true,
            ..rest_config(&proxy)
        };
        let producer = RestProducer::new(&config, "web-03").unwrap();
        producer.connect().await.unwrap();

        producer.log_line("raw", "GET /health 200").await.unwrap();
        let body = proxy.produced()[0].json();
        assert_eq!(body["msg"], "GET /health 200");
        assert_eq!(body["host"], "web-03");
        assert_eq!(body["topic"], "raw");
        assert!(body["ts"].as_f64().unwrap() > 1_500_000_000.0);

        producer.close();
    }
}
