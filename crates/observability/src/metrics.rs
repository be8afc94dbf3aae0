//! 发送端指标收集模块
//!
//! 记录分发、排队、发送与 topic 发现的运行指标。

use metrics::{counter, gauge, histogram};
use std::collections::BTreeMap;

/// 单条记录进入分发器后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 交给至少一个传输通道
    Accepted,
    /// 禁用谓词生效，未发送
    Disabled,
    /// 没有配置任何传输通道
    NoTransport,
}

impl DispatchOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Disabled => "disabled",
            Self::NoTransport => "no_transport",
        }
    }
}

/// 记录一次 dispatch 调用
pub fn record_dispatch(outcome: DispatchOutcome) {
    counter!(
        "log_shipper_records_dispatched_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// 记录等待队列深度
pub fn record_pending_depth(transport: &str, depth: usize) {
    gauge!(
        "log_shipper_pending_depth",
        "transport" => transport.to_string()
    )
    .set(depth as f64);
}

/// 记录连接成功后冲刷的队列条数
pub fn record_queue_flushed(transport: &str, count: usize) {
    counter!(
        "log_shipper_queue_flushed_total",
        "transport" => transport.to_string()
    )
    .increment(count as u64);
}

/// 记录连接失败后丢弃的队列条数
pub fn record_queue_purged(transport: &str, count: usize) {
    counter!(
        "log_shipper_queue_purged_total",
        "transport" => transport.to_string()
    )
    .increment(count as u64);
}

/// 记录单次发送结果
pub fn record_send(transport: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "log_shipper_sends_total",
        "transport" => transport.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录发送耗时
pub fn record_send_latency_ms(transport: &str, latency_ms: f64) {
    histogram!(
        "log_shipper_send_latency_ms",
        "transport" => transport.to_string()
    )
    .record(latency_ms);
}

/// 记录健康探测拒绝的发送
pub fn record_probe_rejected(transport: &str) {
    counter!(
        "log_shipper_probe_rejected_total",
        "transport" => transport.to_string()
    )
    .increment(1);
}

/// 记录一次 topic 发现
pub fn record_discovery(success: bool, topics: usize) {
    let status = if success { "success" } else { "failure" };
    counter!("log_shipper_discovery_total", "status" => status).increment(1);
    if success {
        gauge!("log_shipper_routed_topics").set(topics as f64);
    }
}

/// 投递结果聚合器
///
/// 在内存中按传输通道汇总结果，便于命令行输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// 成功条数
    pub delivered: u64,
    /// 失败条数
    pub failed: u64,
    /// 各错误消息出现次数
    pub errors: BTreeMap<String, u64>,
}

impl DeliveryAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条投递结果
    pub fn update<E: std::fmt::Display>(&mut self, outcome: &Result<(), E>) {
        match outcome {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                self.failed += 1;
                *self.errors.entry(e.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// 生成摘要
    pub fn summary(&self) -> DeliverySummary {
        let total = self.delivered + self.failed;
        DeliverySummary {
            total,
            delivered: self.delivered,
            failed: self.failed,
            failure_rate: if total > 0 {
                self.failed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            errors: self.errors.clone(),
        }
    }
}

/// 投递摘要
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub total: u64,
    pub delivered: u64,
    pub failed: u64,
    pub failure_rate: f64,
    pub errors: BTreeMap<String, u64>,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Records: {}", self.total)?;
        writeln!(f, "Delivered: {}", self.delivered)?;
        writeln!(f, "Failed: {} ({:.2}%)", self.failed, self.failure_rate)?;

        if !self.errors.is_empty() {
            writeln!(f, "Errors:")?;
            for (error, count) in &self.errors {
                writeln!(f, "  {}: {}", error, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls must be no-ops
        record_dispatch(DispatchOutcome::Accepted);
        record_send("rest", false);
        record_discovery(true, 8);
        record_pending_depth("rest", 3);
    }

    #[test]
    fn test_aggregator_summary() {
        let mut agg = DeliveryAggregator::new();
        agg.update::<String>(&Ok(()));
        agg.update::<String>(&Ok(()));
        agg.update(&Err("topic not found: a".to_string()));
        agg.update(&Err("topic not found: a".to_string()));

        let summary = agg.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.failed, 2);
        assert!((summary.failure_rate - 50.0).abs() < 1e-9);
        assert_eq!(summary.errors["topic not found: a"], 2);
        assert!(summary.to_string().contains("Failed: 2 (50.00%)"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = DeliveryAggregator::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.failure_rate, 0.0);
    }
}
