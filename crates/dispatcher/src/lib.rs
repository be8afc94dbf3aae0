//! # Dispatcher
//!
//! 日志分发模块。
//!
//! 负责：
//! - 由 `LogRecordBuilder` 组装记录
//! - 每个传输通道维护连接状态与等待队列
//! - 连接建立前排队，连接成功后按序冲刷，失败则清空
//! - Fan-out 到所有传输通道，单个通道失败不影响其他通道

pub mod completion;
mod depth_guard;
pub mod dispatcher;
pub mod lane;
pub mod metrics;
pub mod pending;
pub mod prober;
pub mod record_builder;
pub mod transports;

#[cfg(test)]
mod test_support;

pub use contracts::{LogSink, Transport};
pub use dispatcher::{DispatcherBuilder, MessageDispatcher};
pub use lane::{ConnectionState, LaneContext, LaneStart, TransportLane};
pub use metrics::{LaneMetrics, MetricsSnapshot};
pub use pending::{PendingEntry, PendingQueue};
pub use prober::{BreakerState, CircuitBreakerProber};
pub use record_builder::LogRecordBuilder;
pub use transports::{LogTransport, RestTransport, REST_TRANSPORT};
