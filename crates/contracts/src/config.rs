//! ShipperConfig - Config Loader 输出
//!
//! 描述完整的发送端配置：topic、记录模板、时间字段、REST 代理。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// 时间字段格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    /// ISO-8601 字符串 (毫秒精度, UTC)
    #[default]
    Iso,
    /// 整秒 epoch
    Epoch,
    /// 毫秒 epoch
    JsEpoch,
    /// 小数秒 epoch
    PyEpoch,
}

/// 完整的发送端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperConfig {
    /// 目标 topic
    #[serde(default = "default_topic")]
    pub topic: String,

    /// 写入每条记录的主机名
    #[serde(default = "default_host")]
    pub host: String,

    /// 连接建立宽限期 (毫秒)，期间记录进入等待队列
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// 时间字段: 字段名 -> 格式
    #[serde(default = "default_date_formats")]
    pub date_formats: BTreeMap<String, DateFormat>,

    /// 合并到每条记录的静态属性
    #[serde(default)]
    pub properties: Map<String, Value>,

    /// REST 代理配置 (可选)
    #[serde(default)]
    pub rest: Option<RestProxyConfig>,
}

impl ShipperConfig {
    /// 宽限期
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            host: default_host(),
            grace_period_ms: default_grace_period_ms(),
            date_formats: default_date_formats(),
            properties: Map::new(),
            rest: None,
        }
    }
}

fn default_topic() -> String {
    "unknown".to_string()
}

fn default_host() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_date_formats() -> BTreeMap<String, DateFormat> {
    BTreeMap::from([("isodate".to_string(), DateFormat::Iso)])
}

/// REST 代理配置
///
/// `proxy_port` 缺失时 REST 通道禁用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestProxyConfig {
    /// 协调节点地址
    #[serde(default = "default_proxy_host")]
    pub proxy_host: String,

    /// 协调节点端口
    #[serde(default)]
    pub proxy_port: Option<u16>,

    /// topic 映射刷新间隔 (毫秒, 0 = 不刷新)
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// 在 log_line 信封中附带 topic
    #[serde(default)]
    pub add_topic_to_message: bool,

    /// 单次 HTTP 请求超时 (毫秒)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// 发现进行中时 produce 的最大重试次数 (间隔 100ms)
    #[serde(default = "default_max_discovery_retries")]
    pub max_discovery_retries: u32,
}

impl RestProxyConfig {
    /// 协调节点 `host:port`，未配置端口时为 None
    pub fn coordinator(&self) -> Option<String> {
        self.proxy_port
            .map(|port| format!("{}:{}", self.proxy_host, port))
    }

    /// 刷新间隔，0 表示禁用
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_ms > 0).then(|| Duration::from_millis(self.refresh_interval_ms))
    }

    /// 请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RestProxyConfig {
    fn default() -> Self {
        Self {
            proxy_host: default_proxy_host(),
            proxy_port: None,
            refresh_interval_ms: default_refresh_interval_ms(),
            add_topic_to_message: false,
            request_timeout_ms: default_request_timeout_ms(),
            max_discovery_retries: default_max_discovery_retries(),
        }
    }
}

fn default_proxy_host() -> String {
    "localhost".to_string()
}

fn default_refresh_interval_ms() -> u64 {
    30 * 60 * 1000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_discovery_retries() -> u32 {
    50
}
