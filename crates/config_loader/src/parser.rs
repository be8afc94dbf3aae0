//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ShipperConfig, ShipperError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ShipperConfig, ShipperError> {
    toml::from_str(content)
        .map_err(|e| ShipperError::config_parse(format!("TOML parse error: {e}")))
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ShipperConfig, ShipperError> {
    serde_json::from_str(content)
        .map_err(|e| ShipperError::config_parse(format!("JSON parse error: {e}")))
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<ShipperConfig, ShipperError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}
