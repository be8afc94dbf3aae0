//! 配置校验模块
//!
//! 校验规则：
//! - topic 非空
//! - 时间字段、属性字段名非空
//! - 时间字段不得覆盖 level / msg / host
//! - REST 代理端口 > 0，主机名非空

use contracts::{ShipperConfig, ShipperError, HOST_FIELD, LEVEL_FIELD, MSG_FIELD};

const RESERVED_FIELDS: [&str; 3] = [HOST_FIELD, LEVEL_FIELD, MSG_FIELD];

/// 校验 ShipperConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ShipperConfig) -> Result<(), ShipperError> {
    validate_topic(config)?;
    validate_date_fields(config)?;
    validate_properties(config)?;
    validate_rest(config)?;
    Ok(())
}

/// 校验 topic
fn validate_topic(config: &ShipperConfig) -> Result<(), ShipperError> {
    if config.topic.trim().is_empty() {
        return Err(ShipperError::config_validation(
            "topic",
            "topic cannot be empty",
        ));
    }
    if config.topic.contains('/') {
        return Err(ShipperError::config_validation(
            "topic",
            format!("topic '{}' cannot contain '/'", config.topic),
        ));
    }
    Ok(())
}

/// 校验时间字段名
fn validate_date_fields(config: &ShipperConfig) -> Result<(), ShipperError> {
    for field in config.date_formats.keys() {
        if field.is_empty() {
            return Err(ShipperError::config_validation(
                "date_formats",
                "date field name cannot be empty",
            ));
        }
        if RESERVED_FIELDS.contains(&field.as_str()) {
            return Err(ShipperError::config_validation(
                format!("date_formats.{field}"),
                format!("'{field}' is a reserved record field"),
            ));
        }
    }
    Ok(())
}

/// 校验静态属性
fn validate_properties(config: &ShipperConfig) -> Result<(), ShipperError> {
    if config.properties.keys().any(String::is_empty) {
        return Err(ShipperError::config_validation(
            "properties",
            "property name cannot be empty",
        ));
    }
    Ok(())
}

/// 校验 REST 代理配置
fn validate_rest(config: &ShipperConfig) -> Result<(), ShipperError> {
    let Some(rest) = &config.rest else {
        return Ok(());
    };

    if rest.proxy_host.trim().is_empty() {
        return Err(ShipperError::config_validation(
            "rest.proxy_host",
            "proxy host cannot be empty",
        ));
    }
    if rest.proxy_port == Some(0) {
        return Err(ShipperError::config_validation(
            "rest.proxy_port",
            "proxy port must be > 0",
        ));
    }
    if rest.request_timeout_ms == 0 {
        return Err(ShipperError::config_validation(
            "rest.request_timeout_ms",
            "request timeout must be > 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DateFormat, RestProxyConfig};
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ShipperConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_topic() {
        let config = ShipperConfig {
            topic: "  ".to_string(),
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("topic cannot be empty"));
    }

    #[test]
    fn test_reserved_date_field() {
        let mut config = ShipperConfig::default();
        config.date_formats.insert("level".to_string(), DateFormat::Epoch);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("date_formats.level"));
    }

    #[test]
    fn test_empty_property_name() {
        let mut config = ShipperConfig::default();
        config.properties.insert(String::new(), json!(1));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_proxy_port() {
        let config = ShipperConfig {
            rest: Some(RestProxyConfig {
                proxy_port: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("rest.proxy_port"));
    }

    #[test]
    fn test_rest_without_port_is_valid() {
        let config = ShipperConfig {
            rest: Some(RestProxyConfig::default()),
            ..Default::default()
        };
        assert!(validate(&config).is_ok());
    }
}
