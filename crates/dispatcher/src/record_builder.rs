//! LogRecordBuilder - assembles outgoing records from the shipper template

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use contracts::{
    DateFormat, Fields, LogRecord, Message, ShipperConfig, ShipperError, HOST_FIELD, LEVEL_FIELD,
    META_FIELD, MSG_FIELD,
};

use crate::depth_guard::{DepthGuard, MAX_META_DEPTH};

/// Builds records as `host, level, msg, <date fields>, <properties>[, meta]`
#[derive(Debug, Clone)]
pub struct LogRecordBuilder {
    template: Fields,
    date_fields: Vec<(String, DateFormat)>,
}

impl LogRecordBuilder {
    pub fn new(config: &ShipperConfig) -> Self {
        let mut template = Fields::new();
        template.insert(HOST_FIELD.to_string(), Value::String(config.host.clone()));
        template.insert(LEVEL_FIELD.to_string(), Value::Null);
        template.insert(MSG_FIELD.to_string(), Value::Null);
        for field in config.date_formats.keys() {
            template.insert(field.clone(), Value::Null);
        }
        for (key, value) in &config.properties {
            template.insert(key.clone(), value.clone());
        }

        let date_fields = config
            .date_formats
            .iter()
            .map(|(field, format)| (field.clone(), *format))
            .collect();

        Self {
            template,
            date_fields,
        }
    }

    /// Record stamped with the current time
    pub fn build(&self, level: &str, message: &Message) -> LogRecord {
        self.build_at(level, message, None::<&Value>, Utc::now())
    }

    /// Record carrying serialized metadata under `meta`
    pub fn build_with_meta<M>(&self, level: &str, message: &Message, meta: &M) -> LogRecord
    where
        M: Serialize + ?Sized,
    {
        self.build_at(level, message, Some(meta), Utc::now())
    }

    /// Record stamped with `now`
    ///
    /// Metadata that fails to serialize, or nests deeper than
    /// [`MAX_META_DEPTH`] (cycles included), degrades `msg` to a text
    /// description of the failure; the build itself never fails.
    pub fn build_at<M>(
        &self,
        level: &str,
        message: &Message,
        meta: Option<&M>,
        now: DateTime<Utc>,
    ) -> LogRecord
    where
        M: Serialize + ?Sized,
    {
        let mut fields = self.template.clone();
        for (field, format) in &self.date_fields {
            fields.insert(field.clone(), format_date(*format, now));
        }

        let mut msg = message.to_value();
        let encoded = meta.map(|m| serde_json::to_value(DepthGuard::new(m, MAX_META_DEPTH)));
        match encoded.transpose() {
            Ok(None) | Ok(Some(Value::Null)) => {}
            Ok(Some(Value::Object(map))) if map.is_empty() => {}
            Ok(Some(value)) => {
                fields.insert(META_FIELD.to_string(), value);
            }
            Err(e) => {
                let error = ShipperError::from(e);
                warn!(level, error = %error, "Metadata could not be serialized");
                msg = Value::String(format!(
                    "{} bad meta object of type {} {}",
                    message.to_text(),
                    short_type_name::<M>(),
                    error
                ));
            }
        }

        LogRecord::new(level, msg, fields)
    }
}

fn format_date(format: DateFormat, now: DateTime<Utc>) -> Value {
    match format {
        DateFormat::Iso => Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        DateFormat::Epoch => Value::from(now.timestamp()),
        DateFormat::JsEpoch => Value::from(now.timestamp_millis()),
        DateFormat::PyEpoch => Value::from(now.timestamp_millis() as f64 / 1000.0),
    }
}

/// `alloc::collections::BTreeMap<(u8, u8), u8>` -> `BTreeMap<(u8, u8), u8>`
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn config() -> ShipperConfig {
        let mut config = ShipperConfig {
            host: "box".to_string(),
            ..Default::default()
        };
        config.date_formats = BTreeMap::from([
            ("isodate".to_string(), DateFormat::Iso),
            ("epoch".to_string(), DateFormat::Epoch),
            ("jsepoch".to_string(), DateFormat::JsEpoch),
            ("ts".to_string(), DateFormat::PyEpoch),
        ]);
        config.properties.insert("service".to_string(), json!("billing"));
        config
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_500_000_000_250).unwrap()
    }

    #[test]
    fn test_date_fields() {
        let builder = LogRecordBuilder::new(&config());
        let record = builder.build_at("info", &Message::from("hi"), None::<&Value>, now());

        assert_eq!(record.get("isodate"), Some(&json!("2017-07-14T02:40:00.250Z")));
        assert_eq!(record.get("epoch"), Some(&json!(1_500_000_000_i64)));
        assert_eq!(record.get("jsepoch"), Some(&json!(1_500_000_000_250_i64)));
        assert_eq!(record.get("ts"), Some(&json!(1_500_000_000.25)));
    }

    #[test]
    fn test_template_order_and_properties() {
        let builder = LogRecordBuilder::new(&config());
        let record = builder.build_at("warn", &Message::from("hi"), None::<&Value>, now());

        let keys: Vec<&str> = record.fields().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["host", "level", "msg", "epoch", "isodate", "jsepoch", "ts", "service"]
        );
        assert_eq!(record.level(), "warn");
        assert_eq!(record.get("host"), Some(&json!("box")));
        assert_eq!(record.get("service"), Some(&json!("billing")));
    }

    #[test]
    fn test_structured_message_and_meta() {
        let builder = LogRecordBuilder::new(&ShipperConfig::default());
        let record = builder.build_with_meta(
            "error",
            &Message::from(json!({ "code": 7 })),
            &json!({ "x": 1 }),
        );

        assert_eq!(record.msg(), &json!({ "code": 7 }));
        assert_eq!(record.get(META_FIELD), Some(&json!({ "x": 1 })));
    }

    #[test]
    fn test_empty_meta_is_skipped() {
        let builder = LogRecordBuilder::new(&ShipperConfig::default());
        let empty: BTreeMap<String, u8> = BTreeMap::new();
        let record = builder.build_with_meta("info", &Message::from("hi"), &empty);
        assert!(record.get(META_FIELD).is_none());
    }

    #[test]
    fn test_unserializable_meta_degrades_msg() {
        let builder = LogRecordBuilder::new(&ShipperConfig::default());
        // Non-string map keys cannot become a JSON object
        let meta = BTreeMap::from([((1u8, 2u8), 3u8)]);
        let record = builder.build_with_meta("error", &Message::from("boom"), &meta);

        assert_eq!(record.level(), "error");
        assert!(record.get(META_FIELD).is_none());
        let msg = record.msg().as_str().unwrap();
        assert!(msg.starts_with("boom bad meta object of type BTreeMap"), "{msg}");
    }

    #[derive(serde::Serialize, Clone)]
    struct Node(Rc<RefCell<Option<Node>>>);

    #[test]
    fn test_self_referential_meta_degrades_msg() {
        let node = Node(Rc::new(RefCell::new(None)));
        *node.0.borrow_mut() = Some(node.clone());

        let builder = LogRecordBuilder::new(&ShipperConfig::default());
        let record = builder.build_with_meta("error", &Message::from("boom"), &node);
        node.0.borrow_mut().take();

        assert_eq!(record.level(), "error");
        assert!(record.get(META_FIELD).is_none());
        let msg = record.msg().as_str().unwrap();
        assert!(msg.starts_with("boom bad meta object of type Node"), "{msg}");
        assert!(msg.contains("nesting deeper than 64"), "{msg}");
    }

    #[test]
    fn test_deep_but_finite_meta_is_kept() {
        let mut meta = json!("leaf");
        for _ in 0..MAX_META_DEPTH {
            meta = json!([meta]);
        }
        let builder = LogRecordBuilder::new(&ShipperConfig::default());
        let record = builder.build_with_meta("info", &Message::from("deep"), &meta);
        assert_eq!(record.get(META_FIELD), Some(&meta));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<u8>(), "u8");
        assert!(short_type_name::<BTreeMap<(u8, u8), u8>>().starts_with("BTreeMap<"));
    }
}
