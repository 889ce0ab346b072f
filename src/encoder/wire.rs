//! Serialized shapes of monitored item samples and data set messages.
//!
//! JSON bodies are built as `serde_json::Value`s so content masks decide
//! field presence; binary bodies are plain bincode of the sample struct.
use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::DataSetFieldContentMask;
use crate::DataValue;
use crate::MessageType;
use crate::Variant;
use crate::STATUS_GOOD;

/// One flat sample as published in "samples" messaging mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MonitoredItemMessage {
    pub(crate) node_id: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) endpoint_url: Option<String>,
    pub(crate) application_uri: Option<String>,
    pub(crate) data_set_writer_id: Option<String>,
    pub(crate) value: DataValue,
    pub(crate) timestamp: Option<DateTime<Utc>>,
    pub(crate) sequence_number: Option<u32>,
    pub(crate) extension_fields: Option<BTreeMap<String, String>>,
}

impl MonitoredItemMessage {
    pub(crate) fn to_json(
        &self,
        compact: bool,
    ) -> Value {
        let mut map = Map::new();
        insert_opt(&mut map, "NodeId", self.node_id.as_ref().map(|v| Value::from(v.as_str())));
        insert_opt(
            &mut map,
            "DisplayName",
            self.display_name.as_ref().map(|v| Value::from(v.as_str())),
        );
        insert_opt(
            &mut map,
            "EndpointUrl",
            self.endpoint_url.as_ref().map(|v| Value::from(v.as_str())),
        );
        insert_opt(
            &mut map,
            "ApplicationUri",
            self.application_uri.as_ref().map(|v| Value::from(v.as_str())),
        );
        insert_opt(
            &mut map,
            "DataSetWriterId",
            self.data_set_writer_id.as_ref().map(|v| Value::from(v.as_str())),
        );
        map.insert("Value".to_string(), data_value_json(&self.value, compact));
        insert_opt(&mut map, "Timestamp", self.timestamp.as_ref().map(timestamp_json));
        insert_opt(&mut map, "SequenceNumber", self.sequence_number.map(Value::from));
        insert_opt(
            &mut map,
            "ExtensionFields",
            self.extension_fields
                .as_ref()
                .filter(|f| !f.is_empty())
                .map(|f| Value::Object(f.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))).collect())),
        );
        Value::Object(map)
    }
}

fn insert_opt(
    map: &mut Map<String, Value>,
    key: &str,
    value: Option<Value>,
) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

pub(crate) fn timestamp_json(ts: &DateTime<Utc>) -> Value {
    Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Drop the parts of a value the field content mask excludes
pub(crate) fn apply_field_mask(
    value: &DataValue,
    mask: crate::DataSetFieldContentMask,
) -> DataValue {
    if mask.contains(DataSetFieldContentMask::RAW_DATA) {
        return DataValue::new(value.value.clone());
    }
    DataValue {
        value: value.value.clone(),
        status_code: if mask.contains(DataSetFieldContentMask::STATUS_CODE) {
            value.status_code
        } else {
            STATUS_GOOD
        },
        source_timestamp: value
            .source_timestamp
            .filter(|_| mask.contains(DataSetFieldContentMask::SOURCE_TIMESTAMP)),
        server_timestamp: value
            .server_timestamp
            .filter(|_| mask.contains(DataSetFieldContentMask::SERVER_TIMESTAMP)),
    }
}

/// Value with its status and timestamps; good status is left out
pub(crate) fn data_value_json(
    value: &DataValue,
    compact: bool,
) -> Value {
    let mut map = Map::new();
    map.insert("Value".to_string(), variant_json(&value.value, compact));
    if value.status_code != STATUS_GOOD {
        map.insert("StatusCode".to_string(), Value::from(value.status_code));
    }
    insert_opt(&mut map, "SourceTimestamp", value.source_timestamp.as_ref().map(timestamp_json));
    insert_opt(&mut map, "ServerTimestamp", value.server_timestamp.as_ref().map(timestamp_json));
    Value::Object(map)
}

/// Compact form writes the bare JSON value, otherwise the value is wrapped
/// with its type name so it can be decoded without schema.
pub(crate) fn variant_json(
    variant: &Variant,
    compact: bool,
) -> Value {
    let body = match variant {
        Variant::Null => Value::Null,
        Variant::Boolean(v) => Value::from(*v),
        Variant::Int64(v) => Value::from(*v),
        Variant::UInt64(v) => Value::from(*v),
        Variant::Double(v) => serde_json::Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
        Variant::String(v) => Value::from(v.as_str()),
        Variant::ByteString(v) => Value::from(v.iter().map(|b| format!("{b:02x}")).collect::<String>()),
        Variant::DateTime(v) => timestamp_json(v),
        Variant::Array(items) => Value::Array(items.iter().map(|i| variant_json(i, compact)).collect()),
        Variant::Map(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), variant_json(v, compact)))
                .collect(),
        ),
    };
    if compact {
        return body;
    }
    let mut map = Map::new();
    map.insert("Type".to_string(), Value::from(variant_type_name(variant)));
    map.insert("Body".to_string(), body);
    Value::Object(map)
}

fn variant_type_name(variant: &Variant) -> &'static str {
    match variant {
        Variant::Null => "Null",
        Variant::Boolean(_) => "Boolean",
        Variant::Int64(_) => "Int64",
        Variant::UInt64(_) => "UInt64",
        Variant::Double(_) => "Double",
        Variant::String(_) => "String",
        Variant::ByteString(_) => "ByteString",
        Variant::DateTime(_) => "DateTime",
        Variant::Array(_) => "Array",
        Variant::Map(_) => "Map",
    }
}

pub(crate) fn message_type_name(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::KeyFrame => "ua-keyframe",
        MessageType::DeltaFrame => "ua-deltaframe",
        MessageType::Event => "ua-event",
        MessageType::KeepAlive => "ua-keepalive",
    }
}

/// Join pre-encoded JSON documents into one array body
pub(crate) fn json_array(items: &[Vec<u8>]) -> Vec<u8> {
    let len = json_array_size(items.iter().map(|i| i.len()));
    let mut body = Vec::with_capacity(len);
    body.push(b'[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            body.push(b',');
        }
        body.extend_from_slice(item);
    }
    body.push(b']');
    body
}

/// Exact length of `json_array` over items of the given lengths
pub(crate) fn json_array_size(lengths: impl Iterator<Item = usize>) -> usize {
    let (count, sum) = lengths.fold((0usize, 0usize), |(c, s), l| (c + 1, s + l));
    2 + sum + count.saturating_sub(1)
}
