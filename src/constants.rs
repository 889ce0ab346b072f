use std::time::Duration;

// -
// Encoding

/// Bytes kept free for transport headers when packing batch bodies
pub(crate) const HEADER_RESERVE: usize = 2048;

/// Ceiling used when neither the job nor the transport names one
pub(crate) const DEFAULT_TRANSPORT_MAX_MESSAGE_SIZE: usize = 256 * 1024;

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_BINARY: &str = "application/octet-stream";
pub(crate) const CONTENT_ENCODING_UTF8: &str = "utf-8";

pub(crate) const MESSAGE_SCHEMA_MONITORED_ITEM_JSON: &str = "application/x-monitored-item-json-v1";
pub(crate) const MESSAGE_SCHEMA_MONITORED_ITEM_BINARY: &str = "application/x-monitored-item-uabinary-v1";
pub(crate) const MESSAGE_SCHEMA_NETWORK_MESSAGE_JSON: &str = "application/x-network-message-json-v1";

// -
// Pipeline

/// Capacity of the channel between triggers and the processing engine
pub(crate) const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// How long a stopping subscription waits to hand over the notification
/// it already holds
pub(crate) const IN_FLIGHT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Last-minute counters are kept in one second buckets
pub(crate) const ROLLING_COUNTER_BUCKETS: usize = 60;

// -
// Job scheduling demands

pub(crate) const DEMAND_KEY_TYPE: &str = "Type";
pub(crate) const DEMAND_VALUE_PUBLISHER: &str = "Publisher";
pub(crate) const DEMAND_KEY_SITE_ID: &str = "SiteId";
pub(crate) const DEMAND_KEY_DEVICE_ID: &str = "DeviceId";
