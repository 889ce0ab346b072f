//! Turns notification batches into size-bounded network messages.
//!
//! Two message shapes are produced:
//! - "samples": one flat JSON/binary record per value change
//!   ([`MonitoredItemMessageEncoder`])
//! - "pub-sub": data set messages grouped per writer inside network
//!   messages ([`NetworkMessageEncoder`])
//!
//! Both guarantee no produced body is larger than the size ceiling handed
//! to them; a single notification that cannot fit is dropped and counted.
mod collation;
mod encoder_metrics;
mod monitored_item_encoder;
mod network_message_encoder;
mod packing;
mod wire;

pub use encoder_metrics::*;
pub use monitored_item_encoder::*;
pub use network_message_encoder::*;


#[cfg(test)]
use mockall::automock;

use crate::MessageEncoding;
use crate::MessagingMode;
use crate::NetworkMessageContentMask;
use crate::PublishError;
use crate::Result;
use crate::SubscriptionNotificationModel;

/// Encoder settings resolved from the writer group and publisher identity
#[derive(Debug, Clone, Default)]
pub struct EncoderSettings {
    pub publisher_id: String,
    pub writer_group_id: String,
    pub encoding: MessageEncoding,
    pub network_message_content_mask: NetworkMessageContentMask,
    pub enable_routing_info: bool,
    /// Wrap values with their type instead of the compact bare form
    pub use_standards_compliant_encoding: bool,
}

#[cfg_attr(test, automock)]
pub trait MessageEncoder: Send + Sync + 'static {
    /// One network message per sample or data set message
    fn encode(
        &self,
        notifications: &[SubscriptionNotificationModel],
        max_message_size: usize,
    ) -> Result<Vec<crate::NetworkMessageModel>>;

    /// Pack as many samples or data set messages per network message as
    /// fit into `max_message_size` minus the transport header reserve
    fn encode_batch(
        &self,
        notifications: &[SubscriptionNotificationModel],
        max_message_size: usize,
    ) -> Result<Vec<crate::NetworkMessageModel>>;

    fn metrics(&self) -> EncoderMetricsSnapshot;
}

/// Build the encoder for a messaging mode, rejecting combinations that
/// cannot be produced
pub fn create_encoder(
    mode: MessagingMode,
    settings: EncoderSettings,
) -> Result<Box<dyn MessageEncoder>> {
    if !mode.supports(settings.encoding) {
        return Err(PublishError::UnsupportedEncoding {
            mode: format!("{mode:?}"),
            encoding: format!("{:?}", settings.encoding),
        }
        .into());
    }
    Ok(match mode {
        MessagingMode::Samples => Box::new(MonitoredItemMessageEncoder::new(settings)),
        MessagingMode::PubSub => Box::new(NetworkMessageEncoder::new(settings)),
    })
}

/// Size ceiling for single bodies; 0 means unbounded
pub(crate) fn body_limit(max_message_size: usize) -> usize {
    match max_message_size {
        0 => usize::MAX,
        n => n,
    }
}

/// Size ceiling for packed bodies once the header reserve is taken off.
/// Ceilings too small to give up the reserve are used as they are.
pub(crate) fn batch_body_limit(max_message_size: usize) -> usize {
    let reserve = crate::constants::HEADER_RESERVE;
    match max_message_size {
        0 => usize::MAX,
        n if n > reserve => n - reserve,
        n => n,
    }
}
