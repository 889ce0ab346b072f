use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::MessageEncoding;
use crate::MessagingMode;
use crate::Result;

/// Identity of this publisher and the shape of jobs it synthesizes when
/// the first node of an endpoint is published.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublisherIdentityConfig {
    /// Stamped into network messages; generated when left empty
    #[serde(default)]
    pub publisher_id: String,

    #[serde(default)]
    pub default_messaging_mode: MessagingMode,

    #[serde(default)]
    pub default_message_encoding: MessageEncoding,
}

impl Default for PublisherIdentityConfig {
    fn default() -> Self {
        Self {
            publisher_id: String::new(),
            default_messaging_mode: MessagingMode::default(),
            default_message_encoding: MessageEncoding::default(),
        }
    }
}

impl PublisherIdentityConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.default_messaging_mode.supports(self.default_message_encoding) {
            return Err(Error::Config(ConfigError::Message(format!(
                "default_message_encoding {:?} is not supported with messaging mode {:?}",
                self.default_message_encoding, self.default_messaging_mode
            ))));
        }
        Ok(())
    }

    pub(super) fn ensure_publisher_id(&mut self) {
        if self.publisher_id.trim().is_empty() {
            self.publisher_id = format!("publisher-{}", nanoid::nanoid!(10));
        }
    }
}
