use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub const BATCH_SIZE_RANGE: (usize, usize) = (2, 1_000);
pub const BATCH_TRIGGER_INTERVAL_RANGE_MS: (u64, u64) = (100, 3_600_000);
pub const MAX_OUTGRESS_MESSAGES_RANGE: (usize, usize) = (2, 25_000);

/// Tuning knobs of the batching & encoding engine.
///
/// These are the process-wide defaults; a job document may carry its own
/// `EngineConfigurationModel` which takes precedence field by field.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Max notifications per batch before a flush is forced
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max wait (ms) after a batch opens before a partial batch is flushed
    #[serde(default = "default_batch_trigger_interval_ms")]
    pub batch_trigger_interval_ms: u64,

    /// Hard byte ceiling per network message; 0 = use transport default
    #[serde(default)]
    pub max_message_size: usize,

    /// Capacity of the sink's outgoing queue
    #[serde(default = "default_max_outgress_messages")]
    pub max_outgress_messages: usize,

    /// Cadence of diagnostics snapshots; 0 disables them
    #[serde(default = "default_diagnostics_interval_secs")]
    pub diagnostics_interval_secs: u64,

    /// Attach the writer group id as routing info to every network message
    #[serde(default)]
    pub enable_routing_info: bool,

    /// Disable compact value encoding (skipping nulls and defaults)
    #[serde(default)]
    pub use_standards_compliant_encoding: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_trigger_interval_ms: default_batch_trigger_interval_ms(),
            max_message_size: 0,
            max_outgress_messages: default_max_outgress_messages(),
            diagnostics_interval_secs: default_diagnostics_interval_secs(),
            enable_routing_info: false,
            use_standards_compliant_encoding: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let (min, max) = BATCH_SIZE_RANGE;
        if self.batch_size < min || self.batch_size > max {
            return Err(Error::Config(ConfigError::Message(format!(
                "batch_size {} must be within [{min}, {max}]",
                self.batch_size
            ))));
        }

        let (min, max) = BATCH_TRIGGER_INTERVAL_RANGE_MS;
        if self.batch_trigger_interval_ms < min || self.batch_trigger_interval_ms > max {
            return Err(Error::Config(ConfigError::Message(format!(
                "batch_trigger_interval_ms {} must be within [{min}, {max}]",
                self.batch_trigger_interval_ms
            ))));
        }

        let (min, max) = MAX_OUTGRESS_MESSAGES_RANGE;
        if self.max_outgress_messages < min || self.max_outgress_messages > max {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_outgress_messages {} must be within [{min}, {max}]",
                self.max_outgress_messages
            ))));
        }

        Ok(())
    }

    pub fn batch_trigger_interval(&self) -> Duration {
        Duration::from_millis(self.batch_trigger_interval_ms)
    }

    pub fn diagnostics_interval(&self) -> Option<Duration> {
        (self.diagnostics_interval_secs > 0).then(|| Duration::from_secs(self.diagnostics_interval_secs))
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_batch_trigger_interval_ms() -> u64 {
    500
}
// Worst case memory for the outgress queue stays in the tens of megabytes
fn default_max_outgress_messages() -> usize {
    4096
}
fn default_diagnostics_interval_secs() -> u64 {
    60
}
