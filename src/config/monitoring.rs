use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Export diagnostics snapshots as prometheus gauges
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    /// Cadence (seconds) at which rolling last-minute trigger counters are zeroed
    #[serde(default = "default_counter_reset_interval_secs")]
    pub counter_reset_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            counter_reset_interval_secs: default_counter_reset_interval_secs(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.counter_reset_interval_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "counter_reset_interval_secs cannot be 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    true
}

fn default_counter_reset_interval_secs() -> u64 {
    60
}
