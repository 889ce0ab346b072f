use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn is_unlimited(&self) -> bool {
        self.max_retries == 0
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.base_delay_ms must be > 0"
            ))));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.max_delay_ms {} must not be below base_delay_ms {}",
                self.max_delay_ms, self.base_delay_ms
            ))));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.timeout_ms must be > 0"
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by pipeline concern
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Field device (re)subscription: never gives up, capped backoff
    #[serde(default = "default_subscription_policy")]
    pub subscription: BackoffPolicy,

    // Transport send from the sink
    #[serde(default = "default_transport_send_policy")]
    pub transport_send: BackoffPolicy,

    // Optimistic concurrency conflicts on the job document store
    #[serde(default = "default_job_store_policy")]
    pub job_store: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            subscription: default_subscription_policy(),
            transport_send: default_transport_send_policy(),
            job_store: default_job_store_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.subscription.validate("subscription")?;
        self.transport_send.validate("transport_send")?;
        self.job_store.validate("job_store")?;

        if self.job_store.is_unlimited() {
            return Err(Error::Config(ConfigError::Message(
                "retry.job_store.max_retries must be bounded (> 0)".into(),
            )));
        }
        Ok(())
    }
}

fn default_subscription_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 15_000,
        base_delay_ms: 1_000,
        max_delay_ms: 60_000,
    }
}
fn default_transport_send_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        timeout_ms: 10_000,
        base_delay_ms: 200,
        max_delay_ms: 10_000,
    }
}
fn default_job_store_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 20,
        timeout_ms: 5_000,
        base_delay_ms: 10,
        max_delay_ms: 1_000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
