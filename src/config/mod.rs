//! Publisher settings.
//!
//! Values are layered from code defaults, an optional file and `PUBLISHER__`
//! environment variables, then checked once by [`PublisherConfig::validate`].
//! The result is shared as an immutable `Arc<PublisherConfig>`; nothing below
//! this module reads the process environment.
mod engine;
mod monitoring;
mod publisher;
mod retry;
pub use engine::*;
pub use monitoring::*;
pub use publisher::*;
pub use retry::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides, e.g. `PUBLISHER__ENGINE__BATCH_SIZE=100`
pub(crate) const ENV_PREFIX: &str = "PUBLISHER";

/// Engine, retry, monitoring and identity settings of one publisher process
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct PublisherConfig {
    /// Batching, size bound and outgress tuning of the processing engine
    #[serde(default)]
    pub engine: EngineConfig,
    /// Retry policies for subscriptions, transport sends and job updates
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Diagnostics and metrics settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Publisher identity and default job shape
    #[serde(default)]
    pub publisher: PublisherIdentityConfig,
}

impl Debug for PublisherConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("engine", &self.engine)
            .field("publisher", &self.publisher)
            .finish()
    }
}

impl PublisherConfig {
    /// Defaults, then the file named by `CONFIG_PATH` (when set), then
    /// `PUBLISHER__*` variables. The result is unchecked until `validate()`.
    ///
    /// ```ignore
    /// std::env::set_var("PUBLISHER__ENGINE__BATCH_SIZE", "100");
    /// let cfg = PublisherConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(Self::environment());

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Layer `path` over the current values; environment variables still win
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        Ok(Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?)
    }

    /// Check every section and fill in a generated publisher id when none is set
    pub fn validate(mut self) -> Result<Self> {
        self.engine.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        self.publisher.validate()?;
        self.publisher.ensure_publisher_id();
        Ok(self)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .ignore_empty(true)
            .try_parsing(true)
    }
}
