use std::time::Duration;

use crate::EngineConfig;
use crate::EngineConfigurationModel;

/// Engine knobs of one writer group: job overrides on top of the
/// process-wide defaults
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub batch_trigger_interval: Duration,
    /// 0 leaves the ceiling to the sink
    pub max_message_size: usize,
    pub max_outgress_messages: usize,
    pub diagnostics_interval: Option<Duration>,
    /// Export diagnostics snapshots as prometheus gauges
    pub export_metrics: bool,
}

impl EngineSettings {
    pub fn resolve(
        defaults: &EngineConfig,
        job: Option<&EngineConfigurationModel>,
    ) -> Self {
        let job = job.cloned().unwrap_or_default();
        Self {
            batch_size: job.batch_size.unwrap_or(defaults.batch_size).max(1),
            batch_trigger_interval: job
                .batch_trigger_interval
                .unwrap_or_else(|| defaults.batch_trigger_interval()),
            max_message_size: job.max_message_size.unwrap_or(defaults.max_message_size),
            max_outgress_messages: job
                .max_outgress_messages
                .unwrap_or(defaults.max_outgress_messages)
                .max(1),
            diagnostics_interval: match job.diagnostics_interval {
                Some(interval) => (!interval.is_zero()).then_some(interval),
                None => defaults.diagnostics_interval(),
            },
            export_metrics: false,
        }
    }

    pub fn with_export_metrics(
        mut self,
        enabled: bool,
    ) -> Self {
        self.export_metrics = enabled;
        self
    }

    /// Ceiling handed to the encoder: the configured size bounded by what
    /// the sink accepts
    pub fn effective_max_message_size(
        &self,
        sink_max_message_size: usize,
    ) -> usize {
        match (self.max_message_size, sink_max_message_size) {
            (0, sink) => sink,
            (configured, 0) => configured,
            (configured, sink) => configured.min(sink),
        }
    }
}
