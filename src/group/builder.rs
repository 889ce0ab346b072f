//! Assembles a [`WriterGroup`] from a job snapshot.
//!
//! The builder owns the process-wide pieces (configuration, subscription
//! client, transport) and wires one source, encoder, sink and engine per
//! job:
//!
//! ```ignore
//! let builder = WriterGroupBuilder::new(config, client, transport);
//! let group = builder.build(&job)?;
//! group.start().await?;
//! ```
//!
//! Unsupported messaging mode / encoding combinations are rejected here,
//! before anything is started.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::WriterGroup;
use crate::constants::NOTIFICATION_CHANNEL_CAPACITY;
use crate::create_encoder;
use crate::DataFlowProcessingEngine;
use crate::EncoderSettings;
use crate::EngineSettings;
use crate::MessageEncoder;
use crate::MessageSink;
use crate::MessageSource;
use crate::NetworkMessageSink;
use crate::PublishError;
use crate::PublisherConfig;
use crate::Result;
use crate::SubscriptionClient;
use crate::Transport;
use crate::WriterGroupJobModel;
use crate::WriterGroupMessageSource;

pub struct WriterGroupBuilder {
    config: Arc<PublisherConfig>,
    client: Arc<dyn SubscriptionClient>,
    transport: Arc<dyn Transport>,
}

impl WriterGroupBuilder {
    pub fn new(
        config: Arc<PublisherConfig>,
        client: Arc<dyn SubscriptionClient>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            client,
            transport,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Engine knobs of the job: its own overrides on top of the defaults
    pub fn engine_settings(
        &self,
        job: &WriterGroupJobModel,
    ) -> EngineSettings {
        EngineSettings::resolve(&self.config.engine, job.engine.as_ref())
            .with_export_metrics(self.config.monitoring.prometheus_enabled)
    }

    pub fn encoder_settings(
        &self,
        job: &WriterGroupJobModel,
    ) -> EncoderSettings {
        EncoderSettings {
            publisher_id: self.config.publisher.publisher_id.clone(),
            writer_group_id: job.writer_group.writer_group_id.clone(),
            encoding: job.writer_group.message_type,
            network_message_content_mask: job.writer_group.message_settings.network_message_content_mask,
            enable_routing_info: self.config.engine.enable_routing_info,
            use_standards_compliant_encoding: self.config.engine.use_standards_compliant_encoding,
        }
    }

    /// Build a stopped group; must run inside the tokio runtime since the
    /// sink spawns its worker right away
    pub fn build(
        &self,
        job: &WriterGroupJobModel,
    ) -> Result<WriterGroup> {
        let id = job.writer_group.writer_group_id.clone();
        if id.trim().is_empty() {
            return Err(PublishError::InvalidRequest("writer group id is empty".to_string()).into());
        }
        let encoder: Arc<dyn MessageEncoder> =
            Arc::from(create_encoder(job.messaging_mode, self.encoder_settings(job))?);
        let settings = self.engine_settings(job);

        let (source, notifications) = WriterGroupMessageSource::new(
            job,
            self.client.clone(),
            self.config.retry.subscription,
            Duration::from_secs(self.config.monitoring.counter_reset_interval_secs),
            NOTIFICATION_CHANNEL_CAPACITY,
        );
        let source: Arc<dyn MessageSource> = Arc::new(source);
        let sink: Arc<dyn MessageSink> = Arc::new(NetworkMessageSink::new(
            &id,
            settings.max_outgress_messages,
            self.transport.clone(),
            self.config.retry.transport_send,
        ));

        debug!(
            "[{}] building {:?}/{:?} group with {:?}",
            id, job.messaging_mode, job.writer_group.message_type, settings
        );
        let engine = Arc::new(DataFlowProcessingEngine::new(
            &id,
            settings,
            encoder,
            sink.clone(),
            source.clone(),
        ));
        Ok(WriterGroup::new(job.clone(), source, notifications, engine, sink))
    }
}
