use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::DataFlowProcessingEngine;
use crate::JobDiagnosticInfo;
use crate::MessageSink;
use crate::MessageSource;
use crate::Result;
use crate::SinkHealth;
use crate::SubscriptionNotificationModel;
use crate::SystemError;
use crate::WriterGroupJobModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterGroupState {
    Created,
    Running,
    Stopped,
}

/// Running pipeline of one writer group.
///
/// A group is started once and stopped once; reconfiguration that cannot
/// be applied in place means building a new group.
pub struct WriterGroup {
    id: String,
    job: Mutex<WriterGroupJobModel>,
    source: Arc<dyn MessageSource>,
    engine: Arc<DataFlowProcessingEngine>,
    sink: Arc<dyn MessageSink>,
    notifications: Mutex<Option<mpsc::Receiver<SubscriptionNotificationModel>>>,
    source_ct: CancellationToken,
    engine_ct: CancellationToken,
    engine_task: tokio::sync::Mutex<Option<JoinHandle<Result<()>>>>,
    state: Mutex<WriterGroupState>,
}

impl WriterGroup {
    pub fn new(
        job: WriterGroupJobModel,
        source: Arc<dyn MessageSource>,
        notifications: mpsc::Receiver<SubscriptionNotificationModel>,
        engine: Arc<DataFlowProcessingEngine>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            id: job.writer_group.writer_group_id.clone(),
            job: Mutex::new(job),
            source,
            engine,
            sink,
            notifications: Mutex::new(Some(notifications)),
            source_ct: CancellationToken::new(),
            engine_ct: CancellationToken::new(),
            engine_task: tokio::sync::Mutex::new(None),
            state: Mutex::new(WriterGroupState::Created),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job(&self) -> WriterGroupJobModel {
        self.job.lock().clone()
    }

    pub fn state(&self) -> WriterGroupState {
        *self.state.lock()
    }

    pub fn engine(&self) -> &DataFlowProcessingEngine {
        &self.engine
    }

    pub fn diagnostic_info(&self) -> JobDiagnosticInfo {
        self.engine.diagnostic_info()
    }

    pub fn sink_health(&self) -> watch::Receiver<SinkHealth> {
        self.sink.health()
    }

    /// Start the triggers and the batching loop
    pub async fn start(&self) -> Result<()> {
        let notifications = {
            let mut state = self.state.lock();
            if *state != WriterGroupState::Created {
                return Err(SystemError::GroupStartFailed(format!("{} is {:?}", self.id, *state)).into());
            }
            let Some(notifications) = self.notifications.lock().take() else {
                return Err(SystemError::GroupStartFailed(format!("{} has no notification stream", self.id)).into());
            };
            *state = WriterGroupState::Running;
            notifications
        };

        let engine = self.engine.clone();
        let engine_ct = self.engine_ct.clone();
        *self.engine_task.lock().await = Some(tokio::spawn(async move { engine.run(notifications, engine_ct).await }));

        if let Err(e) = self.source.start(self.source_ct.clone()).await {
            error!("[{}] source failed to start: {:?}", self.id, e);
            self.stop().await;
            return Err(e);
        }
        info!("[{}] writer group started", self.id);
        Ok(())
    }

    /// Apply a job whose writers changed; the triggers are diff-updated
    pub async fn update(
        &self,
        job: &WriterGroupJobModel,
    ) -> Result<()> {
        if self.state() == WriterGroupState::Stopped {
            return Err(SystemError::GroupStartFailed(format!("{} is stopped", self.id)).into());
        }
        self.source.update(job).await?;
        *self.job.lock() = job.clone();
        debug!(
            "[{}] writer group updated to {} writers",
            self.id,
            job.writer_group.data_set_writers.len()
        );
        Ok(())
    }

    /// Stop the source, flush the open batch, then close the sink
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == WriterGroupState::Stopped {
                return;
            }
            *state = WriterGroupState::Stopped;
        }

        self.source_ct.cancel();
        self.source.stop().await;

        self.engine_ct.cancel();
        if let Some(task) = self.engine_task.lock().await.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{}] engine ended with error: {:?}", self.id, e),
                Err(e) => error!("[{}] engine task failed: {:?}", self.id, e),
            }
        }

        self.sink.close().await;
        crate::metrics::remove_group(&self.id);
        info!("[{}] writer group stopped", self.id);
    }
}
