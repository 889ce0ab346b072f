//! Aggregates the triggers of one writer group into a single notification
//! stream with one start/update/stop lifecycle.
mod writer_group_source;

pub use writer_group_source::*;


use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::TriggerCountersSnapshot;
use crate::WriterGroupJobModel;

#[async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// Start all triggers. Returns without waiting for subscriptions;
    /// triggers that fail to start are retried in the background.
    async fn start(
        &self,
        ct: CancellationToken,
    ) -> Result<()>;

    /// Diff-apply a new job against the running triggers
    async fn update(
        &self,
        job: &WriterGroupJobModel,
    ) -> Result<()>;

    async fn stop(&self);

    /// Ticks each time the last-minute counters were zeroed
    fn counter_reset(&self) -> watch::Receiver<u64>;

    /// Counters per trigger id
    fn counters(&self) -> Vec<(String, TriggerCountersSnapshot)>;
}
