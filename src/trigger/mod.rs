//! Per-connection adapters turning field device subscriptions into a stream
//! of `SubscriptionNotificationModel`s.
//!
//! A trigger owns one subscription per data set writer on its connection,
//! re-subscribes with capped backoff whenever the session drops and keeps
//! the connection health counters reported in diagnostics.
mod counters;
mod subscription;
mod writer_group_trigger;

pub use counters::*;
pub use subscription::*;
pub use writer_group_trigger::*;

#[cfg(test)]
mod writer_group_trigger_test;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::DataSetWriterModel;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageTrigger: Send + Sync + 'static {
    fn id(&self) -> String;

    /// Writers the trigger currently subscribes, in job order
    fn writers(&self) -> Arc<Vec<DataSetWriterModel>>;

    /// Establish one subscription per writer and begin emitting notifications.
    ///
    /// Fails if any initial subscription cannot be created; subscriptions
    /// created before the failure are torn down again.
    async fn start(
        &self,
        ct: CancellationToken,
    ) -> Result<()>;

    /// Swap the writer set without tearing down unaffected subscriptions
    async fn reconfigure(
        &self,
        writers: Vec<DataSetWriterModel>,
    ) -> Result<()>;

    async fn stop(&self);

    fn counters(&self) -> TriggerCountersSnapshot;

    /// Zero the last-minute counters
    fn reset_counters(&self);
}
