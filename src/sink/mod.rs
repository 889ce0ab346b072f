//! Outgoing side of a writer group: a bounded queue in front of the transport.
mod network_message_sink;

pub use network_message_sink::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::NetworkMessageModel;
use crate::Result;

/// Concrete transport capability (device-to-cloud client, broker, ...)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Largest body the transport accepts; 0 when it does not say
    fn max_message_size(&self) -> usize;

    async fn send(
        &self,
        message: &NetworkMessageModel,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkHealth {
    Healthy,
    /// The last send cycle exhausted its retries
    Unhealthy,
}

#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    /// Ceiling the encoder must respect
    fn max_message_size(&self) -> usize;

    /// Enqueue messages; waits while the outgoing queue is full.
    ///
    /// Cancelling `ct` ends the wait with `NetworkError::SendAbandoned` and
    /// the messages not yet queued are dropped.
    async fn send(
        &self,
        messages: Vec<NetworkMessageModel>,
        ct: &CancellationToken,
    ) -> Result<()>;

    fn sent_messages_count(&self) -> u64;

    fn queued_messages(&self) -> usize;

    fn capacity(&self) -> usize;

    fn health(&self) -> watch::Receiver<SinkHealth>;

    /// Stop accepting messages and flush what is queued
    async fn close(&self);
}
