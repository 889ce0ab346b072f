use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::NetworkError;
use crate::NetworkMessageModel;
use crate::Result;
use crate::Transport;

/// Transport recording everything it was handed.
///
/// Can be made to fail a number of sends, or to block until permits are
/// released through `open_gate`.
pub struct CapturingTransport {
    max_message_size: usize,
    messages: Mutex<Vec<NetworkMessageModel>>,
    fail_next: Mutex<usize>,
    gate: Option<Arc<Semaphore>>,
}

impl CapturingTransport {
    pub fn new(max_message_size: usize) -> Arc<Self> {
        Arc::new(Self {
            max_message_size,
            messages: Mutex::new(Vec::new()),
            fail_next: Mutex::new(0),
            gate: None,
        })
    }

    /// Every send waits for one permit
    pub fn gated(max_message_size: usize) -> Arc<Self> {
        Arc::new(Self {
            max_message_size,
            messages: Mutex::new(Vec::new()),
            fail_next: Mutex::new(0),
            gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    pub fn open_gate(
        &self,
        permits: usize,
    ) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn fail_next_sends(
        &self,
        n: usize,
    ) {
        *self.fail_next.lock() = n;
    }

    pub fn messages(&self) -> Vec<NetworkMessageModel> {
        self.messages.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.messages.lock().len()
    }
}

#[async_trait]
impl Transport for CapturingTransport {
    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn send(
        &self,
        message: &NetworkMessageModel,
    ) -> Result<()> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        {
            let mut fail_next = self.fail_next.lock();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(NetworkError::TransportUnavailable("broker refused".to_string()).into());
            }
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}
