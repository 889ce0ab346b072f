use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::MessageSource;
use crate::Result;
use crate::TriggerCountersSnapshot;
use crate::WriterGroupJobModel;

/// Source with hand-set counters; notifications are pushed by the test
/// straight into the engine's channel.
pub struct FakeSource {
    counter_reset: watch::Sender<u64>,
    counters: Mutex<Vec<(String, TriggerCountersSnapshot)>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        let (counter_reset, _) = watch::channel(0);
        Arc::new(Self {
            counter_reset,
            counters: Mutex::new(Vec::new()),
        })
    }

    pub fn set_counters(
        &self,
        counters: Vec<(String, TriggerCountersSnapshot)>,
    ) {
        *self.counters.lock() = counters;
    }

    pub fn reset_counters(&self) {
        self.counter_reset.send_modify(|epoch| *epoch += 1);
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn start(
        &self,
        _ct: CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    async fn update(
        &self,
        _job: &WriterGroupJobModel,
    ) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    fn counter_reset(&self) -> watch::Receiver<u64> {
        self.counter_reset.subscribe()
    }

    fn counters(&self) -> Vec<(String, TriggerCountersSnapshot)> {
        self.counters.lock().clone()
    }
}
