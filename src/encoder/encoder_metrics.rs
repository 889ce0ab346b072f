use parking_lot::Mutex;

/// Cumulative encoder counters; reading never resets them
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncoderMetricsSnapshot {
    pub notifications_dropped: u64,
    pub notifications_processed: u64,
    pub messages_processed: u64,
    pub avg_notifications_per_message: f64,
    pub avg_message_size: f64,
    /// Worst ratio of produced messages to input bundles of one call
    pub max_message_split_ratio: f64,
}

#[derive(Debug, Default)]
pub(crate) struct EncoderMetrics {
    inner: Mutex<EncoderMetricsSnapshot>,
}

impl EncoderMetrics {
    pub(crate) fn record_dropped(
        &self,
        count: u64,
    ) {
        self.inner.lock().notifications_dropped += count;
    }

    pub(crate) fn record_processed(
        &self,
        count: u64,
    ) {
        self.inner.lock().notifications_processed += count;
    }

    /// Fold one emitted message into the rolling averages
    pub(crate) fn record_message(
        &self,
        body_size: usize,
        notification_count: usize,
    ) {
        let mut m = self.inner.lock();
        let n = m.messages_processed as f64;
        m.avg_message_size = (m.avg_message_size * n + body_size as f64) / (n + 1.0);
        m.avg_notifications_per_message =
            (m.avg_notifications_per_message * n + notification_count as f64) / (n + 1.0);
        m.messages_processed += 1;
    }

    pub(crate) fn record_split(
        &self,
        bundles: usize,
        messages: usize,
    ) {
        if bundles == 0 {
            return;
        }
        let ratio = messages as f64 / bundles as f64;
        let mut m = self.inner.lock();
        if ratio > m.max_message_split_ratio {
            m.max_message_split_ratio = ratio;
        }
    }

    pub(crate) fn snapshot(&self) -> EncoderMetricsSnapshot {
        *self.inner.lock()
    }
}
