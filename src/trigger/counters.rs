use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::constants::ROLLING_COUNTER_BUCKETS;
use crate::MessageType;
use crate::MonitoredItemNotificationModel;

/// Sum over the last minute, kept in one second buckets
pub struct RollingCounter {
    inner: Mutex<RollingInner>,
}

struct RollingInner {
    buckets: [u64; ROLLING_COUNTER_BUCKETS],
    epoch: Instant,
    last_second: u64,
}

impl RollingInner {
    fn advance(&mut self) -> usize {
        let now = self.epoch.elapsed().as_secs();
        let gap = now.saturating_sub(self.last_second);
        if gap as usize >= ROLLING_COUNTER_BUCKETS {
            self.buckets = [0; ROLLING_COUNTER_BUCKETS];
        } else {
            for s in (self.last_second + 1)..=now {
                self.buckets[s as usize % ROLLING_COUNTER_BUCKETS] = 0;
            }
        }
        self.last_second = now;
        now as usize % ROLLING_COUNTER_BUCKETS
    }
}

impl Default for RollingCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingCounter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RollingInner {
                buckets: [0; ROLLING_COUNTER_BUCKETS],
                epoch: Instant::now(),
                last_second: 0,
            }),
        }
    }

    pub fn add(
        &self,
        n: u64,
    ) {
        let mut inner = self.inner.lock();
        let slot = inner.advance();
        inner.buckets[slot] += n;
    }

    pub fn total(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.advance();
        inner.buckets.iter().sum()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.advance();
        inner.buckets = [0; ROLLING_COUNTER_BUCKETS];
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NodeStats {
    pub(crate) good: u64,
    pub(crate) bad: u64,
}

/// Health and throughput counters of one trigger. Totals are never reset.
#[derive(Default)]
pub struct TriggerCounters {
    connection_retries: AtomicU64,
    connection_ok: AtomicBool,
    value_changes: AtomicU64,
    data_changes: AtomicU64,
    events: AtomicU64,
    value_changes_last_minute: RollingCounter,
    data_changes_last_minute: RollingCounter,
    events_last_minute: RollingCounter,
    // keyed by data set writer name
    node_stats: DashMap<String, NodeStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerCountersSnapshot {
    pub connection_retries: u64,
    pub is_connection_ok: bool,
    pub good_nodes: u64,
    pub bad_nodes: u64,
    pub value_changes: u64,
    pub data_changes: u64,
    pub events: u64,
    pub value_changes_last_minute: u64,
    pub data_changes_last_minute: u64,
    pub events_last_minute: u64,
}

impl TriggerCounters {
    pub(crate) fn record_retry(&self) {
        self.connection_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_connection_ok(
        &self,
        ok: bool,
    ) {
        self.connection_ok.store(ok, Ordering::Release);
    }

    pub(crate) fn set_node_stats(
        &self,
        writer: &str,
        stats: NodeStats,
    ) {
        self.node_stats.insert(writer.to_string(), stats);
    }

    pub(crate) fn remove_node_stats(
        &self,
        writer: &str,
    ) {
        self.node_stats.remove(writer);
    }

    /// Account one notification bundle received from the device
    pub(crate) fn record(
        &self,
        message_type: MessageType,
        notifications: &[MonitoredItemNotificationModel],
    ) {
        match message_type {
            MessageType::KeyFrame | MessageType::DeltaFrame => {
                let values = notifications.len() as u64;
                self.value_changes.fetch_add(values, Ordering::Relaxed);
                self.value_changes_last_minute.add(values);
                self.data_changes.fetch_add(1, Ordering::Relaxed);
                self.data_changes_last_minute.add(1);
            }
            MessageType::Event => {
                let events = notifications
                    .iter()
                    .map(|n| (n.id.as_str(), n.message_id))
                    .collect::<HashSet<_>>()
                    .len()
                    .max(1) as u64;
                self.events.fetch_add(events, Ordering::Relaxed);
                self.events_last_minute.add(events);
            }
            MessageType::KeepAlive => {}
        }
    }

    pub(crate) fn reset_last_minute(&self) {
        self.value_changes_last_minute.reset();
        self.data_changes_last_minute.reset();
        self.events_last_minute.reset();
    }

    pub fn snapshot(&self) -> TriggerCountersSnapshot {
        let (good_nodes, bad_nodes) = self
            .node_stats
            .iter()
            .fold((0, 0), |(g, b), e| (g + e.value().good, b + e.value().bad));
        TriggerCountersSnapshot {
            connection_retries: self.connection_retries.load(Ordering::Relaxed),
            is_connection_ok: self.connection_ok.load(Ordering::Acquire),
            good_nodes,
            bad_nodes,
            value_changes: self.value_changes.load(Ordering::Relaxed),
            data_changes: self.data_changes.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            value_changes_last_minute: self.value_changes_last_minute.total(),
            data_changes_last_minute: self.data_changes_last_minute.total(),
            events_last_minute: self.events_last_minute.total(),
        }
    }
}
