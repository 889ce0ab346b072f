use std::time::Duration;

use tokio::time::Instant;

/// Flush deadline of the open batch.
///
/// Armed by the first notification of a batch and disarmed by the flush,
/// so an idle group never wakes up.
#[derive(Debug, Clone)]
pub struct BatchTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl BatchTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Start the countdown unless a batch is already open
    pub fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.interval);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }
}
