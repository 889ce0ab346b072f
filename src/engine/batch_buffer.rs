use tracing::trace;

/// Accumulates notifications until `max_batch_size` is reached.
///
/// Only the batching loop touches it, so it needs no locking.
pub struct BatchBuffer<E> {
    max_batch_size: usize,
    buffer: Vec<E>,
}

impl<E> BatchBuffer<E> {
    pub fn new(max_batch_size: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            max_batch_size,
            buffer: Vec::with_capacity(max_batch_size),
        }
    }

    /// Returns the batch length once it is full
    pub fn push(
        &mut self,
        item: E,
    ) -> Option<usize> {
        self.buffer.push(item);
        trace!(
            "BatchBuffer::push, max_batch_size={}, len={}",
            self.max_batch_size,
            self.buffer.len()
        );
        if self.buffer.len() >= self.max_batch_size {
            Some(self.buffer.len())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn take(&mut self) -> Vec<E> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.max_batch_size))
    }
}
