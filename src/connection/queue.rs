//! The bounded FIFO queue backing a connection's send and receive queues.
//! Guarded by its own lock; any thread may push or pop.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::buffer::Buffer;
use crate::error::Error;

/// A `Mutex`-guarded FIFO of buffers with an optional capacity. A limit of
/// `None` means unbounded.
pub struct BoundedQueue {
    inner: Mutex<VecDeque<Buffer>>,
    limit: Option<usize>,
}

impl BoundedQueue {
    pub fn new(limit: Option<usize>) -> BoundedQueue {
        BoundedQueue { inner: Mutex::new(VecDeque::new()), limit }
    }

    /// Push to the tail, failing with [`Error::QueueFull`] if a limit is set
    /// and already reached.
    pub fn push(&self, buf: Buffer) -> Result<(), Error> {
        let mut q = self.inner.lock().expect("queue mutex poisoned");
        if let Some(limit) = self.limit {
            if q.len() >= limit {
                return Err(Error::QueueFull);
            }
        }
        q.push_back(buf);
        Ok(())
    }

    /// Pop the oldest buffer, or `None` if empty.
    pub fn pop(&self) -> Option<Buffer> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued buffer without yielding them.
    pub fn clear(&self) {
        self.inner.lock().expect("queue mutex poisoned").clear();
    }
}
