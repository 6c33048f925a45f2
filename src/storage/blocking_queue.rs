// Blocking queue using Mutex + Condvar.
// Receivers sleep on the condvar while empty; every send wakes one of them.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Which end of the sequence `receive` takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalOrder {
    /// Most recently sent item first.
    #[default]
    Lifo,
    /// Oldest item first.
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub order: RetrievalOrder,
    /// Max items held at once. When full, a send discards the oldest item.
    /// `None` means unbounded.
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
    pub max_depth: u64,
}

pub struct BlockingQueue<T> {
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    config: QueueConfig,
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    max_depth: AtomicU64,
}

impl<T> BlockingQueue<T> {
    /// Unbounded LIFO queue.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        let initial = config.capacity.unwrap_or(16).min(1024);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(initial)),
            not_empty: Condvar::new(),
            config,
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            max_depth: AtomicU64::new(0),
        }
    }

    /// Append an item and wake one waiting receiver. Never blocks.
    pub fn send(&self, item: T) {
        let mut queue = self.inner.lock();
        let mut dropped_oldest = false;
        if let Some(capacity) = self.config.capacity
            && queue.len() >= capacity
        {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            dropped_oldest = true;
        }
        queue.push_back(item);
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.max_depth
            .fetch_max(queue.len() as u64, Ordering::Relaxed);
        drop(queue);
        self.not_empty.notify_one();

        if dropped_oldest {
            tracing::warn!(
                capacity = ?self.config.capacity,
                "queue full, dropped oldest item"
            );
        }
    }

    /// Blocking receive. Waits until an item is available; the lock is
    /// released while sleeping.
    pub fn receive(&self) -> T {
        let mut queue = self.inner.lock();
        loop {
            if let Some(item) = self.take(&mut queue) {
                return item;
            }
            self.not_empty.wait(&mut queue);
        }
    }

    /// Blocking receive that gives up once `timeout` has elapsed. A timeout
    /// too large to express as a deadline waits like `receive`.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.receive());
        };
        let mut queue = self.inner.lock();
        loop {
            if let Some(item) = self.take(&mut queue) {
                return Some(item);
            }
            if self.not_empty.wait_until(&mut queue, deadline).timed_out() {
                // One last look: a send may have raced the deadline.
                return self.take(&mut queue);
            }
        }
    }

    pub fn try_receive(&self) -> Option<T> {
        let mut queue = self.inner.lock();
        self.take(&mut queue)
    }

    fn take(&self, queue: &mut VecDeque<T>) -> Option<T> {
        let item = match self.config.order {
            RetrievalOrder::Lifo => queue.pop_back(),
            RetrievalOrder::Fifo => queue.pop_front(),
        };
        if item.is_some() {
            self.received.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
