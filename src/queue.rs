//! Blocking MPMC queue used to hand frames across thread boundaries.
//!
//! `crossbeam_channel` moves jobs inside the worker pool, but the frame
//! queues need peek (`front`) and timed-wait (`wait_for`) semantics that
//! channels do not expose, so this is the classic mutex + condvar pair.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Thread-safe FIFO queue, optionally bounded.
///
/// All operations are MPMC-safe. An unbounded queue never rejects a push;
/// a bounded queue rejects `push` at capacity and blocks `push_wait`
/// until space frees up.
pub struct ThreadSafeQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> ThreadSafeQueue<T> {
    /// Create a queue with no capacity limit.
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: None,
        }
    }

    /// Create a queue holding at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: Some(capacity),
        }
    }

    fn is_full(&self, len: usize) -> bool {
        self.capacity.is_some_and(|cap| len >= cap)
    }

    /// Append an item. Returns `Err(item)` when the queue is bounded and
    /// currently full; the caller can retry or fall back to `push_wait`.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock().unwrap();
        if self.is_full(items.len()) {
            return Err(item);
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append an item, blocking until the queue has capacity.
    pub fn push_wait(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        while self.is_full(items.len()) {
            items = self.not_full.wait(items).unwrap();
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
    }

    /// Remove and return the oldest item, if any. Non-blocking.
    pub fn pop(&self) -> Option<T> {
        let mut items = self.items.lock().unwrap();
        let item = items.pop_front();
        if item.is_some() {
            drop(items);
            self.not_full.notify_one();
        }
        item
    }

    /// Inspect the oldest item without removing it.
    pub fn front<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let items = self.items.lock().unwrap();
        items.front().map(f)
    }

    /// Wait up to `timeout` for the queue to become non-empty. Returns
    /// `false` on timeout.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock().unwrap();
        while items.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(items, deadline - now)
                .unwrap();
            items = guard;
            if result.timed_out() && items.is_empty() {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_pop_fifo() {
        let q = ThreadSafeQueue::unbounded();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();

        assert_eq!(q.len(), 3);
        assert_eq!(q.front(|v| *v), Some(1));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_bounded_rejects_at_capacity() {
        let q = ThreadSafeQueue::bounded(2);
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.push(3), Err(3));

        q.pop();
        q.push(3).unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_wait_for_times_out() {
        let q: ThreadSafeQueue<u32> = ThreadSafeQueue::unbounded();
        let start = Instant::now();
        assert!(!q.wait_for(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_for_sees_concurrent_push() {
        let q = Arc::new(ThreadSafeQueue::unbounded());
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.push(42).unwrap();
            })
        };

        assert!(q.wait_for(Duration::from_secs(3)));
        assert_eq!(q.pop(), Some(42));
        producer.join().unwrap();
    }

    #[test]
    fn test_push_wait_blocks_until_capacity() {
        let q = Arc::new(ThreadSafeQueue::bounded(1));
        q.push(1).unwrap();

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                // Blocks until the consumer pops
                q.push_wait(2);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        producer.join().unwrap();
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn test_mpmc_all_items_delivered() {
        let q = Arc::new(ThreadSafeQueue::unbounded());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        q.push(p * 100 + i).unwrap();
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }

        let mut seen = Vec::new();
        while let Some(v) = q.pop() {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen.len(), 400);
        assert_eq!(seen, (0..400).collect::<Vec<_>>());
    }
}
