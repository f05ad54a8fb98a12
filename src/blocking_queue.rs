//! Bounded multi-producer/multi-consumer FIFO. Backs both the worker pool's request queue
//! and, via `proxy_log`'s own copy of this shape, the async log drain. A deque guarded by one
//! mutex, with waiters blocking directly on a condvar predicate
//! (`Condvar::wait_while`/`wait_timeout_while` already tolerate spurious wakeups).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct BlockingQueue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T> BlockingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    /// Non-blocking producer: fails (returns `false`) if the queue is at capacity.
    pub fn push(&self, item: T) -> bool {
        let mut q = self.inner.lock().unwrap();
        if q.len() >= self.capacity {
            return false;
        }
        q.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until non-empty; tolerates spurious wakeups via `wait_while`.
    pub fn pop(&self) -> T {
        let mut q = self.inner.lock().unwrap();
        loop {
            if let Some(item) = q.pop_front() {
                return item;
            }
            q = self.not_empty.wait(q).unwrap();
        }
    }

    /// Blocks at most `timeout`; `None` on timeout or a spurious empty wake at deadline.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut q = self.inner.lock().unwrap();
        loop {
            if let Some(item) = q.pop_front() {
                return Some(item);
            }
            let (guard, result) = self.not_empty.wait_timeout(q, timeout).unwrap();
            q = guard;
            if result.timed_out() {
                return q.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_fails_past_capacity() {
        let q = BlockingQueue::new(2);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(!q.push(3));
        assert_eq!(q.len(), 2);
        assert!(q.is_full());
    }

    #[test]
    fn pop_returns_fifo_order() {
        let q = BlockingQueue::new(4);
        q.push("a");
        q.push("b");
        assert_eq!(q.pop(), "a");
        assert_eq!(q.pop(), "b");
    }

    #[test]
    fn pop_timeout_expires_when_empty() {
        let q: BlockingQueue<i32> = BlockingQueue::new(4);
        assert_eq!(q.pop_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn pop_blocks_until_pushed_from_another_thread() {
        let q = Arc::new(BlockingQueue::new(4));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn clear_empties_queue() {
        let q = BlockingQueue::new(4);
        q.push(1);
        q.push(2);
        q.clear();
        assert!(q.is_empty());
    }
}
