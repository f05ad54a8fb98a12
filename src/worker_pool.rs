//! Fixed-size worker pool with a bounded request queue and two dispatch modes: completion
//! mode, where the reactor has already done the I/O and a worker only runs `process`; and
//! readiness mode, where a worker performs the read or write itself (`WorkItem::op`).
//! Shutdown is an explicit poison-pill per thread followed by `JoinHandle::join`.

use crate::blocking_queue::BlockingQueue;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Which half of a readiness-mode I/O pair a worker should perform. Unused in completion
/// mode, where the reactor has already done the read and the worker only calls `process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

/// A unit of dispatched work: the connection's token plus, in readiness mode, which
/// operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub token: usize,
    pub op: Option<Op>,
}

impl WorkItem {
    pub fn completion(token: usize) -> Self {
        Self { token, op: None }
    }

    pub fn readiness(token: usize, op: Op) -> Self {
        Self { token, op: Some(op) }
    }
}

enum Job {
    Work(WorkItem),
    Shutdown,
}

pub struct WorkerPool {
    queue: Arc<BlockingQueue<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads, each looping on `queue.pop()` and handing live work
    /// items to `handler`. `handler` is the completion-vs-readiness dispatch logic built by
    /// the reactor; it's captured behind an `Arc` since every worker thread shares the same
    /// instance.
    pub fn new<F>(worker_count: usize, queue_capacity: usize, handler: F) -> Self
    where
        F: Fn(WorkItem) + Send + Sync + 'static,
    {
        assert!(worker_count > 0, "worker pool needs at least one thread");
        let queue = Arc::new(BlockingQueue::new(queue_capacity));
        let handler = Arc::new(handler);

        let handles = (0..worker_count)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn(move || loop {
                        match queue.pop() {
                            Job::Work(item) => handler(item),
                            Job::Shutdown => break,
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { queue, handles }
    }

    /// Non-blocking enqueue; `false` means the queue was full and the caller (the reactor)
    /// should back off rather than apply unbounded pressure.
    pub fn submit(&self, item: WorkItem) -> bool {
        self.queue.push(Job::Work(item))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Pushes one poison pill per worker and joins every thread. Blocks until all in-flight
    /// work items drain ahead of the pills, since the queue is strict FIFO.
    pub fn shutdown(mut self) {
        for _ in 0..self.handles.len() {
            // A full queue would make shutdown block forever on `push`'s non-blocking
            // contract returning false; loop until it lands, since shutdown is not on any
            // latency-sensitive path.
            while !self.queue.push(Job::Shutdown) {
                thread::yield_now();
            }
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
