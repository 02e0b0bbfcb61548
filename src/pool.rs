//! Bounded worker pool.
//!
//! A fixed set of threads spawned at startup, fed through a mutex-guarded
//! queue and a counting semaphore. Submission never blocks: when the queue
//! is at capacity the job is rejected and the caller decides what to do
//! with the connection it carried.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::Context;
use tracing::debug;

use crate::http::connection::Connection;
use crate::server::Shared;
use crate::sync::Semaphore;

/// One unit of CPU work: parse and compose for a single connection.
pub struct Job {
    id: u64,
    conn: Arc<Mutex<Connection>>,
}

impl Job {
    pub fn new(id: u64, conn: Arc<Mutex<Connection>>) -> Self {
        Self { id, conn }
    }

    fn run(self, shared: &Shared) {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if conn.is_closed() {
            // Reaped between submission and pickup.
            debug!(conn = self.id, "skipping job for closed connection");
            return;
        }
        conn.process(shared);
    }
}

/// Rejection returned when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker queue is full")
    }
}

impl std::error::Error for QueueFull {}

struct PoolState {
    queue: Mutex<VecDeque<Job>>,
    ready: Semaphore,
    capacity: usize,
}

pub struct WorkerPool {
    state: Arc<PoolState>,
}

impl WorkerPool {
    /// Spawns `workers` threads that block on the queue for their lifetime.
    pub fn new(workers: usize, queue_depth: usize, shared: Arc<Shared>) -> anyhow::Result<Self> {
        let state = Arc::new(PoolState {
            queue: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            capacity: queue_depth,
        });
        for i in 0..workers {
            let state = Arc::clone(&state);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("hearth-worker-{i}"))
                .spawn(move || worker_loop(&state, &shared))
                .with_context(|| format!("spawning worker thread {i}"))?;
        }
        Ok(Self { state })
    }

    /// Enqueues a job, or rejects it if the queue is at capacity.
    pub fn submit(&self, job: Job) -> Result<(), QueueFull> {
        {
            let mut queue = self
                .state
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if queue.len() >= self.state.capacity {
                return Err(QueueFull);
            }
            queue.push_back(job);
        }
        self.state.ready.release();
        Ok(())
    }

    pub fn queued(&self) -> usize {
        self.state
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn worker_loop(state: &PoolState, shared: &Shared) {
    loop {
        state.ready.acquire();
        let job = state
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(job) = job {
            job.run(shared);
        }
    }
}
