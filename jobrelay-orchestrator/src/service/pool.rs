//! Worker Pool
//!
//! Bounded pool that runs dispatched executions off the request path.
//!
//! `core_size` long-lived workers drain a queue of `queue_capacity` tasks.
//! When the queue is full, up to `max_size - core_size` extra tasks are
//! spawned directly; past that, submission is rejected.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;

/// Unit of work accepted by the pool
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is saturated (queue full and all overflow workers busy)")]
    Saturated,

    #[error("worker pool is shut down")]
    Closed,
}

pub struct WorkerPool {
    sender: mpsc::Sender<Task>,
    overflow: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates the pool and spawns its core workers
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..config.core_size {
            tokio::spawn(run_worker(worker_id, Arc::clone(&receiver)));
        }

        info!(
            "Configured worker pool: core_size={}, max_size={}, queue_capacity={}",
            config.core_size, config.max_size, config.queue_capacity
        );

        Self {
            sender,
            overflow: Arc::new(Semaphore::new(
                config.max_size.saturating_sub(config.core_size),
            )),
        }
    }

    /// Submits a task without waiting for it to start
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.sender.try_send(Box::pin(task)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                let permit = self
                    .overflow
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| PoolError::Saturated)?;

                debug!("Worker queue full, running task on overflow worker");

                tokio::spawn(async move {
                    run_task(task).await;
                    // Permit is released when dropped
                    drop(permit);
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }
}

async fn run_worker(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<Task>>>) {
    debug!("Worker {} started", worker_id);

    loop {
        let task = receiver.lock().await.recv().await;

        match task {
            Some(task) => run_task(task).await,
            None => break,
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs a task in its own Tokio task so a panic cannot take the worker down
async fn run_task(task: Task) {
    if let Err(e) = tokio::spawn(task).await {
        if e.is_panic() {
            error!("Worker task panicked: {}", e);
        } else {
            warn!("Worker task aborted: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn config(core_size: usize, max_size: usize, queue_capacity: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            core_size,
            max_size,
            queue_capacity,
        }
    }

    #[tokio::test]
    async fn test_runs_submitted_tasks() {
        let pool = WorkerPool::new(config(2, 2, 10));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..3 {
            let tx = tx.clone();
            pool.submit(async move {
                let _ = tx.send(i);
            })
            .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let value = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(value);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_rejects_when_queue_and_overflow_are_full() {
        // One core worker, one overflow slot, queue of one
        let pool = WorkerPool::new(config(1, 2, 1));
        let gate = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));

        let blocked = |gate: Arc<Notify>, started: Arc<AtomicUsize>| async move {
            started.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        };

        // Occupies the core worker
        pool.submit(blocked(Arc::clone(&gate), Arc::clone(&started)))
            .unwrap();
        while started.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        // Fills the queue, then the overflow slot
        pool.submit(blocked(Arc::clone(&gate), Arc::clone(&started)))
            .unwrap();
        pool.submit(blocked(Arc::clone(&gate), Arc::clone(&started)))
            .unwrap();

        let rejected = pool.submit(blocked(Arc::clone(&gate), Arc::clone(&started)));
        assert_eq!(rejected, Err(PoolError::Saturated));

        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_task() {
        let pool = WorkerPool::new(config(1, 1, 4));
        let ran = Arc::new(Notify::new());

        pool.submit(async { panic!("boom") }).unwrap();

        let signal = Arc::clone(&ran);
        pool.submit(async move { signal.notify_one() }).unwrap();

        tokio::time::timeout(Duration::from_secs(5), ran.notified())
            .await
            .unwrap();
    }
}
