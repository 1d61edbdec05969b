//! Fixed-size worker pool with a bounded job queue.
//!
//! The manager's dispatch thread submits one job per frame; a full queue
//! is backpressure and `try_submit` reports it by handing the job back so
//! the caller can retry without losing the frame it captured. Workers run
//! jobs to completion even during shutdown: `stop()` closes the queue,
//! lets the backlog drain, then joins.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;

/// A unit of work for the pool. Captures (the frame, the chain, the
/// output queue) are dropped when the job finishes, whatever the outcome.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for a submitted job. Inert: dropping it neither waits for nor
/// cancels the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    id: u64,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Fixed worker threads pulling jobs from a shared queue.
pub struct WorkerPool {
    tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    next_job_id: AtomicU64,
}

impl WorkerPool {
    /// Create a pool with `max_workers` threads and a job queue holding
    /// `max_jobs` pending entries. A negative `max_jobs` means unlimited.
    pub fn new(max_workers: usize, max_jobs: i64) -> Self {
        let (tx, rx) = if max_jobs < 0 {
            unbounded()
        } else {
            bounded(max_jobs as usize)
        };

        let worker_count = max_workers.max(1);
        let workers = (0..worker_count)
            .map(|i| {
                let rx: Receiver<Job> = rx.clone();
                std::thread::Builder::new()
                    .name(format!("framepipe-worker-{i}"))
                    .spawn(move || worker_loop(i, rx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        tracing::info!(max_workers = worker_count, max_jobs, "worker pool started");
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            worker_count,
            next_job_id: AtomicU64::new(0),
        }
    }

    /// Enqueue a boxed job. A full (or stopped) queue hands the job back
    /// as `Err` so the caller can retry it intact.
    pub fn try_submit(&self, job: Job) -> Result<JobHandle, Job> {
        let tx = self.tx.lock().unwrap();
        let Some(tx) = tx.as_ref() else {
            return Err(job);
        };
        match tx.try_send(job) {
            Ok(()) => Ok(JobHandle {
                id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
            }),
            Err(TrySendError::Full(job)) => {
                tracing::trace!("job queue full");
                Err(job)
            }
            Err(TrySendError::Disconnected(job)) => Err(job),
        }
    }

    /// Convenience wrapper over [`WorkerPool::try_submit`] for callers
    /// that do not retry; returns `None` when the queue is full.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Option<JobHandle> {
        self.try_submit(Box::new(job)).ok()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Close the job queue, run the backlog to completion, and join the
    /// workers. Idempotent.
    pub fn stop(&self) {
        if self.tx.lock().unwrap().take().is_none() {
            return;
        }
        tracing::debug!("stopping worker pool");
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.join();
        }
        tracing::debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(index: usize, rx: Receiver<Job>) {
    tracing::debug!(worker = index, "worker thread started");
    while let Ok(job) = rx.recv() {
        // A panicking job must not take the worker down with it.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(worker = index, "job panicked");
        }
    }
    tracing::debug!(worker = index, "worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_jobs_execute() {
        let pool = WorkerPool::new(2, 10);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = counter.clone();
            let mut job: Job = Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            loop {
                match pool.try_submit(job) {
                    Ok(_) => break,
                    Err(returned) => {
                        job = returned;
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        }

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_full_queue_hands_job_back() {
        let pool = WorkerPool::new(1, 1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);

        // Occupy the single worker
        pool.submit(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        // Fill the single queue slot, then overflow
        let mut accepted = 0;
        let mut rejected = 0;
        for _ in 0..4 {
            match pool.try_submit(Box::new(|| {})) {
                Ok(_) => accepted += 1,
                Err(_) => rejected += 1,
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(rejected, 3);

        gate_tx.send(()).unwrap();
        pool.stop();
    }

    #[test]
    fn test_stop_drains_backlog() {
        let pool = WorkerPool::new(1, -1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        // Submissions after stop are rejected
        assert!(pool.submit(|| {}).is_none());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, -1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.submit(|| panic!("boom")).unwrap();
        let c = counter.clone();
        pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_job_captures_dropped_after_run() {
        struct DropProbe(Arc<AtomicUsize>);
        impl Drop for DropProbe {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let pool = WorkerPool::new(1, -1);
        let drops = Arc::new(AtomicUsize::new(0));
        let probe = DropProbe(drops.clone());

        pool.submit(move || {
            let _probe = &probe;
        })
        .unwrap();

        pool.stop();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
