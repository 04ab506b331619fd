//! Background workers.
//!
//! Two execution shapes: a long-lived [`WorkerPool`] (work queue + N
//! threads) for deferred cleanup and compaction work, and
//! [`run_build_workers`] which fans a cooperative index build out over
//! short-lived scoped threads sharing atomic progress counters.

use crate::status::Status;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool draining a shared work queue.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("bg-worker-{i}"))
                    .spawn(move || loop {
                        let job = {
                            let guard = receiver.lock();
                            guard.recv()
                        };
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
                    .expect("spawning a background worker cannot fail")
            })
            .collect();
        WorkerPool {
            sender: Some(sender),
            workers,
        }
    }

    /// Enqueue a job for the next free worker.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                tracing::warn!("background pool is shut down; job dropped");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets the workers drain and exit.
        self.sender = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Run `work` on `n` scoped worker threads and collect the first failure.
/// Used for cooperative index builds where each worker claims units from
/// shared progress counters.
pub fn run_build_workers(
    n: usize,
    work: impl Fn(usize) -> Result<(), Status> + Sync,
) -> Result<(), Status> {
    let results: Vec<Result<(), Status>> = thread::scope(|scope| {
        let work = &work;
        let handles: Vec<_> = (0..n.max(1))
            .map(|worker_id| scope.spawn(move || work(worker_id)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(_) => Err(Status::not_support("index build worker panicked")),
            })
            .collect()
    });
    for result in results {
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_pool_runs_jobs() {
        let counter = Arc::new(AtomicU64::new(0));
        {
            let pool = WorkerPool::new(4);
            for _ in 0..32 {
                let counter = counter.clone();
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            // Dropping joins the workers after the queue drains.
        }
        assert_eq!(counter.load(Ordering::Relaxed), 32);
    }

    #[test]
    fn test_build_workers_share_counter() {
        let progress = AtomicU64::new(0);
        let done = AtomicU64::new(0);
        run_build_workers(4, |_| {
            loop {
                let claim = progress.fetch_add(1, Ordering::AcqRel);
                if claim >= 100 {
                    return Ok(());
                }
                done.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();
        assert_eq!(done.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_build_workers_propagate_failure() {
        let err = run_build_workers(2, |worker_id| {
            if worker_id == 1 {
                Err(Status::not_support("boom"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::NotSupport);
    }
}
