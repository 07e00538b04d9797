//! Fan-out / fan-in for independent steps.
//!
//! Workflow code decides which steps may run side by side and hands
//! them to a [`WorkerPool`]; the call returns once every task has
//! finished. Tasks borrow from the caller (typically the
//! [`DurableContext`](super::DurableContext)), so workers are scoped
//! threads.

use std::collections::VecDeque;
use std::sync::mpsc::channel;
use std::sync::Mutex;
use std::thread;

use log::{debug, error};

/// A unit of work for the pool.
pub type Task<'env, R> = Box<dyn FnOnce() -> R + Send + 'env>;

/// Bounded pool of scoped worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    size: usize,
}

impl Default for WorkerPool {
    /// One worker per logical CPU.
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl WorkerPool {
    /// Creates a pool with at most `size` concurrent workers (min 1).
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs every task and waits for all of them.
    ///
    /// Results come back in task order, whatever order they finished in.
    /// If a task panics, its payload is resumed on the caller once the
    /// remaining workers have drained the queue.
    pub fn run_all<'env, R: Send>(&self, tasks: Vec<Task<'env, R>>) -> Vec<R> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.size.min(total);
        debug!("Dispatching {} tasks on {} workers", total, workers);

        let queue: Mutex<VecDeque<(usize, Task<'env, R>)>> =
            Mutex::new(tasks.into_iter().enumerate().collect());
        let (tx, rx) = channel();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let tx = tx.clone();
                    let queue = &queue;

                    scope.spawn(move || loop {
                        let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                        let Some((index, task)) = next else {
                            break;
                        };

                        let result = task();
                        if let Err(e) = tx.send((index, result)) {
                            error!("Failed to send task result: {}", e);
                        }
                    })
                })
                .collect();

            let mut panicked = None;
            for handle in handles {
                if let Err(payload) = handle.join() {
                    panicked.get_or_insert(payload);
                }
            }
            if let Some(payload) = panicked {
                std::panic::resume_unwind(payload);
            }
        });
        drop(tx);

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        for (index, result) in rx {
            slots[index] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }

    /// Runs two tasks side by side and returns both results.
    pub fn join<'env, A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send + 'env,
        B: FnOnce() -> RB + Send + 'env,
        RA: Send,
        RB: Send,
    {
        if self.size < 2 {
            let ra = a();
            let rb = b();
            return (ra, rb);
        }

        thread::scope(|scope| {
            let handle = scope.spawn(a);
            let rb = b();
            let ra = match handle.join() {
                Ok(ra) => ra,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (ra, rb)
        })
    }
}
