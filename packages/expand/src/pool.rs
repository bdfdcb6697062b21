//! Bounded worker pool for parallel expansion calls.
//!
//! Executors that iterate independent work items (grid cells, countries,
//! radius centers) run them through this pool: a fixed number of workers
//! pull tasks from a shared queue, observe the cancellation token between
//! HTTP calls, and sleep a per-task delay to respect the back end's rate
//! expectations. Results stream through a channel into the single
//! consumer that called [`WorkerPool::run`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Output of one pooled task.
#[derive(Debug, Default)]
pub struct TaskYield {
    /// Records this task produced.
    pub records: Vec<serde_json::Value>,
    /// Pages the task walked.
    pub pages: u64,
    /// Whether the task produced nothing.
    pub empty: bool,
    /// Whether the task failed after retries.
    pub failed: bool,
}

/// Bounded pool of expansion workers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    delay: Duration,
}

impl WorkerPool {
    /// Creates a pool with the given parallelism and per-task delay.
    #[must_use]
    pub const fn new(workers: usize, delay: Duration) -> Self {
        Self { workers, delay }
    }

    /// Runs every task through the pool and collects the yields.
    ///
    /// Tasks execute in queue order per worker; no ordering holds across
    /// workers. Cancellation is observed between tasks — workers finish
    /// their current HTTP call and drain cleanly, so partial output
    /// remains valid.
    pub async fn run<T, F, Fut>(
        &self,
        tasks: Vec<T>,
        cancel: &CancellationToken,
        handler: F,
    ) -> Vec<TaskYield>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = TaskYield> + Send + 'static,
    {
        let task_count = tasks.len();
        if task_count == 0 {
            return Vec::new();
        }
        let queue = Arc::new(Mutex::new(tasks.into_iter().collect::<VecDeque<T>>()));
        let (tx, mut rx) = tokio::sync::mpsc::channel::<TaskYield>(self.workers.max(1) * 2);

        let worker_count = self.workers.clamp(1, task_count);
        let mut join_set = tokio::task::JoinSet::new();

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let handler = handler.clone();
            let delay = self.delay;

            join_set.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        log::debug!("Worker {worker_id} draining after cancellation");
                        break;
                    }
                    let task = {
                        let mut guard =
                            queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        guard.pop_front()
                    };
                    let Some(task) = task else { break };

                    let result = handler(task).await;
                    if tx.send(result).await.is_err() {
                        break;
                    }

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            });
        }
        drop(tx);

        let mut yields = Vec::with_capacity(task_count);
        while let Some(result) = rx.recv().await {
            yields.push(result);
        }

        while join_set.join_next().await.is_some() {}
        yields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_all_tasks() {
        let pool = WorkerPool::new(3, Duration::ZERO);
        let cancel = CancellationToken::new();
        let yields = pool
            .run((0..10).collect(), &cancel, |i: i32| async move {
                TaskYield {
                    records: vec![json!({"id": i})],
                    pages: 1,
                    ..TaskYield::default()
                }
            })
            .await;
        assert_eq!(yields.len(), 10);
        let total: u64 = yields.iter().map(|y| y.pages).sum();
        assert_eq!(total, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_stops_remaining_tasks() {
        let pool = WorkerPool::new(1, Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let yields = pool
            .run(vec![1, 2, 3], &cancel, |_i: i32| async move {
                TaskYield::default()
            })
            .await;
        // Cancelled before any task was picked up.
        assert!(yields.is_empty());
    }
}
