//! Bounded concurrency task group.
//!
//! Stages that perform many independent operations (one build per target,
//! one digest per artifact) spawn them on a [`TaskGroup`]. At most `limit`
//! tasks run at a time. A failing task does not stop its peers: every task
//! runs to completion and [`TaskGroup::wait`] reports all failures at once.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A set of fallible tasks sharing a concurrency limit.
#[derive(Debug)]
pub struct TaskGroup {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Result<()>>,
}

impl TaskGroup {
    /// Creates a group running at most `limit` tasks at once. A limit of zero
    /// is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Queues an async task. It starts once a slot is free.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled)?;
            task.await
        });
    }

    /// Queues blocking work (hashing, compression) on the blocking pool.
    pub fn spawn_blocking<F>(&mut self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.spawn(async move {
            tokio::task::spawn_blocking(task)
                .await
                .map_err(|e| Error::TaskPanic {
                    message: e.to_string(),
                })?
        });
    }

    /// Number of tasks not yet collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task.
    ///
    /// # Errors
    ///
    /// A single failure is returned as is; several are aggregated into
    /// [`Error::Tasks`] in completion order.
    pub async fn wait(mut self) -> Result<()> {
        let mut failures = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(Error::TaskPanic {
                    message: e.to_string(),
                })
            });
            if let Err(err) = outcome {
                tracing::debug!(error = %err, "task failed");
                failures.push(err);
            }
        }
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Error::Tasks { failures }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limit_and_full_aggregation() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut group = TaskGroup::new(3);
        for i in 0..10 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let finished = Arc::clone(&finished);
            group.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                finished.fetch_add(1, Ordering::SeqCst);
                if i == 2 || i == 7 {
                    return Err(Error::config(format!("task {i} failed"), ""));
                }
                Ok(())
            });
        }

        let err = group.wait().await.unwrap_err();
        assert_eq!(finished.load(Ordering::SeqCst), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(err.failure_count(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("task 2 failed"));
        assert!(rendered.contains("task 7 failed"));
    }

    #[tokio::test]
    async fn test_single_failure_is_returned_directly() {
        let mut group = TaskGroup::new(2);
        group.spawn(async { Ok(()) });
        group.spawn(async { Err(Error::Cancelled) });
        assert!(matches!(group.wait().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_failures_are_reported_in_completion_order() {
        let mut group = TaskGroup::new(2);
        group.spawn(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(Error::config("slow", ""))
        });
        group.spawn(async { Err(Error::config("fast", "")) });

        let Err(Error::Tasks { failures }) = group.wait().await else {
            panic!("expected aggregated failures");
        };
        let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec!["configuration error: fast", "configuration error: slow"]
        );
    }

    #[tokio::test]
    async fn test_empty_group_succeeds() {
        let group = TaskGroup::new(0);
        assert!(group.is_empty());
        group.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_blocking_tasks_and_panics() {
        let mut group = TaskGroup::new(2);
        let explode = true;
        group.spawn_blocking(|| Ok(()));
        group.spawn_blocking(move || {
            assert!(!explode, "blocking boom");
            Ok(())
        });
        group.spawn(async move {
            assert!(!explode, "async boom");
            Ok(())
        });
        assert_eq!(group.len(), 3);
        let err = group.wait().await.unwrap_err();
        assert_eq!(err.failure_count(), 2);
        assert!(err.to_string().contains("task panicked"));
    }
}
