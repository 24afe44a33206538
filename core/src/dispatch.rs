//! Bounded-concurrency fan-out with a join barrier
//!
//! The [`Dispatcher`] runs one unit of work per target:
//! - at most `max_concurrency` units run at any instant (unbounded when
//!   unset); queued targets start in input order as slots free up
//! - every unit runs to completion, even after a sibling has failed
//! - the first failure in target order is returned; later ones are logged
//!
//! There is no retry here; callers wrap individual work items if they
//! want one.
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = Dispatcher::new("preload").max_concurrency(10);
//! dispatcher
//!     .dispatch(ports, move |port| {
//!         let generator = Arc::clone(&generator);
//!         async move { generator.load(&client, &ip, port).await }
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{BenchError, BenchResult};

/// One unit of work bound to its target and its position in the input
struct DispatchJob<T> {
    index: usize,
    target: T,
}

/// Runs a work function across targets with a concurrency ceiling
#[derive(Debug, Clone)]
pub struct Dispatcher {
    label: String,
    max_concurrency: Option<usize>,
}

impl Dispatcher {
    /// Unbounded dispatcher; `label` tags its log lines
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            max_concurrency: None,
        }
    }

    /// Run at most `limit` units at once (a limit of 0 is treated as 1)
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    /// The configured ceiling, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Run `work` once per target and wait for all of them
    ///
    /// On success the results come back in target order. On failure the
    /// first error in target order is returned after every unit finished.
    pub async fn dispatch<T, R, F, Fut>(&self, targets: Vec<T>, work: F) -> BenchResult<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BenchResult<R>> + Send + 'static,
    {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let total = targets.len();
        let permits = self.max_concurrency.unwrap_or(total);
        let semaphore = Arc::new(Semaphore::new(permits));
        let work = Arc::new(work);

        tracing::debug!(
            label = %self.label,
            targets = total,
            max_concurrency = ?self.max_concurrency,
            "Dispatching"
        );

        let mut handles = Vec::with_capacity(total);
        for (index, target) in targets.into_iter().enumerate() {
            let job = DispatchJob { index, target };

            // Acquire here rather than inside the task so that queued jobs
            // start strictly in target order.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| BenchError::Dispatch(format!("{}: semaphore closed", self.label)))?;
            let work = Arc::clone(&work);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                (job.index, work(job.target).await)
            }));
        }

        let mut results = Vec::with_capacity(total);
        let mut first_error: Option<BenchError> = None;

        let joined = futures::future::join_all(handles).await;
        for (position, handle) in joined.into_iter().enumerate() {
            let (index, outcome) = match handle {
                Ok(done) => done,
                Err(e) => (
                    position,
                    Err(BenchError::Dispatch(format!(
                        "{}: task {position} did not complete: {e}",
                        self.label
                    ))),
                ),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(e) if first_error.is_none() => {
                    tracing::error!(label = %self.label, index, error = %e, "Dispatched work failed");
                    first_error = Some(e);
                }
                Err(e) => {
                    tracing::error!(
                        label = %self.label,
                        index,
                        error = %e,
                        "Dispatched work failed (suppressed, earlier failure wins)"
                    );
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Tracks how many units are in flight and the high-water mark
    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_results_in_target_order() {
        let results = Dispatcher::new("test")
            .dispatch(vec![3u64, 1, 2], |n| async move {
                tokio::time::sleep(Duration::from_millis(n * 10)).await;
                Ok(n * 100)
            })
            .await
            .unwrap();

        assert_eq!(results, vec![300, 100, 200]);
    }

    #[tokio::test]
    async fn test_empty_targets() {
        let results: Vec<()> = Dispatcher::new("test")
            .max_concurrency(4)
            .dispatch(Vec::<u32>::new(), |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_failure_on_one_target() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&completed);

        let result = Dispatcher::new("test")
            .dispatch(vec!["A", "B", "C"], move |target| {
                let seen = Arc::clone(&seen);
                async move {
                    if target == "B" {
                        return Err(BenchError::remote(target, "work", "boom"));
                    }
                    seen.lock().unwrap().push(target);
                    Ok(())
                }
            })
            .await;

        match result {
            Err(BenchError::RemoteExecution { machine, .. }) => assert_eq!(machine, "B"),
            other => panic!("expected B's error, got {other:?}"),
        }
        let mut done = completed.lock().unwrap().clone();
        done.sort();
        assert_eq!(done, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_first_error_in_target_order_wins() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);

        // B fails late, C fails immediately: B is still the one reported.
        let result = Dispatcher::new("test")
            .dispatch(vec!["A", "B", "C"], move |target| {
                let counter = Arc::clone(&counter);
                async move {
                    let outcome = match target {
                        "B" => {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err(BenchError::remote(target, "work", "slow failure"))
                        }
                        "C" => Err(BenchError::remote(target, "work", "fast failure")),
                        _ => Ok(()),
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    outcome
                }
            })
            .await;

        match result {
            Err(BenchError::RemoteExecution { machine, message, .. }) => {
                assert_eq!(machine, "B");
                assert_eq!(message, "slow failure");
            }
            other => panic!("expected B's error, got {other:?}"),
        }
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let tracker = Arc::new(InFlight::default());
        let t = Arc::clone(&tracker);

        Dispatcher::new("test")
            .max_concurrency(3)
            .dispatch((0..10u32).collect::<Vec<_>>(), move |_: u32| {
                let t = Arc::clone(&t);
                async move {
                    t.enter();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    t.exit();
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(tracker.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unbounded_runs_everything_at_once() {
        let tracker = Arc::new(InFlight::default());
        let t = Arc::clone(&tracker);

        Dispatcher::new("test")
            .dispatch((0..5u32).collect::<Vec<_>>(), move |_: u32| {
                let t = Arc::clone(&t);
                async move {
                    t.enter();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    t.exit();
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(tracker.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_queued_targets_start_in_order() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&started);

        Dispatcher::new("test")
            .max_concurrency(1)
            .dispatch(vec![5u32, 4, 3, 2, 1], move |n| {
                let s = Arc::clone(&s);
                async move {
                    s.lock().unwrap().push(n);
                    tokio::time::sleep(Duration::from_millis(u64::from(n))).await;
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(*started.lock().unwrap(), vec![5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_panicking_work_reported_after_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);

        let result = Dispatcher::new("test")
            .dispatch(vec![0u32, 1, 2], move |n| {
                let counter = Arc::clone(&counter);
                async move {
                    if n == 1 {
                        panic!("work panicked");
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(BenchError::Dispatch(_))));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_limit_clamped() {
        assert_eq!(Dispatcher::new("test").max_concurrency(0).limit(), Some(1));
        assert_eq!(Dispatcher::new("test").limit(), None);
    }
}
