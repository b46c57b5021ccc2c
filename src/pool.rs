//! Bounded worker pool with retry, backoff, and breaker reporting
//!
//! A fixed set of long-lived worker tasks consumes one bounded FIFO queue.
//! Admission is checked synchronously at submission time (queue capacity
//! first, then the circuit breaker) so callers get immediate backpressure
//! instead of queueing doomed work. Each claimed task is executed under a
//! single retry budget; the breaker hears about every attempt's outcome.

use crate::breaker::CircuitBreaker;
use crate::config::PoolSection;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::metrics::metrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One attempt at a task's work. Retried by the worker, never by the task
/// itself: the pool owns the whole retry budget.
pub type AttemptFuture = Pin<Box<dyn Future<Output = BridgeResult<String>> + Send>>;
pub type AttemptFn = Box<dyn Fn() -> AttemptFuture + Send + Sync>;

/// A unit of dispatched work: the attempt closure, the completion sender the
/// caller is awaiting, and a token cancelled when the caller gives up.
pub struct Task {
    attempt: AttemptFn,
    done: oneshot::Sender<BridgeResult<String>>,
    cancel: CancellationToken,
}

impl Task {
    pub fn new(
        attempt: AttemptFn,
        done: oneshot::Sender<BridgeResult<String>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            attempt,
            done,
            cancel,
        }
    }
}

/// Retry budget applied to every claimed task.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PoolSection) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }
}

/// Exponential backoff before retry `attempt` (1-based), capped.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(max)
}

pub struct WorkerPool {
    task_tx: mpsc::Sender<Task>,
    task_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    queue_depth: Arc<AtomicUsize>,
    queue_capacity: usize,
    breaker: Arc<CircuitBreaker>,
    shutdown_tx: watch::Sender<bool>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        queue_capacity: usize,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let worker_count = workers.clamp(1, crate::config::MAX_POOL_WORKERS);
        let capacity = queue_capacity.max(1);
        let (task_tx, task_rx) = mpsc::channel(capacity);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let queue_depth = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, _) = watch::channel(false);

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            handles.push(tokio::spawn(Self::worker_loop(
                id,
                task_rx.clone(),
                queue_depth.clone(),
                shutdown_tx.subscribe(),
                breaker.clone(),
                retry,
            )));
        }
        info!(workers = worker_count, capacity, "worker pool started");

        Self {
            task_tx,
            task_rx,
            queue_depth,
            queue_capacity: capacity,
            breaker,
            shutdown_tx,
            workers: std::sync::Mutex::new(handles),
            stopped: AtomicBool::new(false),
        }
    }

    /// Submit a task. Fails fast with `QueueFull` when the queue is at
    /// capacity and `CircuitOpen` when the breaker denies admission, in that
    /// order. Neither failure queues anything.
    pub fn submit(&self, task: Task) -> BridgeResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(BridgeError::ShuttingDown);
        }
        if self.queue_depth.load(Ordering::Acquire) >= self.queue_capacity {
            return Err(BridgeError::QueueFull);
        }
        if !self.breaker.allow_request() {
            return Err(BridgeError::CircuitOpen);
        }
        match self.task_tx.try_send(task) {
            Ok(()) => {
                self.queue_depth.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(BridgeError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BridgeError::ShuttingDown),
        }
    }

    /// Tasks queued but not yet claimed by a worker.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Acquire)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Stop accepting work, fail every drained task's handle, and join all
    /// workers. Idempotent and safe from teardown paths; join errors are
    /// logged and swallowed.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("worker pool shutting down");
        let _ = self.shutdown_tx.send(true);

        {
            let mut rx = self.task_rx.lock().await;
            while let Ok(task) = rx.try_recv() {
                self.queue_depth.fetch_sub(1, Ordering::AcqRel);
                let _ = task.done.send(Err(BridgeError::ShuttingDown));
            }
        }

        let handles = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!("error joining worker: {e}");
            }
        }
        info!("worker pool shutdown complete");
    }

    async fn worker_loop(
        id: usize,
        task_rx: Arc<Mutex<mpsc::Receiver<Task>>>,
        queue_depth: Arc<AtomicUsize>,
        mut shutdown_rx: watch::Receiver<bool>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) {
        debug!(worker = id, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let claimed = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                task = Self::next_task(&task_rx) => task,
            };
            let Some(task) = claimed else {
                break;
            };
            queue_depth.fetch_sub(1, Ordering::AcqRel);
            Self::execute_with_retry(id, task, &breaker, retry).await;
        }
        debug!(worker = id, "worker exited");
    }

    async fn next_task(task_rx: &Arc<Mutex<mpsc::Receiver<Task>>>) -> Option<Task> {
        task_rx.lock().await.recv().await
    }

    async fn execute_with_retry(
        worker: usize,
        task: Task,
        breaker: &CircuitBreaker,
        retry: RetryPolicy,
    ) {
        let Task {
            attempt,
            done,
            cancel,
        } = task;

        let mut last_error = None;
        for n in 1..=retry.max_retries {
            if cancel.is_cancelled() {
                debug!(worker, "task cancelled by caller, aborting");
                last_error = Some(BridgeError::ShuttingDown);
                break;
            }
            match (attempt)().await {
                Ok(response) => {
                    breaker.record_success();
                    let _ = done.send(Ok(response));
                    return;
                }
                Err(e) if e.is_retryable() => {
                    breaker.record_failure();
                    metrics().record_broker_failure();
                    warn!(worker, attempt = n, error = %e, "broker exchange failed");
                    last_error = Some(e);
                    if n < retry.max_retries {
                        metrics().record_retry();
                        let delay = backoff_delay(n, retry.base_delay, retry.max_delay);
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!(worker, "task cancelled during backoff");
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                Err(e) => {
                    // Caller fault or terminal condition: no breaker
                    // bookkeeping, no retry.
                    let _ = done.send(Err(e));
                    return;
                }
            }
        }
        let _ = done.send(Err(last_error.unwrap_or(BridgeError::ShuttingDown)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn test_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    fn test_breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(3, Duration::from_secs(30)))
    }

    fn ok_task(done: oneshot::Sender<BridgeResult<String>>) -> Task {
        Task::new(
            Box::new(|| Box::pin(async { Ok("done".to_string()) })),
            done,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, base, max), Duration::from_millis(4000));
        assert_eq!(backoff_delay(10, base, max), max);
    }

    #[tokio::test]
    async fn test_submitted_task_completes() {
        let pool = WorkerPool::new(2, 2, test_retry(), test_breaker());
        let (tx, rx) = oneshot::channel();
        pool.submit(ok_task(tx)).unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), "done");
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_budget() {
        let pool = WorkerPool::new(1, 1, test_retry(), test_breaker());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let (tx, rx) = oneshot::channel();
        let task = Task::new(
            Box::new(move || {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BridgeError::transport("recv failed"))
                })
            }),
            tx,
            CancellationToken::new(),
        );
        pool.submit(task).unwrap();

        let result = rx.await.unwrap();
        assert!(matches!(result, Err(BridgeError::Transport { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Every attempt was reported: the breaker opened at threshold 3.
        assert!(pool.breaker().is_open());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_retryable_failure_skips_breaker() {
        let pool = WorkerPool::new(1, 1, test_retry(), test_breaker());
        let (tx, rx) = oneshot::channel();
        let task = Task::new(
            Box::new(|| Box::pin(async { Err(BridgeError::invalid_input("bad")) })),
            tx,
            CancellationToken::new(),
        );
        pool.submit(task).unwrap();

        assert!(matches!(
            rx.await.unwrap(),
            Err(BridgeError::InvalidInput { .. })
        ));
        assert_eq!(pool.breaker().failure_count(), 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_full_rejects_before_queueing() {
        let pool = WorkerPool::new(1, 1, test_retry(), test_breaker());
        // Park the single worker on a task that waits for release.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));
        let (tx, _rx) = oneshot::channel();
        let blocker = Task::new(
            Box::new(move || {
                let release_rx = release_rx.clone();
                Box::pin(async move {
                    if let Some(rx) = release_rx.lock().await.take() {
                        let _ = rx.await;
                    }
                    Ok("released".to_string())
                })
            }),
            tx,
            CancellationToken::new(),
        );
        pool.submit(blocker).unwrap();
        // Give the worker a moment to claim it.
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fill the queue, then one more must be rejected.
        let (tx, _rx1) = oneshot::channel();
        pool.submit(ok_task(tx)).unwrap();
        let (tx, _rx2) = oneshot::channel();
        assert!(matches!(
            pool.submit(ok_task(tx)),
            Err(BridgeError::QueueFull)
        ));

        let _ = release_tx.send(());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_submission() {
        let breaker = test_breaker();
        for _ in 0..3 {
            breaker.record_failure();
        }
        let pool = WorkerPool::new(1, 4, test_retry(), breaker);
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            pool.submit(ok_task(tx)),
            Err(BridgeError::CircuitOpen)
        ));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_tasks_complete_exactly_once() {
        let pool = Arc::new(WorkerPool::new(4, 16, test_retry(), test_breaker()));
        let executions = Arc::new(AtomicU32::new(0));

        let mut receivers = Vec::new();
        for _ in 0..10 {
            let counter = executions.clone();
            let (tx, rx) = oneshot::channel();
            let task = Task::new(
                Box::new(move || {
                    let counter = counter.clone();
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok("ok".to_string())
                    })
                }),
                tx,
                CancellationToken::new(),
            );
            pool.submit(task).unwrap();
            receivers.push(rx);
        }
        for rx in receivers {
            assert_eq!(rx.await.unwrap().unwrap(), "ok");
        }
        assert_eq!(executions.load(Ordering::SeqCst), 10);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_task_stops_retrying() {
        let pool = WorkerPool::new(1, 1, test_retry(), test_breaker());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let task = Task::new(
            Box::new(move || {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(BridgeError::transport("down"))
                })
            }),
            tx,
            cancel.clone(),
        );
        cancel.cancel();
        pool.submit(task).unwrap();

        let result = rx.await.unwrap();
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_drained_tasks() {
        let pool = Arc::new(WorkerPool::new(1, 2, test_retry(), test_breaker()));
        // Park the worker so queued tasks stay queued.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));
        let (tx, _rx) = oneshot::channel();
        pool.submit(Task::new(
            Box::new(move || {
                let release_rx = release_rx.clone();
                Box::pin(async move {
                    if let Some(rx) = release_rx.lock().await.take() {
                        let _ = rx.await;
                    }
                    Ok("ok".to_string())
                })
            }),
            tx,
            CancellationToken::new(),
        ))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (tx, queued_rx) = oneshot::channel();
        pool.submit(ok_task(tx)).unwrap();

        // Drain runs before workers are joined, so the queued task is failed
        // while the worker is still parked on the blocker.
        let shutdown_handle = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = release_tx.send(());
        shutdown_handle.await.unwrap();

        // The drained task's handle received a failure, it did not hang.
        match queued_rx.await {
            Ok(Err(BridgeError::ShuttingDown)) => {}
            Ok(other) => panic!("expected ShuttingDown, got {other:?}"),
            Err(_) => panic!("completion handle dropped without a result"),
        }

        // Idempotent.
        pool.shutdown().await;
        assert!(matches!(
            pool.submit(ok_task(oneshot::channel().0)),
            Err(BridgeError::ShuttingDown)
        ));
    }
}
