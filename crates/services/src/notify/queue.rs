//! In-process at-least-once delivery queue.
//!
//! One queue, N worker tasks. A worker owns a job for its whole retry
//! lifecycle, so retries of one job are strictly sequential and a job is
//! never re-enqueued while an attempt is in flight. Anything implementing
//! [`JobHandler`] can sit behind it; a broker-backed queue can replace this
//! without touching the orchestrator.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Done,
    /// Transient failure; retry after backoff until attempts run out.
    Retry(String),
    /// Permanent failure; skip remaining attempts.
    Abort(String),
}

#[async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
    async fn handle(&self, job: &J, attempt: u32) -> JobResult;

    /// Called exactly once when a job is given up on, after its final
    /// failing attempt or an abort.
    async fn exhausted(&self, job: &J, reason: String);

    fn retry_policy(&self, job: &J) -> RetryPolicy;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Exponential backoff before the attempt after `attempt` failed, with a
    /// little jitter so herds of retries spread out.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
        let jitter_ceiling = (exp.as_millis() as u64 / 4).max(1);
        let jitter = rand::rng().random_range(0..jitter_ceiling);
        exp + Duration::from_millis(jitter)
    }
}

pub struct DeliveryQueue<J> {
    tx: mpsc::UnboundedSender<J>,
}

impl<J> DeliveryQueue<J>
where
    J: fmt::Debug + Send + 'static,
{
    /// Spawns `workers` tasks draining a shared queue.
    pub fn start(workers: usize, handler: Arc<dyn JobHandler<J>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<J>();
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let rx = rx.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        debug!(worker_id, "Delivery queue closed, worker exiting");
                        break;
                    };
                    run_job(&*handler, job, worker_id).await;
                }
            });
        }

        Self { tx }
    }

    /// Hands a job to the worker pool. Fails only when the pool is gone,
    /// which a caller reports as an enqueue error for that channel.
    pub fn enqueue(&self, job: J) -> Result<(), String> {
        self.tx
            .send(job)
            .map_err(|_| "delivery queue is shut down".to_string())
    }
}

async fn run_job<J: fmt::Debug + 'static>(handler: &dyn JobHandler<J>, job: J, worker_id: usize) {
    let policy = handler.retry_policy(&job);

    for attempt in 1..=policy.max_attempts {
        match handler.handle(&job, attempt).await {
            JobResult::Done => return,
            JobResult::Abort(reason) => {
                warn!(worker_id, ?job, %reason, "Job aborted");
                handler.exhausted(&job, reason).await;
                return;
            }
            JobResult::Retry(reason) => {
                if attempt == policy.max_attempts {
                    warn!(worker_id, ?job, %reason, attempt, "Job exhausted retries");
                    handler.exhausted(&job, reason).await;
                    return;
                }
                let delay = policy.backoff(attempt);
                debug!(worker_id, ?job, %reason, attempt, ?delay, "Retrying job");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    struct FlakyHandler {
        fail_first: u32,
        attempts: AtomicU32,
        exhausted: AtomicU32,
        done: Notify,
    }

    impl FlakyHandler {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                attempts: AtomicU32::new(0),
                exhausted: AtomicU32::new(0),
                done: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl JobHandler<&'static str> for FlakyHandler {
        async fn handle(&self, _job: &&'static str, _attempt: u32) -> JobResult {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                JobResult::Retry("transient".into())
            } else {
                self.done.notify_one();
                JobResult::Done
            }
        }

        async fn exhausted(&self, _job: &&'static str, _reason: String) {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
        }

        fn retry_policy(&self, _job: &&'static str) -> RetryPolicy {
            RetryPolicy::new(3, Duration::from_millis(1))
        }
    }

    struct AbortingHandler {
        attempts: AtomicU32,
        exhausted: AtomicU32,
        done: Notify,
    }

    #[async_trait]
    impl JobHandler<&'static str> for AbortingHandler {
        async fn handle(&self, _job: &&'static str, _attempt: u32) -> JobResult {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            JobResult::Abort("invalid target".into())
        }

        async fn exhausted(&self, _job: &&'static str, _reason: String) {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
        }

        fn retry_policy(&self, _job: &&'static str) -> RetryPolicy {
            RetryPolicy::new(3, Duration::from_millis(1))
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let handler = FlakyHandler::new(2);
        let queue = DeliveryQueue::start(2, handler.clone());
        queue.enqueue("job").unwrap();

        handler.done.notified().await;
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let handler = FlakyHandler::new(10);
        let queue = DeliveryQueue::start(1, handler.clone());
        queue.enqueue("job").unwrap();

        handler.done.notified().await;
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_skips_remaining_attempts() {
        let handler = Arc::new(AbortingHandler {
            attempts: AtomicU32::new(0),
            exhausted: AtomicU32::new(0),
            done: Notify::new(),
        });
        let queue = DeliveryQueue::start(1, handler.clone());
        queue.enqueue("job").unwrap();

        handler.done.notified().await;
        assert_eq!(handler.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let first = policy.backoff(1);
        let second = policy.backoff(2);
        assert!(first >= Duration::from_millis(100));
        assert!(second >= Duration::from_millis(200));
    }
}
