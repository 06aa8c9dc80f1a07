//! Delivery executor: one event, bounded retries

use std::sync::Arc;

use tracing::{debug, instrument};

use super::transport::{DeliveryTransport, TransportError};
use crate::event::Event;
use crate::reliability::{RetryPolicy, Sleeper, TokioSleeper};

/// Successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    /// Attempts made, including the successful one
    pub attempts: u32,

    /// Status code returned by the target
    pub status: u16,
}

/// Terminal delivery failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Every attempt in the retry budget failed
    #[error("timeout attempting to reach event target after {attempts} attempts: {last_failure}")]
    TimedOut {
        attempts: u32,
        last_failure: AttemptFailure,
    },

    /// The event has nothing to deliver to
    #[error("event target is empty")]
    EmptyTarget,
}

impl DeliveryError {
    /// Attempts consumed before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::TimedOut { attempts, .. } => *attempts,
            Self::EmptyTarget => 0,
        }
    }
}

/// Why a single attempt failed
///
/// Transport errors and error statuses are retried identically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("target responded with status {0}")]
    Status(u16),
}

/// Attempts delivery of a single event
///
/// A call succeeds when it completes without a transport error and the
/// status is below 400. Failed attempts are retried per the [`RetryPolicy`],
/// waiting between attempts only.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(HttpTransport::new(DEFAULT_DELIVERY_TIMEOUT)?);
/// let executor = DeliveryExecutor::new(transport, RetryPolicy::delivery());
///
/// match executor.deliver(&event).await {
///     Ok(delivered) => println!("delivered after {} attempts", delivered.attempts),
///     Err(e) => println!("giving up: {e}"),
/// }
/// ```
pub struct DeliveryExecutor {
    transport: Arc<dyn DeliveryTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl DeliveryExecutor {
    /// Create an executor that waits on the tokio timer
    pub fn new(transport: Arc<dyn DeliveryTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            policy,
        }
    }

    /// Replace the sleeper used between attempts
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver an event, retrying until success or the budget runs out
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn deliver(&self, event: &Event) -> Result<Delivered, DeliveryError> {
        if event.target.trim().is_empty() {
            return Err(DeliveryError::EmptyTarget);
        }

        let mut attempt = 1;
        loop {
            let failure = match self.attempt(&event.target).await {
                Ok(status) => {
                    debug!(attempt, status, "delivery attempt succeeded");
                    return Ok(Delivered {
                        attempts: attempt,
                        status,
                    });
                }
                Err(failure) => failure,
            };

            debug!(attempt, error = %failure, "delivery attempt failed");

            if !self.policy.has_attempts_remaining(attempt) {
                return Err(DeliveryError::TimedOut {
                    attempts: attempt,
                    last_failure: failure,
                });
            }

            attempt += 1;
            self.sleeper
                .sleep(self.policy.delay_for_attempt(attempt))
                .await;
        }
    }

    async fn attempt(&self, target: &str) -> Result<u16, AttemptFailure> {
        let status = self.transport.get(target).await?;
        if status >= 400 {
            return Err(AttemptFailure::Status(status));
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replays scripted responses, then repeats the fallback
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16, TransportError>>>,
        fallback: Result<u16, TransportError>,
        calls: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(
            script: Vec<Result<u16, TransportError>>,
            fallback: Result<u16, TransportError>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl DeliveryTransport for ScriptedTransport {
        async fn get(&self, _target: &str) -> Result<u16, TransportError> {
            *self.calls.lock() += 1;
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
        }
    }

    fn executor(transport: Arc<ScriptedTransport>) -> (DeliveryExecutor, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = DeliveryExecutor::new(transport, RetryPolicy::delivery())
            .with_sleeper(sleeper.clone());
        (executor, sleeper)
    }

    fn event() -> Event {
        Event::pending("user-1", "https://example.com/hook")
    }

    #[tokio::test]
    async fn test_first_success_returns_without_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Ok(200)));
        let (executor, sleeper) = executor(transport.clone());

        let delivered = executor.deliver(&event()).await.unwrap();

        assert_eq!(
            delivered,
            Delivered {
                attempts: 1,
                status: 200
            }
        );
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_always_failing_target_exhausts_budget() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![],
            Err(TransportError::Request("connection refused".into())),
        ));
        let (executor, sleeper) = executor(transport.clone());

        let err = executor.deliver(&event()).await.unwrap_err();

        assert_eq!(transport.calls(), 20);
        assert_eq!(err.attempts(), 20);
        assert!(matches!(
            err,
            DeliveryError::TimedOut {
                last_failure: AttemptFailure::Transport(_),
                ..
            }
        ));

        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 19);
        assert_eq!(sleeps[0], Duration::from_millis(10));
        assert_eq!(sleeps[1], Duration::from_millis(20));
        assert_eq!(sleeps[18], Duration::from_secs(10));
        assert_eq!(
            sleeps.iter().sum::<Duration>(),
            RetryPolicy::delivery().total_backoff()
        );
    }

    #[tokio::test]
    async fn test_error_status_counts_as_failed_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Ok(404)));
        let (executor, _sleeper) = executor(transport.clone());

        let err = executor.deliver(&event()).await.unwrap_err();

        assert_eq!(transport.calls(), 20);
        assert_eq!(
            err,
            DeliveryError::TimedOut {
                attempts: 20,
                last_failure: AttemptFailure::Status(404),
            }
        );
    }

    #[tokio::test]
    async fn test_recovers_after_two_failures() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![Err(TransportError::Timeout), Ok(500)],
            Ok(200),
        ));
        let (executor, sleeper) = executor(transport.clone());

        let delivered = executor.deliver(&event()).await.unwrap();

        assert_eq!(delivered.attempts, 3);
        assert_eq!(transport.calls(), 3);
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[tokio::test]
    async fn test_redirect_status_is_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Ok(302)));
        let (executor, _sleeper) = executor(transport);

        let delivered = executor.deliver(&event()).await.unwrap();
        assert_eq!(delivered.status, 302);
    }

    #[tokio::test]
    async fn test_empty_target_is_not_attempted() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Ok(200)));
        let (executor, _sleeper) = executor(transport.clone());

        let mut event = event();
        event.target = String::new();

        let err = executor.deliver(&event).await.unwrap_err();
        assert_eq!(err, DeliveryError::EmptyTarget);
        assert_eq!(err.attempts(), 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_retry_policy_makes_single_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![], Ok(500)));
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = DeliveryExecutor::new(transport.clone(), RetryPolicy::no_retry())
            .with_sleeper(sleeper.clone());

        let err = executor.deliver(&event()).await.unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn test_timed_out_message() {
        let err = DeliveryError::TimedOut {
            attempts: 20,
            last_failure: AttemptFailure::Status(503),
        };
        assert_eq!(
            err.to_string(),
            "timeout attempting to reach event target after 20 attempts: target responded with status 503"
        );
    }
}
