//! Fixed-delay retry for connections and statements.
//!
//! - [`RetryPolicy`]: attempt count and the fixed pause between attempts
//! - [`retry`]: async helper that re-runs an operation until it succeeds
//! - [`RetryingExecutor`]: wraps any [`Executor`] and rolls back between attempts

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::traits::Executor;
use crate::core::value::{RowSet, SqlValue};
use crate::error::Result;
use crate::logging::RunLog;

/// Retry policy: a fixed number of attempts with a fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. Each failure is logged as a
/// warning with its attempt count; the last error is returned unchanged.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, log: &RunLog, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log.warn(format!(
                    "{} failed (attempt {}/{}): {}",
                    label, attempt, policy.max_attempts, e
                ));
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                attempt += 1;
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
}

/// An [`Executor`] that retries every statement under a [`RetryPolicy`].
///
/// A failed statement poisons the open transaction, so the inner executor is
/// rolled back before each new attempt. Rollback errors are ignored.
pub struct RetryingExecutor<E> {
    inner: E,
    policy: RetryPolicy,
    log: RunLog,
}

impl<E: Executor> RetryingExecutor<E> {
    pub fn new(inner: E, policy: RetryPolicy, log: RunLog) -> Self {
        Self { inner, policy, log }
    }

    async fn rollback_quietly(&self) {
        if let Err(e) = self.inner.rollback().await {
            tracing::debug!("rollback before retry failed: {}", e);
        }
    }
}

#[async_trait]
impl<E: Executor> Executor for RetryingExecutor<E> {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet> {
        retry(&self.policy, &self.log, "query", move |attempt| async move {
            if attempt > 1 {
                self.rollback_quietly().await;
            }
            self.inner.query(sql, params).await
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        retry(&self.policy, &self.log, "statement", move |attempt| async move {
            if attempt > 1 {
                self.rollback_quietly().await;
            }
            self.inner.execute(sql, params).await
        })
        .await
    }

    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
        retry(&self.policy, &self.log, "batch", move |attempt| async move {
            if attempt > 1 {
                self.rollback_quietly().await;
            }
            self.inner.execute_batch(sql, rows).await
        })
        .await
    }

    async fn rollback(&self) -> Result<()> {
        self.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls of every kind, then succeeds.
    struct FlakyExecutor {
        failures: u32,
        calls: AtomicU32,
        rollbacks: AtomicU32,
        rollback_fails: bool,
    }

    impl FlakyExecutor {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                rollbacks: AtomicU32::new(0),
                rollback_fails: false,
            }
        }

        fn attempt(&self) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(MigrateError::State(format!("transient failure {}", n)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Executor for FlakyExecutor {
        async fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<RowSet> {
            self.attempt()?;
            Ok(RowSet::new(vec!["n".into()], vec![vec![SqlValue::I64(1)]]))
        }

        async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
            self.attempt()?;
            Ok(1)
        }

        async fn execute_batch(&self, _sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
            self.attempt()?;
            Ok(rows.len() as u64)
        }

        async fn rollback(&self) -> Result<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            if self.rollback_fails {
                return Err(MigrateError::State("no transaction".into()));
            }
            Ok(())
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[test]
    fn test_default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.delay, Duration::from_secs(1));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let log = RunLog::new();
        let exec = RetryingExecutor::new(FlakyExecutor::new(2), policy(3), log.clone());

        assert_eq!(exec.execute("UPDATE t SET a = 1", &[]).await.unwrap(), 1);
        assert_eq!(exec.inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(exec.inner.rollbacks.load(Ordering::SeqCst), 2);
        assert!(log.contains("attempt 1/3"));
        assert!(log.contains("attempt 2/3"));
        assert!(!log.contains("attempt 3/3"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let log = RunLog::new();
        let exec = RetryingExecutor::new(FlakyExecutor::new(10), policy(3), log.clone());

        let rows = vec![vec![SqlValue::I64(1)], vec![SqlValue::I64(2)]];
        let err = exec.execute_batch("INSERT ...", &rows).await.unwrap_err();
        assert!(err.to_string().contains("transient failure 3"));
        assert_eq!(exec.inner.calls.load(Ordering::SeqCst), 3);
        assert!(log.contains("attempt 3/3"));
    }

    #[tokio::test]
    async fn test_rollback_failure_is_ignored() {
        let mut flaky = FlakyExecutor::new(1);
        flaky.rollback_fails = true;
        let exec = RetryingExecutor::new(flaky, policy(3), RunLog::new());

        let rows = exec.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(exec.inner.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_rollback_on_first_success() {
        let exec = RetryingExecutor::new(FlakyExecutor::new(0), policy(3), RunLog::new());
        exec.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(exec.inner.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let log = RunLog::new();
        let started = tokio::time::Instant::now();
        let result: Result<()> = retry(
            &RetryPolicy::new(3, Duration::from_secs(1)),
            &log,
            "connect",
            |_| async { Err(MigrateError::State("down".into())) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
