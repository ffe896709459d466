//! Connection acquisition with bounded retry.
//!
//! Every attempt is one direct connection followed by a liveness check, so a
//! refused connection fails at once instead of being retried inside the pool.

use std::io;
use std::time::Duration;

use sqlx::AnyConnection;
use sqlx::Connection;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::session::{Session, SessionOptions};

/// Liveness check run on every attempt.
const PING_SQL: &str = "SELECT 1";

/// How long and how often to retry.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Give up once this much time has elapsed. Zero means one attempt.
    pub max_wait: Duration,
    /// Pause between attempts.
    pub retry_interval: Duration,
    /// Upper bound on a single attempt.
    pub connect_timeout: Duration,
    /// Options for the session that is opened.
    pub session: SessionOptions,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::ZERO,
            retry_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            session: SessionOptions::default(),
        }
    }
}

impl AcquireOptions {
    /// Creates options waiting at most `seconds`.
    #[must_use]
    pub fn wait_seconds(seconds: u64) -> Self {
        Self {
            max_wait: Duration::from_secs(seconds),
            ..Self::default()
        }
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub const fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the upper bound on a single attempt.
    #[must_use]
    pub const fn connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Sets the session options.
    #[must_use]
    pub fn session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    /// Time allowed for the next attempt: what is left of the wait, but at
    /// least one retry interval and never more than the connect timeout.
    fn attempt_budget(&self, elapsed: Duration) -> Duration {
        self.max_wait
            .saturating_sub(elapsed)
            .max(self.retry_interval)
            .min(self.connect_timeout)
    }
}

/// Opens a working session for `url`, retrying until `options.max_wait`
/// has elapsed.
pub async fn acquire(url: &str, options: &AcquireOptions) -> Result<Session> {
    Dialect::from_url(url)?;
    sqlx::any::install_default_drivers();

    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let budget = options.attempt_budget(start.elapsed());
        match try_connect(url, options, budget).await {
            Ok(session) => {
                debug!(attempts, "Connection established");
                return Ok(session);
            }
            Err(Error::Database(source) | Error::Statement { source, .. }) => {
                let waited = start.elapsed();
                if waited >= options.max_wait {
                    return Err(Error::ConnectionUnavailable {
                        attempts,
                        waited,
                        source,
                    });
                }
                warn!(attempts, error = %source, "Database unavailable, retrying");
                sleep(options.retry_interval).await;
            }
            Err(other) => return Err(other),
        }
    }
}

async fn try_connect(url: &str, options: &AcquireOptions, budget: Duration) -> Result<Session> {
    let mut conn = timeout(budget, AnyConnection::connect(url))
        .await
        .map_err(|_| timed_out(budget))??;
    sqlx::query(PING_SQL).execute(&mut conn).await?;
    conn.close().await?;

    let session = options.session.clone().acquire_timeout(budget);
    Session::connect(url, &session).await
}

fn timed_out(budget: Duration) -> sqlx::Error {
    sqlx::Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("no connection within {budget:?}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_memory_database() {
        let options = AcquireOptions::default().session(SessionOptions::default().max_connections(1));
        let mut session = acquire("sqlite::memory:", &options).await.unwrap();
        let rows = session.execute_raw("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(rows.first().and_then(|r| r.get_i64("one")), Some(1));
    }

    #[tokio::test]
    async fn test_zero_wait_makes_one_attempt() {
        let options = AcquireOptions::default();
        let err = acquire("sqlite:///definitely/missing/dir/db.sqlite", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionUnavailable { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_retries_until_deadline() {
        let options = AcquireOptions {
            max_wait: Duration::from_millis(200),
            retry_interval: Duration::from_millis(20),
            ..AcquireOptions::default()
        };
        let err = acquire("sqlite:///definitely/missing/dir/db.sqlite", &options)
            .await
            .unwrap_err();
        match err {
            Error::ConnectionUnavailable {
                attempts, waited, ..
            } => {
                assert!(attempts > 1);
                assert!(waited >= Duration::from_millis(200));
            }
            other => panic!("Expected ConnectionUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_backend_is_not_retried() {
        let options = AcquireOptions::wait_seconds(30);
        let err = acquire("mysql://localhost/db", &options).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedBackend(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_one_quick_attempt() {
        let start = Instant::now();
        let err = acquire("postgres://postgres@127.0.0.1:1/db", &AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionUnavailable { attempts: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_refused_connection_retries_until_deadline() {
        let options = AcquireOptions::default()
            .retry_interval(Duration::from_millis(100))
            .connect_timeout(Duration::from_millis(500));
        let options = AcquireOptions {
            max_wait: Duration::from_millis(800),
            ..options
        };
        let start = Instant::now();
        let err = acquire("postgres://postgres@127.0.0.1:1/db", &options)
            .await
            .unwrap_err();
        match err {
            Error::ConnectionUnavailable { attempts, waited, .. } => {
                assert!(attempts > 2);
                assert!(waited >= Duration::from_millis(800));
            }
            other => panic!("Expected ConnectionUnavailable, got {other:?}"),
        }
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_attempt_budget() {
        let options = AcquireOptions::default();
        assert_eq!(options.attempt_budget(Duration::ZERO), Duration::from_secs(1));

        let options = AcquireOptions::wait_seconds(30);
        assert_eq!(options.attempt_budget(Duration::ZERO), Duration::from_secs(5));
        assert_eq!(
            options.attempt_budget(Duration::from_secs(28)),
            Duration::from_secs(2)
        );
        assert_eq!(
            options.attempt_budget(Duration::from_secs(40)),
            Duration::from_secs(1)
        );
    }
}
