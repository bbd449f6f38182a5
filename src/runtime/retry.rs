// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry with backoff for establishing sessions.
//!
//! Lifecycle operations are never retried by the client: a failed task is
//! reported, and issuing a new one is the caller's decision. Connecting is
//! different, so [`crate::VsphereClient::dial`] retries transient transport
//! errors according to a [`RetryConfig`].
//!
//! # Example
//!
//! ```
//! use vsphere_api_rs::runtime::{Backoff, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::builder()
//!     .max_retries(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(100)))
//!     .build();
//! assert_eq!(retry.max_retries, 3);
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, VsphereError};
use crate::runtime::Context;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay every time.
    Fixed(Duration),
    /// Delay multiplies with every attempt, up to `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Upper bound.
        max: Duration,
        /// Growth factor.
        multiplier: f64,
    },
}

impl Backoff {
    /// Exponential backoff doubling from `initial`, capped at 30 seconds.
    #[must_use]
    pub fn exponential(initial: Duration) -> Self {
        Backoff::Exponential {
            initial,
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let millis = initial.as_millis() as f64 * multiplier.powi(attempt as i32);
                let capped = millis.min(max.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::exponential(Duration::from_millis(250))
    }
}

/// How many times, and how patiently, to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay strategy.
    pub backoff: Backoff,
    /// Give up once this much time has passed since the first attempt.
    pub total_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            total_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Never retry.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::None,
            total_timeout: None,
        }
    }

    /// Run `operation` until it succeeds, fails permanently or retries run out.
    ///
    /// Only errors for which [`VsphereError::is_transient`] holds are retried.
    /// Backoff sleeps are abandoned when `ctx` finishes.
    pub async fn execute<T, F, Fut>(&self, ctx: &Context, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = std::time::Instant::now();
        let mut attempt = 0;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= self.max_retries {
                return Err(err);
            }
            if let Some(timeout) = self.total_timeout {
                if start.elapsed() >= timeout {
                    return Err(err);
                }
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                target: "vsphere_api::retry",
                "{} failed (attempt {}), retrying in {:?}: {}",
                what,
                attempt + 1,
                delay,
                err
            );
            ctx.run(what, async {
                tokio::time::sleep(delay).await;
                Ok::<_, VsphereError>(())
            })
            .await?;
            attempt += 1;
        }
    }
}

/// Builder for [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Set maximum retry attempts.
    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.config.max_retries = max;
        self
    }

    /// Set the backoff strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the total timeout for all attempts.
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    /// Disable the total timeout.
    #[must_use]
    pub fn no_total_timeout(mut self) -> Self {
        self.config.total_timeout = None;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RetryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_millis(100));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(7), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff_cap() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn test_builder() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .backoff(Backoff::None)
            .no_total_timeout()
            .build();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.total_timeout, None);
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }

    #[tokio::test]
    async fn test_retries_transport_errors() {
        let config = RetryConfig::builder()
            .max_retries(3)
            .backoff(Backoff::None)
            .build();
        let calls = Arc::new(AtomicU32::new(0));

        let result = config
            .execute(&Context::background(), "connect", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(VsphereError::Transport("connection reset".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_faults() {
        let config = RetryConfig::builder().backoff(Backoff::None).build();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = config
            .execute(&Context::background(), "connect", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(VsphereError::Config("bad endpoint".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(VsphereError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let config = RetryConfig::builder()
            .max_retries(2)
            .backoff(Backoff::None)
            .build();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = config
            .execute(&Context::background(), "connect", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(VsphereError::Transport("refused".to_string()))
                }
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
