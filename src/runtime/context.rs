// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellation and deadlines for remote calls.
//!
//! Every suspension point of an operation (property retrieval, method calls and
//! the long-poll for task updates) runs under the caller's [`Context`]. When
//! the context is cancelled or its deadline passes, the pending call is
//! abandoned and [`VsphereError::Cancelled`] is returned.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vsphere_api_rs::runtime::Context;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(30));
//! let child = ctx.child();
//! ctx.cancel();
//! assert!(child.is_done());
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VsphereError};

/// A cancellation signal with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Wrap an existing cancellation token.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// A child that is cancelled with its parent but can be cancelled alone.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child with a deadline no later than `timeout` from now.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context was cancelled or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or expires.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `fut` unless the context finishes first.
    ///
    /// `what` names the pending call in the [`VsphereError::Cancelled`] error.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_done() {
            return Err(VsphereError::Cancelled(what.to_string()));
        }
        tokio::select! {
            biased;
            _ = self.done() => Err(VsphereError::Cancelled(what.to_string())),
            out = fut => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through() {
        let ctx = Context::background();
        let out = ctx.run("call", async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_after_cancel() {
        let ctx = Context::background();
        ctx.cancel();
        let out: Result<()> = ctx.run("call", async { Ok(()) }).await;
        assert!(matches!(out, Err(VsphereError::Cancelled(ref w)) if w == "call"));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let out: Result<()> = ctx.run("WaitForUpdatesEx", std::future::pending()).await;
        assert!(matches!(out, Err(VsphereError::Cancelled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = Context::with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_done());
        let out: Result<()> = ctx.run("slow", std::future::pending()).await;
        assert!(matches!(out, Err(VsphereError::Cancelled(_))));
        assert!(ctx.is_done());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_done());
        let other = parent.child();
        parent.cancel();
        assert!(other.is_done());
    }

    #[tokio::test]
    async fn test_child_with_timeout_keeps_earlier_deadline() {
        let parent = Context::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
