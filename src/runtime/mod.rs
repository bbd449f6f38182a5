// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities: cancellation, call logging and retry.

mod context;
mod logging;
mod retry;

pub use context::Context;
pub use logging::{CallMetrics, LogLevel, LoggingConfig, RequestLogger, RequestSpan};
pub use retry::{Backoff, RetryConfig, RetryConfigBuilder};
