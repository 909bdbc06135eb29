//! Exponential backoff retry with jitter
//!
//! The delay before retry `n` (0-based) is `initial_delay * multiplier^n`
//! plus a whole-second jitter drawn from the OS random source.
use crate::config::RetryConfig;
use crate::context::{Context, ContextError};
use crate::logger::SharedLogger;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retry aborted: {0}")]
    Context(ContextError),
    #[error("{last_error}")]
    Exhausted { attempts: u32, last_error: E },
}

impl<E> RetryError<E> {
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            Self::Context(err) => Some(*err),
            Self::Exhausted { .. } => None,
        }
    }

    /// The last attempt's failure, exactly as the callback returned it
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Context(_) => None,
            Self::Exhausted { last_error, .. } => Some(last_error),
        }
    }
}

/// Retry driver around a single callback.
///
/// Configuration is fixed at construction. Every [`execute`](Self::execute)
/// starts fresh at attempt 0 and keeps its attempt state local, so one
/// instance can be shared by many concurrent tasks.
#[derive(Clone)]
pub struct ExponentialBackoffRetry<F> {
    callback: F,
    config: RetryConfig,
    logger: Option<SharedLogger>,
}

impl<F> fmt::Debug for ExponentialBackoffRetry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentialBackoffRetry")
            .field("config", &self.config)
            .field("logging", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl<F> ExponentialBackoffRetry<F> {
    /// Zero values for the numeric settings fall back to 100ms, 3 attempts,
    /// a multiplier of 2 and a 1 second jitter bound.
    pub fn new(
        callback: F,
        initial_delay: Duration,
        max_retries: u32,
        multiplier: u32,
        jitter_bound_secs: u32,
        logger: Option<SharedLogger>,
    ) -> Self {
        Self::from_config(
            callback,
            RetryConfig::new(initial_delay, max_retries, multiplier, jitter_bound_secs),
            logger,
        )
    }

    pub fn from_config(callback: F, config: RetryConfig, logger: Option<SharedLogger>) -> Self {
        Self {
            callback,
            config: config.normalized(),
            logger,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn generate_jitter(&self, bound_secs: u32) -> Duration {
        generate_jitter(bound_secs)
    }

    /// Run the callback until it succeeds, attempts run out, or `ctx` is done.
    ///
    /// On exhaustion the last callback error is returned unchanged inside
    /// [`RetryError::Exhausted`]. A done context always wins with
    /// [`RetryError::Context`], including in the middle of a backoff delay.
    pub async fn execute<Fut, T, E>(&self, ctx: &Context) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            if let Some(err) = ctx.err() {
                return Err(RetryError::Context(err));
            }

            let last_error = match (self.callback)().await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            if attempt + 1 >= max_retries {
                if let Some(logger) = &self.logger {
                    logger.warn(ctx, "retry attempts exhausted", &[("attempts", &max_retries)]);
                }
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last_error,
                });
            }

            let delay = backoff_delay(self.config.initial_delay, self.config.multiplier, attempt);
            let jitter = generate_jitter(self.config.jitter_bound_secs);
            let total_delay = delay.saturating_add(jitter);

            if let Some(logger) = &self.logger {
                logger.debug(
                    ctx,
                    "retry scheduled",
                    &[
                        ("attempt", &attempt),
                        ("delay", &delay),
                        ("jitter", &jitter),
                        ("total_delay", &total_delay),
                    ],
                );
            }

            tokio::select! {
                biased;
                err = ctx.done() => return Err(RetryError::Context(err)),
                _ = tokio::time::sleep(total_delay) => {}
            }

            attempt += 1;
        }
    }
}

/// `initial * multiplier^attempt`, saturating instead of overflowing
pub fn backoff_delay(initial: Duration, multiplier: u32, attempt: u32) -> Duration {
    let factor = multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
    initial.saturating_mul(factor)
}

/// Random whole-second jitter in `0..bound_secs`.
///
/// Draws one byte from the OS random source and reduces it modulo the bound.
/// If the random source fails the bound itself is used, which reduces to zero.
pub fn generate_jitter(bound_secs: u32) -> Duration {
    let bound = bound_secs.max(1);
    let mut byte = [0u8; 1];

    let sample = match OsRng.try_fill_bytes(&mut byte) {
        Ok(()) => u32::from(byte[0]),
        Err(_) => bound,
    };

    Duration::from_secs(u64::from(sample % bound))
}

/// Execute a future-producing callback with retry logic
pub async fn with_retry<F, Fut, T, E>(
    ctx: &Context,
    config: RetryConfig,
    callback: F,
) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    ExponentialBackoffRetry::from_config(callback, config, None)
        .execute(ctx)
        .await
}
