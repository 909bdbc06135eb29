//! Lock-free circuit breaker
//!
//! State transitions:
//! - Closed → Open: when consecutive failures reach the threshold
//! - Open → HalfOpen: on the first call after the recovery timeout elapsed
//! - HalfOpen → Closed: when the single trial call succeeds
//! - HalfOpen → Open: when the trial call fails
//!
//! Transitions are evaluated lazily inside [`CircuitBreaker::execute`]; there is
//! no background timer. All state lives in atomics, so concurrent callers may
//! interleave between the state read and the operation call. The HalfOpen trial
//! gate is the only point of mutual exclusion.
use crate::config::CircuitBreakerConfig;
use crate::context::Context;
use crate::logger::SharedLogger;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed = 0,
    /// Circuit is open, requests go straight to the fallback
    Open = 1,
    /// Testing if the dependency recovered, a single trial call is allowed
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

/// Circuit breaker guarding operations that produce a `T`.
///
/// Cloning is cheap and every clone shares the same state.
pub struct CircuitBreaker<T> {
    inner: Arc<Inner>,
    _result: PhantomData<fn() -> T>,
}

struct Inner {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    logger: Option<SharedLogger>,
    state: AtomicU8,
    failure_count: AtomicU64,
    /// Nanoseconds since `epoch` plus one; zero means no failure recorded
    last_failure: AtomicU64,
    epoch: Instant,
    half_open_gate: AtomicBool,
}

impl<T> Clone for CircuitBreaker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CircuitBreaker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("failure_threshold", &self.inner.failure_threshold)
            .field("recovery_timeout", &self.inner.recovery_timeout)
            .finish()
    }
}

/// Holds the HalfOpen trial slot; releases it on drop
struct TrialGuard<'a> {
    gate: &'a AtomicBool,
}

impl<'a> TrialGuard<'a> {
    fn acquire(gate: &'a AtomicBool) -> Option<Self> {
        gate.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { gate })
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

impl<T> CircuitBreaker<T> {
    /// Create a breaker in the Closed state.
    ///
    /// A zero `failure_threshold` becomes 1 and a zero `recovery_timeout` becomes 30s.
    pub fn new(
        failure_threshold: u32,
        recovery_timeout: Duration,
        logger: Option<SharedLogger>,
    ) -> Self {
        Self::from_config(
            CircuitBreakerConfig::new(failure_threshold, recovery_timeout),
            logger,
        )
    }

    pub fn from_config(config: CircuitBreakerConfig, logger: Option<SharedLogger>) -> Self {
        let config = config.normalized();
        let name = config
            .name
            .unwrap_or_else(|| std::any::type_name::<T>().to_string());

        Self {
            inner: Arc::new(Inner {
                name,
                failure_threshold: config.failure_threshold,
                recovery_timeout: config.recovery_timeout,
                logger,
                state: AtomicU8::new(CircuitState::Closed as u8),
                failure_count: AtomicU64::new(0),
                last_failure: AtomicU64::new(0),
                epoch: Instant::now(),
                half_open_gate: AtomicBool::new(false),
            }),
            _result: PhantomData,
        }
    }

    /// Run `operation` under circuit breaker protection.
    ///
    /// `fallback` is used instead when the context is already done, when the
    /// circuit is open, when another caller holds the HalfOpen trial, or when
    /// `operation` fails. Only the fallback's outcome reaches the caller in
    /// those cases; the operation error is logged and dropped.
    pub async fn execute<Op, OpFut, OpErr, Fb, FbFut, E>(
        &self,
        ctx: &Context,
        operation: Op,
        fallback: Fb,
    ) -> Result<T, E>
    where
        Op: FnOnce() -> OpFut,
        OpFut: Future<Output = Result<T, OpErr>>,
        OpErr: fmt::Display,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        if ctx.is_done() {
            return fallback().await;
        }

        if self.state() == CircuitState::Open {
            if !self.recovery_timeout_elapsed() {
                return fallback().await;
            }
            self.transition_to_half_open(ctx);
        }

        let _trial = if self.state() == CircuitState::HalfOpen {
            match TrialGuard::acquire(&self.inner.half_open_gate) {
                Some(guard) => Some(guard),
                None => return fallback().await,
            }
        } else {
            None
        };

        match operation().await {
            Ok(result) => {
                self.record_success(ctx);
                Ok(result)
            }
            Err(err) => {
                self.record_failure(ctx, &err);
                fallback().await
            }
        }
    }

    fn recovery_timeout_elapsed(&self) -> bool {
        match self.last_failure_at() {
            Some(at) => at.elapsed() > self.inner.recovery_timeout,
            // Reset raced with the read; let a trial through
            None => true,
        }
    }

    fn transition_to_half_open(&self, ctx: &Context) {
        let moved = self
            .inner
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if moved {
            if let Some(logger) = &self.inner.logger {
                logger.debug(
                    ctx,
                    "circuit breaker half-open",
                    &[("type_name", &self.inner.name)],
                );
            }
        }
    }

    fn record_success(&self, ctx: &Context) {
        let previous = self.reset_inner();

        if previous != CircuitState::Closed {
            if let Some(logger) = &self.inner.logger {
                logger.debug(
                    ctx,
                    "circuit breaker closed",
                    &[
                        ("type_name", &self.inner.name),
                        ("previous_state", &previous),
                    ],
                );
            }
        }
    }

    fn record_failure(&self, ctx: &Context, err: &dyn fmt::Display) {
        let failures = self.inner.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self.state();

        if let Some(logger) = &self.inner.logger {
            logger.debug(
                ctx,
                "circuit breaker operation failed",
                &[
                    ("type_name", &self.inner.name),
                    ("error", &err.to_string()),
                ],
            );
        }

        // A HalfOpen failure reopens regardless of the threshold
        if failures >= u64::from(self.inner.failure_threshold) || previous == CircuitState::HalfOpen
        {
            if let Some(logger) = &self.inner.logger {
                logger.debug(
                    ctx,
                    "circuit breaker opened",
                    &[
                        ("type_name", &self.inner.name),
                        ("failure_count", &failures),
                        ("previous_state", &previous),
                    ],
                );
            }

            // Stamp first so a caller that observes Open also sees the time
            self.stamp_failure();
            self.inner
                .state
                .store(CircuitState::Open as u8, Ordering::Release);
        }
    }

    fn stamp_failure(&self) {
        let nanos = u64::try_from(self.inner.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX - 1);
        self.inner
            .last_failure
            .store(nanos.saturating_add(1), Ordering::Release);
    }

    fn reset_inner(&self) -> CircuitState {
        self.inner.failure_count.store(0, Ordering::Release);
        let previous = self
            .inner
            .state
            .swap(CircuitState::Closed as u8, Ordering::AcqRel);
        self.inner.last_failure.store(0, Ordering::Release);
        CircuitState::from_u8(previous)
    }

    /// Force the Closed state, zero the failure count and clear the last failure time
    pub fn reset(&self) {
        self.reset_inner();
    }

    /// Get current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn failure_count(&self) -> u64 {
        self.inner.failure_count.load(Ordering::Acquire)
    }

    /// Time of the failure that last opened the circuit
    pub fn last_failure_at(&self) -> Option<Instant> {
        match self.inner.last_failure.load(Ordering::Acquire) {
            0 => None,
            stamp => Some(self.inner.epoch + Duration::from_nanos(stamp - 1)),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn failure_threshold(&self) -> u32 {
        self.inner.failure_threshold
    }

    pub fn recovery_timeout(&self) -> Duration {
        self.inner.recovery_timeout
    }
}
