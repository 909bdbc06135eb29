//! Configuration for the circuit breaker and the retry driver
//!
//! Zero is treated as "not set" and replaced by the matching default.
use std::time::Duration;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 1;
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MULTIPLIER: u32 = 2;
pub const DEFAULT_JITTER_BOUND_SECS: u32 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failure count to trigger circuit open
    pub failure_threshold: u32,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub recovery_timeout: Duration,
    /// Label used in log output; defaults to the guarded result type name
    pub name: Option<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            name: None,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            name: None,
        }
        .normalized()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn normalized(mut self) -> Self {
        if self.failure_threshold == 0 {
            self.failure_threshold = DEFAULT_FAILURE_THRESHOLD;
        }
        if self.recovery_timeout.is_zero() {
            self.recovery_timeout = DEFAULT_RECOVERY_TIMEOUT;
        }
        self
    }

    /// Load from `{PREFIX}_FAILURE_THRESHOLD` and `{PREFIX}_RECOVERY_TIMEOUT_MS`.
    /// Unset variables fall back to the defaults.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            failure_threshold: env_or(prefix, "FAILURE_THRESHOLD", defaults.failure_threshold)?,
            recovery_timeout: env_millis_or(prefix, "RECOVERY_TIMEOUT_MS", defaults.recovery_timeout)?,
            name: std::env::var(env_key(prefix, "NAME")).ok(),
        }
        .normalized())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the first retry; later delays grow geometrically
    pub initial_delay: Duration,
    /// Total number of attempts, including the first call
    pub max_retries: u32,
    /// Growth factor applied per attempt
    pub multiplier: u32,
    /// Jitter is drawn from `0..jitter_bound_secs` whole seconds
    pub jitter_bound_secs: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_bound_secs: DEFAULT_JITTER_BOUND_SECS,
        }
    }
}

impl RetryConfig {
    pub fn new(
        initial_delay: Duration,
        max_retries: u32,
        multiplier: u32,
        jitter_bound_secs: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_retries,
            multiplier,
            jitter_bound_secs,
        }
        .normalized()
    }

    pub fn normalized(mut self) -> Self {
        if self.initial_delay.is_zero() {
            self.initial_delay = DEFAULT_INITIAL_DELAY;
        }
        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        if self.multiplier == 0 {
            self.multiplier = DEFAULT_MULTIPLIER;
        }
        if self.jitter_bound_secs == 0 {
            self.jitter_bound_secs = DEFAULT_JITTER_BOUND_SECS;
        }
        self
    }

    /// Load from `{PREFIX}_INITIAL_DELAY_MS`, `{PREFIX}_MAX_RETRIES`,
    /// `{PREFIX}_MULTIPLIER` and `{PREFIX}_JITTER_BOUND_SECS`
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            initial_delay: env_millis_or(prefix, "INITIAL_DELAY_MS", defaults.initial_delay)?,
            max_retries: env_or(prefix, "MAX_RETRIES", defaults.max_retries)?,
            multiplier: env_or(prefix, "MULTIPLIER", defaults.multiplier)?,
            jitter_bound_secs: env_or(prefix, "JITTER_BOUND_SECS", defaults.jitter_bound_secs)?,
        }
        .normalized())
    }
}

fn env_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}

fn env_or<T: std::str::FromStr>(prefix: &str, name: &str, default: T) -> Result<T, ConfigError> {
    let key = env_key(prefix, name);
    match std::env::var(&key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn env_millis_or(prefix: &str, name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let default_millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    let millis = env_or(prefix, name, default_millis)?;
    Ok(Duration::from_millis(millis))
}
