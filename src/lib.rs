//! Fault-tolerance primitives for unreliable operations
//!
//! This library provides two independent patterns that callers compose as
//! they see fit:
//! - **Circuit Breaker**: stops calling a failing dependency for a cooldown
//!   period and serves a fallback meanwhile
//! - **Retry**: exponential backoff with whole-second jitter, interruptible by
//!   a [`Context`] deadline or cancellation
//! - **Preset Configurations**: pre-tuned settings for gRPC, database, Redis, etc.
//!
//! # Example: circuit breaker with fallback
//!
//! ```rust,no_run
//! use failguard::{presets, CircuitBreaker, Context, TracingLogger};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = presets::grpc_config();
//!     let breaker = CircuitBreaker::<String>::from_config(
//!         config.circuit_breaker,
//!         Some(TracingLogger::shared()),
//!     );
//!
//!     let profile = breaker
//!         .execute(
//!             &Context::background(),
//!             || async { Err::<String, _>("upstream unavailable") },
//!             || async { Ok::<_, std::io::Error>("cached profile".to_string()) },
//!         )
//!         .await;
//! }
//! ```
//!
//! # Example: retry bounded by a deadline
//!
//! ```rust,no_run
//! use failguard::{Context, ExponentialBackoffRetry};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let retry = ExponentialBackoffRetry::new(
//!         || async { Ok::<_, String>(42) },
//!         Duration::from_millis(100),
//!         5,
//!         2,
//!         1,
//!         None,
//!     );
//!
//!     let result = retry.execute(&Context::with_timeout(Duration::from_secs(30))).await;
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod logger;
pub mod presets;
pub mod retry;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerConfig, ConfigError, RetryConfig};
pub use context::{Context, ContextError};
pub use logger::{Field, Level, LogRecord, Logger, MemoryLogger, SharedLogger, TracingLogger};
pub use presets::{
    database_config, grpc_config, http_external_config, kafka_config, redis_config, ServiceConfig,
};
pub use retry::{backoff_delay, generate_jitter, with_retry, ExponentialBackoffRetry, RetryError};
