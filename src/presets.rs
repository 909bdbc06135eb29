//! Preset configurations for common dependency types
use crate::config::{CircuitBreakerConfig, RetryConfig};
use std::time::Duration;

/// Configuration bundle for a dependency type
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: Option<RetryConfig>,
}

/// gRPC service calls (internal microservices)
///
/// - Circuit breaker: 5 failures, 60s cooldown
/// - Retry: 3 attempts from 100ms, no more than 1s of jitter
pub fn grpc_config() -> ServiceConfig {
    ServiceConfig {
        circuit_breaker: CircuitBreakerConfig::new(5, Duration::from_secs(60)),
        retry: Some(RetryConfig::new(Duration::from_millis(100), 3, 2, 1)),
    }
}

/// Database queries (PostgreSQL, MySQL)
///
/// - Circuit breaker: 10 failures, 30s cooldown
/// - No retry (avoid duplicate writes)
pub fn database_config() -> ServiceConfig {
    ServiceConfig {
        circuit_breaker: CircuitBreakerConfig::new(10, Duration::from_secs(30)),
        retry: None,
    }
}

/// Redis/Cache operations
///
/// - Circuit breaker: 3 failures, 15s cooldown
/// - Retry: 2 attempts (idempotent reads)
pub fn redis_config() -> ServiceConfig {
    ServiceConfig {
        circuit_breaker: CircuitBreakerConfig::new(3, Duration::from_secs(15)),
        retry: Some(RetryConfig::new(Duration::from_millis(50), 2, 2, 1)),
    }
}

/// External HTTP APIs (third-party services)
///
/// - Circuit breaker: 5 failures, 120s cooldown
/// - Retry: 5 attempts with longer backoff and up to 3s of jitter
pub fn http_external_config() -> ServiceConfig {
    ServiceConfig {
        circuit_breaker: CircuitBreakerConfig::new(5, Duration::from_secs(120)),
        retry: Some(RetryConfig::new(Duration::from_millis(500), 5, 2, 3)),
    }
}

/// Kafka producer operations
pub fn kafka_config() -> ServiceConfig {
    ServiceConfig {
        circuit_breaker: CircuitBreakerConfig::new(5, Duration::from_secs(30)),
        retry: Some(RetryConfig::new(Duration::from_millis(100), 3, 2, 1)),
    }
}
