//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → resolved per endpoint into EndpointSettings
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → EndpointRegistry::apply_config reconfigures live executors
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Reload keeps limiter, breaker and cache state; only parameters change

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BurstConfig, CacheConfig, CircuitBreakerConfig, ClientConfig, EndpointConfig,
    EndpointSettings, ExecutorConfig, ObservabilityConfig, RateLimitConfig, RetryConfig,
    TransportConfig,
};
