//! # rpc-common
//!
//! Shared utilities including configuration, error handling, and telemetry.

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppConfig, ClientPropertiesVariant, ConfigError, DetectionConfig, GatewayConfig, LogConfig,
    ProxyConfig, ProxyScheme, SameTickPolicy, APP_NAME,
};
pub use error::{AppError, AppResult};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
