//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, ClientPropertiesVariant, ConfigError, DetectionConfig, GatewayConfig, LogConfig,
    ProxyConfig, ProxyScheme, SameTickPolicy, APP_NAME,
};
