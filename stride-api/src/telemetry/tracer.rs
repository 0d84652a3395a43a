//! Tracing Subscriber Initialization

use std::str::FromStr;

use stride_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "stride_api=debug,tower_http=info,info";

/// Filter used in production when `RUST_LOG` is unset.
pub const PRODUCTION_LOG_FILTER: &str = "stride_api=info,tower_http=warn,info";

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::InvalidValue {
                field: "STRIDE_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected json or pretty".to_string(),
            }),
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every event
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    pub log_format: LogFormat,
    /// Expose `/metrics` and record request metrics
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "stride-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            service_name: lookup("STRIDE_SERVICE_NAME").unwrap_or(defaults.service_name),
            service_version: lookup("STRIDE_SERVICE_VERSION").unwrap_or(defaults.service_version),
            environment: lookup("STRIDE_ENVIRONMENT").unwrap_or(defaults.environment),
            log_format: match lookup("STRIDE_LOG_FORMAT") {
                Some(value) => value.parse()?,
                None => defaults.log_format,
            },
            metrics_enabled: lookup("STRIDE_METRICS_ENABLED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.metrics_enabled),
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "production" | "prod"
        )
    }

    /// Filter to install when `RUST_LOG` does not name one.
    pub fn default_log_filter(&self) -> &'static str {
        if self.is_production() {
            PRODUCTION_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup, before anything logs. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));

    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().pretty()))
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.service_name, "stride-api");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.metrics_enabled);
        assert!(!config.is_production());
    }

    #[test]
    fn test_telemetry_config_overrides() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "STRIDE_LOG_FORMAT" => Some("pretty".to_string()),
            "STRIDE_METRICS_ENABLED" => Some("false".to_string()),
            "STRIDE_ENVIRONMENT" => Some("Production".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.metrics_enabled);
        assert!(config.is_production());
    }

    #[test]
    fn test_production_logs_quieter_by_default() {
        let dev = TelemetryConfig::default();
        assert_eq!(dev.default_log_filter(), DEFAULT_LOG_FILTER);

        let prod = TelemetryConfig {
            environment: "prod".to_string(),
            ..TelemetryConfig::default()
        };
        assert_eq!(prod.default_log_filter(), PRODUCTION_LOG_FILTER);
        assert!(!prod.default_log_filter().contains("debug"));
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
