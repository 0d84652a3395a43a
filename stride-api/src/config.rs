//! API Configuration Module
//!
//! Server binding, CORS, caller identity and store selection. Values are read
//! once at startup from environment variables, with defaults suited to local
//! development.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use stride_core::ConfigError;

/// Default header carrying the authenticated caller's user id.
pub const DEFAULT_USER_HEADER: &str = "x-user-id";

// ============================================================================
// STORE MODE
// ============================================================================

/// Which [`stride_storage::LearningStore`] backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    #[default]
    Postgres,
    /// Process-local store, empty at startup. Development only.
    Memory,
}

impl FromStr for StoreMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreMode::Postgres),
            "memory" | "mem" => Ok(StoreMode::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "STRIDE_STORE".to_string(),
                value: other.to_string(),
                reason: "expected postgres or memory".to_string(),
            }),
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMode::Postgres => write!(f, "postgres"),
            StoreMode::Memory => write!(f, "memory"),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for binding, CORS and caller identity.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind: String,

    pub port: u16,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Identity and Storage
    // ========================================================================
    /// Trusted header set by the upstream auth layer, lowercase.
    pub user_header: String,

    pub store: StoreMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            user_header: DEFAULT_USER_HEADER.to_string(),
            store: StoreMode::Postgres,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `STRIDE_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `STRIDE_API_PORT`: Listen port (default: 3000)
    /// - `STRIDE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `STRIDE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `STRIDE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `STRIDE_USER_HEADER`: Caller identity header (default: x-user-id)
    /// - `STRIDE_STORE`: "postgres" or "memory" (default: postgres)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = lookup("STRIDE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = lookup("STRIDE_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.cors_allow_credentials);

        let port_key = if lookup("PORT").is_some() {
            "PORT"
        } else {
            "STRIDE_API_PORT"
        };

        let user_header = lookup("STRIDE_USER_HEADER")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.user_header);
        if axum::http::HeaderName::from_bytes(user_header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "STRIDE_USER_HEADER".to_string(),
                value: user_header,
                reason: "not a valid header name".to_string(),
            });
        }

        Ok(Self {
            bind: lookup("STRIDE_API_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, port_key, defaults.port)?,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: parse_var(
                &lookup,
                "STRIDE_CORS_MAX_AGE_SECS",
                defaults.cors_max_age_secs,
            )?,
            user_header,
            store: match lookup("STRIDE_STORE") {
                Some(value) => value.parse()?,
                None => defaults.store,
            },
        })
    }

    /// Socket address the server listens on.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "STRIDE_API_BIND".to_string(),
                value: addr,
                reason: e.to_string(),
            })
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            // Dev mode: allow all
            return true;
        }
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub(crate) fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.user_header, "x-user-id");
        assert_eq!(config.store, StoreMode::Postgres);
    }

    #[test]
    fn test_port_prefers_platform_variable() {
        let config =
            ApiConfig::from_lookup(vars(&[("PORT", "8080"), ("STRIDE_API_PORT", "9090")]))
                .unwrap();
        assert_eq!(config.port, 8080);

        let config = ApiConfig::from_lookup(vars(&[("STRIDE_API_PORT", "9090")])).unwrap();
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = ApiConfig::from_lookup(vars(&[("STRIDE_API_PORT", "ninety")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "STRIDE_API_PORT"));
    }

    #[test]
    fn test_store_mode_parsing() {
        let config = ApiConfig::from_lookup(vars(&[("STRIDE_STORE", "Memory")])).unwrap();
        assert_eq!(config.store, StoreMode::Memory);
        assert!(ApiConfig::from_lookup(vars(&[("STRIDE_STORE", "redis")])).is_err());
    }

    #[test]
    fn test_user_header_is_normalized() {
        let config =
            ApiConfig::from_lookup(vars(&[("STRIDE_USER_HEADER", "X-Learner-Id")])).unwrap();
        assert_eq!(config.user_header, "x-learner-id");
        assert!(ApiConfig::from_lookup(vars(&[("STRIDE_USER_HEADER", "bad header")])).is_err());
    }

    #[test]
    fn test_origin_allowed() {
        let dev = ApiConfig::default();
        assert!(dev.is_origin_allowed("https://anything.example"));

        let config = ApiConfig::from_lookup(vars(&[(
            "STRIDE_CORS_ORIGINS",
            "https://learn.example, https://admin.example",
        )]))
        .unwrap();
        assert!(config.is_origin_allowed("https://learn.example"));
        assert!(config.is_origin_allowed("https://admin.example"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig {
            bind: "127.0.0.1".to_string(),
            port: 4000,
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().port(), 4000);

        let bad = ApiConfig {
            bind: "not an address".to_string(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
