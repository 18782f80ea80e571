use alloy::primitives::Address;
use paygate::DEFAULT_CONTRACT;
use std::env;
use std::time::Duration;

const DEFAULT_PORT: u16 = 4024;
const DEFAULT_DB_PATH: &str = "./paygate.db";
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// `DB_PATH` value selecting the non-persistent store.
pub const IN_MEMORY_DB: &str = ":memory:";

#[derive(Clone)]
pub struct GatewayConfig {
    /// Server port
    pub port: u16,
    /// SQLite database path, or `:memory:`
    pub db_path: String,
    /// Payment router contract quoted in 402 responses
    pub contract: Address,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Upstream request timeout
    pub upstream_timeout: Duration,
    /// Permit plain-HTTP and private-network upstreams (local development)
    pub allow_private_upstreams: bool,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("contract", &self.contract)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("allow_private_upstreams", &self.allow_private_upstreams)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: DEFAULT_DB_PATH.to_string(),
            contract: DEFAULT_CONTRACT,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            rate_limit_rpm: DEFAULT_RATE_LIMIT_RPM,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            allow_private_upstreams: false,
            metrics_token: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "yes")
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Build from an arbitrary variable source; unset names keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.port = parse_var("PORT", port)?;
        }
        if let Some(db_path) = lookup("DB_PATH") {
            config.db_path = db_path;
        }
        if let Some(contract) = lookup("PAYGATE_CONTRACT") {
            config.contract = contract
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(contract))?;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(rpm) = lookup("RATE_LIMIT_RPM") {
            config.rate_limit_rpm = parse_var("RATE_LIMIT_RPM", rpm)?;
            if config.rate_limit_rpm == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "RATE_LIMIT_RPM",
                    value: "0".to_string(),
                });
            }
        }
        if let Some(secs) = lookup("UPSTREAM_TIMEOUT_SECS") {
            config.upstream_timeout =
                Duration::from_secs(parse_var("UPSTREAM_TIMEOUT_SECS", secs)?);
        }
        if let Some(flag) = lookup("ALLOW_PRIVATE_UPSTREAMS") {
            config.allow_private_upstreams = parse_flag(&flag);
        }
        config.metrics_token = lookup("METRICS_TOKEN");

        // Wildcard CORS is a development convenience only
        if config.allowed_origins.iter().any(|o| o == "*") && !config.allow_private_upstreams {
            tracing::error!(
                "Wildcard CORS origin '*' is only allowed with ALLOW_PRIVATE_UPSTREAMS=true (dev mode)"
            );
            return Err(ConfigError::WildcardOrigin);
        }

        if config.allow_private_upstreams {
            tracing::warn!(
                "ALLOW_PRIVATE_UPSTREAMS=true: gates may proxy to private addresses. Do not use in production"
            );
        }
        if config.metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is publicly accessible");
        }

        Ok(config)
    }

    pub fn in_memory(&self) -> bool {
        self.db_path == IN_MEMORY_DB
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("wildcard CORS origin '*' is not allowed outside dev mode")]
    WildcardOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 4024);
        assert_eq!(config.db_path, "./paygate.db");
        assert_eq!(config.contract, DEFAULT_CONTRACT);
        assert_eq!(config.rate_limit_rpm, 120);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert!(!config.allow_private_upstreams);
        assert!(!config.in_memory());
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("DB_PATH", ":memory:"),
            ("PAYGATE_CONTRACT", "0x2222222222222222222222222222222222222222"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("UPSTREAM_TIMEOUT_SECS", "5"),
            ("METRICS_TOKEN", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.in_memory());
        assert_eq!(config.contract, Address::repeat_byte(0x22));
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("PORT", "http")])),
            Err(ConfigError::InvalidValue { name: "PORT", .. })
        ));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("PAYGATE_CONTRACT", "0x12")])),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("RATE_LIMIT_RPM", "0")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_wildcard_origin_requires_dev_mode() {
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("ALLOWED_ORIGINS", "*")])),
            Err(ConfigError::WildcardOrigin)
        ));
        let config = GatewayConfig::from_lookup(lookup(&[
            ("ALLOWED_ORIGINS", "*"),
            ("ALLOW_PRIVATE_UPSTREAMS", "true"),
        ]))
        .unwrap();
        assert!(config.allow_private_upstreams);
    }
}
