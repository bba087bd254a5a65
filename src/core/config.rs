//! # Configuration Module
//!
//! This module holds the service configuration and the logic that assembles it at
//! start-up.
//!
//! ## Key Features
//! - YAML configuration parsing with serde, every section optional
//! - Environment variable overrides (including the standard Jaeger agent variables)
//! - Validation with error messages naming the offending field
//!
//! Configuration is read once. The resulting [`AppConfig`] is immutable and shared
//! with the handlers through the application state.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{ServiceError, ServiceResult};
use crate::observability::config::ObservabilityConfig;

/// Environment variable holding an optional YAML configuration file path
pub const CONFIG_PATH_ENV: &str = "OBS_DEMO_CONFIG_PATH";

/// Main service configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener and shutdown settings
    pub server: ServerConfig,

    /// Simulated work settings for `/` and `/work`
    pub work: WorkConfig,

    /// Observability settings (metrics, logging, tracing)
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// How long in-flight requests get to finish once a shutdown signal arrives
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    /// Fixed delay performed by the root handler
    #[serde(with = "humantime_serde")]
    pub root_delay: Duration,
    /// Delay used by `/work` when `t` is absent
    pub default_delay_secs: f64,
    /// Upper bound of the delay `/work` actually sleeps
    pub max_delay_secs: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            root_delay: Duration::from_millis(50),
            default_delay_secs: 0.1,
            max_delay_secs: 2.0,
        }
    }
}

impl ServerConfig {
    /// Socket address the listener binds to
    pub fn socket_addr(&self) -> ServiceResult<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| ServiceError::config(format!("Invalid bind address: {}", e)))
    }
}

impl AppConfig {
    /// Build the configuration from the process environment
    ///
    /// If `OBS_DEMO_CONFIG_PATH` is set the file is parsed first; environment
    /// overrides are applied on top and the result is validated.
    pub async fn load() -> ServiceResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(&path).await?,
            Err(_) => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file without applying overrides
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ServiceResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| ServiceError::config(format!("Failed to read config file: {}", e)))?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> ServiceResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ServiceResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Tracing: the standard OpenTelemetry Jaeger agent variables
        if let Some(host) = lookup("OTEL_EXPORTER_JAEGER_AGENT_HOST") {
            self.observability.tracing.agent_host = host;
        }

        if let Some(port) = lookup("OTEL_EXPORTER_JAEGER_AGENT_PORT") {
            self.observability.tracing.agent_port = port.trim().parse().map_err(|e| {
                ServiceError::config(format!("Invalid OTEL_EXPORTER_JAEGER_AGENT_PORT: {}", e))
            })?;
        }

        if let Some(name) = lookup("OTEL_SERVICE_NAME") {
            self.observability.tracing.service_name = name;
        }

        if let Some(interval) = lookup("OBS_DEMO_TRACING_RECONNECT_INTERVAL") {
            self.observability.tracing.reconnect_interval =
                humantime::parse_duration(interval.trim()).map_err(|e| {
                    ServiceError::config(format!(
                        "Invalid OBS_DEMO_TRACING_RECONNECT_INTERVAL: {}",
                        e
                    ))
                })?;
        }

        if let Some(enabled) = lookup("OBS_DEMO_TRACING_ENABLED") {
            self.observability.tracing.enabled = enabled.trim().parse().map_err(|e| {
                ServiceError::config(format!("Invalid OBS_DEMO_TRACING_ENABLED: {}", e))
            })?;
        }

        // Server
        if let Some(addr) = lookup("OBS_DEMO_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("OBS_DEMO_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ServiceError::config(format!("Invalid OBS_DEMO_PORT: {}", e)))?;
        }

        // Work
        if let Some(delay) = lookup("OBS_DEMO_ROOT_DELAY") {
            self.work.root_delay = humantime::parse_duration(delay.trim()).map_err(|e| {
                ServiceError::config(format!("Invalid OBS_DEMO_ROOT_DELAY: {}", e))
            })?;
        }

        // Logging
        if let Some(level) = lookup("OBS_DEMO_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("OBS_DEMO_LOG_FORMAT") {
            self.observability.logging.format = format.parse()?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ServiceResult<()> {
        self.server.socket_addr()?;

        let work = &self.work;
        if !work.default_delay_secs.is_finite() || work.default_delay_secs < 0.0 {
            return Err(ServiceError::config(
                "work.default_delay_secs must be a non-negative number",
            ));
        }
        if !work.max_delay_secs.is_finite() || work.max_delay_secs < 0.0 {
            return Err(ServiceError::config(
                "work.max_delay_secs must be a non-negative number",
            ));
        }

        let metrics = &self.observability.metrics;
        if !metrics.endpoint.starts_with('/') {
            return Err(ServiceError::config(format!(
                "observability.metrics.endpoint must start with '/': {}",
                metrics.endpoint
            )));
        }
        if metrics.latency_buckets.is_empty() {
            return Err(ServiceError::config(
                "observability.metrics.latency_buckets must not be empty",
            ));
        }
        if metrics
            .latency_buckets
            .windows(2)
            .any(|pair| !(pair[0] < pair[1]))
        {
            return Err(ServiceError::config(
                "observability.metrics.latency_buckets must be strictly increasing",
            ));
        }

        if self.observability.tracing.reconnect_interval.is_zero() {
            return Err(ServiceError::config(
                "observability.tracing.reconnect_interval must be greater than zero",
            ));
        }

        if self.observability.tracing.service_name.trim().is_empty() {
            return Err(ServiceError::config(
                "observability.tracing.service_name must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::config::LogFormat;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_service_constants() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.work.root_delay, Duration::from_millis(50));
        assert_eq!(config.work.default_delay_secs, 0.1);
        assert_eq!(config.work.max_delay_secs, 2.0);
        assert_eq!(config.observability.tracing.agent_host, "jaeger");
        assert_eq!(config.observability.tracing.agent_port, 6831);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("OTEL_EXPORTER_JAEGER_AGENT_HOST", "localhost"),
                ("OTEL_EXPORTER_JAEGER_AGENT_PORT", "6832"),
                ("OBS_DEMO_PORT", "8080"),
                ("OBS_DEMO_ROOT_DELAY", "10ms"),
                ("OBS_DEMO_LOG_FORMAT", "text"),
                ("OBS_DEMO_TRACING_ENABLED", "false"),
                ("OBS_DEMO_TRACING_RECONNECT_INTERVAL", "250ms"),
            ]))
            .unwrap();

        assert_eq!(config.observability.tracing.agent_endpoint(), "localhost:6832");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.work.root_delay, Duration::from_millis(10));
        assert_eq!(config.observability.logging.format, LogFormat::Text);
        assert!(!config.observability.tracing.enabled);
        assert_eq!(
            config.observability.tracing.reconnect_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_invalid_env_override_names_variable() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("OTEL_EXPORTER_JAEGER_AGENT_PORT", "jaeger")]))
            .unwrap_err();
        assert!(err.to_string().contains("OTEL_EXPORTER_JAEGER_AGENT_PORT"));
    }

    #[test]
    fn test_validation_rejects_bad_buckets() {
        let mut config = AppConfig::default();
        config.observability.metrics.latency_buckets = vec![0.1, 0.1, 1.0];
        assert!(config.validate().is_err());

        config.observability.metrics.latency_buckets.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_delays() {
        let mut config = AppConfig::default();
        config.work.max_delay_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.work.default_delay_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_reconnect_interval() {
        let mut config = AppConfig::default();
        config.observability.tracing.reconnect_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:0");

        let bad = ServerConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
