use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::ServiceError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics: MetricsConfig,
    pub logging: LogConfig,
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether the exposition route is mounted
    pub enabled: bool,
    /// Path of the exposition route
    pub endpoint: String,
    /// Upper bounds of the latency histogram buckets, in seconds
    pub latency_buckets: Vec<f64>,
    /// Include `process_*` series (CPU, memory, file descriptors) in every scrape
    pub process_metrics: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Value of the `logger` field on request log records
    pub logger_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub service_name: String,
    pub agent_host: String,
    pub agent_port: u16,
    /// Delay between attempts to resolve an agent that was unreachable at start-up
    #[serde(with = "humantime_serde")]
    pub reconnect_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(ServiceError::config(format!(
                "Unknown log format '{}', expected 'json' or 'text'",
                other
            ))),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
            // Prometheus client default buckets
            latency_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
            ],
            process_metrics: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            logger_name: "obs_demo".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "obs-demo-app".to_string(),
            agent_host: "jaeger".to_string(),
            agent_port: 6831,
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

impl TracingConfig {
    /// `host:port` of the Jaeger agent
    pub fn agent_endpoint(&self) -> String {
        format!("{}:{}", self.agent_host, self.agent_port)
    }
}
