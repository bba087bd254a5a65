use std::io::Write;
use std::time::Duration;

use obs_demo::observability::LogFormat;
use obs_demo::AppConfig;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_load_from_yaml_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
server:
  port: 8081
  shutdown_timeout: 5s
work:
  root_delay: 10ms
  max_delay_secs: 1.5
observability:
  logging:
    level: debug
    format: text
  tracing:
    agent_host: collector.local
"#
    )
    .unwrap();

    let config = AppConfig::load_from_file(file.path()).await.unwrap();
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.shutdown_timeout, Duration::from_secs(5));
    assert_eq!(config.work.root_delay, Duration::from_millis(10));
    assert_eq!(config.work.max_delay_secs, 1.5);
    assert_eq!(config.observability.logging.level, "debug");
    assert_eq!(config.observability.logging.format, LogFormat::Text);
    assert_eq!(config.observability.tracing.agent_host, "collector.local");

    // Unspecified fields keep their defaults
    assert_eq!(config.server.bind_address, "0.0.0.0");
    assert_eq!(config.work.default_delay_secs, 0.1);
    assert_eq!(config.observability.tracing.agent_port, 6831);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_file_overrides_then_env_overrides() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  port: 8081").unwrap();

    let mut config = AppConfig::load_from_file(file.path()).await.unwrap();
    config
        .apply_overrides(|key| match key {
            "OBS_DEMO_PORT" => Some("9090".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.server.port, 9090);
}

#[tokio::test]
async fn test_malformed_yaml_is_yaml_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "server: [not, a, mapping").unwrap();

    let err = AppConfig::load_from_file(file.path()).await.unwrap_err();
    assert_eq!(err.error_type(), "yaml_error");
    assert!(err.to_string().starts_with("YAML error"));
}

#[tokio::test]
async fn test_missing_file_is_config_error() {
    let err = AppConfig::load_from_file("/definitely/not/here.yaml")
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "configuration_error");
}
