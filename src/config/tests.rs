//! Tests for config functionality.

use crate::config::{Backend, Config};
use crate::error::TurnstileError;
use crate::namespace::NamespaceClient;
use crate::session::Session;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.backend, Backend::Filesystem);
    assert_eq!(config.endpoints.len(), 1);
    assert_eq!(config.root, "/turnstile");
    assert_eq!(config.session_timeout_ms, 10_000);
    assert_eq!(config.connect_timeout_ms, 5_000);
    assert_eq!(config.connect_max_retries, 5);
    assert_eq!(config.connect_base_delay_ms, 50);
    assert_eq!(config.connect_max_delay_ms, 2_000);
    assert_eq!(config.poll_interval_ms, 50);
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_minimal_yaml() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
backend: memory
root: /locks
"#;
    let config = Config::from_yaml(yaml).unwrap();

    // Specified values should be used
    assert_eq!(config.backend, Backend::Memory);
    assert_eq!(config.root, "/locks");

    // Unspecified values should use defaults
    assert_eq!(config.session_timeout_ms, 10_000);
    assert_eq!(config.poll_interval_ms, 50);
}

#[test]
fn test_parse_full_yaml() {
    let yaml = r#"
backend: filesystem
endpoints:
  - /srv/locks-a
  - /srv/locks-b
root: /app/locks
session_timeout_ms: 3000
connect_timeout_ms: 1000
connect_max_retries: 2
connect_base_delay_ms: 10
connect_max_delay_ms: 100
poll_interval_ms: 20
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.endpoints, vec!["/srv/locks-a", "/srv/locks-b"]);

    let settings = config.session_settings();
    assert_eq!(settings.endpoints.len(), 2);
    assert_eq!(settings.session_timeout, Duration::from_secs(3));
    assert_eq!(settings.connect_timeout, Duration::from_secs(1));
    assert_eq!(settings.max_retries, 2);
    assert_eq!(settings.base_delay, Duration::from_millis(10));
    assert_eq!(settings.max_delay, Duration::from_millis(100));
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = r#"
root: /locks
future_option: true
nested:
  anything: 1
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.root, "/locks");
}

#[test]
fn test_unknown_backend_is_rejected() {
    let err = Config::from_yaml("backend: redis").unwrap_err();
    assert!(matches!(err, TurnstileError::Config(_)));
}

#[test]
fn test_zero_durations_are_rejected() {
    for field in [
        "session_timeout_ms",
        "connect_timeout_ms",
        "connect_base_delay_ms",
        "poll_interval_ms",
    ] {
        let err = Config::from_yaml(&format!("{}: 0", field)).unwrap_err();
        assert!(err.to_string().contains(field), "{}", err);
    }
}

#[test]
fn test_empty_endpoints_are_rejected() {
    assert!(Config::from_yaml("endpoints: []").is_err());
    assert!(Config::from_yaml("endpoints: ['']").is_err());
}

#[test]
fn test_invalid_root_is_rejected() {
    for root in ["locks", "/locks/", "/a//b", "/a/../b"] {
        let err = Config::from_yaml(&format!("root: '{}'", root)).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)), "{}", root);
    }
}

#[test]
fn test_base_delay_above_max_is_rejected() {
    let yaml = "connect_base_delay_ms: 500\nconnect_max_delay_ms: 100";
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("connect_base_delay_ms"));
}

#[test]
fn test_yaml_roundtrip_preserves_values() {
    let config = Config::from_yaml("backend: memory\nsession_timeout_ms: 1234").unwrap();
    let reparsed = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
    assert_eq!(reparsed, config);
}

#[test]
fn test_load_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load(dir.path().join("missing.yaml")).unwrap_err();
    assert!(matches!(err, TurnstileError::Config(_)));
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("turnstile.yaml");
    std::fs::write(&path, "root: /from-file\n").unwrap();
    assert_eq!(Config::load(&path).unwrap().root, "/from-file");
}

#[test]
fn test_filesystem_ensemble_connects_to_prepared_endpoint() {
    let dir = TempDir::new().unwrap();
    let endpoint = dir.path().join("service");
    let config = Config {
        endpoints: vec![endpoint.to_string_lossy().to_string()],
        ..Config::default()
    };

    config.prepare_endpoints().unwrap();
    assert!(endpoint.is_dir());

    let ensemble = config.ensemble();
    let session = Session::connect(ensemble.as_ref(), &config.session_settings()).unwrap();
    assert!(!session.is_lost());
    session.close().unwrap();
}

#[test]
fn test_memory_ensemble_dials() {
    let config = Config {
        backend: Backend::Memory,
        ..Config::default()
    };
    let client = config
        .ensemble()
        .dial("memory", Duration::from_secs(1))
        .unwrap();
    assert!(client.session_id().as_str().starts_with("mem-"));
}
