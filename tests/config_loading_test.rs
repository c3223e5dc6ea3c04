use std::fs;

use translation_orchestrator::config::{self, ConfigurationError};

#[test]
fn test_shipped_configuration_loads() {
    let config = config::load_path("config/orchestrator.toml").unwrap();
    assert_eq!(config.workers.len(), 2);
    assert_eq!(config.batching.batch_size, 50);
    assert_eq!(config.batching.merge_threshold, 10);
    assert_eq!(config.credentials.cooldown_seconds, 300);
    assert!(config.jobs.max_lifetime_seconds.is_none());
    assert!(config.database.url.is_none());
}

#[test]
fn test_file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
        credential_seeds = ["AIzaSy-seed-one-0001", "AIzaSy-seed-two-0002"]

        [retry]
        max_retries = 5

        [jobs]
        max_lifetime_seconds = 600

        [[workers]]
        id = "edge"
        url = "http://edge:9000"
        rpm_limit = 30
        "#,
    )
    .unwrap();

    let config = config::load_path(path.to_str().unwrap()).unwrap();
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.retry_delay_ms, 2_000);
    assert_eq!(config.jobs.max_lifetime(), Some(chrono::Duration::minutes(10)));
    assert_eq!(config.workers[0].rpm_limit, 30);
    assert_eq!(config.credential_seeds.len(), 2);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[batching]\nbatch_size = 0\n").unwrap();

    let err = config::load_path(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent");
    let config = config::load_path(path.to_str().unwrap()).unwrap();
    assert!(config.workers.is_empty());
    assert_eq!(config.web.bind_address, "0.0.0.0:8080");
}
