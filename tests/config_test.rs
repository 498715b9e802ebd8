//! 設定読み込みのテスト

use cost_anomaly_rs::config::AppConfig;
use cost_anomaly_rs::Error;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_overrides_defaults() {
    let file = config_file(
        r#"
[detection]
window_length = 7
recurrence_tolerance = 0.2

[store]
endpoint = "https://search.internal:9200"
bulk_batch_size = 100
"#,
    );

    let config = AppConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.detection.window_length, 7);
    assert_eq!(config.detection.recurrence_tolerance, 0.2);
    assert_eq!(config.detection.podium_size, 3);
    assert_eq!(config.store.endpoint, "https://search.internal:9200");
    assert_eq!(config.store.bulk_batch_size, 100);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = config_file(
        r#"
[detection]
podium_size = 0
"#,
    );

    assert!(matches!(
        AppConfig::load(Some(file.path())),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn test_missing_file_is_an_error() {
    let result = AppConfig::load(Some(std::path::Path::new("/nonexistent/cost-anomaly.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}
