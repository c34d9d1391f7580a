//! Configuration file loading

use edge_lib::error::ConfigError;
use edge_node::config::NodeConfig;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn test_file_values_are_loaded() {
    let file = write_config(
        r#"
node_id = "roof-west"
poll_interval_secs = 20
cloud_report_freq = 3
forecast_api_key = "abc123"
cloud_endpoint = "https://cloud.example.com/reports"
"#,
    );

    let config = NodeConfig::load_from(file.path().to_str(), env(&[])).unwrap();

    assert_eq!(config.node_id, "roof-west");
    assert_eq!(config.poll_interval_secs, 20);
    assert_eq!(config.cloud_report_freq, 3);
    assert_eq!(config.forecast_api_key.as_deref(), Some("abc123"));
    assert_eq!(
        config.cloud_endpoint.as_deref(),
        Some("https://cloud.example.com/reports")
    );
    // Untouched keys keep their defaults
    assert_eq!(config.aggregator_workers, 4);
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config("poll_interval_secs = 20\nnode_id = \"from-file\"\n");

    let config = NodeConfig::load_from(
        file.path().to_str(),
        env(&[("EDGE_POLL_INTERVAL_SECS", "45")]),
    )
    .unwrap();

    assert_eq!(config.poll_interval_secs, 45);
    assert_eq!(config.node_id, "from-file");
}

#[test]
fn test_invalid_file_value_is_fatal() {
    let file = write_config("soiling_threshold = 1.2\n");

    let err = NodeConfig::load_from(file.path().to_str(), env(&[])).unwrap_err();
    assert_eq!(
        err,
        ConfigError::ThresholdOutOfRange {
            name: "soiling_threshold",
            value: 1.2
        }
    );
}

#[test]
fn test_missing_file_is_load_error() {
    let err = NodeConfig::load_from(Some("/nonexistent/edge-node.toml"), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}
