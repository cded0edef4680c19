//! Configuration loading tests.

use std::io::Write;
use std::time::Duration;

use vortex_common::LogFormat;
use vortex_network::NetworkType;
use vortex_server::cli::Args;
use vortex_server::config::Config;

/// Test configuration loading from YAML.
#[test]
fn test_config_yaml_parsing() {
    let yaml = r#"
server:
  listen_address: 127.0.0.1:8100

store:
  path: /var/lib/vortex/networks.json

workloads:
  endpoint: http://scheduler.local:8080
  timeout_secs: 3

providers:
  enabled:
    - bridge
    - system
  command_timeout_secs: 10

reconcile:
  interval_secs: 60

logging:
  format: json
"#;

    let config = Config::from_yaml(yaml).expect("Failed to parse YAML");

    assert_eq!(config.server.listen_address, "127.0.0.1:8100");
    assert_eq!(config.store.path.as_deref(), Some("/var/lib/vortex/networks.json"));
    assert_eq!(config.workloads.endpoint.as_deref(), Some("http://scheduler.local:8080"));
    assert_eq!(config.workloads.timeout(), Duration::from_secs(3));
    assert_eq!(config.providers.enabled, vec![NetworkType::Bridge, NetworkType::System]);
    assert!(!config.providers.dev);
    assert_eq!(config.providers.command_timeout(), Duration::from_secs(10));
    assert_eq!(config.reconcile.interval(), Some(Duration::from_secs(60)));
    assert_eq!(LogFormat::from(config.logging.format), LogFormat::Json);
}

/// Sections left out of the file keep their defaults.
#[test]
fn test_partial_config_uses_defaults() {
    let config = Config::from_yaml("providers:\n  dev: true\n").expect("Failed to parse YAML");

    assert!(config.providers.dev);
    assert_eq!(config.providers.enabled.len(), 4);
    assert_eq!(config.server.listen_address, "0.0.0.0:7890");
    assert_eq!(LogFormat::from(config.logging.format), LogFormat::Pretty);
}

#[test]
fn test_unknown_network_type_rejected() {
    let result = Config::from_yaml("providers:\n  enabled: [vxlan]\n");
    assert!(result.is_err());
}

#[test]
fn test_load_from_file_with_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  listen_address: 0.0.0.0:9999\nstore:\n  path: /tmp/a.json").unwrap();

    let args = Args {
        store_path: Some("/tmp/b.json".into()),
        workloads_endpoint: Some("http://127.0.0.1:1".into()),
        ..Default::default()
    };
    let config = Config::load(file.path()).unwrap().with_cli_overrides(&args);

    assert_eq!(config.server.listen_address, "0.0.0.0:9999");
    assert_eq!(config.store.path.as_deref(), Some("/tmp/b.json"));
    assert_eq!(config.workloads.endpoint.as_deref(), Some("http://127.0.0.1:1"));
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/vortex/server.yaml").is_err());
}
