use std::io::Write;

use tether_core::{ConfigError, RunConfig};
use tether_ir::OperationId;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "scenarios_per_suite": 25,
            "workers": 2,
            "seed": 1234,
            "max_failures": 3,
            "initializers": ["login"],
            "replay_failures": false,
            "unique_inputs": true
        }}"#
    )
    .unwrap();

    let config = RunConfig::from_path(file.path()).unwrap();
    assert_eq!(config.scenarios_per_suite, 25);
    assert_eq!(config.workers, 2);
    assert_eq!(config.seed, Some(1234));
    assert_eq!(config.max_failures, Some(3));
    assert_eq!(config.initializers, vec![OperationId::new("login")]);
    assert!(!config.replay_failures);
    assert!(config.unique_inputs);
    assert_eq!(config.bundle_capacity, 100, "unset fields keep defaults");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    match RunConfig::from_path(&path) {
        Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn test_malformed_json() {
    let err = RunConfig::from_json("{ \"workers\": ").unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));
    assert!(err.to_string().starts_with("Invalid config JSON"));
}

#[test]
fn test_round_trip_through_json() {
    let config = RunConfig {
        seed: Some(9),
        max_wall_secs: Some(60),
        ..RunConfig::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(RunConfig::from_json(&json).unwrap(), config);
}

#[test]
fn test_out_of_range_values_are_named() {
    let config = RunConfig::from_json(r#"{"swarm_factor": 2.0, "event_buffer": 0}"#).unwrap();
    let errors = config.validate().unwrap_err();
    let fields: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            ConfigError::Invalid { field, .. } => Some(*field),
            _ => None,
        })
        .collect();
    assert_eq!(fields, vec!["event_buffer", "swarm_factor"]);
}
