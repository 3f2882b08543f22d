//! Integration tests for loading configuration files from disk.

use std::io::Write;

use tilegpu_core::{EngineConfig, Error, LogLevel};

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    writeln!(
        file,
        r#"
log_level = "info"
window_title = "level viewer"
max_objects = 256
"#
    )
    .expect("Failed to write config");

    let config = EngineConfig::load(file.path()).expect("Failed to load config");
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.window_title, "level viewer");
    assert_eq!(config.max_objects, 256);
}

#[test]
fn test_load_malformed_config_reports_path() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "log_level = ").expect("Failed to write config");

    match EngineConfig::load(file.path()) {
        Err(Error::ConfigParse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_load_missing_config() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let result = EngineConfig::load(dir.path().join("missing.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_load_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "initial_object_capacity = 0").expect("Failed to write config");

    assert!(matches!(
        EngineConfig::load(file.path()),
        Err(Error::Config(_))
    ));
}
