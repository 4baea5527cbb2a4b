//! Integration tests for xrov-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use std::path::PathBuf;
use tempfile::tempdir;
use xrov_config::Config;

/// Test config loading from a real global config file
#[test]
fn test_load_global_config_from_file() {
    let temp = tempdir().unwrap();
    let global = temp.path().join("global.toml");
    std::fs::write(
        &global,
        r#"
[rpc]
shmem_size = 2097152
shmem_dir = "/dev/shm"
response_timeout_ms = 5000

[sync]
synchronize_every_call = true
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&global), &temp.path().join("missing.toml")).unwrap();

    assert_eq!(config.rpc.shmem_size, 2 * 1024 * 1024);
    assert_eq!(config.rpc.shmem_dir, PathBuf::from("/dev/shm"));
    assert_eq!(config.rpc.response_timeout_ms, 5000);
    assert!(config.sync.synchronize_every_call);
    // untouched sections keep their defaults
    assert_eq!(config.events.max_overlay_layers, 16);
}

/// Test config hierarchy: project config overrides global key by key
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();
    let global = temp.path().join("global.toml");
    let project = temp.path().join("project.toml");

    std::fs::write(
        &global,
        r#"
[rpc]
shmem_size = 4096
response_timeout_ms = 100

[events]
max_queued_events_per_overlay = 4
"#,
    )
    .unwrap();
    std::fs::write(
        &project,
        r#"
[rpc]
response_timeout_ms = 900

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&global), &project).unwrap();

    assert_eq!(config.rpc.shmem_size, 4096, "global value survives");
    assert_eq!(config.rpc.response_timeout_ms, 900, "project value wins");
    assert_eq!(config.events.max_queued_events_per_overlay, 4);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_config_is_reported() {
    let temp = tempdir().unwrap();
    let project = temp.path().join("project.toml");
    std::fs::write(&project, "[rpc\nshmem_size = ").unwrap();

    let err = Config::load_from(None, &project).unwrap_err();
    assert!(matches!(err, xrov_config::ConfigError::Toml(_)));
}

#[test]
fn test_no_files_yields_defaults() {
    let temp = tempdir().unwrap();
    let config = Config::load_from(None, &temp.path().join("nope.toml")).unwrap();
    assert_eq!(config, Config::default());
}
