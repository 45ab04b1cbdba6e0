//! Tests for configuration resolution and graceful degradation
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate RATING_ROOT_FOLDER or RATING_CONFIG are marked
//! with #[serial] so they run sequentially.

use rating_common::config::{
    get_default_root_folder, RootFolderInitializer, RootFolderResolver, TomlConfig, CONFIG_FILE_ENV,
    ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, get_default_root_folder());
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    let toml = TomlConfig::parse(r#"root_folder = "/tmp/rating-from-toml""#).unwrap();

    // TOML beats the compiled default
    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = RootFolderResolver::new("test-module").with_toml(&toml).resolve();
    assert_eq!(resolved, PathBuf::from("/tmp/rating-from-toml"));

    // ENV beats TOML
    env::set_var(ROOT_FOLDER_ENV, "/tmp/rating-from-env");
    let resolved = RootFolderResolver::new("test-module").with_toml(&toml).resolve();
    assert_eq!(resolved, PathBuf::from("/tmp/rating-from-env"));

    // CLI beats ENV
    let resolved = RootFolderResolver::new("test-module")
        .with_toml(&toml)
        .with_cli_arg(Some(PathBuf::from("/tmp/rating-from-cli")))
        .resolve();
    assert_eq!(resolved, PathBuf::from("/tmp/rating-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_missing_config_file_falls_back_to_defaults() {
    let config = TomlConfig::load_or_default(Some(&PathBuf::from("/nonexistent/rating/config.toml")));
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_invalid_toml_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let config = TomlConfig::load_or_default(Some(&path));
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_config_file_from_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        bind = "0.0.0.0"

        [ingest]
        staging_ttl_secs = 60

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    env::set_var(CONFIG_FILE_ENV, &path);
    let config = TomlConfig::load_or_default(None);
    env::remove_var(CONFIG_FILE_ENV);

    assert_eq!(config.bind.as_deref(), Some("0.0.0.0"));
    assert_eq!(config.ingest.staging_ttl_secs, 60);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_initializer_creates_root_folder() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("a").join("b");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("ratings.db"));
}
