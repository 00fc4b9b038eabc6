//! Tests for bootstrap configuration and root folder resolution
//!
//! Tests touching TURAN_ROOT_FOLDER are marked #[serial] so environment
//! changes do not race.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use turan_common::config::{
    load_toml_config, write_toml_config, LoggingConfig, RootFolderResolver, TomlConfig,
    TranscriptionConfig, ROOT_FOLDER_ENV,
};

#[test]
fn test_missing_config_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");

    let config = load_toml_config(&path).expect("missing file must not fail");

    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging.level, "info");
    assert!(config.transcription.endpoint.is_none());
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("turan-hw.toml");
    std::fs::write(&path, "port = 5800\n").unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.port, Some(5800));
    assert_eq!(config.logging.level, "info");
    assert!(config.root_folder.is_none());
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = [not toml").unwrap();

    let result = load_toml_config(&path);

    assert!(matches!(result, Err(turan_common::Error::Config(_))));
}

#[test]
fn test_write_then_load_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("turan-hw.toml");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/turan")),
        database_path: None,
        port: Some(5810),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        transcription: TranscriptionConfig {
            endpoint: Some("http://localhost:9000/transcribe".to_string()),
            api_key: None,
        },
    };

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
    assert!(!path.with_extension("toml.tmp").exists());
}

#[test]
fn test_database_path_defaults_under_root() {
    let config = TomlConfig::default();
    let root = PathBuf::from("/srv/turan");

    assert_eq!(config.database_path_or(&root), root.join("turan.db"));

    let explicit = TomlConfig {
        database_path: Some(PathBuf::from("/data/other.db")),
        ..TomlConfig::default()
    };
    assert_eq!(explicit.database_path_or(&root), PathBuf::from("/data/other.db"));
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = RootFolderResolver::new("turan-hw")
        .with_cli_arg(Some(PathBuf::from("/from/cli")))
        .with_toml(&toml)
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolved, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = RootFolderResolver::new("turan-hw")
        .with_toml(&toml)
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_toml_used_without_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = RootFolderResolver::new("turan-hw")
        .with_toml(&toml)
        .resolve();

    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_default_when_nothing_configured() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = RootFolderResolver::new("turan-hw").resolve();

    assert!(!resolved.as_os_str().is_empty());
    assert!(resolved.to_string_lossy().contains("turan"));
}
