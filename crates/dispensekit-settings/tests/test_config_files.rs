use dispensekit_settings::{Config, SettingsError, SettingsManager};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_toml_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.toml");

    let mut config = Config::default();
    config.connection.port = "COM7".to_string();
    config.connection.wait_for_ack = true;
    config.pressure.channel_2_psi = 42;
    config.raster.rows = 3;
    config.save_to_file(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("[pressure]"));
    assert!(text.contains("channel_2_psi = 42"));

    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_json_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rig.json");

    let mut config = Config::default();
    config.timing.settle_ms = 250;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.timing.settle_ms, 250);
}

#[test]
fn test_invalid_file_is_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[pressure]\nchannel_1_psi = 250\n").unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::PressureOutOfRange { psi: 250, .. })
    ));
}

#[test]
fn test_invalid_config_is_not_saved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never.toml");
    let mut config = Config::default();
    config.connection.timeout_ms = 0;

    assert!(config.save_to_file(&path).is_err());
    assert!(!path.exists());
}

#[test]
fn test_manager_defaults_when_missing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let manager = SettingsManager::load_or_default(Some(&path)).unwrap();
    assert_eq!(manager.config(), &Config::default());
    assert!(!path.exists());

    manager.save().unwrap();
    assert!(path.exists());
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut manager = SettingsManager::init(&path).unwrap();
    manager.config_mut().pressure.channel_1_psi = 33;
    manager.save().unwrap();

    assert!(matches!(
        SettingsManager::init(&path),
        Err(SettingsError::AlreadyExists { .. })
    ));
    let reloaded = SettingsManager::load_or_default(Some(&path)).unwrap();
    assert_eq!(reloaded.config().pressure.channel_1_psi, 33);
}
