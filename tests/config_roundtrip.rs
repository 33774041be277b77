//! Integration tests: configuration persistence and its effect on facades.

use std::sync::Arc;

use capbridge::config::BridgeConfig;
use capbridge::facade::location::LocationSource;
use capbridge::facade::sensor::SensorKind;
use capbridge::platform::sim::SimHost;
use capbridge::{Facade, FacadeKind, FacadeRegistry};

#[test]
fn config_roundtrips_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = BridgeConfig::default();
    config.sensors.enabled = vec![SensorKind::Light, SensorKind::Proximity];
    config.location.fused = true;
    config.speech.max_message_chars = 120;
    config.data_channel.scheme = "acme".to_owned();
    config.interpreter.pool_size = 2;
    config.interpreter.preload = vec![FacadeKind::DataChannel];
    config.save_to_file(&path).expect("save");

    let restored = BridgeConfig::from_file(&path).expect("load");
    assert_eq!(restored, config);
}

#[test]
fn partial_file_fills_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[location]\ngps = false\n").expect("write");

    let config = BridgeConfig::from_file(&path).expect("load");
    assert_eq!(config.location.sources(), [LocationSource::Network]);
    assert_eq!(config.speech, BridgeConfig::default().speech);
    assert_eq!(config.interpreter.pool_size, 10);
}

#[test]
fn invalid_file_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[interpreter]\npool_size = 0\n").expect("write");
    assert!(BridgeConfig::from_file(&path).is_err());

    std::fs::write(&path, "this is = = not toml").expect("write");
    assert!(BridgeConfig::from_file(&path).is_err());
}

#[test]
fn configured_sources_drive_registrations() {
    let host = Arc::new(SimHost::new());
    let mut config = BridgeConfig::default();
    config.sensors.enabled = vec![SensorKind::Light, SensorKind::Pressure];
    config.location.network = false;
    let registry = FacadeRegistry::with_config(host.clone(), &config);

    let sensors = registry.sensor().expect("sensor facade");
    sensors.start().expect("start");
    // Pressure is not on the simulated device.
    assert_eq!(sensors.active_sensors(), [SensorKind::Light]);

    let before = host.active_subscriptions();
    registry.location().expect("location").start().expect("start");
    assert_eq!(host.active_subscriptions(), before + 1);
}
