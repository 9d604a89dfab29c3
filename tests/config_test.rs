//! Loading a configuration file from disk and pushing its initial settings.

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use rust_regsync::config::{apply_initial_settings, EngineConfig};
use rust_regsync::modules::{Detector, ReceiverModule, ReceiverSettings, SourceModule, SourceSettings};
use rust_regsync::{SimulatedRegisterBus, SyncError};
use tempfile::TempDir;

const BENCH_CONFIG: &str = r#"
[application]
name = "bench analyzer"
log_level = "debug"
log_format = "compact"

[simulation]
fail_after_writes = 100

[receiver]
StartFrequency = 150e6
StopFrequency = 900e6
Attenuation = 12.5
Detector = "rms"

[source]
OutputLevel = -30
RfOn = true
"#;

fn write_config(contents: &str) -> Result<(TempDir, std::path::PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("regsync.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

#[test]
fn file_settings_reach_the_registers() -> Result<()> {
    let (_dir, path) = write_config(BENCH_CONFIG)?;
    let config = EngineConfig::load_from(&path)?;

    assert_eq!(config.application.name, "bench analyzer");
    assert_eq!(config.application.log_format, "compact");
    assert_eq!(config.simulation.fail_after_writes, Some(100));

    let rx_bus = Arc::new(config.simulation.build_bus("rx-bus"));
    let mut rx = ReceiverModule::new("rx", ReceiverSettings::default(), rx_bus.clone())?;
    assert_eq!(apply_initial_settings(&mut rx, &config.receiver)?, 4);
    rx.apply()?;

    assert_eq!(rx.detector(), Detector::Rms);
    assert_eq!(rx.attenuation(), 12.5);
    assert_eq!(rx_bus.value_at(0x10), Some(150_000_000));
    assert_eq!(rx_bus.value_at(0x18), Some(750_000_000));
    assert_eq!(rx_bus.value_at(0x20), Some((3 << 8) | 25));

    let tx_bus = Arc::new(config.simulation.build_bus("tx-bus"));
    let mut tx = SourceModule::new("tx", SourceSettings::default(), tx_bus.clone())?;
    assert_eq!(apply_initial_settings(&mut tx, &config.source)?, 2);
    tx.apply()?;

    assert!(tx.rf_on());
    assert_eq!(tx.output_level(), -30.0);
    assert_eq!(tx_bus.value_at(0x3C), Some(1));
    Ok(())
}

#[test]
fn out_of_range_initial_value_is_rejected() -> Result<()> {
    let (_dir, path) = write_config(
        r#"
        [application]
        name = "bad"

        [receiver]
        Attenuation = 40.0
        "#,
    )?;
    let config = EngineConfig::load_from(&path)?;

    let bus = Arc::new(SimulatedRegisterBus::new("rx-bus"));
    let mut rx = ReceiverModule::new("rx", ReceiverSettings::default(), bus)?;
    let err = apply_initial_settings(&mut rx, &config.receiver).unwrap_err();
    assert!(matches!(err, SyncError::Limit { .. }));
    assert!(!rx.any_property_change_pending());
    Ok(())
}

#[test]
fn unknown_property_in_config_is_reported() -> Result<()> {
    let (_dir, path) = write_config(
        r#"
        [application]
        name = "typo"

        [receiver]
        StartFreq = 150e6
        "#,
    )?;
    let config = EngineConfig::load_from(&path)?;

    let bus = Arc::new(SimulatedRegisterBus::new("rx-bus"));
    let mut rx = ReceiverModule::new("rx", ReceiverSettings::default(), bus)?;
    let err = apply_initial_settings(&mut rx, &config.receiver).unwrap_err();
    assert!(err.to_string().contains("StartFreq"));
    Ok(())
}

#[test]
fn invalid_log_level_fails_to_load() -> Result<()> {
    let (_dir, path) = write_config(
        r#"
        [application]
        name = "loud"
        log_level = "verbose"
        "#,
    )?;

    let err = EngineConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
    Ok(())
}
