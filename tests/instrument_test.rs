//! Multi-module instruments: aggregate status, ordered apply and concurrent use.

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use rust_regsync::change_tracker::ModuleKind;
use rust_regsync::modules::{Detector, ReceiverModule, ReceiverSettings, SourceModule, SourceSettings};
use rust_regsync::{Instrument, ParamValue, SimulatedRegisterBus, SyncError};

struct Bench {
    rx_bus: Arc<SimulatedRegisterBus>,
    tx_bus: Arc<SimulatedRegisterBus>,
    instrument: Instrument,
}

fn bench() -> Result<Bench> {
    let rx_bus = Arc::new(SimulatedRegisterBus::new("rx-bus"));
    let tx_bus = Arc::new(SimulatedRegisterBus::new("tx-bus"));

    let mut instrument = Instrument::new("analyzer");
    instrument.add_module(Box::new(ReceiverModule::new(
        "rx",
        ReceiverSettings::default(),
        rx_bus.clone(),
    )?))?;
    instrument.add_module(Box::new(SourceModule::new(
        "tx",
        SourceSettings::default(),
        tx_bus.clone(),
    )?))?;

    rx_bus.clear_log();
    tx_bus.clear_log();
    Ok(Bench {
        rx_bus,
        tx_bus,
        instrument,
    })
}

#[test]
fn status_follows_individual_modules() -> Result<()> {
    let mut b = bench()?;
    assert!(!b.instrument.any_property_change_pending());

    b.instrument
        .module_mut("tx")?
        .set_value("OutputLevel", &ParamValue::Float(-20.0))?;
    assert!(b.instrument.any_property_change_pending());

    let status = b.instrument.status();
    assert_eq!(status.len(), 2);
    assert!(!status[0].property_change_pending);
    assert!(status[1].property_change_pending);
    assert_eq!(status[1].kind, "source");

    b.instrument.apply_all()?;
    assert!(!b.instrument.any_property_change_pending());
    assert!(!b.instrument.any_reg_settings_dirty());
    assert!(b.rx_bus.written_addresses().is_empty());
    assert_eq!(b.tx_bus.written_addresses(), vec![0x38, 0x40]);
    Ok(())
}

#[test]
fn apply_all_stops_at_first_failing_module() -> Result<()> {
    let mut b = bench()?;

    b.instrument
        .module_mut("rx")?
        .set_value("StartFrequency", &ParamValue::Float(500e6))?;
    b.instrument
        .module_mut("tx")?
        .set_value("RfOn", &ParamValue::Bool(true))?;

    let err = b.instrument.apply_all().unwrap_err();
    assert!(matches!(err, SyncError::Validation { ref module, .. } if module == "rx"));
    assert_eq!(b.tx_bus.write_count(), 0);
    assert!(b.instrument.module("tx")?.any_property_change_pending());
    Ok(())
}

#[test]
fn lookup_by_name_and_kind() -> Result<()> {
    let b = bench()?;

    assert_eq!(b.instrument.module("RX")?.kind(), ModuleKind::Receiver);
    assert_eq!(b.instrument.modules_of_kind(ModuleKind::Source).count(), 1);
    assert!(matches!(
        b.instrument.module("scope"),
        Err(SyncError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn concurrent_apply_writes_each_bus() -> Result<()> {
    let mut b = bench()?;

    b.instrument
        .module_mut("rx")?
        .set_value("Detector", &ParamValue::Text("Rms".into()))?;
    b.instrument
        .module_mut("tx")?
        .set_value("OutputFrequency", &ParamValue::Float(2400e6))?;

    let report = b.instrument.apply_all_concurrent()?;
    assert_eq!(report.written, 5);
    assert_eq!(b.rx_bus.written_addresses(), vec![0x20, 0x40]);
    assert_eq!(b.tx_bus.written_addresses(), vec![0x30, 0x34, 0x40]);
    Ok(())
}

#[test]
fn modules_can_be_driven_from_separate_threads() -> Result<()> {
    let rx_bus = Arc::new(SimulatedRegisterBus::new("rx-bus"));
    let tx_bus = Arc::new(SimulatedRegisterBus::new("tx-bus"));
    let mut rx = ReceiverModule::new("rx", ReceiverSettings::default(), rx_bus.clone())?;
    let mut tx = SourceModule::new("tx", SourceSettings::default(), tx_bus.clone())?;
    rx_bus.clear_log();
    tx_bus.clear_log();

    let rx_handle = thread::spawn(move || -> Result<ReceiverModule> {
        for step in 1..=10 {
            rx.set_attenuation(f64::from(step))?;
            rx.apply()?;
        }
        rx.set_detector(Detector::Average)?;
        rx.apply()?;
        Ok(rx)
    });
    let tx_handle = thread::spawn(move || -> Result<SourceModule> {
        for step in 0..10 {
            tx.set_output_level(-f64::from(step))?;
            tx.apply()?;
        }
        Ok(tx)
    });

    let rx = rx_handle.join().expect("receiver thread panicked")?;
    let tx = tx_handle.join().expect("source thread panicked")?;

    assert_eq!(rx.attenuation(), 10.0);
    assert_eq!(rx.read_field_by_name("ReceiverReg", "Control", "ATTEN")?, 20);
    assert_eq!(rx.read_field_by_name("ReceiverReg", "Control", "DETECTOR")?, 1);
    assert_eq!(tx.output_level(), -9.0);
    assert_eq!(tx_bus.value_at(0x38), Some(u64::from((-900i32) as u32)));
    assert!(!rx.any_property_change_pending() && !tx.any_property_change_pending());
    Ok(())
}
