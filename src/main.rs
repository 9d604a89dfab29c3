//! CLI entry point for rust_regsync
//!
//! Drives a receiver and a source module over simulated register buses:
//!
//! ```bash
//! # apply the configured settings and print the resulting write log
//! rust_regsync demo --config config/regsync.toml
//!
//! # dump the register map of every module as JSON
//! rust_regsync registers
//!
//! # set one property by name, apply, and report what was written
//! rust_regsync set rx StartFrequency 150e6
//!
//! # show the effective configuration after environment overrides
//! REGSYNC_APPLICATION__LOG_LEVEL=debug rust_regsync config
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use rust_regsync::config::{apply_initial_settings, EngineConfig, DEFAULT_CONFIG_PATH};
use rust_regsync::hardware::SimulatedRegisterBus;
use rust_regsync::logging;
use rust_regsync::modules::{ReceiverModule, ReceiverSettings, SourceModule, SourceSettings};
use rust_regsync::{Instrument, ParamValue};

#[derive(Parser)]
#[command(name = "rust_regsync")]
#[command(about = "Register settings synchronization over a simulated bus", long_about = None)]
struct Cli {
    /// Configuration file (missing file falls back to defaults)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the configured initial settings and print the write log
    Demo {
        /// Force-apply every register after the normal apply
        #[arg(long)]
        force: bool,
    },

    /// Print every module's register map
    Registers,

    /// Print the effective configuration (file + environment) as TOML
    Config,

    /// Set one property, apply, and print the writes it caused
    Set {
        /// Module name (rx or tx)
        module: String,
        /// Property name, case-insensitive
        property: String,
        /// Value: true/false, integer, float or text
        value: String,
    },
}

/// Instrument plus the buses behind its modules, keyed by module name.
struct Bench {
    instrument: Instrument,
    buses: BTreeMap<String, Arc<SimulatedRegisterBus>>,
}

fn build_bench(config: &EngineConfig) -> Result<Bench> {
    let rx_bus = Arc::new(config.simulation.build_bus("rx-bus"));
    let tx_bus = Arc::new(config.simulation.build_bus("tx-bus"));

    let mut receiver = ReceiverModule::new("rx", ReceiverSettings::default(), rx_bus.clone())
        .context("receiver construction failed")?;
    let mut source = SourceModule::new("tx", SourceSettings::default(), tx_bus.clone())
        .context("source construction failed")?;

    apply_initial_settings(&mut receiver, &config.receiver)
        .context("invalid [receiver] settings")?;
    apply_initial_settings(&mut source, &config.source).context("invalid [source] settings")?;

    let mut instrument = Instrument::new(config.application.name.clone());
    instrument.add_module(Box::new(receiver))?;
    instrument.add_module(Box::new(source))?;

    let buses = BTreeMap::from([("rx".to_string(), rx_bus), ("tx".to_string(), tx_bus)]);
    info!(instrument = %config.application.name, "instrument ready");
    Ok(Bench { instrument, buses })
}

fn write_log_json(buses: &BTreeMap<String, Arc<SimulatedRegisterBus>>) -> serde_json::Value {
    let logs: serde_json::Map<String, serde_json::Value> = buses
        .iter()
        .map(|(name, bus)| {
            let writes: Vec<_> = bus
                .write_log()
                .iter()
                .map(|w| json!({ "address": format!("{:#x}", w.address), "value": w.value, "force": w.force }))
                .collect();
            (name.clone(), serde_json::Value::Array(writes))
        })
        .collect();
    serde_json::Value::Object(logs)
}

fn clear_logs(bench: &Bench) {
    for bus in bench.buses.values() {
        bus.clear_log();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let output = match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        Commands::Demo { force } => {
            let mut bench = build_bench(&config)?;
            clear_logs(&bench);
            let report = bench.instrument.apply_all()?;
            let mut out = json!({
                "applied": { "written": report.written, "skipped": report.skipped },
                "writes": write_log_json(&bench.buses),
            });
            if force {
                clear_logs(&bench);
                let forced = bench.instrument.apply_all_forced()?;
                out["forced"] = json!({
                    "written": forced.written,
                    "writes": write_log_json(&bench.buses),
                });
            }
            out["status"] = serde_json::to_value(bench.instrument.status())?;
            out
        }
        Commands::Registers => {
            let bench = build_bench(&config)?;
            let modules: Vec<_> = bench
                .instrument
                .modules()
                .iter()
                .map(|m| {
                    json!({
                        "module": m.name(),
                        "properties": m.describe(),
                        "groups": m.register_snapshot(),
                    })
                })
                .collect();
            serde_json::Value::Array(modules)
        }
        Commands::Set {
            module,
            property,
            value,
        } => {
            let mut bench = build_bench(&config)?;
            // Push configured initial settings first so the log shows only this change.
            bench.instrument.apply_all()?;
            clear_logs(&bench);

            let value = ParamValue::parse(&value);
            let target = bench.instrument.module_mut(&module)?;
            let changed = target.set_value(&property, &value)?;
            let report = target.apply()?;
            json!({
                "module": module,
                "property": property,
                "value": value,
                "changed": changed,
                "written": report.written,
                "writes": write_log_json(&bench.buses),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
