//! Instrument - an ordered set of modules applied together.
//!
//! Modules keep their own change trackers and register maps; the instrument only
//! sequences them and aggregates their status flags. Modules are independent single
//! writers, so [`Instrument::apply_all_concurrent`] may apply each one on its own
//! thread.

use serde::Serialize;
use tracing::{info, info_span};

use crate::change_tracker::ModuleKind;
use crate::error::{LookupKind, SyncError, SyncResult};
use crate::pipeline::ApplySettings;
use crate::register_manager::ApplyReport;

/// Status line of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub name: String,
    pub kind: &'static str,
    pub property_change_pending: bool,
    pub reg_settings_dirty: bool,
}

#[derive(Default)]
pub struct Instrument {
    name: String,
    modules: Vec<Box<dyn ApplySettings>>,
}

impl Instrument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a module. Module names must be unique (case-insensitive).
    pub fn add_module(&mut self, module: Box<dyn ApplySettings>) -> SyncResult<()> {
        if self
            .modules
            .iter()
            .any(|m| m.name().eq_ignore_ascii_case(module.name()))
        {
            return Err(SyncError::Definition(format!(
                "duplicate module name '{}' in instrument '{}'",
                module.name(),
                self.name
            )));
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn modules(&self) -> &[Box<dyn ApplySettings>] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> SyncResult<&dyn ApplySettings> {
        self.modules
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .map(|m| m.as_ref())
            .ok_or_else(|| SyncError::not_found(LookupKind::Module, name))
    }

    pub fn module_mut(&mut self, name: &str) -> SyncResult<&mut (dyn ApplySettings + 'static)> {
        self.modules
            .iter_mut()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .map(|m| m.as_mut())
            .ok_or_else(|| SyncError::not_found(LookupKind::Module, name))
    }

    /// Modules of one kind, in insertion order.
    pub fn modules_of_kind(&self, kind: ModuleKind) -> impl Iterator<Item = &dyn ApplySettings> {
        self.modules
            .iter()
            .filter(move |m| m.kind() == kind)
            .map(|m| m.as_ref())
    }

    pub fn any_property_change_pending(&self) -> bool {
        self.modules.iter().any(|m| m.any_property_change_pending())
    }

    pub fn any_reg_settings_dirty(&self) -> bool {
        self.modules.iter().any(|m| m.any_reg_settings_dirty())
    }

    pub fn status(&self) -> Vec<ModuleStatus> {
        self.modules
            .iter()
            .map(|m| ModuleStatus {
                name: m.name().to_string(),
                kind: m.kind().name(),
                property_change_pending: m.any_property_change_pending(),
                reg_settings_dirty: m.any_reg_settings_dirty(),
            })
            .collect()
    }

    /// Apply every module in order, stopping at the first failure.
    pub fn apply_all(&mut self) -> SyncResult<ApplyReport> {
        self.apply_sequential(false)
    }

    pub fn apply_all_forced(&mut self) -> SyncResult<ApplyReport> {
        self.apply_sequential(true)
    }

    fn apply_sequential(&mut self, force: bool) -> SyncResult<ApplyReport> {
        let _span = info_span!("instrument_apply", instrument = %self.name, force).entered();
        let mut total = ApplyReport::default();

        for module in &mut self.modules {
            let report = if force {
                module.apply_forced()?
            } else {
                module.apply()?
            };
            total.written += report.written;
            total.skipped += report.skipped;
        }

        info!(written = total.written, modules = self.modules.len(), "instrument applied");
        Ok(total)
    }

    /// Apply every module on its own thread.
    ///
    /// All modules run to completion; the first error in module order is returned.
    pub fn apply_all_concurrent(&mut self) -> SyncResult<ApplyReport> {
        let _span = info_span!("instrument_apply_concurrent", instrument = %self.name).entered();

        let results: Vec<SyncResult<ApplyReport>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .modules
                .iter_mut()
                .map(|module| scope.spawn(move || module.apply()))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });

        let mut total = ApplyReport::default();
        for result in results {
            let report = result?;
            total.written += report.written;
            total.skipped += report.skipped;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("modules", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hardware::SimulatedRegisterBus;
    use crate::modules::{ReceiverModule, ReceiverSettings, SourceModule, SourceSettings};
    use crate::parameter::ParamValue;

    fn instrument() -> (Arc<SimulatedRegisterBus>, Arc<SimulatedRegisterBus>, Instrument) {
        let rx_bus = Arc::new(SimulatedRegisterBus::new("rx-bus"));
        let tx_bus = Arc::new(SimulatedRegisterBus::new("tx-bus"));
        let mut inst = Instrument::new("analyzer");
        inst.add_module(Box::new(
            ReceiverModule::new("rx", ReceiverSettings::default(), rx_bus.clone()).unwrap(),
        ))
        .unwrap();
        inst.add_module(Box::new(
            SourceModule::new("tx", SourceSettings::default(), tx_bus.clone()).unwrap(),
        ))
        .unwrap();
        (rx_bus, tx_bus, inst)
    }

    #[test]
    fn aggregate_status_follows_modules() {
        let (_rx, _tx, mut inst) = instrument();
        assert!(!inst.any_property_change_pending());

        inst.module_mut("TX")
            .unwrap()
            .set_value("OutputLevel", &ParamValue::Float(-3.0))
            .unwrap();
        assert!(inst.any_property_change_pending());

        let status = inst.status();
        assert!(!status[0].property_change_pending);
        assert!(status[1].property_change_pending);
        assert_eq!(status[1].kind, "source");

        inst.apply_all().unwrap();
        assert!(!inst.any_property_change_pending());
        assert!(!inst.any_reg_settings_dirty());
    }

    #[test]
    fn forced_apply_rewrites_every_module() {
        let (rx, tx, mut inst) = instrument();
        rx.clear_log();
        tx.clear_log();

        let report = inst.apply_all_forced().unwrap();
        assert_eq!(rx.write_count(), 7);
        assert_eq!(tx.write_count(), 6);
        assert_eq!(report.written, 13);
    }

    #[test]
    fn concurrent_apply_matches_sequential() {
        let (rx, tx, mut inst) = instrument();
        inst.module_mut("rx")
            .unwrap()
            .set_value("StartFrequency", &ParamValue::Float(120e6))
            .unwrap();
        inst.module_mut("tx")
            .unwrap()
            .set_value("RfOn", &ParamValue::Bool(true))
            .unwrap();

        inst.apply_all_concurrent().unwrap();
        assert_eq!(rx.value_at(0x10), Some(120_000_000));
        assert_eq!(tx.value_at(0x3C), Some(1));
        assert!(!inst.any_property_change_pending());
    }

    #[test]
    fn duplicate_module_names_rejected() {
        let (_rx, _tx, mut inst) = instrument();
        let bus = Arc::new(SimulatedRegisterBus::default());
        let dup = ReceiverModule::new("RX", ReceiverSettings::default(), bus).unwrap();
        assert!(matches!(
            inst.add_module(Box::new(dup)),
            Err(SyncError::Definition(_))
        ));
    }
}
