//! Settings apply pipeline.
//!
//! [`Module<S>`] glues one [`ModuleSettings`] implementation to a [`RegisterManager`],
//! a [`PropertyChangeTracker`] and a shared [`RegisterAccess`] driver. The pipeline is
//! written once here; concrete modules only describe their registers, validation and
//! register computation.
//!
//! # Apply sequence
//!
//! ```text
//! Idle ─► Validating ─► ComputingRegisters ─► WritingHardware ─► Idle
//!             │
//!             └─► Rejected ─► Idle
//! ```
//!
//! 1. **Validating** - module checks over the pending settings (all settings when
//!    forced). Rejection mutates nothing and keeps every pending bit.
//! 2. **ComputingRegisters** - the module writes register caches for the pending
//!    settings. No hardware I/O.
//! 3. **WritingHardware** - dirty registers (all when forced) are written group by
//!    group. A driver failure stops the walk and is returned; pending bits stay set.
//! 4. On success every property records its value as applied and all pending bits
//!    are cleared.
//!
//! Hooks receive the settings by shared reference while the pipeline holds the
//! register manager mutably, so a hook cannot mutate a property mid-apply.

use std::sync::Arc;

use tracing::{debug, info_span, trace, warn};

use crate::change_tracker::{ensure_bit_table, ChangeMask, ChangeSet, ModuleKind, PropertyChangeTracker};
use crate::error::{LookupKind, SyncError, SyncResult};
use crate::hardware::RegisterAccess;
use crate::parameter::{ParamType, ParamValue, Property, PropertyInfo, PropertyState};
use crate::register::RegisterSnapshot;
use crate::register_group::RegisterGroup;
use crate::register_manager::{ApplyReport, RegisterManager};

/// Stage of the apply sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    Validating,
    ComputingRegisters,
    WritingHardware,
    Rejected,
}

/// Module-specific behavior plugged into the pipeline.
pub trait ModuleSettings: Send + Sync + 'static {
    /// Which row set of the change-bit table this module uses.
    const KIND: ModuleKind;

    /// Register groups in apply order. Values are filled in by
    /// [`compute_registers`](Self::compute_registers) before the initial push.
    fn register_groups(&self) -> SyncResult<Vec<RegisterGroup>>;

    /// Check the settings selected by `changes`. Returns the rejection reason.
    fn validate(&self, changes: &ChangeSet) -> Result<(), String>;

    /// Write register caches for the settings selected by `changes`.
    fn compute_registers(
        &self,
        changes: &ChangeSet,
        registers: &mut RegisterManager,
    ) -> SyncResult<()>;

    fn properties(&self) -> Vec<&dyn PropertyState>;

    fn properties_mut(&mut self) -> Vec<&mut dyn PropertyState>;
}

/// One instrument module: settings, register map, change tracker and driver.
pub struct Module<S: ModuleSettings> {
    name: String,
    settings: S,
    registers: RegisterManager,
    tracker: PropertyChangeTracker,
    driver: Arc<dyn RegisterAccess>,
    state: ApplyState,
}

impl<S: ModuleSettings> Module<S> {
    /// Build the register map from `settings` and push every initial value to hardware.
    pub fn new(
        name: impl Into<String>,
        settings: S,
        driver: Arc<dyn RegisterAccess>,
    ) -> SyncResult<Self> {
        ensure_bit_table()?;

        let name = name.into();
        let _span = info_span!("module_init", module = %name, kind = S::KIND.name()).entered();

        settings
            .validate(&ChangeSet::Forced)
            .map_err(|reason| SyncError::Validation {
                module: name.clone(),
                reason,
            })?;

        let mut registers = RegisterManager::new();
        for group in settings.register_groups()? {
            registers.add_group(group);
        }
        settings.compute_registers(&ChangeSet::Forced, &mut registers)?;

        let report = registers.initialize(driver.as_ref())?;
        debug!(written = report.written, driver = driver.name(), "initial register push");

        Ok(Self {
            name,
            settings,
            registers,
            tracker: PropertyChangeTracker::new(S::KIND),
            driver,
            state: ApplyState::Idle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn registers(&self) -> &RegisterManager {
        &self.registers
    }

    pub fn tracker(&self) -> &PropertyChangeTracker {
        &self.tracker
    }

    pub fn driver(&self) -> &Arc<dyn RegisterAccess> {
        &self.driver
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Set one typed property selected from the settings.
    ///
    /// Returns whether the value changed. On change the property's bits are
    /// re-evaluated: they are marked pending while any property sharing them differs
    /// from its applied value, and cleared once all of them are back.
    pub fn update<T: ParamType>(
        &mut self,
        select: impl FnOnce(&mut S) -> &mut Property<T>,
        value: T,
    ) -> SyncResult<bool> {
        let property = select(&mut self.settings);
        let bits = property.bits();
        let changed = property.set(value)?;
        if changed {
            self.refresh_pending(bits);
        }
        Ok(changed)
    }

    pub fn get_value(&self, property: &str) -> SyncResult<ParamValue> {
        self.settings
            .properties()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(property))
            .map(|p| p.value())
            .ok_or_else(|| SyncError::not_found(LookupKind::Property, property))
    }

    /// By-name counterpart of [`update`](Self::update).
    pub fn set_value(&mut self, property: &str, value: &ParamValue) -> SyncResult<bool> {
        let target = self
            .settings
            .properties_mut()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(property))
            .ok_or_else(|| SyncError::not_found(LookupKind::Property, property))?;
        let bits = target.bits();
        let changed = target.set_value(value)?;
        if changed {
            self.refresh_pending(bits);
        }
        Ok(changed)
    }

    pub fn describe(&self) -> Vec<PropertyInfo> {
        self.settings.properties().into_iter().map(|p| p.info()).collect()
    }

    /// Mark `bits` pending without changing any value (`ChangeMask::ALL` marks all).
    ///
    /// Marked bits stay pending until the next successful apply, even if every
    /// property sharing them is set back to its applied value.
    pub fn mark_pending(&mut self, bits: ChangeMask) {
        self.tracker.hold(bits);
    }

    fn refresh_pending(&mut self, bits: ChangeMask) {
        let properties = self.settings.properties();
        for index in 0..u64::BITS {
            let bit = ChangeMask::bit(index);
            if !bits.intersects(bit) {
                continue;
            }
            let still_modified = properties
                .iter()
                .any(|p| p.bits().intersects(bit) && p.is_modified());
            if still_modified || self.tracker.is_held(bit) {
                self.tracker.mark(bit);
            } else {
                self.tracker.clear(bit);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Apply
    // -------------------------------------------------------------------------

    pub fn apply(&mut self) -> SyncResult<ApplyReport> {
        self.apply_with(false)
    }

    /// Recompute and rewrite every register regardless of pending state.
    pub fn apply_forced(&mut self) -> SyncResult<ApplyReport> {
        self.apply_with(true)
    }

    fn apply_with(&mut self, force: bool) -> SyncResult<ApplyReport> {
        let span = info_span!("apply", module = %self.name, force);
        let _enter = span.enter();

        let changes = if force {
            ChangeSet::Forced
        } else {
            ChangeSet::Pending(self.tracker.pending())
        };

        self.transition(ApplyState::Validating);
        if let Err(reason) = self.settings.validate(&changes) {
            self.transition(ApplyState::Rejected);
            warn!(%reason, "settings rejected");
            self.transition(ApplyState::Idle);
            return Err(SyncError::Validation {
                module: self.name.clone(),
                reason,
            });
        }

        self.transition(ApplyState::ComputingRegisters);
        if force || self.tracker.any_pending() {
            // Register caches now hold these settings; a revert must not drop them
            // before they reach hardware.
            self.tracker.hold(match changes {
                ChangeSet::Forced => ChangeMask::ALL,
                ChangeSet::Pending(mask) => mask,
            });
            if let Err(err) = self.settings.compute_registers(&changes, &mut self.registers) {
                self.transition(ApplyState::Idle);
                return Err(err);
            }
        }

        self.transition(ApplyState::WritingHardware);
        let result = self
            .registers
            .apply_all_to_hw(self.driver.as_ref(), force);
        self.transition(ApplyState::Idle);
        let report = result?;

        for property in self.settings.properties_mut() {
            property.commit();
        }
        self.tracker.clear(ChangeMask::ALL);
        self.tracker.release(ChangeMask::ALL);

        debug!(written = report.written, skipped = report.skipped, "apply complete");
        Ok(report)
    }

    fn transition(&mut self, next: ApplyState) {
        trace!(from = ?self.state, to = ?next, "apply state");
        self.state = next;
    }

    pub fn any_property_change_pending(&self) -> bool {
        self.tracker.any_pending()
    }

    pub fn any_reg_settings_dirty(&self) -> bool {
        self.registers.any_dirty()
    }

    pub fn register_snapshot(&self) -> Vec<GroupSnapshot> {
        self.registers
            .groups()
            .iter()
            .map(|g| GroupSnapshot {
                group: g.name().to_string(),
                registers: g.snapshot(),
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Named register access (diagnostics)
    // -------------------------------------------------------------------------

    pub fn read_register_by_name(&self, group: &str, name: &str) -> SyncResult<u64> {
        self.registers.read_register_by_name(group, name)
    }

    /// Cache-only write; the next `apply` pushes it.
    pub fn write_register_by_name(
        &mut self,
        group: &str,
        name: &str,
        value: u64,
        force: bool,
    ) -> SyncResult<()> {
        self.registers
            .write_register_by_name(group, name, value, force)
    }

    pub fn lock_register_by_name(
        &mut self,
        group: &str,
        name: &str,
        mask: Option<u64>,
    ) -> SyncResult<()> {
        self.registers.lock_register_by_name(group, name, mask)
    }

    pub fn unlock_register_by_name(
        &mut self,
        group: &str,
        name: &str,
        mask: Option<u64>,
    ) -> SyncResult<()> {
        self.registers.unlock_register_by_name(group, name, mask)
    }

    pub fn is_register_locked_by_name(&self, group: &str, name: &str) -> SyncResult<bool> {
        self.registers.is_register_locked_by_name(group, name)
    }

    pub fn read_field_by_name(&self, group: &str, name: &str, field: &str) -> SyncResult<u64> {
        self.registers.read_field_by_name(group, name, field)
    }

    pub fn write_field_by_name(
        &mut self,
        group: &str,
        name: &str,
        field: &str,
        value: u64,
        force: bool,
    ) -> SyncResult<()> {
        self.registers
            .write_field_by_name(group, name, field, value, force)
    }

    pub fn lock_field_by_name(&mut self, group: &str, name: &str, field: &str) -> SyncResult<()> {
        self.registers.lock_field_by_name(group, name, field)
    }

    pub fn unlock_field_by_name(
        &mut self,
        group: &str,
        name: &str,
        field: &str,
    ) -> SyncResult<()> {
        self.registers.unlock_field_by_name(group, name, field)
    }

    pub fn is_field_locked_by_name(
        &self,
        group: &str,
        name: &str,
        field: &str,
    ) -> SyncResult<bool> {
        self.registers.is_field_locked_by_name(group, name, field)
    }

    /// Reload one register cache from hardware. The register ends up clean.
    pub fn refresh_register_from_hw(&mut self, group: &str, name: &str) -> SyncResult<u64> {
        let driver = Arc::clone(&self.driver);
        let reg = self.registers.find_mut(group, name)?;
        let value = driver
            .read_register(reg.address())
            .map_err(|source| SyncError::HardwareRead {
                register: reg.name().to_string(),
                address: reg.address(),
                source,
            })?;
        reg.load_from_hw(value);
        debug!(register = reg.name(), value, "register refreshed from hardware");
        Ok(value)
    }
}

impl<S: ModuleSettings + std::fmt::Debug> std::fmt::Debug for Module<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("pending", &self.tracker.pending())
            .field("driver", &self.driver.name())
            .finish()
    }
}

/// Register values of one group, for listings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupSnapshot {
    pub group: String,
    pub registers: Vec<RegisterSnapshot>,
}

// =============================================================================
// Object-safe view for instruments
// =============================================================================

/// Type-erased module operations, so one instrument can hold different module types.
pub trait ApplySettings: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> ModuleKind;
    fn apply(&mut self) -> SyncResult<ApplyReport>;
    fn apply_forced(&mut self) -> SyncResult<ApplyReport>;
    fn any_property_change_pending(&self) -> bool;
    fn any_reg_settings_dirty(&self) -> bool;
    fn get_value(&self, property: &str) -> SyncResult<ParamValue>;
    fn set_value(&mut self, property: &str, value: &ParamValue) -> SyncResult<bool>;
    fn describe(&self) -> Vec<PropertyInfo>;
    fn register_snapshot(&self) -> Vec<GroupSnapshot>;
}

impl<S: ModuleSettings> ApplySettings for Module<S> {
    fn name(&self) -> &str {
        Module::name(self)
    }

    fn kind(&self) -> ModuleKind {
        S::KIND
    }

    fn apply(&mut self) -> SyncResult<ApplyReport> {
        Module::apply(self)
    }

    fn apply_forced(&mut self) -> SyncResult<ApplyReport> {
        Module::apply_forced(self)
    }

    fn any_property_change_pending(&self) -> bool {
        Module::any_property_change_pending(self)
    }

    fn any_reg_settings_dirty(&self) -> bool {
        Module::any_reg_settings_dirty(self)
    }

    fn get_value(&self, property: &str) -> SyncResult<ParamValue> {
        Module::get_value(self, property)
    }

    fn set_value(&mut self, property: &str, value: &ParamValue) -> SyncResult<bool> {
        Module::set_value(self, property, value)
    }

    fn describe(&self) -> Vec<PropertyInfo> {
        Module::describe(self)
    }

    fn register_snapshot(&self) -> Vec<GroupSnapshot> {
        Module::register_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_tracker::Setting;
    use crate::hardware::SimulatedRegisterBus;
    use crate::register::{Register, RegisterWidth};
    use tracing_test::traced_test;

    /// Two properties sharing one bit, one register.
    #[derive(Debug)]
    struct Pair {
        low: Property<i64>,
        high: Property<i64>,
    }

    impl Pair {
        fn new() -> Self {
            let bits = Setting::OutputLevel.mask();
            Self {
                low: Property::new("Low", 1).with_range(0, 100).with_bits(bits),
                high: Property::new("High", 2).with_range(0, 100).with_bits(bits),
            }
        }
    }

    impl ModuleSettings for Pair {
        const KIND: ModuleKind = ModuleKind::Source;

        fn register_groups(&self) -> SyncResult<Vec<RegisterGroup>> {
            Ok(vec![RegisterGroup::new(
                "PairReg",
                vec![Register::new("Packed", 0x0, RegisterWidth::Bits32)],
            )?])
        }

        fn validate(&self, _changes: &ChangeSet) -> Result<(), String> {
            if self.low.get() > self.high.get() {
                return Err("low above high".into());
            }
            Ok(())
        }

        fn compute_registers(
            &self,
            changes: &ChangeSet,
            registers: &mut RegisterManager,
        ) -> SyncResult<()> {
            if changes.contains(Setting::OutputLevel.mask()) {
                let packed = ((self.high.get() as u64) << 8) | self.low.get() as u64;
                registers
                    .register_mut("PairReg", "Packed")?
                    .write(packed, false)?;
            }
            Ok(())
        }

        fn properties(&self) -> Vec<&dyn PropertyState> {
            vec![&self.low, &self.high]
        }

        fn properties_mut(&mut self) -> Vec<&mut dyn PropertyState> {
            vec![&mut self.low, &mut self.high]
        }
    }

    fn pair_module() -> (Arc<SimulatedRegisterBus>, Module<Pair>) {
        let bus = Arc::new(SimulatedRegisterBus::new("sim"));
        let module = Module::new("pair", Pair::new(), bus.clone()).unwrap();
        (bus, module)
    }

    #[test]
    fn construction_pushes_computed_initial_values() {
        let (bus, module) = pair_module();
        assert_eq!(bus.value_at(0x0), Some(0x0201));
        assert!(!module.any_property_change_pending());
        assert!(!module.any_reg_settings_dirty());
        assert_eq!(module.state(), ApplyState::Idle);
    }

    #[test]
    fn shared_bit_clears_only_when_all_sharers_revert() {
        let (_bus, mut module) = pair_module();

        module.update(|s| &mut s.low, 5).unwrap();
        module.update(|s| &mut s.high, 9).unwrap();
        assert!(module.any_property_change_pending());

        module.update(|s| &mut s.low, 1).unwrap();
        assert!(module.any_property_change_pending());

        module.update(|s| &mut s.high, 2).unwrap();
        assert!(!module.any_property_change_pending());
    }

    #[test]
    fn rejected_apply_keeps_pending_and_registers() {
        let (bus, mut module) = pair_module();
        bus.clear_log();

        module.update(|s| &mut s.low, 50).unwrap();
        let err = module.apply().unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert!(module.any_property_change_pending());
        assert!(!module.any_reg_settings_dirty());
        assert_eq!(bus.write_count(), 0);
        assert_eq!(module.state(), ApplyState::Idle);

        module.update(|s| &mut s.high, 60).unwrap();
        module.apply().unwrap();
        assert_eq!(bus.value_at(0x0), Some((60 << 8) | 50));
    }

    #[test]
    fn by_name_access() {
        let (_bus, mut module) = pair_module();
        assert_eq!(module.get_value("low").unwrap(), ParamValue::Int(1));
        assert!(module.set_value("HIGH", &ParamValue::Int(7)).unwrap());
        assert!(module.any_property_change_pending());
        assert!(matches!(
            module.set_value("missing", &ParamValue::Int(7)),
            Err(SyncError::NotFound {
                kind: LookupKind::Property,
                ..
            })
        ));
    }

    #[test]
    fn refresh_from_hw_loads_cache_clean() {
        let (bus, mut module) = pair_module();
        bus.preload(0x0, 0xABCD);
        assert_eq!(module.refresh_register_from_hw("*", "Packed").unwrap(), 0xABCD);
        assert_eq!(module.read_register_by_name("PairReg", "0x0").unwrap(), 0xABCD);
        assert!(!module.any_reg_settings_dirty());
    }

    #[test]
    fn explicit_mark_survives_revert() {
        let (_bus, mut module) = pair_module();
        let bits = Setting::OutputLevel.mask();

        module.mark_pending(bits);
        module.update(|s| &mut s.low, 5).unwrap();
        module.update(|s| &mut s.low, 1).unwrap();
        assert!(module.tracker().is_pending(bits));

        module.apply().unwrap();
        assert!(!module.any_property_change_pending());
        assert_eq!(module.tracker().held(), ChangeMask::NONE);
    }

    #[test]
    fn revert_after_failed_write_reaches_hardware() {
        let (bus, mut module) = pair_module();

        module.update(|s| &mut s.low, 7).unwrap();
        bus.fail_writes_at(0x0);
        assert!(matches!(
            module.apply(),
            Err(SyncError::HardwareWrite { .. })
        ));
        bus.clear_failures();

        module.update(|s| &mut s.low, 1).unwrap();
        assert!(module.any_property_change_pending());

        module.apply().unwrap();
        assert_eq!(bus.value_at(0x0), Some(0x0201));
        assert!(!module.any_property_change_pending());
        assert!(!module.any_reg_settings_dirty());
    }

    #[test]
    #[traced_test]
    fn rejection_and_writes_are_logged() {
        let (_bus, mut module) = pair_module();

        module.update(|s| &mut s.low, 50).unwrap();
        assert!(module.apply().is_err());
        assert!(logs_contain("settings rejected"));

        module.update(|s| &mut s.low, 2).unwrap();
        module.apply().unwrap();
        assert!(logs_contain("writing register"));
        assert!(logs_contain("apply complete"));
    }
}
