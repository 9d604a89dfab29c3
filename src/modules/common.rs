//! Common module settings: enable switch and reference clock selection.
//!
//! Register map (`CommonReg`):
//!
//! | Register | Address | Fields                           |
//! |----------|---------|----------------------------------|
//! | Control  | `0x00`  | `ENABLE` [0], `REF_CLK` [1]      |

use serde::{Deserialize, Serialize};

use crate::change_tracker::{ChangeSet, ModuleKind, Setting};
use crate::error::SyncResult;
use crate::parameter::{parse_choice, ParamType, ParamValue, Property, PropertyState};
use crate::pipeline::{Module, ModuleSettings};
use crate::register::{BitField, Register, RegisterWidth};
use crate::register_group::RegisterGroup;
use crate::register_manager::RegisterManager;

pub const COMMON_GROUP: &str = "CommonReg";

/// Reference clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub enum ReferenceClock {
    Internal,
    External,
}

impl ReferenceClock {
    const CHOICES: [(&'static str, ReferenceClock); 2] = [
        ("Internal", ReferenceClock::Internal),
        ("External", ReferenceClock::External),
    ];

    fn code(self) -> u64 {
        match self {
            ReferenceClock::Internal => 0,
            ReferenceClock::External => 1,
        }
    }
}

impl ParamType for ReferenceClock {
    fn to_param(&self) -> ParamValue {
        ParamValue::Text(format!("{:?}", self))
    }

    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self> {
        parse_choice(property, value, &Self::CHOICES)
    }
}

#[derive(Debug)]
pub struct CommonSettings {
    pub enabled: Property<bool>,
    pub reference_clock: Property<ReferenceClock>,
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self {
            enabled: Property::new("Enabled", true)
                .with_description("Module enable switch")
                .with_bits(Setting::Enabled.mask()),
            reference_clock: Property::new("ReferenceClock", ReferenceClock::Internal)
                .with_description("Reference clock source")
                .with_bits(Setting::ReferenceClock.mask()),
        }
    }
}

/// Access to the embedded common settings of a derived module.
pub trait DerivesCommon {
    fn common(&self) -> &CommonSettings;
    fn common_mut(&mut self) -> &mut CommonSettings;
}

impl DerivesCommon for CommonSettings {
    fn common(&self) -> &CommonSettings {
        self
    }

    fn common_mut(&mut self) -> &mut CommonSettings {
        self
    }
}

impl ModuleSettings for CommonSettings {
    const KIND: ModuleKind = ModuleKind::Common;

    fn register_groups(&self) -> SyncResult<Vec<RegisterGroup>> {
        Ok(vec![RegisterGroup::new(
            COMMON_GROUP,
            vec![
                Register::new("Control", 0x00, RegisterWidth::Bits32).with_fields(vec![
                    BitField::new("ENABLE", 0, 1),
                    BitField::new("REF_CLK", 1, 1),
                ]),
            ],
        )?])
    }

    fn validate(&self, _changes: &ChangeSet) -> Result<(), String> {
        Ok(())
    }

    fn compute_registers(
        &self,
        changes: &ChangeSet,
        registers: &mut RegisterManager,
    ) -> SyncResult<()> {
        let control = registers.register_mut(COMMON_GROUP, "Control")?;
        if changes.contains(Setting::Enabled.mask()) {
            control.write_field("ENABLE", u64::from(self.enabled.get()), false)?;
        }
        if changes.contains(Setting::ReferenceClock.mask()) {
            control.write_field("REF_CLK", self.reference_clock.get().code(), false)?;
        }
        Ok(())
    }

    fn properties(&self) -> Vec<&dyn PropertyState> {
        vec![&self.enabled, &self.reference_clock]
    }

    fn properties_mut(&mut self) -> Vec<&mut dyn PropertyState> {
        vec![&mut self.enabled, &mut self.reference_clock]
    }
}

/// Module with only the common settings.
pub type CommonModule = Module<CommonSettings>;

impl<S: ModuleSettings + DerivesCommon> Module<S> {
    pub fn enabled(&self) -> bool {
        self.settings().common().enabled.get()
    }

    pub fn set_enabled(&mut self, enabled: bool) -> SyncResult<bool> {
        self.update(|s| &mut s.common_mut().enabled, enabled)
    }

    pub fn reference_clock(&self) -> ReferenceClock {
        self.settings().common().reference_clock.get()
    }

    pub fn set_reference_clock(&mut self, clock: ReferenceClock) -> SyncResult<bool> {
        self.update(|s| &mut s.common_mut().reference_clock, clock)
    }
}
