//! Signal source module.
//!
//! ```text
//! CommonReg   Control   0x00
//! SourceReg   FreqLow   0x30   output frequency, low word
//!             FreqHigh  0x34   output frequency, high word
//!             Level     0x38   output level in 0.01 dBm, two's complement
//!             RfControl 0x3C   RF_ON [0]
//! SwLatches   Latch     0x40   bit 0 commits frequency, bit 1 commits level/RF
//! ```
//!
//! The RF output can only be switched on while the module is enabled.

use crate::change_tracker::{ChangeSet, ModuleKind, Setting};
use crate::error::SyncResult;
use crate::modules::common::{CommonSettings, DerivesCommon};
use crate::modules::{split_words, LATCH_GROUP};
use crate::parameter::{Property, PropertyState};
use crate::pipeline::{Module, ModuleSettings};
use crate::register::{BitField, Register, RegisterWidth};
use crate::register_group::RegisterGroup;
use crate::register_manager::RegisterManager;

pub const SOURCE_GROUP: &str = "SourceReg";

pub const MIN_OUTPUT_FREQUENCY_HZ: f64 = 10e6;
pub const MAX_OUTPUT_FREQUENCY_HZ: f64 = 6000e6;
pub const MIN_OUTPUT_LEVEL_DBM: f64 = -120.0;
pub const MAX_OUTPUT_LEVEL_DBM: f64 = 10.0;

const LATCH_FREQUENCY: u64 = 0x1;
const LATCH_OUTPUT: u64 = 0x2;

#[derive(Debug)]
pub struct SourceSettings {
    pub common: CommonSettings,
    pub output_frequency: Property<f64>,
    pub output_level: Property<f64>,
    pub rf_on: Property<bool>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            common: CommonSettings::default(),
            output_frequency: Property::new("OutputFrequency", 1000e6)
                .with_unit("Hz")
                .with_range(MIN_OUTPUT_FREQUENCY_HZ, MAX_OUTPUT_FREQUENCY_HZ)
                .with_bits(Setting::OutputFrequency.mask()),
            output_level: Property::new("OutputLevel", -10.0)
                .with_unit("dBm")
                .with_range(MIN_OUTPUT_LEVEL_DBM, MAX_OUTPUT_LEVEL_DBM)
                .with_bits(Setting::OutputLevel.mask()),
            rf_on: Property::new("RfOn", false)
                .with_description("RF output switch")
                .with_bits(Setting::RfOutput.mask()),
        }
    }
}

impl SourceSettings {
    /// Level in hundredths of a dBm as a 32-bit two's complement word.
    fn level_code(&self) -> u64 {
        let centi_dbm = (self.output_level.get() * 100.0).round() as i32;
        u64::from(centi_dbm as u32)
    }
}

impl DerivesCommon for SourceSettings {
    fn common(&self) -> &CommonSettings {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonSettings {
        &mut self.common
    }
}

impl ModuleSettings for SourceSettings {
    const KIND: ModuleKind = ModuleKind::Source;

    fn register_groups(&self) -> SyncResult<Vec<RegisterGroup>> {
        let mut groups = self.common.register_groups()?;
        groups.push(RegisterGroup::new(
            SOURCE_GROUP,
            vec![
                Register::new("FreqLow", 0x30, RegisterWidth::Bits32),
                Register::new("FreqHigh", 0x34, RegisterWidth::Bits32),
                Register::new("Level", 0x38, RegisterWidth::Bits32),
                Register::new("RfControl", 0x3C, RegisterWidth::Bits32)
                    .with_fields(vec![BitField::new("RF_ON", 0, 1)]),
            ],
        )?);
        groups.push(RegisterGroup::new(
            LATCH_GROUP,
            vec![Register::new("Latch", 0x40, RegisterWidth::Bits32)],
        )?);
        Ok(groups)
    }

    fn validate(&self, changes: &ChangeSet) -> Result<(), String> {
        self.common.validate(changes)?;

        let relevant = Setting::RfOutput.mask() | Setting::Enabled.mask();
        if changes.contains(relevant) && self.rf_on.get() && !self.common.enabled.get() {
            return Err("RF output cannot be switched on while the module is disabled".into());
        }
        Ok(())
    }

    fn compute_registers(
        &self,
        changes: &ChangeSet,
        registers: &mut RegisterManager,
    ) -> SyncResult<()> {
        self.common.compute_registers(changes, registers)?;

        let mut latch = 0;
        let group = registers.group_mut(SOURCE_GROUP)?;

        if changes.contains(Setting::OutputFrequency.mask()) {
            let (low, high) = split_words(self.output_frequency.get().round() as u64);
            group.register_mut("FreqLow")?.write(low, true)?;
            group.register_mut("FreqHigh")?.write(high, true)?;
            latch |= LATCH_FREQUENCY;
        }
        if changes.contains(Setting::OutputLevel.mask()) {
            group.register_mut("Level")?.write(self.level_code(), false)?;
            latch |= LATCH_OUTPUT;
        }
        if changes.contains(Setting::RfOutput.mask()) {
            group
                .register_mut("RfControl")?
                .write_field("RF_ON", u64::from(self.rf_on.get()), false)?;
            latch |= LATCH_OUTPUT;
        }

        if latch != 0 {
            registers
                .register_mut(LATCH_GROUP, "Latch")?
                .write(latch, true)?;
        }
        Ok(())
    }

    fn properties(&self) -> Vec<&dyn PropertyState> {
        let mut props = self.common.properties();
        props.push(&self.output_frequency);
        props.push(&self.output_level);
        props.push(&self.rf_on);
        props
    }

    fn properties_mut(&mut self) -> Vec<&mut dyn PropertyState> {
        let mut props = self.common.properties_mut();
        props.push(&mut self.output_frequency);
        props.push(&mut self.output_level);
        props.push(&mut self.rf_on);
        props
    }
}

pub type SourceModule = Module<SourceSettings>;

impl Module<SourceSettings> {
    pub fn output_frequency(&self) -> f64 {
        self.settings().output_frequency.get()
    }

    pub fn set_output_frequency(&mut self, hz: f64) -> SyncResult<bool> {
        self.update(|s| &mut s.output_frequency, hz)
    }

    pub fn output_level(&self) -> f64 {
        self.settings().output_level.get()
    }

    pub fn set_output_level(&mut self, dbm: f64) -> SyncResult<bool> {
        self.update(|s| &mut s.output_level, dbm)
    }

    pub fn rf_on(&self) -> bool {
        self.settings().rf_on.get()
    }

    pub fn set_rf_on(&mut self, on: bool) -> SyncResult<bool> {
        self.update(|s| &mut s.rf_on, on)
    }
}
