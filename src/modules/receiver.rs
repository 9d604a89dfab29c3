//! Swept receiver module.
//!
//! Settings and the logical setting each one marks:
//!
//! | Property         | Unit | Range              | Setting          |
//! |------------------|------|--------------------|------------------|
//! | `StartFrequency` | Hz   | 10 MHz .. 3 GHz    | `FrequencyRange` |
//! | `StopFrequency`  | Hz   | 10 MHz .. 3 GHz    | `FrequencyRange` |
//! | `Attenuation`    | dB   | 0 .. 31.5          | `Attenuation`    |
//! | `Detector`       | -    | Peak/Average/...   | `Detector`       |
//!
//! Register map, in apply order:
//!
//! ```text
//! CommonReg   Control  0x00
//! ReceiverReg FreqLow  0x10   start frequency, low word
//!             FreqHigh 0x14   start frequency, high word
//!             SpanLow  0x18   stop - start, low word
//!             SpanHigh 0x1C   stop - start, high word
//!             Control  0x20   ATTEN [5:0] (0.5 dB steps), DETECTOR [9:8]
//! SwLatches   Latch    0x40   bit 0 commits frequency, bit 1 commits control
//! ```
//!
//! A frequency-range change rewrites all four frequency words as a unit, even the
//! ones whose value did not change, and every computed change re-arms the latch.

use serde::{Deserialize, Serialize};

use crate::change_tracker::{ChangeSet, ModuleKind, Setting};
use crate::error::SyncResult;
use crate::modules::common::{CommonSettings, DerivesCommon};
use crate::modules::{split_words, LATCH_GROUP};
use crate::parameter::{parse_choice, ParamType, ParamValue, Property, PropertyState};
use crate::pipeline::{Module, ModuleSettings};
use crate::register::{BitField, Register, RegisterWidth};
use crate::register_group::RegisterGroup;
use crate::register_manager::RegisterManager;

pub const RECEIVER_GROUP: &str = "ReceiverReg";

pub const MIN_FREQUENCY_HZ: f64 = 10e6;
pub const MAX_FREQUENCY_HZ: f64 = 3000e6;
pub const MAX_ATTENUATION_DB: f64 = 31.5;
pub const ATTENUATION_STEP_DB: f64 = 0.5;

const LATCH_FREQUENCY: u64 = 0x1;
const LATCH_CONTROL: u64 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub enum Detector {
    Peak,
    Average,
    Sample,
    Rms,
}

impl Detector {
    const CHOICES: [(&'static str, Detector); 4] = [
        ("Peak", Detector::Peak),
        ("Average", Detector::Average),
        ("Sample", Detector::Sample),
        ("Rms", Detector::Rms),
    ];

    fn code(self) -> u64 {
        match self {
            Detector::Peak => 0,
            Detector::Average => 1,
            Detector::Sample => 2,
            Detector::Rms => 3,
        }
    }
}

impl ParamType for Detector {
    fn to_param(&self) -> ParamValue {
        ParamValue::Text(format!("{:?}", self))
    }

    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self> {
        parse_choice(property, value, &Self::CHOICES)
    }
}

#[derive(Debug)]
pub struct ReceiverSettings {
    pub common: CommonSettings,
    pub start_frequency: Property<f64>,
    pub stop_frequency: Property<f64>,
    pub attenuation: Property<f64>,
    pub detector: Property<Detector>,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        let range = Setting::FrequencyRange.mask();
        Self {
            common: CommonSettings::default(),
            start_frequency: Property::new("StartFrequency", 100e6)
                .with_unit("Hz")
                .with_range(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
                .with_bits(range),
            stop_frequency: Property::new("StopFrequency", 200e6)
                .with_unit("Hz")
                .with_range(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
                .with_bits(range),
            attenuation: Property::new("Attenuation", 0.0)
                .with_unit("dB")
                .with_range(0.0, MAX_ATTENUATION_DB)
                .with_bits(Setting::Attenuation.mask()),
            detector: Property::new("Detector", Detector::Peak)
                .with_bits(Setting::Detector.mask()),
        }
    }
}

impl ReceiverSettings {
    fn attenuation_code(&self) -> u64 {
        (self.attenuation.get() / ATTENUATION_STEP_DB).round() as u64
    }
}

impl DerivesCommon for ReceiverSettings {
    fn common(&self) -> &CommonSettings {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonSettings {
        &mut self.common
    }
}

impl ModuleSettings for ReceiverSettings {
    const KIND: ModuleKind = ModuleKind::Receiver;

    fn register_groups(&self) -> SyncResult<Vec<RegisterGroup>> {
        let mut groups = self.common.register_groups()?;
        groups.push(RegisterGroup::new(
            RECEIVER_GROUP,
            vec![
                Register::new("FreqLow", 0x10, RegisterWidth::Bits32),
                Register::new("FreqHigh", 0x14, RegisterWidth::Bits32),
                Register::new("SpanLow", 0x18, RegisterWidth::Bits32),
                Register::new("SpanHigh", 0x1C, RegisterWidth::Bits32),
                Register::new("Control", 0x20, RegisterWidth::Bits32).with_fields(vec![
                    BitField::new("ATTEN", 0, 6),
                    BitField::new("DETECTOR", 8, 2),
                ]),
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

        if changes.contains(Setting::FrequencyRange.mask()) {
            let start = self.start_frequency.get();
            let stop = self.stop_frequency.get();
            if start >= stop {
                return Err(format!(
                    "start frequency {start} Hz must be below stop frequency {stop} Hz"
                ));
            }
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

        if changes.contains(Setting::FrequencyRange.mask()) {
            let start = self.start_frequency.get().round() as u64;
            let span = (self.stop_frequency.get() - self.start_frequency.get()).round() as u64;
            let (start_low, start_high) = split_words(start);
            let (span_low, span_high) = split_words(span);

            let group = registers.group_mut(RECEIVER_GROUP)?;
            group.register_mut("FreqLow")?.write(start_low, true)?;
            group.register_mut("FreqHigh")?.write(start_high, true)?;
            group.register_mut("SpanLow")?.write(span_low, true)?;
            group.register_mut("SpanHigh")?.write(span_high, true)?;
            latch |= LATCH_FREQUENCY;
        }

        if changes.contains(Setting::Attenuation.mask() | Setting::Detector.mask()) {
            let control = registers.register_mut(RECEIVER_GROUP, "Control")?;
            if changes.contains(Setting::Attenuation.mask()) {
                control.write_field("ATTEN", self.attenuation_code(), false)?;
            }
            if changes.contains(Setting::Detector.mask()) {
                control.write_field("DETECTOR", self.detector.get().code(), false)?;
            }
            latch |= LATCH_CONTROL;
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
        props.push(&self.start_frequency);
        props.push(&self.stop_frequency);
        props.push(&self.attenuation);
        props.push(&self.detector);
        props
    }

    fn properties_mut(&mut self) -> Vec<&mut dyn PropertyState> {
        let mut props = self.common.properties_mut();
        props.push(&mut self.start_frequency);
        props.push(&mut self.stop_frequency);
        props.push(&mut self.attenuation);
        props.push(&mut self.detector);
        props
    }
}

pub type ReceiverModule = Module<ReceiverSettings>;

impl Module<ReceiverSettings> {
    pub fn start_frequency(&self) -> f64 {
        self.settings().start_frequency.get()
    }

    pub fn set_start_frequency(&mut self, hz: f64) -> SyncResult<bool> {
        self.update(|s| &mut s.start_frequency, hz)
    }

    pub fn stop_frequency(&self) -> f64 {
        self.settings().stop_frequency.get()
    }

    pub fn set_stop_frequency(&mut self, hz: f64) -> SyncResult<bool> {
        self.update(|s| &mut s.stop_frequency, hz)
    }

    pub fn attenuation(&self) -> f64 {
        self.settings().attenuation.get()
    }

    /// Set attenuation, snapped to the nearest 0.5 dB step.
    pub fn set_attenuation(&mut self, db: f64) -> SyncResult<bool> {
        let snapped = (db / ATTENUATION_STEP_DB).round() * ATTENUATION_STEP_DB;
        self.update(|s| &mut s.attenuation, snapped)
    }

    pub fn detector(&self) -> Detector {
        self.settings().detector.get()
    }

    pub fn set_detector(&mut self, detector: Detector) -> SyncResult<bool> {
        self.update(|s| &mut s.detector, detector)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::SyncError;
    use crate::hardware::SimulatedRegisterBus;

    fn receiver() -> (Arc<SimulatedRegisterBus>, ReceiverModule) {
        let bus = Arc::new(SimulatedRegisterBus::new("sim"));
        let module = ReceiverModule::new("rx", ReceiverSettings::default(), bus.clone()).unwrap();
        bus.clear_log();
        (bus, module)
    }

    #[test]
    fn register_groups_in_apply_order() {
        let (_bus, module) = receiver();
        let names: Vec<_> = module
            .registers()
            .groups()
            .iter()
            .map(|g| g.name().to_string())
            .collect();
        assert_eq!(names, ["CommonReg", "ReceiverReg", "SwLatches"]);
    }

    #[test]
    fn start_frequency_writes_frequency_words_then_latch() {
        let (bus, mut module) = receiver();

        assert!(module.set_start_frequency(150e6).unwrap());
        assert!(module.tracker().is_pending(Setting::FrequencyRange.mask()));

        module.apply().unwrap();
        assert_eq!(bus.written_addresses(), vec![0x10, 0x14, 0x18, 0x1C, 0x40]);
        assert_eq!(bus.value_at(0x10), Some(150_000_000));
        assert_eq!(bus.value_at(0x18), Some(50_000_000));
        assert_eq!(bus.value_at(0x40), Some(LATCH_FREQUENCY));
    }

    #[test]
    fn attenuation_and_detector_share_control_register() {
        let (bus, mut module) = receiver();

        module.set_attenuation(10.3).unwrap();
        assert_eq!(module.attenuation(), 10.5);
        module.set_detector(Detector::Rms).unwrap();
        module.apply().unwrap();

        assert_eq!(bus.written_addresses(), vec![0x20, 0x40]);
        assert_eq!(bus.value_at(0x20), Some((3 << 8) | 21));
        assert_eq!(bus.value_at(0x40), Some(LATCH_CONTROL));
    }

    #[test]
    fn inverted_range_is_rejected_until_fixed() {
        let (bus, mut module) = receiver();

        module.set_start_frequency(500e6).unwrap();
        let err = module.apply().unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert_eq!(bus.write_count(), 0);
        assert!(module.any_property_change_pending());

        module.set_stop_frequency(800e6).unwrap();
        module.apply().unwrap();
        assert_eq!(bus.value_at(0x18), Some(300_000_000));
    }

    #[test]
    fn detector_by_name() {
        let (_bus, mut module) = receiver();
        module
            .set_value("detector", &ParamValue::Text("average".into()))
            .unwrap();
        assert_eq!(module.detector(), Detector::Average);
        assert_eq!(
            module.get_value("Detector").unwrap(),
            ParamValue::Text("Average".into())
        );
    }

    #[test]
    fn unchanged_high_words_are_still_rewritten() {
        let (bus, mut module) = receiver();
        module.set_stop_frequency(3000e6).unwrap();
        module.apply().unwrap();

        assert_eq!(bus.value_at(0x18), Some(2_900_000_000));
        assert_eq!(bus.value_at(0x1C), Some(0));
        let high_writes = bus
            .write_log()
            .iter()
            .filter(|w| w.address == 0x14 || w.address == 0x1C)
            .count();
        assert_eq!(high_writes, 2);
    }
}
