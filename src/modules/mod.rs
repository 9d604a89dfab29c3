//! Concrete instrument modules.
//!
//! Every module type is a [`ModuleSettings`](crate::pipeline::ModuleSettings)
//! implementation driven by the shared [`Module`](crate::pipeline::Module) pipeline:
//!
//! - [`common`] - settings every module carries (enable, reference clock)
//! - [`receiver`] - swept receiver: frequency range, attenuation, detector
//! - [`source`] - signal source: output frequency, level, RF switch
//!
//! Derived modules embed [`CommonSettings`] and layer their own register groups after
//! the `CommonReg` group, so the common control register is always written first.
//! Their change bits come from the central table in
//! [`change_tracker`](crate::change_tracker) and never overlap the common bits.

pub mod common;
pub mod receiver;
pub mod source;

pub use common::{CommonModule, CommonSettings, DerivesCommon, ReferenceClock};
pub use receiver::{Detector, ReceiverModule, ReceiverSettings};
pub use source::{SourceModule, SourceSettings};

/// Group written last by derived modules; committing it makes staged values take effect.
pub const LATCH_GROUP: &str = "SwLatches";

/// Split a 64-bit quantity into `(low, high)` 32-bit register words.
pub(crate) fn split_words(value: u64) -> (u64, u64) {
    (value & 0xFFFF_FFFF, value >> 32)
}
