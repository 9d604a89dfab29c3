//! PropertyChangeTracker - which logical settings have pending changes.
//!
//! Pending changes are tracked per *logical setting* (frequency range, attenuation, ...),
//! not per register. Each setting owns one bit of a module's [`ChangeMask`].
//!
//! # Bit allocation
//!
//! Bits are assigned in one central table, [`SETTING_TABLE`], mapping every
//! `(module kind, setting)` pair to a bit index. A module kind may build on a parent
//! kind (receiver and source modules both build on the common module), and a kind's
//! bits must never collide with the bits of any of its ancestors. Sibling kinds may
//! reuse the same bit indices because they never share a tracker.
//!
//! [`verify_bit_table`] checks that contract. It runs once, lazily, the first time a
//! module is constructed, and is also covered by a dedicated test.
//!
//! ```text
//!   bit:      0        1          8               9            10
//! Common   Enabled  RefClock
//! Receiver                   FrequencyRange  Attenuation    Detector
//! Source                     OutputFrequency OutputLevel    RfOutput
//! ```

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use once_cell::sync::Lazy;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// ChangeMask
// =============================================================================

/// Set of logical-setting bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeMask(u64);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);

    /// Reserved pattern spanning every level of the hierarchy.
    ///
    /// `is_pending(ALL)` is always true, and `mark(ALL)` sets every bit allocated to
    /// the tracker's module kind and its ancestors.
    pub const ALL: ChangeMask = ChangeMask(u64::MAX);

    pub const fn bit(index: u32) -> Self {
        ChangeMask(1u64 << index)
    }

    pub const fn from_bits(bits: u64) -> Self {
        ChangeMask(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: ChangeMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ChangeMask {
    type Output = ChangeMask;

    fn bitand(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 & rhs.0)
    }
}

impl Not for ChangeMask {
    type Output = ChangeMask;

    fn not(self) -> ChangeMask {
        ChangeMask(!self.0)
    }
}

// =============================================================================
// Bit allocation table
// =============================================================================

/// Module types that own change bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Settings every module carries.
    Common,
    Receiver,
    Source,
}

impl ModuleKind {
    pub fn parent(self) -> Option<ModuleKind> {
        match self {
            ModuleKind::Common => None,
            ModuleKind::Receiver | ModuleKind::Source => Some(ModuleKind::Common),
        }
    }

    /// `self` followed by each ancestor, nearest first.
    pub fn lineage(self) -> impl Iterator<Item = ModuleKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    pub fn is_ancestor_or_self_of(self, other: ModuleKind) -> bool {
        other.lineage().any(|kind| kind == self)
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Common => "common",
            ModuleKind::Receiver => "receiver",
            ModuleKind::Source => "source",
        }
    }
}

/// Logical settings tracked for pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    Enabled,
    ReferenceClock,
    FrequencyRange,
    Attenuation,
    Detector,
    OutputFrequency,
    OutputLevel,
    RfOutput,
}

impl Setting {
    pub const ALL_SETTINGS: [Setting; 8] = [
        Setting::Enabled,
        Setting::ReferenceClock,
        Setting::FrequencyRange,
        Setting::Attenuation,
        Setting::Detector,
        Setting::OutputFrequency,
        Setting::OutputLevel,
        Setting::RfOutput,
    ];

    /// Bit mask assigned to this setting in [`SETTING_TABLE`].
    pub fn mask(self) -> ChangeMask {
        SETTING_TABLE
            .iter()
            .find(|entry| entry.setting == self)
            .map(|entry| ChangeMask::bit(entry.bit))
            .unwrap_or(ChangeMask::NONE)
    }
}

/// One row of the allocation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingBit {
    pub owner: ModuleKind,
    pub setting: Setting,
    pub bit: u32,
}

const fn entry(owner: ModuleKind, setting: Setting, bit: u32) -> SettingBit {
    SettingBit {
        owner,
        setting,
        bit,
    }
}

/// Central `(module kind, setting) -> bit index` table.
pub const SETTING_TABLE: &[SettingBit] = &[
    entry(ModuleKind::Common, Setting::Enabled, 0),
    entry(ModuleKind::Common, Setting::ReferenceClock, 1),
    entry(ModuleKind::Receiver, Setting::FrequencyRange, 8),
    entry(ModuleKind::Receiver, Setting::Attenuation, 9),
    entry(ModuleKind::Receiver, Setting::Detector, 10),
    entry(ModuleKind::Source, Setting::OutputFrequency, 8),
    entry(ModuleKind::Source, Setting::OutputLevel, 9),
    entry(ModuleKind::Source, Setting::RfOutput, 10),
];

/// Union of the bits owned by `kind` and all of its ancestors.
pub fn allocated_mask(kind: ModuleKind) -> ChangeMask {
    SETTING_TABLE
        .iter()
        .filter(|entry| entry.owner.is_ancestor_or_self_of(kind))
        .fold(ChangeMask::NONE, |mask, entry| {
            mask | ChangeMask::bit(entry.bit)
        })
}

/// Check the allocation table for collisions.
///
/// Every setting must appear exactly once, every bit must fit in a `u64` mask, and no
/// two settings visible to the same module kind (its own or an ancestor's) may share a
/// bit.
pub fn verify_bit_table() -> Result<(), String> {
    for setting in Setting::ALL_SETTINGS {
        let rows = SETTING_TABLE
            .iter()
            .filter(|entry| entry.setting == setting)
            .count();
        if rows != 1 {
            return Err(format!("setting {setting:?} has {rows} table entries"));
        }
    }

    for (index, a) in SETTING_TABLE.iter().enumerate() {
        if a.bit >= u64::BITS {
            return Err(format!("setting {:?} uses bit {} beyond 63", a.setting, a.bit));
        }
        for b in &SETTING_TABLE[index + 1..] {
            let related =
                a.owner.is_ancestor_or_self_of(b.owner) || b.owner.is_ancestor_or_self_of(a.owner);
            if related && a.bit == b.bit {
                return Err(format!(
                    "bit {} shared by {}::{:?} and {}::{:?}",
                    a.bit,
                    a.owner.name(),
                    a.setting,
                    b.owner.name(),
                    b.setting
                ));
            }
        }
    }

    Ok(())
}

static BIT_TABLE_CHECK: Lazy<Result<(), String>> = Lazy::new(verify_bit_table);

/// Startup check of the allocation table, evaluated once per process.
pub fn ensure_bit_table() -> SyncResult<()> {
    BIT_TABLE_CHECK
        .as_ref()
        .map(|_| ())
        .map_err(|reason| SyncError::Definition(reason.clone()))
}

// =============================================================================
// Tracker
// =============================================================================

/// Pending-change bitmask of one module instance.
///
/// Held bits are pending bits that reverting a property cannot clear: bits marked
/// explicitly and bits whose registers were computed but not yet confirmed on
/// hardware. Only [`release`](Self::release) drops them.
#[derive(Debug, Clone)]
pub struct PropertyChangeTracker {
    kind: ModuleKind,
    allocated: ChangeMask,
    pending: ChangeMask,
    held: ChangeMask,
}

impl PropertyChangeTracker {
    pub fn new(kind: ModuleKind) -> Self {
        Self {
            kind,
            allocated: allocated_mask(kind),
            pending: ChangeMask::NONE,
            held: ChangeMask::NONE,
        }
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Every bit this tracker's module kind may use.
    pub fn allocated(&self) -> ChangeMask {
        self.allocated
    }

    pub fn pending(&self) -> ChangeMask {
        self.pending
    }

    fn expand(&self, bits: ChangeMask) -> ChangeMask {
        if bits == ChangeMask::ALL {
            self.allocated
        } else {
            bits
        }
    }

    pub fn mark(&mut self, bits: ChangeMask) {
        self.pending |= self.expand(bits);
    }

    /// Mark `bits` pending and keep them pending until released.
    pub fn hold(&mut self, bits: ChangeMask) {
        let bits = self.expand(bits);
        self.held |= bits;
        self.pending |= bits;
    }

    pub fn held(&self) -> ChangeMask {
        self.held
    }

    pub fn is_held(&self, bits: ChangeMask) -> bool {
        self.held.intersects(bits)
    }

    pub fn release(&mut self, bits: ChangeMask) {
        self.held = self.held & !bits;
    }

    pub fn is_pending(&self, bits: ChangeMask) -> bool {
        bits == ChangeMask::ALL || self.pending.intersects(bits)
    }

    pub fn clear(&mut self, bits: ChangeMask) {
        self.pending = self.pending & !bits;
    }

    pub fn any_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

// =============================================================================
// ChangeSet
// =============================================================================

/// The changes an apply pass works on: either everything (forced) or a pending mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSet {
    Forced,
    Pending(ChangeMask),
}

impl ChangeSet {
    pub fn contains(&self, bits: ChangeMask) -> bool {
        match self {
            ChangeSet::Forced => true,
            ChangeSet::Pending(mask) => mask.intersects(bits),
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, ChangeSet::Forced)
    }
}
