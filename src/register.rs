//! Register - a named, addressed cache of a hardware-writable value.
//!
//! A [`Register`] holds the value the engine *intends* the hardware to have. It tracks
//! whether that value has been confirmed on the hardware (`dirty`) and which bits are
//! currently protected from writes (`lock_mask`).
//!
//! # Write semantics
//!
//! ```text
//! effective = (cached & lock_mask) | (incoming & !lock_mask)
//! dirty    |= effective != cached || force
//! cached    = effective
//! ```
//!
//! Bits covered by the lock mask keep their prior value and never cause the register
//! to become dirty on their own.
//!
//! # Bit fields
//!
//! Registers declared with [`RegisterKind::BitFields`] can additionally be accessed
//! through named fields. Field writes are read-modify-write operations on the cached
//! value and go through the same lock merge as whole-register writes.

use serde::Serialize;

use crate::error::{LookupKind, SyncError, SyncResult};

/// Declared storage width of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegisterWidth {
    Bits32,
    Bits64,
}

impl RegisterWidth {
    pub fn bits(self) -> u32 {
        match self {
            RegisterWidth::Bits32 => 32,
            RegisterWidth::Bits64 => 64,
        }
    }

    /// Mask covering every valid bit of this width.
    pub fn mask(self) -> u64 {
        match self {
            RegisterWidth::Bits32 => u32::MAX as u64,
            RegisterWidth::Bits64 => u64::MAX,
        }
    }
}

/// A named bit range inside a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitField {
    name: String,
    lsb: u32,
    width: u32,
}

impl BitField {
    pub fn new(name: impl Into<String>, lsb: u32, width: u32) -> Self {
        Self {
            name: name.into(),
            lsb,
            width,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lsb(&self) -> u32 {
        self.lsb
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Unshifted mask of the field's value range.
    pub fn value_mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Mask of the field's bit positions within the register.
    pub fn mask(&self) -> u64 {
        self.value_mask() << self.lsb
    }

    fn extract(&self, register_value: u64) -> u64 {
        (register_value >> self.lsb) & self.value_mask()
    }
}

/// Plain register vs bit-field-addressable register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegisterKind {
    Plain,
    BitFields(Vec<BitField>),
}

/// Serializable view of a register's state, used for diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterSnapshot {
    pub name: String,
    pub address: u64,
    pub value: u64,
    pub dirty: bool,
    pub lock_mask: u64,
}

/// Named, addressed, typed register cache.
#[derive(Debug, Clone)]
pub struct Register {
    name: String,
    address: u64,
    width: RegisterWidth,
    kind: RegisterKind,
    value: u64,
    dirty: bool,
    lock_mask: u64,
}

impl Register {
    /// Create a plain register with an initial value of zero.
    ///
    /// New registers start dirty so the first hardware apply establishes a known state.
    pub fn new(name: impl Into<String>, address: u64, width: RegisterWidth) -> Self {
        Self {
            name: name.into(),
            address,
            width,
            kind: RegisterKind::Plain,
            value: 0,
            dirty: true,
            lock_mask: 0,
        }
    }

    /// Set the initial cached value.
    pub fn with_initial(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    /// Declare named bit fields, turning this into a bit-field-addressable register.
    pub fn with_fields(mut self, fields: Vec<BitField>) -> Self {
        self.kind = RegisterKind::BitFields(fields);
        self
    }

    /// Check the declaration for internal consistency.
    ///
    /// The initial value must fit the width; fields must fit the width, have unique
    /// names and must not overlap.
    pub fn validate_definition(&self) -> SyncResult<()> {
        self.check_width(self.value)?;

        if let RegisterKind::BitFields(fields) = &self.kind {
            let mut used = 0u64;
            for (index, field) in fields.iter().enumerate() {
                let end = field.lsb.checked_add(field.width);
                if field.width == 0 || end.map_or(true, |end| end > self.width.bits()) {
                    return Err(SyncError::Definition(format!(
                        "field {}.{} (lsb {}, width {}) does not fit a {}-bit register",
                        self.name,
                        field.name,
                        field.lsb,
                        field.width,
                        self.width.bits()
                    )));
                }
                if used & field.mask() != 0 {
                    return Err(SyncError::Definition(format!(
                        "field {}.{} overlaps another field",
                        self.name, field.name
                    )));
                }
                if fields[..index]
                    .iter()
                    .any(|other| other.name.eq_ignore_ascii_case(&field.name))
                {
                    return Err(SyncError::Definition(format!(
                        "duplicate field name {}.{}",
                        self.name, field.name
                    )));
                }
                used |= field.mask();
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn width(&self) -> RegisterWidth {
        self.width
    }

    pub fn kind(&self) -> &RegisterKind {
        &self.kind
    }

    /// Declared bit fields (empty for plain registers).
    pub fn fields(&self) -> &[BitField] {
        match &self.kind {
            RegisterKind::Plain => &[],
            RegisterKind::BitFields(fields) => fields,
        }
    }

    /// Current cached value.
    pub fn read(&self) -> u64 {
        self.value
    }

    /// Write a new value into the cache, honoring the lock mask.
    ///
    /// Returns `OutOfRange` without touching the register if `value` is wider than the
    /// declared width.
    pub fn write(&mut self, value: u64, force: bool) -> SyncResult<()> {
        self.check_width(value)?;

        let effective = (self.value & self.lock_mask) | (value & !self.lock_mask);
        if effective != self.value || force {
            self.dirty = true;
        }
        self.value = effective;
        Ok(())
    }

    /// Add bits to the lock mask.
    pub fn lock(&mut self, mask: u64) {
        self.lock_mask |= mask & self.width.mask();
    }

    /// Remove bits from the lock mask.
    pub fn unlock(&mut self, mask: u64) {
        self.lock_mask &= !mask;
    }

    pub fn is_locked(&self) -> bool {
        self.lock_mask != 0
    }

    pub fn lock_mask(&self) -> u64 {
        self.lock_mask
    }

    /// Whether the cache differs from the last value confirmed on hardware.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record a successful hardware write of the cached value.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Replace the cache with a value read back from hardware.
    pub fn load_from_hw(&mut self, value: u64) {
        self.value = value & self.width.mask();
        self.dirty = false;
    }

    /// Look up a field by case-insensitive name.
    pub fn field(&self, name: &str) -> SyncResult<&BitField> {
        self.fields()
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                SyncError::not_found(LookupKind::Field, format!("{}.{}", self.name, name))
            })
    }

    pub fn read_field(&self, name: &str) -> SyncResult<u64> {
        let field = self.field(name)?;
        Ok(field.extract(self.value))
    }

    /// Read-modify-write a single field of the cached value.
    pub fn write_field(&mut self, name: &str, value: u64, force: bool) -> SyncResult<()> {
        let field = self.field(name)?.clone();
        if value & !field.value_mask() != 0 {
            return Err(SyncError::OutOfRange {
                target: format!("field {}.{}", self.name, field.name),
                value,
                bits: field.width,
            });
        }

        let merged = (self.value & !field.mask()) | (value << field.lsb);
        self.write(merged, force)
    }

    pub fn lock_field(&mut self, name: &str) -> SyncResult<()> {
        let mask = self.field(name)?.mask();
        self.lock(mask);
        Ok(())
    }

    pub fn unlock_field(&mut self, name: &str) -> SyncResult<()> {
        let mask = self.field(name)?.mask();
        self.unlock(mask);
        Ok(())
    }

    pub fn is_field_locked(&self, name: &str) -> SyncResult<bool> {
        let mask = self.field(name)?.mask();
        Ok(self.lock_mask & mask != 0)
    }

    pub fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            name: self.name.clone(),
            address: self.address,
            value: self.value,
            dirty: self.dirty,
            lock_mask: self.lock_mask,
        }
    }

    fn check_width(&self, value: u64) -> SyncResult<()> {
        if value & !self.width.mask() != 0 {
            return Err(SyncError::OutOfRange {
                target: format!("register {}", self.name),
                value,
                bits: self.width.bits(),
            });
        }
        Ok(())
    }
}
