//! RegisterGroup - an ordered, named collection of registers.
//!
//! Group names and register names are matched case-insensitively. Insertion order is
//! creation order and is preserved for listing and for the hardware apply walk.

use crate::error::{LookupKind, SyncError, SyncResult};
use crate::register::{Register, RegisterSnapshot};

#[derive(Debug, Clone)]
pub struct RegisterGroup {
    name: String,
    registers: Vec<Register>,
}

impl RegisterGroup {
    /// Build a group from its registers.
    ///
    /// Every register is checked with [`Register::validate_definition`], and register
    /// names and addresses must be unique within the group so lookups stay unambiguous.
    /// All registers start dirty so the first hardware apply pushes every one of them.
    pub fn new(name: impl Into<String>, registers: Vec<Register>) -> SyncResult<Self> {
        let name = name.into();

        for (index, reg) in registers.iter().enumerate() {
            reg.validate_definition()?;

            for earlier in &registers[..index] {
                if earlier.name().eq_ignore_ascii_case(reg.name()) {
                    return Err(SyncError::Definition(format!(
                        "duplicate register name '{}' in group '{}'",
                        reg.name(),
                        name
                    )));
                }
                if earlier.address() == reg.address() {
                    return Err(SyncError::Definition(format!(
                        "registers '{}' and '{}' in group '{}' share address {:#x}",
                        earlier.name(),
                        reg.name(),
                        name,
                        reg.address()
                    )));
                }
            }
        }

        Ok(Self { name, registers })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn register(&self, name: &str) -> SyncResult<&Register> {
        self.registers
            .iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| self.missing(name))
    }

    pub fn register_mut(&mut self, name: &str) -> SyncResult<&mut Register> {
        let group = self.name.clone();
        self.registers
            .iter_mut()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| SyncError::not_found(LookupKind::Register, format!("{group}/{name}")))
    }

    pub fn register_by_address(&self, address: u64) -> SyncResult<&Register> {
        self.registers
            .iter()
            .find(|reg| reg.address() == address)
            .ok_or_else(|| self.missing(&format!("{address:#x}")))
    }

    pub fn register_by_address_mut(&mut self, address: u64) -> SyncResult<&mut Register> {
        let group = self.name.clone();
        self.registers
            .iter_mut()
            .find(|reg| reg.address() == address)
            .ok_or_else(|| {
                SyncError::not_found(LookupKind::Register, format!("{group}/{address:#x}"))
            })
    }

    /// Registers in creation order.
    pub fn all(&self) -> &[Register] {
        &self.registers
    }

    pub(crate) fn all_mut(&mut self) -> &mut [Register] {
        &mut self.registers
    }

    pub(crate) fn split_mut(&mut self) -> (&str, &mut [Register]) {
        (&self.name, &mut self.registers)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn any_dirty(&self) -> bool {
        self.registers.iter().any(Register::is_dirty)
    }

    pub fn any_locked(&self) -> bool {
        self.registers.iter().any(Register::is_locked)
    }

    pub fn snapshot(&self) -> Vec<RegisterSnapshot> {
        self.registers.iter().map(Register::snapshot).collect()
    }

    fn missing(&self, name: &str) -> SyncError {
        SyncError::not_found(LookupKind::Register, format!("{}/{}", self.name, name))
    }
}
