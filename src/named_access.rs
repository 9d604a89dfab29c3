//! Named low-level register access for diagnostics.
//!
//! A register reference is either a case-insensitive register name or a `0x`-prefixed
//! hexadecimal address. The group `"*"` searches every group of the manager; the lookup
//! fails with `AmbiguousName` when more than one group matches.
//!
//! Named writes only touch the register cache. They mark the register dirty and the
//! next `apply` pushes it to hardware like any other change.

use crate::error::{LookupKind, SyncError, SyncResult};
use crate::register::Register;
use crate::register_manager::RegisterManager;

/// Group selector matching every group.
pub const ANY_GROUP: &str = "*";

/// Parsed register reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterRef<'a> {
    Name(&'a str),
    Address(u64),
}

impl<'a> RegisterRef<'a> {
    /// `0x14` / `0X14` parse as addresses, anything else is a name.
    pub fn parse(text: &'a str) -> Self {
        let trimmed = text.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"));
        match hex.map(|digits| u64::from_str_radix(digits, 16)) {
            Some(Ok(address)) => RegisterRef::Address(address),
            _ => RegisterRef::Name(trimmed),
        }
    }

    fn matches(&self, reg: &Register) -> bool {
        match self {
            RegisterRef::Name(name) => reg.name().eq_ignore_ascii_case(name),
            RegisterRef::Address(address) => reg.address() == *address,
        }
    }
}

impl RegisterManager {
    /// Resolve `(group, name)` to `(group index, register index)`.
    fn resolve(&self, group: &str, name: &str) -> SyncResult<(usize, usize)> {
        let reference = RegisterRef::parse(name);

        if group.trim() == ANY_GROUP {
            let matches: Vec<(usize, usize)> = self
                .groups()
                .iter()
                .enumerate()
                .filter_map(|(gi, g)| {
                    g.all()
                        .iter()
                        .position(|reg| reference.matches(reg))
                        .map(|ri| (gi, ri))
                })
                .collect();

            return match matches.as_slice() {
                [] => Err(SyncError::not_found(
                    LookupKind::Register,
                    format!("{ANY_GROUP}/{name}"),
                )),
                [single] => Ok(*single),
                _ => Err(SyncError::AmbiguousName {
                    name: name.to_string(),
                    groups: matches
                        .iter()
                        .map(|(gi, _)| self.groups()[*gi].name().to_string())
                        .collect(),
                }),
            };
        }

        let gi = self
            .groups()
            .iter()
            .position(|g| g.is_named(group))
            .ok_or_else(|| SyncError::not_found(LookupKind::Group, group))?;
        let ri = self.groups()[gi]
            .all()
            .iter()
            .position(|reg| reference.matches(reg))
            .ok_or_else(|| {
                SyncError::not_found(
                    LookupKind::Register,
                    format!("{}/{}", self.groups()[gi].name(), name),
                )
            })?;
        Ok((gi, ri))
    }

    /// Find a register by group and name or `0x` address (`"*"` searches all groups).
    pub fn find(&self, group: &str, name: &str) -> SyncResult<&Register> {
        let (gi, ri) = self.resolve(group, name)?;
        Ok(&self.groups()[gi].all()[ri])
    }

    pub fn find_mut(&mut self, group: &str, name: &str) -> SyncResult<&mut Register> {
        let (gi, ri) = self.resolve(group, name)?;
        Ok(&mut self.groups_mut()[gi].all_mut()[ri])
    }

    /// Name of the group that owns the resolved register.
    pub fn owning_group(&self, group: &str, name: &str) -> SyncResult<&str> {
        let (gi, _) = self.resolve(group, name)?;
        Ok(self.groups()[gi].name())
    }

    pub fn read_register_by_name(&self, group: &str, name: &str) -> SyncResult<u64> {
        Ok(self.find(group, name)?.read())
    }

    pub fn write_register_by_name(
        &mut self,
        group: &str,
        name: &str,
        value: u64,
        force: bool,
    ) -> SyncResult<()> {
        self.find_mut(group, name)?.write(value, force)
    }

    /// Lock `mask` bits, or every bit of the register when `mask` is `None`.
    pub fn lock_register_by_name(
        &mut self,
        group: &str,
        name: &str,
        mask: Option<u64>,
    ) -> SyncResult<()> {
        let reg = self.find_mut(group, name)?;
        let mask = mask.unwrap_or_else(|| reg.width().mask());
        reg.lock(mask);
        Ok(())
    }

    /// Unlock `mask` bits, or every bit of the register when `mask` is `None`.
    pub fn unlock_register_by_name(
        &mut self,
        group: &str,
        name: &str,
        mask: Option<u64>,
    ) -> SyncResult<()> {
        let reg = self.find_mut(group, name)?;
        let mask = mask.unwrap_or_else(|| reg.width().mask());
        reg.unlock(mask);
        Ok(())
    }

    pub fn is_register_locked_by_name(&self, group: &str, name: &str) -> SyncResult<bool> {
        Ok(self.find(group, name)?.is_locked())
    }

    pub fn read_field_by_name(&self, group: &str, name: &str, field: &str) -> SyncResult<u64> {
        self.find(group, name)?.read_field(field)
    }

    pub fn write_field_by_name(
        &mut self,
        group: &str,
        name: &str,
        field: &str,
        value: u64,
        force: bool,
    ) -> SyncResult<()> {
        self.find_mut(group, name)?.write_field(field, value, force)
    }

    pub fn lock_field_by_name(&mut self, group: &str, name: &str, field: &str) -> SyncResult<()> {
        self.find_mut(group, name)?.lock_field(field)
    }

    pub fn unlock_field_by_name(
        &mut self,
        group: &str,
        name: &str,
        field: &str,
    ) -> SyncResult<()> {
        self.find_mut(group, name)?.unlock_field(field)
    }

    pub fn is_field_locked_by_name(
        &self,
        group: &str,
        name: &str,
        field: &str,
    ) -> SyncResult<bool> {
        self.find(group, name)?.is_field_locked(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{BitField, RegisterWidth};
    use crate::register_group::RegisterGroup;

    fn two_group_manager(shared_address: bool) -> RegisterManager {
        let source_addr = if shared_address { 0x14 } else { 0x34 };
        let mut mgr = RegisterManager::new();
        mgr.add_group(
            RegisterGroup::new(
                "ReceiverReg",
                vec![
                    Register::new("FreqLow", 0x10, RegisterWidth::Bits32),
                    Register::new("FreqHigh", 0x14, RegisterWidth::Bits32),
                    Register::new("Control", 0x20, RegisterWidth::Bits32).with_fields(vec![
                        BitField::new("ATTEN", 0, 6),
                        BitField::new("DETECTOR", 8, 2),
                    ]),
                ],
            )
            .unwrap(),
        );
        mgr.add_group(
            RegisterGroup::new(
                "SourceReg",
                vec![
                    Register::new("FreqLow", 0x30, RegisterWidth::Bits32),
                    Register::new("Level", source_addr, RegisterWidth::Bits32),
                ],
            )
            .unwrap(),
        );
        mgr
    }

    #[test]
    fn parse_reference() {
        assert_eq!(RegisterRef::parse("0x14"), RegisterRef::Address(0x14));
        assert_eq!(RegisterRef::parse("0X1f"), RegisterRef::Address(0x1F));
        assert_eq!(RegisterRef::parse("FreqLow"), RegisterRef::Name("FreqLow"));
        assert_eq!(RegisterRef::parse("0xZZ"), RegisterRef::Name("0xZZ"));
    }

    #[test]
    fn wildcard_address_resolves_unique_match() {
        let mut mgr = two_group_manager(false);
        mgr.write_register_by_name("*", "0x14", 5, false).unwrap();
        assert_eq!(mgr.read_register_by_name("ReceiverReg", "FreqHigh").unwrap(), 5);
        assert_eq!(mgr.owning_group("*", "0x14").unwrap(), "ReceiverReg");
    }

    #[test]
    fn wildcard_address_shared_by_two_groups_is_ambiguous() {
        let mut mgr = two_group_manager(true);
        let err = mgr.write_register_by_name("*", "0x14", 5, false).unwrap_err();
        match err {
            SyncError::AmbiguousName { groups, .. } => {
                assert_eq!(groups, vec!["ReceiverReg", "SourceReg"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Explicit group still works.
        mgr.write_register_by_name("sourcereg", "0x14", 5, false)
            .unwrap();
    }

    #[test]
    fn wildcard_name_in_two_groups_is_ambiguous() {
        let mgr = two_group_manager(false);
        assert!(matches!(
            mgr.read_register_by_name("*", "freqlow"),
            Err(SyncError::AmbiguousName { .. })
        ));
        assert_eq!(mgr.read_register_by_name("*", "Level").unwrap(), 0);
    }

    #[test]
    fn missing_group_or_register_is_not_found() {
        let mgr = two_group_manager(false);
        assert!(matches!(
            mgr.read_register_by_name("Nope", "FreqLow"),
            Err(SyncError::NotFound {
                kind: LookupKind::Group,
                ..
            })
        ));
        assert!(matches!(
            mgr.read_register_by_name("*", "0x99"),
            Err(SyncError::NotFound {
                kind: LookupKind::Register,
                ..
            })
        ));
    }

    #[test]
    fn lock_without_mask_locks_whole_register() {
        let mut mgr = two_group_manager(false);
        mgr.lock_register_by_name("ReceiverReg", "FreqLow", None)
            .unwrap();
        assert!(mgr.is_register_locked_by_name("ReceiverReg", "0x10").unwrap());
        assert_eq!(mgr.find("ReceiverReg", "FreqLow").unwrap().lock_mask(), 0xFFFF_FFFF);

        mgr.unlock_register_by_name("ReceiverReg", "FreqLow", Some(0xFFFF_0000))
            .unwrap();
        assert_eq!(mgr.find("ReceiverReg", "FreqLow").unwrap().lock_mask(), 0xFFFF);

        mgr.unlock_register_by_name("ReceiverReg", "FreqLow", None)
            .unwrap();
        assert!(!mgr.is_register_locked_by_name("ReceiverReg", "FreqLow").unwrap());
    }

    #[test]
    fn field_access_by_name() {
        let mut mgr = two_group_manager(false);
        mgr.write_field_by_name("*", "control", "ATTEN", 12, false)
            .unwrap();
        assert_eq!(mgr.read_field_by_name("ReceiverReg", "0x20", "atten").unwrap(), 12);

        mgr.lock_field_by_name("ReceiverReg", "Control", "DETECTOR")
            .unwrap();
        assert!(mgr.is_field_locked_by_name("ReceiverReg", "Control", "DETECTOR").unwrap());
        assert!(!mgr.is_field_locked_by_name("ReceiverReg", "Control", "ATTEN").unwrap());

        mgr.unlock_field_by_name("ReceiverReg", "Control", "DETECTOR")
            .unwrap();
        assert!(!mgr.is_register_locked_by_name("ReceiverReg", "Control").unwrap());
    }
}
