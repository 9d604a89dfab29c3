//! RegisterManager - the ordered register groups of one module.
//!
//! Group order is significant: registers in an earlier group may be prerequisites for a
//! later group's hardware behavior (for example a "software latches" group that commits
//! values staged by the groups before it). Both the initial push and every apply walk
//! groups in order, and registers within a group in creation order.

use tracing::{debug, warn};

use crate::error::{LookupKind, SyncError, SyncResult};
use crate::hardware::RegisterAccess;
use crate::register::Register;
use crate::register_group::RegisterGroup;

/// Outcome of one hardware apply walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Registers written to hardware.
    pub written: usize,
    /// Clean registers that were skipped.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterManager {
    groups: Vec<RegisterGroup>,
    initialized: bool,
}

impl RegisterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group, or replace an existing group with the same name in place.
    ///
    /// Replacing keeps the original position so a derived module can layer its own
    /// version of a base group without disturbing the apply order.
    pub fn add_group(&mut self, group: RegisterGroup) {
        if let Some(existing) = self.groups.iter_mut().find(|g| g.is_named(group.name())) {
            debug!(group = group.name(), "replacing register group");
            *existing = group;
        } else {
            self.groups.push(group);
        }
    }

    /// Groups in apply order.
    pub fn groups(&self) -> &[RegisterGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> SyncResult<&RegisterGroup> {
        self.groups
            .iter()
            .find(|g| g.is_named(name))
            .ok_or_else(|| SyncError::not_found(LookupKind::Group, name))
    }

    pub fn group_mut(&mut self, name: &str) -> SyncResult<&mut RegisterGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.is_named(name))
            .ok_or_else(|| SyncError::not_found(LookupKind::Group, name))
    }

    pub(crate) fn groups_mut(&mut self) -> &mut [RegisterGroup] {
        &mut self.groups
    }

    /// Shorthand for `group(group)?.register(name)`.
    pub fn register(&self, group: &str, name: &str) -> SyncResult<&Register> {
        self.group(group)?.register(name)
    }

    pub fn register_mut(&mut self, group: &str, name: &str) -> SyncResult<&mut Register> {
        self.group_mut(group)?.register_mut(name)
    }

    pub fn register_count(&self) -> usize {
        self.groups.iter().map(RegisterGroup::len).sum()
    }

    pub fn any_dirty(&self) -> bool {
        self.groups.iter().any(RegisterGroup::any_dirty)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Push every register's initial value to hardware, group by group.
    ///
    /// Runs at most once per manager; later calls are no-ops. If the push fails the
    /// manager stays uninitialized and the unwritten registers stay dirty.
    pub fn initialize(&mut self, driver: &dyn RegisterAccess) -> SyncResult<ApplyReport> {
        if self.initialized {
            return Ok(ApplyReport::default());
        }
        let report = self.apply_all_to_hw(driver, true)?;
        self.initialized = true;
        Ok(report)
    }

    /// Write dirty registers (or all, when `force`) to hardware in group order.
    ///
    /// Each register is marked clean right after its own write succeeds. On the first
    /// failure the walk stops: registers already written stay clean, the failing one and
    /// everything after it stay dirty, and nothing is rolled back. A later call resumes
    /// with whatever is still dirty.
    pub fn apply_all_to_hw(
        &mut self,
        driver: &dyn RegisterAccess,
        force: bool,
    ) -> SyncResult<ApplyReport> {
        let mut report = ApplyReport::default();

        for group in &mut self.groups {
            let (group_name, registers) = group.split_mut();
            for reg in registers.iter_mut() {
                if !force && !reg.is_dirty() {
                    report.skipped += 1;
                    continue;
                }

                debug!(
                    group = group_name,
                    register = reg.name(),
                    address = reg.address(),
                    value = reg.read(),
                    force,
                    "writing register"
                );

                if let Err(source) = driver.write_register(reg.address(), reg.read(), force) {
                    warn!(
                        group = group_name,
                        register = reg.name(),
                        driver = driver.name(),
                        error = %source,
                        "hardware write failed, stopping apply"
                    );
                    return Err(SyncError::HardwareWrite {
                        group: group_name.to_string(),
                        register: reg.name().to_string(),
                        address: reg.address(),
                        source,
                    });
                }

                reg.mark_clean();
                report.written += 1;
            }
        }

        Ok(report)
    }
}
