//! Simulated Register Bus
//!
//! In-memory implementation of [`RegisterAccess`] for testing without physical
//! hardware. Every write is recorded in order so tests can assert exactly which
//! registers an `apply` touched.
//!
//! # Failure Injection
//!
//! - [`SimulatedRegisterBus::fail_writes_at`] - every write to one address fails
//! - [`SimulatedRegisterBus::fail_after_writes`] - the bus accepts N more writes, then
//!   fails every following write until [`SimulatedRegisterBus::clear_failures`]
//!
//! Reads of an address that was never written return `0`, like a freshly reset device.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{DriverError, DriverErrorKind};
use crate::hardware::RegisterAccess;

/// One recorded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u64,
    pub value: u64,
    pub force: bool,
}

#[derive(Debug, Default)]
struct BusState {
    registers: HashMap<u64, u64>,
    writes: Vec<WriteRecord>,
    read_count: usize,
    fail_at_address: Option<u64>,
    writes_until_failure: Option<usize>,
}

/// Thread-safe simulated register bus.
///
/// # Example
///
/// ```rust,ignore
/// let bus = Arc::new(SimulatedRegisterBus::new("sim0"));
/// let mut receiver = ReceiverModule::new("rx", ReceiverSettings::default(), bus.clone())?;
/// bus.clear_log();
/// receiver.set_detector(Detector::Rms)?;
/// receiver.apply()?;
/// assert_eq!(bus.written_addresses(), vec![0x20, 0x40]);
/// ```
#[derive(Debug)]
pub struct SimulatedRegisterBus {
    name: String,
    state: Mutex<BusState>,
}

impl SimulatedRegisterBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(BusState::default()),
        }
    }

    /// Fail every write to `address` until failures are cleared.
    pub fn fail_writes_at(&self, address: u64) {
        self.state.lock().fail_at_address = Some(address);
    }

    /// Accept `successful_writes` more writes, then fail the rest.
    pub fn fail_after_writes(&self, successful_writes: usize) {
        self.state.lock().writes_until_failure = Some(successful_writes);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_at_address = None;
        state.writes_until_failure = None;
    }

    /// Set a hardware value without recording a write (simulates the device changing).
    pub fn preload(&self, address: u64, value: u64) {
        self.state.lock().registers.insert(address, value);
    }

    /// Current simulated hardware value at `address`.
    pub fn value_at(&self, address: u64) -> Option<u64> {
        self.state.lock().registers.get(&address).copied()
    }

    /// All successful writes, oldest first.
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Addresses of all successful writes, oldest first.
    pub fn written_addresses(&self) -> Vec<u64> {
        self.state.lock().writes.iter().map(|w| w.address).collect()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().read_count
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.read_count = 0;
    }
}

impl Default for SimulatedRegisterBus {
    fn default() -> Self {
        Self::new("simulated")
    }
}

impl RegisterAccess for SimulatedRegisterBus {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_register(&self, address: u64, value: u64, force: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        if state.fail_at_address == Some(address) {
            return Err(DriverError::new(
                &self.name,
                DriverErrorKind::Hardware,
                format!("injected write failure at {address:#x}"),
            ));
        }

        if let Some(remaining) = state.writes_until_failure.as_mut() {
            if *remaining == 0 {
                return Err(DriverError::new(
                    &self.name,
                    DriverErrorKind::Communication,
                    format!("injected bus failure writing {address:#x}"),
                ));
            }
            *remaining -= 1;
        }

        tracing::trace!(bus = %self.name, address, value, "register write");
        state.registers.insert(address, value);
        state.writes.push(WriteRecord {
            address,
            value,
            force,
        });
        Ok(())
    }

    fn read_register(&self, address: u64) -> Result<u64, DriverError> {
        let mut state = self.state.lock();
        state.read_count += 1;
        Ok(state.registers.get(&address).copied().unwrap_or(0))
    }
}
