//! Register-Access Capability
//!
//! This module defines the one capability the engine consumes from a device: writing
//! and reading raw register values by numeric address. A module receives an
//! `Arc<dyn RegisterAccess>` at construction and never inspects what transport sits
//! behind it.
//!
//! # Contract
//!
//! - Addresses are the numeric register addresses declared in the register map.
//! - `write_register` may block for as long as the transport needs; the engine defines
//!   no timeouts of its own.
//! - `force` tells the transport the write was requested unconditionally (force apply
//!   or forced named write). Transports that cache may use it to bypass their cache.
//!
//! # Thread Safety
//!
//! - Methods take `&self`; implementations use interior mutability for state.
//! - Several modules of one instrument may share a single transport and be applied
//!   from different threads, so implementations must be `Send + Sync`.
//!
//! # Example
//!
//! ```rust,ignore
//! struct SpiBus { /* ... */ }
//!
//! impl RegisterAccess for SpiBus {
//!     fn name(&self) -> &str { "spi0" }
//!
//!     fn write_register(&self, address: u64, value: u64, _force: bool) -> Result<(), DriverError> {
//!         self.transfer(address, value)
//!     }
//!
//!     fn read_register(&self, address: u64) -> Result<u64, DriverError> {
//!         self.fetch(address)
//!     }
//! }
//! ```

use crate::error::DriverError;

/// Capability: raw register I/O by address.
pub trait RegisterAccess: Send + Sync {
    /// Transport name used in logs and error messages.
    fn name(&self) -> &str;

    /// Write `value` to the register at `address`.
    fn write_register(&self, address: u64, value: u64, force: bool) -> Result<(), DriverError>;

    /// Read the current hardware value of the register at `address`.
    fn read_register(&self, address: u64) -> Result<u64, DriverError>;
}
