//! Hardware Register Access
//!
//! The register-access boundary between the engine and a device transport, plus the
//! simulated in-memory bus used for tests, the CLI and development without hardware.

pub mod register_access;
pub mod simulated;

pub use register_access::RegisterAccess;
pub use simulated::{SimulatedRegisterBus, WriteRecord};
