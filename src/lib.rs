//! # Register Settings Synchronization Engine
//!
//! This crate keeps the high-level settings of instrument modules (frequency range,
//! attenuation, detector type, ...) in sync with the hardware registers that implement
//! them. Properties can be changed freely in software; the engine tracks which logical
//! settings changed, computes the register values those changes imply, and writes only
//! the registers that need it, group by group, through a pluggable register-access
//! driver.
//!
//! ## Crate Structure
//!
//! - **`error`**: `SyncError`, `DriverError` and the `SyncResult` alias.
//! - **`register`**, **`register_group`**, **`register_manager`**: the lockable,
//!   group-organized register cache and the ordered hardware apply walk.
//! - **`named_access`**: diagnostic lookup of registers and bit fields by name or
//!   `0x` address, including the `"*"` all-groups wildcard.
//! - **`change_tracker`**: the central change-bit table and the per-module pending mask.
//! - **`parameter`**: `Property<T>`, typed settings with range limits and change
//!   notification, and the `ParamValue` tagged value type.
//! - **`pipeline`**: `Module<S>`, the validate / compute / write / clear apply sequence.
//! - **`modules`**: the common, receiver and source module types.
//! - **`instrument`**: multi-module composition with aggregate status.
//! - **`hardware`**: the `RegisterAccess` driver boundary and a simulated bus.
//! - **`config`** / **`logging`**: figment configuration and tracing setup.

pub mod change_tracker;
pub mod config;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod logging;
pub mod modules;
pub mod named_access;
pub mod parameter;
pub mod pipeline;
pub mod register;
pub mod register_group;
pub mod register_manager;

pub use error::{DriverError, DriverErrorKind, SyncError, SyncResult};
pub use hardware::{RegisterAccess, SimulatedRegisterBus};
pub use instrument::Instrument;
pub use parameter::{ParamValue, Property};
pub use pipeline::{ApplySettings, Module, ModuleSettings};
pub use register_manager::ApplyReport;
