//! Custom error types for the settings engine.
//!
//! This module defines the primary error type, `SyncError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different failures that can occur between a property setter and the register
//! write that finally reaches the hardware.
//!
//! ## Error Hierarchy
//!
//! - **`Limit`**: A property setter received a value outside its declared range. Raised
//!   before any pending bit is marked, so it never corrupts pending state.
//! - **`Validation`**: The module rejected the current combination of pending settings
//!   during `apply`. Pending bits are preserved so the caller can correct and retry.
//! - **`NotFound`** / **`AmbiguousName`**: Named group, register, field or property lookup
//!   failed.
//! - **`OutOfRange`**: A raw value does not fit the declared register or field width.
//! - **`HardwareWrite`**: The register-access boundary failed a write. This is the only
//!   kind that can leave a module partially applied: registers written earlier in the
//!   same `apply` stay clean, the rest stay dirty.
//! - **`TypeMismatch`**: A dynamically-typed parameter value did not carry the kind the
//!   property expects.
//!
//! Driver failures travel as [`DriverError`], which is wrapped by `HardwareWrite` and
//! `HardwareRead` together with the register that was being accessed.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Communication,
    Hardware,
    Timeout,
    Permission,
    InvalidAddress,
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Permission => "permission",
            DriverErrorKind::InvalidAddress => "invalid_address",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Failure reported by a [`RegisterAccess`](crate::hardware::RegisterAccess) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Driver '{driver}' {kind} error: {message}")]
pub struct DriverError {
    pub driver: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Engine Errors
// =============================================================================

/// What a failed named lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Group,
    Register,
    Field,
    Property,
    Module,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LookupKind::Group => "group",
            LookupKind::Register => "register",
            LookupKind::Field => "field",
            LookupKind::Property => "property",
            LookupKind::Module => "module",
        };
        write!(f, "{}", label)
    }
}

/// Convenience alias for results using the engine error type.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Primary error type for the settings engine.
///
/// # Error Categories
///
/// 1. **Local, recoverable** - `Limit`, `Validation`, `TypeMismatch`, `InvalidChoice`
///    - The caller corrects the offending setting and retries.
///    - No pending state is lost.
///
/// 2. **Contract violations** - `NotFound`, `AmbiguousName`, `OutOfRange`
///    - A diagnostic name or raw value was wrong; nothing was modified.
///
/// 3. **Hardware** - `HardwareWrite`, `HardwareRead`
///    - Reported up unchanged. The engine never retries internally; a retried
///      `apply` resumes with the registers that are still dirty.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Property value outside its declared `[min, max]` range.
    #[error("Limit error: {property} = {value} is outside [{min}, {max}]")]
    Limit {
        property: String,
        value: String,
        min: String,
        max: String,
    },

    /// Module-level validation rejected the pending combination of settings.
    #[error("Validation error in module '{module}': {reason}")]
    Validation { module: String, reason: String },

    /// Named lookup failed.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: LookupKind, name: String },

    /// A wildcard lookup matched in more than one group.
    #[error("Register name '{name}' is ambiguous, found in groups: {}", .groups.join(", "))]
    AmbiguousName { name: String, groups: Vec<String> },

    /// Value does not fit the declared width of a register or field.
    #[error("Value {value:#x} does not fit {bits}-bit {target}")]
    OutOfRange {
        target: String,
        value: u64,
        bits: u32,
    },

    /// Register-access boundary failed a write during `apply`.
    #[error("Hardware write of {group}/{register} at {address:#x} failed: {source}")]
    HardwareWrite {
        group: String,
        register: String,
        address: u64,
        #[source]
        source: DriverError,
    },

    /// Register-access boundary failed a read.
    #[error("Hardware read of {register} at {address:#x} failed: {source}")]
    HardwareRead {
        register: String,
        address: u64,
        #[source]
        source: DriverError,
    },

    /// Text value is not one of the property's named choices.
    #[error("Invalid choice for '{property}': '{value}' (expected one of: {})", .choices.join(", "))]
    InvalidChoice {
        property: String,
        value: String,
        choices: Vec<String>,
    },

    /// Dynamically-typed parameter value had the wrong kind.
    #[error("Type mismatch for '{property}': expected {expected}, found {found}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Register map declaration is inconsistent (duplicate name, overlapping field, ...).
    #[error("Register map definition error: {0}")]
    Definition(String),

    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl SyncError {
    pub(crate) fn not_found(kind: LookupKind, name: impl Into<String>) -> Self {
        SyncError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether the caller can fix the cause locally and simply retry.
    ///
    /// Hardware failures are reported for the caller to decide on a retry policy,
    /// so they are not considered locally recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Limit { .. }
                | SyncError::Validation { .. }
                | SyncError::TypeMismatch { .. }
                | SyncError::InvalidChoice { .. }
                | SyncError::NotFound { .. }
                | SyncError::AmbiguousName { .. }
                | SyncError::OutOfRange { .. }
        )
    }
}

impl From<figment::Error> for SyncError {
    fn from(value: figment::Error) -> Self {
        SyncError::Config(Box::new(value))
    }
}
