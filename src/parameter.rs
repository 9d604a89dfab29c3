//! Property<T> - typed module settings with change detection.
//!
//! A [`Property`] is one high-level setting of a module (a start frequency, an
//! attenuation, a detector mode). It knows:
//! - its range constraints, enforced before anything else happens
//! - the logical-setting bits it belongs to in the module's change tracker
//! - the value it had at the last successful `apply` (its *applied* value)
//! - a `tokio::sync::watch` channel so a UI layer can observe value changes
//!
//! Setting a property never touches registers or hardware; the owning module marks
//! the pending bit and the next `apply` does the rest.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut start = Property::new("StartFrequency", 100e6)
//!     .with_unit("Hz")
//!     .with_range(10e6, 3000e6)
//!     .with_bits(Setting::FrequencyRange.mask());
//!
//! assert!(start.set(200e6)?);     // changed
//! assert!(!start.set(200e6)?);    // same value, nothing to do
//! assert!(start.set(1e6).is_err()); // LimitError, value untouched
//! ```
//!
//! # Dynamic access
//!
//! [`PropertyState`] is the object-safe view used for by-name access and pipeline
//! bookkeeping. Values cross that boundary as [`ParamValue`], a closed tagged union of
//! the primitive kinds a property can hold.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::change_tracker::ChangeMask;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// ParamValue
// =============================================================================

/// Dynamically-typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
        }
    }

    fn mismatch(&self, property: &str, expected: &'static str) -> SyncError {
        SyncError::TypeMismatch {
            property: property.to_string(),
            expected,
            found: self.kind_name(),
        }
    }

    pub fn as_bool(&self, property: &str) -> SyncResult<bool> {
        match self {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(other.mismatch(property, "bool")),
        }
    }

    pub fn as_int(&self, property: &str) -> SyncResult<i64> {
        match self {
            ParamValue::Int(v) => Ok(*v),
            other => Err(other.mismatch(property, "int")),
        }
    }

    /// Integers are accepted where a float is expected.
    pub fn as_float(&self, property: &str) -> SyncResult<f64> {
        match self {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(other.mismatch(property, "float")),
        }
    }

    pub fn as_text(&self, property: &str) -> SyncResult<&str> {
        match self {
            ParamValue::Text(v) => Ok(v),
            other => Err(other.mismatch(property, "text")),
        }
    }

    /// Parse a command-line value: `true`/`false`, integer, float, otherwise text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(v) = trimmed.parse::<bool>() {
            ParamValue::Bool(v)
        } else if let Ok(v) = trimmed.parse::<i64>() {
            ParamValue::Int(v)
        } else if let Ok(v) = trimmed.parse::<f64>() {
            ParamValue::Float(v)
        } else {
            ParamValue::Text(trimmed.to_string())
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Types a [`Property`] can hold.
pub trait ParamType: Clone + PartialEq + PartialOrd + Debug + Send + Sync + 'static {
    fn to_param(&self) -> ParamValue;
    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self>;
}

impl ParamType for bool {
    fn to_param(&self) -> ParamValue {
        ParamValue::Bool(*self)
    }

    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self> {
        value.as_bool(property)
    }
}

impl ParamType for i64 {
    fn to_param(&self) -> ParamValue {
        ParamValue::Int(*self)
    }

    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self> {
        value.as_int(property)
    }
}

impl ParamType for f64 {
    fn to_param(&self) -> ParamValue {
        ParamValue::Float(*self)
    }

    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self> {
        value.as_float(property)
    }
}

impl ParamType for String {
    fn to_param(&self) -> ParamValue {
        ParamValue::Text(self.clone())
    }

    fn from_param(property: &str, value: &ParamValue) -> SyncResult<Self> {
        value.as_text(property).map(str::to_string)
    }
}

/// Resolve a text value against a fixed list of named choices (case-insensitive).
///
/// Used by enum-valued settings to implement [`ParamType::from_param`].
pub fn parse_choice<T: Copy>(
    property: &str,
    value: &ParamValue,
    choices: &[(&str, T)],
) -> SyncResult<T> {
    let text = value.as_text(property)?;
    choices
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(text))
        .map(|(_, choice)| *choice)
        .ok_or_else(|| SyncError::InvalidChoice {
            property: property.to_string(),
            value: text.to_string(),
            choices: choices.iter().map(|(label, _)| label.to_string()).collect(),
        })
}

// =============================================================================
// Constraints
// =============================================================================

/// Value constraints checked by [`Property::set`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constraints<T> {
    None,
    /// Inclusive range.
    Range { min: T, max: T },
}

impl<T: PartialOrd + Debug> Constraints<T> {
    pub fn validate(&self, property: &str, value: &T) -> SyncResult<()> {
        match self {
            Constraints::None => Ok(()),
            Constraints::Range { min, max } => {
                // NaN fails both comparisons, so test for "inside" rather than "outside".
                if value >= min && value <= max {
                    Ok(())
                } else {
                    Err(SyncError::Limit {
                        property: property.to_string(),
                        value: format!("{:?}", value),
                        min: format!("{:?}", min),
                        max: format!("{:?}", max),
                    })
                }
            }
        }
    }
}

// =============================================================================
// Property<T>
// =============================================================================

/// Typed module setting.
pub struct Property<T: ParamType> {
    name: String,
    description: Option<String>,
    unit: Option<String>,
    bits: ChangeMask,
    constraints: Constraints<T>,
    /// Value at the last successful apply.
    applied: T,
    value_tx: watch::Sender<T>,
}

impl<T: ParamType> Property<T> {
    /// New property whose initial value also counts as applied.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let (value_tx, _) = watch::channel(initial.clone());
        Self {
            name: name.into(),
            description: None,
            unit: None,
            bits: ChangeMask::NONE,
            constraints: Constraints::None,
            applied: initial,
            value_tx,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_range(mut self, min: T, max: T) -> Self {
        self.constraints = Constraints::Range { min, max };
        self
    }

    /// Change-tracker bits marked when this property changes.
    pub fn with_bits(mut self, bits: ChangeMask) -> Self {
        self.bits = bits;
        self
    }

    pub fn get(&self) -> T {
        self.value_tx.borrow().clone()
    }

    /// Validate and store `value`.
    ///
    /// Returns `Ok(true)` if the stored value changed, `Ok(false)` if `value` equals the
    /// current value. A rejected value leaves the property untouched.
    pub fn set(&mut self, value: T) -> SyncResult<bool> {
        self.constraints.validate(&self.name, &value)?;

        if *self.value_tx.borrow() == value {
            return Ok(false);
        }

        self.value_tx.send_replace(value);
        Ok(true)
    }

    pub fn applied(&self) -> &T {
        &self.applied
    }

    /// Watch receiver notified on every stored change.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.value_tx.subscribe()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn constraints(&self) -> &Constraints<T> {
        &self.constraints
    }
}

impl<T: ParamType> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("value", &*self.value_tx.borrow())
            .field("applied", &self.applied)
            .field("bits", &self.bits)
            .finish()
    }
}

// =============================================================================
// PropertyState (object-safe view)
// =============================================================================

/// Serializable description of a property, used for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    pub value: ParamValue,
    pub applied: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<ParamValue>,
    pub modified: bool,
}

/// Type-erased property access for dynamic collections and the apply pipeline.
pub trait PropertyState: Send + Sync {
    fn name(&self) -> &str;
    fn bits(&self) -> ChangeMask;
    /// Current value differs from the applied value.
    fn is_modified(&self) -> bool;
    /// Record the current value as applied.
    fn commit(&mut self);
    fn value(&self) -> ParamValue;
    /// Typed set through a [`ParamValue`]; same semantics as [`Property::set`].
    fn set_value(&mut self, value: &ParamValue) -> SyncResult<bool>;
    fn info(&self) -> PropertyInfo;
}

impl<T: ParamType> PropertyState for Property<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn bits(&self) -> ChangeMask {
        self.bits
    }

    fn is_modified(&self) -> bool {
        *self.value_tx.borrow() != self.applied
    }

    fn commit(&mut self) {
        self.applied = self.get();
    }

    fn value(&self) -> ParamValue {
        self.value_tx.borrow().to_param()
    }

    fn set_value(&mut self, value: &ParamValue) -> SyncResult<bool> {
        let typed = T::from_param(&self.name, value)?;
        self.set(typed)
    }

    fn info(&self) -> PropertyInfo {
        let (min, max) = match &self.constraints {
            Constraints::None => (None, None),
            Constraints::Range { min, max } => (Some(min.to_param()), Some(max.to_param())),
        };
        PropertyInfo {
            name: self.name.clone(),
            value: self.value(),
            applied: self.applied.to_param(),
            unit: self.unit.clone(),
            min,
            max,
            modified: self.is_modified(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
