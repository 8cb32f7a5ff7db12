//! FourCC identified parameters of the drift engine's controls.

use std::{any::Any, fmt::Debug};

use four_cc::FourCC;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Value kind of a [`Parameter`], e.g. to pick a fitting widget in a UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    /// Continuous value, such as the anchor position.
    Float,
    /// Stepped value, such as the pitch in semitones.
    Integer,
    /// One of the given named choices, such as the scale.
    Enum { values: Vec<String> },
}

// -------------------------------------------------------------------------------------------------

/// Descriptor of a single [`DriftEngine`](crate::DriftEngine) control for UIs and automation.
///
/// Hosts usually deal with normalized values in range \[0, 1\] only: descriptors convert them
/// from and to display strings.
pub trait Parameter: Debug {
    /// Unique id of the parameter within the engine.
    fn id(&self) -> FourCC;

    /// Display name.
    fn name(&self) -> &'static str;

    fn parameter_type(&self) -> ParameterType;

    /// Normalized default value.
    fn default_value(&self) -> f32;

    /// Format a normalized value for display, optionally with the value's unit.
    fn value_to_string(&self, value: f32, include_unit: bool) -> String;

    /// Parse a display string. Returns the normalized value, or `None` when the string is not a
    /// valid value of this parameter.
    fn string_to_value(&self, string: String) -> Option<f32>;

    /// Create a normalized value update for this parameter. Returns an error when the value is
    /// out of range.
    fn normalized_update(&self, value: f32) -> Result<(FourCC, ParameterValueUpdate), Error> {
        let update = ParameterValueUpdate::Normalized(value);
        update.validate()?;
        Ok((self.id(), update))
    }
}

// -------------------------------------------------------------------------------------------------

/// A new value for a [`Parameter`], applied by the engine at the start of its next block.
#[derive(Debug)]
pub enum ParameterValueUpdate {
    /// Typed value: `f32` for float, `i32` for integer and the enum type itself for enum
    /// parameters.
    Raw(Box<dyn Any + Send + Sync>),
    /// Value in range `0.0..=1.0`, mapped to the parameter's range.
    Normalized(f32),
}

impl ParameterValueUpdate {
    /// Check that normalized updates are in range. Raw values get checked and clamped by the
    /// receiving parameter value instead.
    pub fn validate(&self) -> Result<(), Error> {
        if let Self::Normalized(value) = self {
            if !(0.0..=1.0).contains(value) {
                return Err(Error::ParameterError(format!(
                    "Invalid parameter update: value should be a normalized value, but is: '{value}'"
                )));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::{FloatParameter, FloatParameterValue};

mod integer;
pub use integer::{IntegerParameter, IntegerParameterValue};

mod r#enum;
pub use r#enum::{EnumParameter, EnumParameterValue};

// -------------------------------------------------------------------------------------------------
