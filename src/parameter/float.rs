use std::{
    fmt::{Debug, Display},
    ops::RangeInclusive,
};

use four_cc::FourCC;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
    display_scale: f32,
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            unit: "",
            display_scale: 1.0,
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Display plain values as percentages: `0.25` shows up as "25.0 %".
    pub const fn with_percent_display(mut self) -> Self {
        self.unit = "%";
        self.display_scale = 100.0;
        self
    }

    /// Create a raw, ParameterValueUpdate for this parameter.
    #[must_use]
    pub fn value_update(&self, value: f32) -> (FourCC, ParameterValueUpdate) {
        (self.id, ParameterValueUpdate::Raw(Box::new(value)))
    }

    /// The parameter's value range.
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's default value.
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Clamp the given plain value to the parameter's range.
    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Normalize the given plain value to a 0.0-1.0 range.
    pub fn normalize_value(&self, value: f32) -> f32 {
        (value - *self.range.start()) / (*self.range.end() - *self.range.start())
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        debug_assert!((0.0..=1.0).contains(&normalized));
        *self.range.start() + normalized * (*self.range.end() - *self.range.start())
    }

    /// Convert the given plain value to a string.
    pub fn plain_value_to_string(&self, value: f32, include_unit: bool) -> String {
        let value = value * self.display_scale;
        if include_unit && !self.unit.is_empty() {
            format!("{:.1} {}", value, self.unit)
        } else {
            format!("{:.1}", value)
        }
    }

    /// Convert the given string to a plain, clamped value.
    pub fn string_to_plain_value(&self, string: &str) -> Option<f32> {
        let mut string = string.trim();
        if !self.unit.is_empty() {
            string = string.trim_end_matches(self.unit).trim_end();
        }
        let value = string.parse::<f32>().ok()?;
        Some(self.clamp_value(value / self.display_scale))
    }
}

impl Parameter for FloatParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Float
    }

    fn default_value(&self) -> f32 {
        self.normalize_value(self.default)
    }

    fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        let value = self.denormalize_value(value.clamp(0.0, 1.0));
        self.plain_value_to_string(value, include_unit)
    }

    fn string_to_value(&self, string: String) -> Option<f32> {
        let value = self.string_to_plain_value(&string)?;
        Some(self.normalize_value(value))
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds a float parameter value and its description.
#[derive(Debug, Clone)]
pub struct FloatParameterValue {
    /// The parameter's description and constraints.
    description: FloatParameter,
    /// The current value of the parameter.
    value: f32,
}

impl FloatParameterValue {
    /// Create a new parameter value with the given parameter description, initialized to the
    /// parameter's default value.
    pub fn from_description(description: FloatParameter) -> Self {
        let value = description.default_value();
        Self { value, description }
    }

    /// Access the parameter value's description.
    pub fn description(&self) -> &FloatParameter {
        &self.description
    }

    /// Access to the current value.
    #[inline(always)]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set a new value, clamping the given value into the parameter's value bounds if necessary.
    pub fn set_value_clamped(&mut self, value: f32) {
        self.value = self.description.clamp_value(value);
    }

    /// Applies a parameter update.
    pub fn apply_update(&mut self, update: &ParameterValueUpdate) {
        match update {
            ParameterValueUpdate::Raw(raw) => {
                if let Some(value) = (*raw).downcast_ref::<f32>() {
                    self.set_value_clamped(*value);
                } else if let Some(value) = (*raw).downcast_ref::<f64>() {
                    self.set_value_clamped(*value as f32);
                } else {
                    log::warn!(
                        "Invalid value type for float parameter '{}'",
                        self.description.id()
                    );
                }
            }
            ParameterValueUpdate::Normalized(normalized) => {
                let value = self
                    .description
                    .denormalize_value(normalized.clamp(0.0, 1.0));
                self.set_value_clamped(value);
            }
        }
    }
}

impl From<FloatParameter> for FloatParameterValue {
    fn from(description: FloatParameter) -> Self {
        Self::from_description(description)
    }
}

impl Display for FloatParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let include_unit = true;
        f.write_str(&self.description.plain_value_to_string(self.value, include_unit))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const WANDER: FloatParameter =
        FloatParameter::new(FourCC(*b"test"), "Wander", 0.0..=1.0, 0.3).with_percent_display();

    #[test]
    fn normalization() {
        let tilt = FloatParameter::new(FourCC(*b"tilt"), "Tilt", -1.0..=1.0, 0.0);
        assert_eq!(tilt.normalize_value(0.0), 0.5);
        assert_eq!(tilt.denormalize_value(1.0), 1.0);
        assert_eq!(Parameter::default_value(&tilt), 0.5);
        assert_eq!(tilt.clamp_value(3.0), 1.0);
    }

    #[test]
    fn string_conversion() {
        assert_eq!(WANDER.plain_value_to_string(0.25, true), "25.0 %");
        assert_eq!(WANDER.plain_value_to_string(0.25, false), "25.0");
        let parsed = WANDER.string_to_plain_value("50 %").unwrap();
        assert!((parsed - 0.5).abs() < 1e-6);
        assert_eq!(WANDER.string_to_plain_value("250"), Some(1.0));
        assert_eq!(WANDER.string_to_plain_value("nope"), None);
    }

    #[test]
    fn value_updates() {
        let mut value = FloatParameterValue::from_description(WANDER);
        assert_eq!(value.value(), 0.3);

        value.apply_update(&ParameterValueUpdate::Normalized(1.0));
        assert_eq!(value.value(), 1.0);

        value.apply_update(&WANDER.value_update(-2.0).1);
        assert_eq!(value.value(), 0.0);

        value.apply_update(&ParameterValueUpdate::Raw(Box::new(0.75f64)));
        assert_eq!(value.value(), 0.75);

        // wrong value types are ignored
        value.apply_update(&ParameterValueUpdate::Raw(Box::new(1i32)));
        assert_eq!(value.value(), 0.75);
        assert_eq!(value.to_string(), "75.0 %");
    }
}
