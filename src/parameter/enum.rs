use std::{fmt::Display, str::FromStr};

use four_cc::FourCC;
use strum::IntoEnumIterator;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// An enum parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameter {
    id: FourCC,
    name: &'static str,
    values: Vec<String>,
    default_index: usize,
}

impl EnumParameter {
    pub fn new<E: IntoEnumIterator + ToString + PartialEq>(
        id: FourCC,
        name: &'static str,
        default: E,
    ) -> Self {
        let values = E::iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let default_index = E::iter().position(|r| r == default).unwrap_or(0);
        Self {
            id,
            name,
            values,
            default_index,
        }
    }

    /// Create a raw, ParameterValueUpdate for this parameter.
    #[must_use]
    pub fn value_update<E: Send + Sync + 'static>(
        &self,
        value: E,
    ) -> (FourCC, ParameterValueUpdate) {
        (self.id, ParameterValueUpdate::Raw(Box::new(value)))
    }

    /// All possible values as display strings.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn normalize_index(&self, index: usize) -> f32 {
        if self.values.len() > 1 {
            index as f32 / (self.values.len() - 1) as f32
        } else {
            0.0
        }
    }

    pub fn denormalize_index(&self, normalized: f32) -> usize {
        debug_assert!((0.0..=1.0).contains(&normalized));
        let index = (normalized * self.values.len().saturating_sub(1) as f32).round() as usize;
        index.min(self.values.len().saturating_sub(1))
    }
}

impl Parameter for EnumParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Enum {
            values: self.values.clone(),
        }
    }

    fn default_value(&self) -> f32 {
        self.normalize_index(self.default_index)
    }

    fn value_to_string(&self, value: f32, _include_unit: bool) -> String {
        let index = self.denormalize_index(value.clamp(0.0, 1.0));
        self.values.get(index).cloned().unwrap_or_default()
    }

    fn string_to_value(&self, string: String) -> Option<f32> {
        let string = string.trim();
        let index = self
            .values
            .iter()
            .position(|v| v.eq_ignore_ascii_case(string))?;
        Some(self.normalize_index(index))
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds an enum parameter value and its description.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameterValue<T> {
    /// The current value of the parameter.
    value: T,
    /// The parameter's description and constraints.
    description: EnumParameter,
}

impl<T> EnumParameterValue<T>
where
    T: IntoEnumIterator + FromStr + Default + Copy + 'static,
{
    pub fn from_description(description: EnumParameter) -> Self {
        let value = T::iter()
            .nth(description.default_index())
            .unwrap_or_default();
        Self { value, description }
    }

    #[inline(always)]
    pub fn value(&self) -> T {
        self.value
    }

    pub fn set_value(&mut self, value: T) {
        self.value = value;
    }

    pub fn description(&self) -> &EnumParameter {
        &self.description
    }

    pub fn apply_update(&mut self, update: &ParameterValueUpdate) {
        match update {
            ParameterValueUpdate::Raw(raw) => {
                if let Some(value) = raw.downcast_ref::<T>() {
                    self.set_value(*value);
                } else if let Some(value_str) = raw.downcast_ref::<String>() {
                    if let Ok(value) = T::from_str(value_str) {
                        self.set_value(value);
                    } else {
                        log::warn!(
                            "Invalid string value for enum parameter '{}'",
                            self.description.id()
                        );
                    }
                } else if let Some(index) = raw.downcast_ref::<usize>() {
                    if let Some(value) = T::iter().nth(*index) {
                        self.set_value(value);
                    } else {
                        log::warn!(
                            "Invalid index {index} for enum parameter '{}'",
                            self.description.id()
                        );
                    }
                } else {
                    log::warn!(
                        "Invalid value type for enum parameter '{}'",
                        self.description.id()
                    );
                }
            }
            ParameterValueUpdate::Normalized(normalized) => {
                let index = self
                    .description
                    .denormalize_index(normalized.clamp(0.0, 1.0));
                if let Some(value) = T::iter().nth(index) {
                    self.set_value(value);
                }
            }
        }
    }
}

impl<T> From<EnumParameter> for EnumParameterValue<T>
where
    T: IntoEnumIterator + FromStr + Default + Copy + 'static,
{
    fn from(description: EnumParameter) -> Self {
        Self::from_description(description)
    }
}

impl<T: Display> Display for EnumParameterValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

// -------------------------------------------------------------------------------------------------
