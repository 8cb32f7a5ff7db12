//! User facing controls of the drift engine.

use four_cc::FourCC;

use super::envelope::GrainShape;
use crate::{
    parameter::{
        EnumParameter, EnumParameterValue, FloatParameter, FloatParameterValue,
        IntegerParameter, IntegerParameterValue, Parameter, ParameterValueUpdate,
    },
    utils::scale::Scale,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Current values of all drift engine controls, as set by the user.
///
/// Parameter descriptors are available as associated consts (float and integer parameters) or
/// functions (enum parameters).
#[derive(Debug, Clone)]
pub struct DriftControls {
    anchor: FloatParameterValue,
    wander: FloatParameterValue,
    gravity: FloatParameterValue,
    drift: FloatParameterValue,
    density: FloatParameterValue,
    deviation: FloatParameterValue,
    pitch: IntegerParameterValue,
    scatter: IntegerParameterValue,
    scale: EnumParameterValue<Scale>,
    spectrum: FloatParameterValue,
    tilt: FloatParameterValue,
    shape: EnumParameterValue<GrainShape>,
    entropy: FloatParameterValue,
}

impl Default for DriftControls {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftControls {
    pub const ANCHOR: FloatParameter =
        FloatParameter::new(FourCC(*b"DANC"), "Anchor", 0.0..=1.0, 0.5).with_percent_display();
    pub const WANDER: FloatParameter =
        FloatParameter::new(FourCC(*b"DWND"), "Wander", 0.0..=1.0, 0.3).with_percent_display();
    pub const GRAVITY: FloatParameter =
        FloatParameter::new(FourCC(*b"DGRV"), "Gravity", -1.0..=1.0, 0.0)
            .with_percent_display();
    pub const DRIFT: FloatParameter =
        FloatParameter::new(FourCC(*b"DDRF"), "Drift", 0.0..=1.0, 0.3).with_percent_display();
    pub const DENSITY: FloatParameter =
        FloatParameter::new(FourCC(*b"DDNS"), "Density", 0.0..=1.0, 0.5)
            .with_percent_display();
    pub const DEVIATION: FloatParameter =
        FloatParameter::new(FourCC(*b"DDEV"), "Deviation", 0.0..=1.0, 1.0)
            .with_percent_display();
    pub const PITCH: IntegerParameter =
        IntegerParameter::new(FourCC(*b"DPIT"), "Pitch", -24..=24, 0).with_unit("st");
    pub const SCATTER: IntegerParameter =
        IntegerParameter::new(FourCC(*b"DSCT"), "Scatter", 0..=12, 0).with_unit("deg");
    pub const SCALE_ID: FourCC = FourCC(*b"DSCL");
    pub const SPECTRUM: FloatParameter =
        FloatParameter::new(FourCC(*b"DSPC"), "Spectrum", 0.0..=1.0, 0.0)
            .with_percent_display();
    pub const TILT: FloatParameter =
        FloatParameter::new(FourCC(*b"DTLT"), "Tilt", -1.0..=1.0, 0.0).with_percent_display();
    pub const SHAPE_ID: FourCC = FourCC(*b"DSHP");
    pub const ENTROPY: FloatParameter =
        FloatParameter::new(FourCC(*b"DENT"), "Entropy", 0.0..=1.0, 0.25)
            .with_percent_display();

    /// Scale selector descriptor.
    pub fn scale_parameter() -> EnumParameter {
        EnumParameter::new(Self::SCALE_ID, "Scale", Scale::Chromatic)
    }

    /// Grain envelope shape descriptor.
    pub fn shape_parameter() -> EnumParameter {
        EnumParameter::new(Self::SHAPE_ID, "Shape", GrainShape::Cloud)
    }

    /// Create a new set of controls with all values at their defaults.
    pub fn new() -> Self {
        Self {
            anchor: FloatParameterValue::from_description(Self::ANCHOR),
            wander: FloatParameterValue::from_description(Self::WANDER),
            gravity: FloatParameterValue::from_description(Self::GRAVITY),
            drift: FloatParameterValue::from_description(Self::DRIFT),
            density: FloatParameterValue::from_description(Self::DENSITY),
            deviation: FloatParameterValue::from_description(Self::DEVIATION),
            pitch: IntegerParameterValue::from_description(Self::PITCH),
            scatter: IntegerParameterValue::from_description(Self::SCATTER),
            scale: EnumParameterValue::from_description(Self::scale_parameter()),
            spectrum: FloatParameterValue::from_description(Self::SPECTRUM),
            tilt: FloatParameterValue::from_description(Self::TILT),
            shape: EnumParameterValue::from_description(Self::shape_parameter()),
            entropy: FloatParameterValue::from_description(Self::ENTROPY),
        }
    }

    /// All parameter descriptors, in display order.
    pub fn parameters(&self) -> Vec<&dyn Parameter> {
        vec![
            self.anchor.description() as &dyn Parameter,
            self.wander.description(),
            self.gravity.description(),
            self.drift.description(),
            self.density.description(),
            self.deviation.description(),
            self.pitch.description(),
            self.scatter.description(),
            self.scale.description(),
            self.spectrum.description(),
            self.tilt.description(),
            self.shape.description(),
            self.entropy.description(),
        ]
    }

    /// Apply a single parameter update. Unknown parameter ids are an error.
    pub fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        match id {
            _ if id == Self::ANCHOR.id() => self.anchor.apply_update(value),
            _ if id == Self::WANDER.id() => self.wander.apply_update(value),
            _ if id == Self::GRAVITY.id() => self.gravity.apply_update(value),
            _ if id == Self::DRIFT.id() => self.drift.apply_update(value),
            _ if id == Self::DENSITY.id() => self.density.apply_update(value),
            _ if id == Self::DEVIATION.id() => self.deviation.apply_update(value),
            _ if id == Self::PITCH.id() => self.pitch.apply_update(value),
            _ if id == Self::SCATTER.id() => self.scatter.apply_update(value),
            _ if id == Self::SCALE_ID => self.scale.apply_update(value),
            _ if id == Self::SPECTRUM.id() => self.spectrum.apply_update(value),
            _ if id == Self::TILT.id() => self.tilt.apply_update(value),
            _ if id == Self::SHAPE_ID => self.shape.apply_update(value),
            _ if id == Self::ENTROPY.id() => self.entropy.apply_update(value),
            _ => {
                return Err(Error::ParameterError(format!(
                    "Invalid/unknown drift engine parameter '{id}'"
                )))
            }
        }
        Ok(())
    }

    /// Center of the drifters' wander window in range \[0, 1\].
    #[inline]
    pub fn anchor(&self) -> f32 {
        self.anchor.value()
    }

    /// Half width of the drifters' wander window.
    #[inline]
    pub fn wander(&self) -> f32 {
        self.wander.value()
    }

    #[inline]
    pub fn gravity(&self) -> f32 {
        self.gravity.value()
    }

    #[inline]
    pub fn drift(&self) -> f32 {
        self.drift.value()
    }

    #[inline]
    pub fn density(&self) -> f32 {
        self.density.value()
    }

    #[inline]
    pub fn deviation(&self) -> f32 {
        self.deviation.value()
    }

    /// Master transpose in semitones.
    #[inline]
    pub fn pitch(&self) -> i32 {
        self.pitch.value()
    }

    /// Pitch spread across drifters in scale degrees.
    #[inline]
    pub fn scatter(&self) -> i32 {
        self.scatter.value()
    }

    #[inline]
    pub fn scale(&self) -> Scale {
        self.scale.value()
    }

    /// Spectral separation amount.
    #[inline]
    pub fn spectrum(&self) -> f32 {
        self.spectrum.value()
    }

    #[inline]
    pub fn tilt(&self) -> f32 {
        self.tilt.value()
    }

    #[inline]
    pub fn shape(&self) -> GrainShape {
        self.shape.value()
    }

    #[inline]
    pub fn entropy(&self) -> f32 {
        self.entropy.value()
    }

    /// Poisson grain rate per drifter in Hz: 0.25 Hz at density 0, 50 Hz at density 1.
    #[inline]
    pub fn grain_rate(&self) -> f32 {
        density_to_rate(self.density())
    }

    /// Grain length in seconds: 500 ms at density 0, 100 ms at density 1.
    #[inline]
    pub fn grain_length(&self) -> f32 {
        density_to_length(self.density())
    }
}

// -------------------------------------------------------------------------------------------------

#[inline]
pub(crate) fn density_to_rate(density: f32) -> f32 {
    0.25 * 200f32.powf(density)
}

#[inline]
pub(crate) fn density_to_length(density: f32) -> f32 {
    0.5 * 0.2f32.powf(density)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let controls = DriftControls::new();
        assert_eq!(controls.anchor(), 0.5);
        assert_eq!(controls.wander(), 0.3);
        assert_eq!(controls.deviation(), 1.0);
        assert_eq!(controls.scale(), Scale::Chromatic);
        assert_eq!(controls.shape(), GrainShape::Cloud);
        assert_eq!(controls.parameters().len(), 13);
        assert!((controls.grain_rate() - 0.25 * 200f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn density_mappings() {
        assert!((density_to_rate(0.0) - 0.25).abs() < 1e-6);
        assert!((density_to_rate(1.0) - 50.0).abs() < 1e-3);
        assert!((density_to_length(0.0) - 0.5).abs() < 1e-6);
        assert!((density_to_length(1.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn parameter_updates() {
        let mut controls = DriftControls::new();
        let (id, update) = DriftControls::GRAVITY.value_update(-0.5);
        controls.process_parameter_update(id, &update).unwrap();
        assert_eq!(controls.gravity(), -0.5);

        let (id, update) = DriftControls::PITCH.value_update(100);
        controls.process_parameter_update(id, &update).unwrap();
        assert_eq!(controls.pitch(), 24);

        controls
            .process_parameter_update(
                DriftControls::TILT.id(),
                &ParameterValueUpdate::Normalized(0.0),
            )
            .unwrap();
        assert_eq!(controls.tilt(), -1.0);

        let (id, update) = DriftControls::scale_parameter().value_update(Scale::Hirajoshi);
        controls.process_parameter_update(id, &update).unwrap();
        assert_eq!(controls.scale(), Scale::Hirajoshi);

        controls
            .process_parameter_update(
                DriftControls::SHAPE_ID,
                &ParameterValueUpdate::Raw(Box::new("Hail".to_string())),
            )
            .unwrap();
        assert_eq!(controls.shape(), GrainShape::Hail);

        assert!(controls
            .process_parameter_update(FourCC(*b"XXXX"), &ParameterValueUpdate::Normalized(0.5))
            .is_err());
    }
}
