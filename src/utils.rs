//! DSP building blocks of the drift engine.

pub mod random;
pub mod scale;
pub mod smoothed;

pub mod filter {
    //! Filters used for the spectral separation of drifter grains.
    pub mod band;
}

// -------------------------------------------------------------------------------------------------

/// Values below this magnitude are flushed to zero in recursive DSP state.
pub const DENORMAL_THRESHOLD: f32 = 1e-20;

// -------------------------------------------------------------------------------------------------

/// Flush tiny values to zero, so recursive filters don't run into denormal slowdowns.
#[inline(always)]
pub fn flush_denormal(value: f32) -> f32 {
    if value.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        value
    }
}

/// Replace NaN and excessively large values with silence.
#[inline(always)]
pub fn sanitize_sample(value: f32) -> f32 {
    if value.is_nan() || value.abs() > 1e10 {
        0.0
    } else {
        value
    }
}

/// Map the given mix through a `tanh` saturation curve. `ceiling` is the largest possible
/// output magnitude, `drive` the input gain before saturating.
#[inline(always)]
pub fn soft_clip(value: f32, drive: f32, ceiling: f32) -> f32 {
    (value * drive).tanh() * ceiling
}

// -------------------------------------------------------------------------------------------------
