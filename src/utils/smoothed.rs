// -------------------------------------------------------------------------------------------------

/// Exponential smoothed value for click free control changes, using an inertial exponential
/// approach.
///
/// Each [`approach`](Self::approach) call moves current a fraction (the inertia) of the
/// remaining distance towards the target. Inertia is specified for a 48 kHz frame rate and gets
/// compensated for other rates, so the ramp's time constant does not depend on the sample rate.
#[derive(Debug, Clone)]
pub struct ExponentialSmoothedValue {
    current: f32,
    step: f32,
}

impl ExponentialSmoothedValue {
    /// Inertia of the drift engine's control smoothing: roughly a 20 ms time constant.
    pub const INERTIA: f32 = 0.001;

    const REFERENCE_SAMPLE_RATE: f32 = 48000.0;

    pub fn new(value: f32, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        // never overshoot the target at very low rates
        let sample_rate_comp = (Self::REFERENCE_SAMPLE_RATE / sample_rate.max(1) as f32).min(1.0);
        Self {
            current: value,
            step: (Self::INERTIA * sample_rate_comp).min(1.0),
        }
    }

    /// Access to the current, possibly ramped value.
    #[inline(always)]
    #[must_use]
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Jump to the given value without ramping.
    pub fn init(&mut self, value: f32) {
        self.current = value;
    }

    /// Ramp once towards the given target. Returns the new current value.
    #[inline]
    pub fn approach(&mut self, target: f32) -> f32 {
        self.current += (target - self.current) * self.step;
        self.current
    }
}

// -------------------------------------------------------------------------------------------------
