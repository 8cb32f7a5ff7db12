use std::f32::consts::PI;

use crate::utils::flush_denormal;

// -------------------------------------------------------------------------------------------------

/// Coefficients of a [`BandFilter`]: frequency and damping, clamped to the filter's stability
/// bounds. Calculated once per band and shared by all filter states of that band.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BandFilterCoefficients {
    frequency: f32,
    damping: f32,
}

impl BandFilterCoefficients {
    /// Highest center frequency, relative to the sample rate.
    const MAX_RELATIVE_FREQUENCY: f32 = 0.4;
    /// Frequency coefficient limit. Above, the Chamberlin topology may blow up.
    const MAX_FREQUENCY_COEFF: f32 = 0.7;
    const MIN_DAMPING: f32 = 0.05;
    const MAX_DAMPING: f32 = 1.9;

    /// Create new coefficients for the given center frequency in Hz, resonance (Q) and
    /// sample rate.
    pub fn new(center_frequency: f32, q: f32, sample_rate: u32) -> Self {
        let mut coefficients = Self::default();
        coefficients.set(center_frequency, q, sample_rate);
        coefficients
    }

    pub fn set(&mut self, center_frequency: f32, q: f32, sample_rate: u32) {
        let sample_rate = sample_rate.max(1) as f32;
        let frequency = center_frequency
            .max(0.0)
            .min(sample_rate * Self::MAX_RELATIVE_FREQUENCY);
        self.frequency =
            (2.0 * (PI * frequency / sample_rate).sin()).min(Self::MAX_FREQUENCY_COEFF);
        self.damping = (1.0 / q.max(f32::EPSILON)).clamp(Self::MIN_DAMPING, Self::MAX_DAMPING);
    }

    #[inline(always)]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[inline(always)]
    pub fn damping(&self) -> f32 {
        self.damping
    }
}

// -------------------------------------------------------------------------------------------------

/// Two pole state variable band-pass filter (Chamberlin topology).
///
/// Cheap enough to run one instance per grain and channel. The state gets scrubbed of
/// denormals and NaNs after every sample, so a single bad input can't poison it.
#[derive(Debug, Default, Clone, Copy)]
pub struct BandFilter {
    low: f32,
    band: f32,
}

impl BandFilter {
    pub const fn new() -> Self {
        Self {
            low: 0.0,
            band: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.low = 0.0;
        self.band = 0.0;
    }

    /// Process a single sample and return the band-pass output.
    #[inline]
    pub fn process_sample(&mut self, coefficients: &BandFilterCoefficients, input: f32) -> f32 {
        let f = coefficients.frequency;
        self.low += f * self.band;
        let high = input - self.low - coefficients.damping * self.band;
        self.band += f * high;

        self.low = Self::scrub(self.low);
        self.band = Self::scrub(self.band);
        self.band
    }

    #[inline(always)]
    fn scrub(value: f32) -> f32 {
        if value.is_finite() {
            flush_denormal(value)
        } else {
            0.0
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_gain(filter_frequency: f32, signal_frequency: f32) -> f32 {
        let sample_rate = 48000;
        let coefficients = BandFilterCoefficients::new(filter_frequency, 2.0, sample_rate);
        let mut filter = BandFilter::new();
        let mut peak = 0.0f32;
        for i in 0..sample_rate as usize {
            let input = (2.0 * PI * signal_frequency * i as f32 / sample_rate as f32).sin();
            let output = filter.process_sample(&coefficients, input);
            // skip settling time
            if i > sample_rate as usize / 2 {
                peak = peak.max(output.abs());
            }
        }
        peak
    }

    #[test]
    fn passes_center_band() {
        let center = sine_gain(750.0, 750.0);
        assert!(center > 0.5, "center gain {center}");
        assert!(sine_gain(750.0, 60.0) < center * 0.3);
        assert!(sine_gain(750.0, 12000.0) < center * 0.3);
    }

    #[test]
    fn coefficients_are_clamped() {
        let coefficients = BandFilterCoefficients::new(30000.0, 0.0, 48000);
        assert!(coefficients.frequency() <= 0.7);
        assert!(coefficients.damping() <= 1.9);
        let coefficients = BandFilterCoefficients::new(250.0, 1000.0, 48000);
        assert!(coefficients.damping() >= 0.05);
    }

    #[test]
    fn scrubs_invalid_state() {
        let coefficients = BandFilterCoefficients::new(1550.0, 3.0, 48000);
        let mut filter = BandFilter::new();
        assert_eq!(filter.process_sample(&coefficients, f32::NAN), 0.0);
        assert_eq!(filter.process_sample(&coefficients, f32::INFINITY), 0.0);
        assert!(filter.process_sample(&coefficients, 1.0).is_finite());
        filter.reset();
        assert_eq!(filter.process_sample(&coefficients, 1e-30), 0.0);
    }
}
