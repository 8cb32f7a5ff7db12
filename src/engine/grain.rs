//! Fixed size grain voice pool and the per sample grain renderer.

use super::{drifter::DRIFTER_COUNT, envelope::GrainShape};
use crate::{
    sample::SourceRegion,
    utils::filter::band::{BandFilter, BandFilterCoefficients},
};

// -------------------------------------------------------------------------------------------------

/// Number of grain voices in the pool.
pub const GRAIN_POOL_SIZE: usize = 32;

// -------------------------------------------------------------------------------------------------

/// A single grain voice.
#[derive(Debug, Clone)]
pub struct Grain {
    active: bool,
    /// Fractional, region relative read position in source frames.
    read_position: f32,
    /// Source frames to advance per engine sample.
    position_delta: f32,
    phase: f32,
    phase_delta: f32,
    drifter_index: usize,
    shape: GrainShape,
    amplitude: f32,
    filter_l: BandFilter,
    filter_r: BandFilter,
}

impl Grain {
    const fn new() -> Self {
        Self {
            active: false,
            read_position: 0.0,
            position_delta: 1.0,
            phase: 0.0,
            phase_delta: 0.0,
            drifter_index: 0,
            shape: GrainShape::Cloud,
            amplitude: 1.0,
            filter_l: BandFilter::new(),
            filter_r: BandFilter::new(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn read_position(&self) -> f32 {
        self.read_position
    }

    #[inline]
    pub fn position_delta(&self) -> f32 {
        self.position_delta
    }

    /// Envelope phase in range \[0, 1\].
    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Index of the drifter which spawned the grain.
    #[inline]
    pub fn drifter_index(&self) -> usize {
        self.drifter_index
    }

    #[inline]
    pub fn shape(&self) -> GrainShape {
        self.shape
    }
}

// -------------------------------------------------------------------------------------------------

/// Playback properties of a newly spawned grain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainSpawn {
    /// Region relative start frame.
    pub read_position: f32,
    /// Playback rate multiplier, including the source to engine sample rate ratio.
    pub position_delta: f32,
    /// Grain length in engine samples.
    pub length: f32,
    pub drifter_index: usize,
    pub shape: GrainShape,
    pub amplitude: f32,
}

/// Per drifter rendering state, updated once per tick before rendering.
#[derive(Debug, Clone)]
pub struct GrainMixContext {
    /// Stereo position of each drifter in range \[-1, 1\].
    pub panning: [f32; DRIFTER_COUNT],
    /// Tilt gain of each drifter.
    pub tilt_gain: [f32; DRIFTER_COUNT],
    /// Band filter of each drifter, or `None` when spectral separation is off.
    pub band_filters: Option<[BandFilterCoefficients; DRIFTER_COUNT]>,
    /// Gain compensating the band filter's loss.
    pub band_gain: f32,
}

impl Default for GrainMixContext {
    fn default() -> Self {
        Self {
            panning: [0.0; DRIFTER_COUNT],
            tilt_gain: [1.0; DRIFTER_COUNT],
            band_filters: None,
            band_gain: 1.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Fixed collection of grain voices.
///
/// Grains are allocated from the first free slot. A full pool drops new grains: voices are
/// never stolen. Slot filter states persist across reuses.
#[derive(Debug, Clone)]
pub struct GrainPool {
    grains: [Grain; GRAIN_POOL_SIZE],
}

impl Default for GrainPool {
    fn default() -> Self {
        Self::new()
    }
}

impl GrainPool {
    pub fn new() -> Self {
        Self {
            grains: std::array::from_fn(|_| Grain::new()),
        }
    }

    pub fn grains(&self) -> &[Grain; GRAIN_POOL_SIZE] {
        &self.grains
    }

    /// Number of currently playing grains.
    pub fn active_count(&self) -> usize {
        self.grains.iter().filter(|grain| grain.active).count()
    }

    pub fn is_full(&self) -> bool {
        self.grains.iter().all(|grain| grain.active)
    }

    /// Start a new grain in the first free slot. Returns the slot index, or `None` when the
    /// pool is full and the grain got dropped.
    pub fn spawn(&mut self, spawn: &GrainSpawn) -> Option<usize> {
        let index = self.grains.iter().position(|grain| !grain.active)?;
        let grain = &mut self.grains[index];
        grain.active = true;
        grain.read_position = spawn.read_position.max(0.0);
        grain.position_delta = spawn.position_delta;
        grain.phase = 0.0;
        grain.phase_delta = 1.0 / spawn.length.max(1.0);
        grain.drifter_index = spawn.drifter_index.min(DRIFTER_COUNT - 1);
        grain.shape = spawn.shape;
        grain.amplitude = spawn.amplitude;
        Some(index)
    }

    /// Stop all grains and clear their filter states.
    pub fn reset(&mut self) {
        for grain in &mut self.grains {
            *grain = Grain::new();
        }
    }

    /// Render and advance all active grains by one sample. Returns the unnormalized stereo
    /// mix and the number of grains which were active at the start of the tick.
    pub fn render(
        &mut self,
        region: &SourceRegion<'_>,
        context: &GrainMixContext,
    ) -> ((f32, f32), usize) {
        let length = region.len() as f32;
        if length <= 0.0 {
            return ((0.0, 0.0), 0);
        }
        let (mut mix_l, mut mix_r) = (0.0, 0.0);
        let mut active_count = 0;

        for grain in self.grains.iter_mut().filter(|grain| grain.active) {
            active_count += 1;
            let drifter = grain.drifter_index;

            let envelope = grain.shape.amplitude(grain.phase);
            let sample = region.interpolated(grain.read_position)
                * envelope
                * grain.amplitude
                * context.tilt_gain[drifter];

            // linear crossfade
            let pan = context.panning[drifter];
            let mut left = sample * (0.5 - pan * 0.5);
            let mut right = sample * (0.5 + pan * 0.5);
            if let Some(band_filters) = &context.band_filters {
                let coefficients = &band_filters[drifter];
                left = grain.filter_l.process_sample(coefficients, left) * context.band_gain;
                right = grain.filter_r.process_sample(coefficients, right) * context.band_gain;
            }
            mix_l += left;
            mix_r += right;

            // capture regions move along with the write head
            grain.read_position += grain.position_delta - region.drift();
            grain.read_position = grain.read_position.rem_euclid(length);
            if !grain.read_position.is_finite() || grain.read_position >= length {
                grain.read_position = 0.0;
            }
            grain.phase += grain.phase_delta;
            if grain.phase >= 1.0 {
                grain.active = false;
            }
        }
        ((mix_l, mix_r), active_count)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleBuffer;

    fn spawn(drifter_index: usize, length: f32) -> GrainSpawn {
        GrainSpawn {
            read_position: 10.0,
            position_delta: 1.0,
            length,
            drifter_index,
            shape: GrainShape::Cloud,
            amplitude: 1.0,
        }
    }

    #[test]
    fn pool_capacity() {
        let mut pool = GrainPool::new();
        for index in 0..GRAIN_POOL_SIZE {
            assert_eq!(pool.spawn(&spawn(index % DRIFTER_COUNT, 1000.0)), Some(index));
        }
        assert!(pool.is_full());
        let before = pool
            .grains()
            .iter()
            .map(|g| (g.drifter_index(), g.read_position(), g.phase()))
            .collect::<Vec<_>>();
        assert_eq!(pool.spawn(&spawn(3, 10.0)), None);
        let after = pool
            .grains()
            .iter()
            .map(|g| (g.drifter_index(), g.read_position(), g.phase()))
            .collect::<Vec<_>>();
        assert_eq!(before, after);
        assert_eq!(pool.active_count(), GRAIN_POOL_SIZE);

        pool.reset();
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn grain_lifecycle() {
        let sample = SampleBuffer::new(vec![0.5; 1000], 48000).unwrap();
        let region = SourceRegion::from_sample(&sample);
        let context = GrainMixContext::default();

        let mut pool = GrainPool::new();
        pool.spawn(&spawn(0, 100.0));
        let mut previous_phase = 0.0;
        let mut ticks = 0;
        while pool.active_count() > 0 {
            let (_, active) = pool.render(&region, &context);
            assert_eq!(active, 1);
            ticks += 1;
            let grain = &pool.grains()[0];
            if grain.is_active() {
                assert!(grain.phase() >= previous_phase);
                assert!(grain.phase() < 1.0);
                previous_phase = grain.phase();
            }
            assert!(ticks <= 101, "grain never finished");
        }
        assert!((99..=101).contains(&ticks), "{ticks} ticks");
        assert_eq!(pool.render(&region, &context), ((0.0, 0.0), 0));
    }

    #[test]
    fn read_positions_wrap() {
        let sample = SampleBuffer::new(vec![0.0; 200], 48000).unwrap();
        let region = SourceRegion::from_sample(&sample);
        let mut pool = GrainPool::new();
        pool.spawn(&GrainSpawn {
            read_position: 195.0,
            position_delta: 2.0,
            ..spawn(1, 1000.0)
        });
        for _ in 0..5 {
            pool.render(&region, &GrainMixContext::default());
        }
        assert!((pool.grains()[0].read_position() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn panning_and_tilt() {
        let sample = SampleBuffer::new(vec![1.0; 1000], 48000).unwrap();
        let region = SourceRegion::from_sample(&sample);
        let mut context = GrainMixContext::default();
        context.panning = [-1.0, 1.0, 0.0, 0.0];
        context.tilt_gain = [1.0, 0.5, 1.0, 1.0];

        let mut pool = GrainPool::new();
        pool.spawn(&GrainSpawn {
            shape: GrainShape::Ice,
            ..spawn(0, 1000.0)
        });
        pool.spawn(&GrainSpawn {
            shape: GrainShape::Ice,
            ..spawn(1, 1000.0)
        });
        let mut mix = (0.0, 0.0);
        for _ in 0..500 {
            mix = pool.render(&region, &context).0;
        }
        // drifter 0 hard left at full gain, drifter 1 hard right at half gain
        assert!((mix.0 - 1.0).abs() < 1e-4, "{mix:?}");
        assert!((mix.1 - 0.5).abs() < 1e-4, "{mix:?}");
    }

    #[test]
    fn band_filter_separates_drifters() {
        let frames = (0..48000)
            .map(|i| (2.0 * std::f32::consts::PI * 250.0 * i as f32 / 48000.0).sin())
            .collect::<Vec<_>>();
        let sample = SampleBuffer::new(frames, 48000).unwrap();
        let region = SourceRegion::from_sample(&sample);
        let q = 3.0;
        let context = GrainMixContext {
            band_filters: Some([250.0, 750.0, 1550.0, 4000.0].map(|center| {
                BandFilterCoefficients::new(center, q, 48000)
            })),
            band_gain: 2.0,
            ..GrainMixContext::default()
        };
        let measure = |drifter_index: usize| {
            let mut pool = GrainPool::new();
            pool.spawn(&GrainSpawn {
                read_position: 0.0,
                shape: GrainShape::Ice,
                ..spawn(drifter_index, 40000.0)
            });
            let mut energy = 0.0;
            for i in 0..20000 {
                let ((left, right), _) = pool.render(&region, &context);
                if i > 10000 {
                    energy += left * left + right * right;
                }
            }
            energy
        };
        // a 250 Hz tone passes the lowest band, but not the highest one
        assert!(measure(0) > 10.0 * measure(3));
    }
}
