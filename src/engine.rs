//! The drift engine: drifters wandering across a sample, spawning grains which get rendered into
//! a stereo output.
//!
//! [`DriftEngine`] lives on the audio thread and renders one block per [`DriftEngine::process`]
//! call. It never allocates, locks or blocks while processing. Other threads talk to it through
//! its lock-free message queue, usually via a [`DriftController`](crate::DriftController), and
//! observe it via [`DriftSnapshot`]s published once per block.

use std::sync::Arc;

use basedrop::Owned;
use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;

use crate::{
    parameter::{Parameter, ParameterValueUpdate},
    sample::{CaptureBuffer, SampleBuffer, SourceRegion},
    utils::{
        filter::band::BandFilterCoefficients,
        random::RandomSource,
        sanitize_sample,
        scale::Scale,
        smoothed::ExponentialSmoothedValue,
        soft_clip,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

pub mod controls;
pub mod drifter;
pub mod envelope;
pub mod grain;
pub mod scheduler;

use controls::DriftControls;
use drifter::{DriftForces, DrifterField, DRIFTER_COUNT};
use grain::{GrainMixContext, GrainPool, GrainSpawn, GRAIN_POOL_SIZE};
use scheduler::{ClockDetector, GrainScheduler, SchedulerInputs, TriggerMode, GATE_THRESHOLD};

// -------------------------------------------------------------------------------------------------

/// Construction time settings of a [`DriftEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriftConfig {
    /// Engine output sample rate in Hz. By default 48000.
    pub sample_rate: u32,
    /// Seed of the engine's random source. Engines with equal seeds and inputs render
    /// identical output.
    pub seed: u64,
    /// Soft clip ceiling of the audio outputs. By default 5.0, a Eurorack ±5 V range.
    pub output_level: f32,
    /// Full scale of the position and pulse CV outputs. By default 5.0.
    pub cv_level: f32,
    /// Maximum number of simultaneously playing grains, up to the pool size. Triggers beyond
    /// are dropped.
    pub max_active_grains: usize,
    /// Search radius for grain start zero crossings in frames. 0 disables the search.
    pub zero_crossing_radius: usize,
    /// Size of the live capture buffer in frames. By default None: no live capture.
    pub capture_frames: Option<usize>,
    /// Distance in frames grains keep from the capture buffer's write head.
    pub capture_safety_margin: usize,
    /// Capacity of the engine's message queue.
    pub message_queue_size: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            seed: 0x0D21_F7E5,
            output_level: 5.0,
            cv_level: 5.0,
            max_active_grains: GRAIN_POOL_SIZE,
            zero_crossing_radius: 256,
            capture_frames: None,
            capture_safety_margin: 256,
            message_queue_size: 1024,
        }
    }
}

impl DriftConfig {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn output_level(mut self, level: f32) -> Self {
        self.output_level = level;
        self
    }

    pub fn cv_level(mut self, level: f32) -> Self {
        self.cv_level = level;
        self
    }

    pub fn max_active_grains(mut self, count: usize) -> Self {
        self.max_active_grains = count;
        self
    }

    pub fn zero_crossing_radius(mut self, frames: usize) -> Self {
        self.zero_crossing_radius = frames;
        self
    }

    pub fn capture_frames(mut self, frames: usize) -> Self {
        self.capture_frames = Some(frames);
        self
    }

    pub fn capture_safety_margin(mut self, frames: usize) -> Self {
        self.capture_safety_margin = frames;
        self
    }

    pub fn message_queue_size(mut self, size: usize) -> Self {
        self.message_queue_size = size;
        self
    }

    /// Validate all settings. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "drift config 'sample_rate' must be greater than zero".to_string(),
            ));
        }
        if !(self.output_level.is_finite() && self.output_level > 0.0) {
            return Err(Error::ParameterError(format!(
                "drift config 'output_level' value is '{}'",
                self.output_level
            )));
        }
        if !(self.cv_level.is_finite() && self.cv_level >= 0.0) {
            return Err(Error::ParameterError(format!(
                "drift config 'cv_level' value is '{}'",
                self.cv_level
            )));
        }
        if !(1..=GRAIN_POOL_SIZE).contains(&self.max_active_grains) {
            return Err(Error::ParameterError(format!(
                "drift config 'max_active_grains' value is '{}', but must be in range 1..={}",
                self.max_active_grains, GRAIN_POOL_SIZE
            )));
        }
        if self.message_queue_size == 0 {
            return Err(Error::ParameterError(
                "drift config 'message_queue_size' must be greater than zero".to_string(),
            ));
        }
        if let Some(frames) = self.capture_frames {
            let min_frames = self
                .capture_safety_margin
                .checked_mul(2)
                .and_then(|margins| margins.checked_add(SampleBuffer::MIN_FRAMES))
                .ok_or_else(|| {
                    Error::ParameterError(format!(
                        "drift config 'capture_safety_margin' value '{}' is too large",
                        self.capture_safety_margin
                    ))
                })?;
            if frames < min_frames {
                return Err(Error::ParameterError(format!(
                    "drift config 'capture_frames' value is '{frames}', but must be at least {min_frames}"
                )));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// How [`DriftEngine::process`] writes into the output buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Mix into the buffer's existing content.
    Add,
    /// Overwrite the buffer's content.
    #[default]
    Replace,
}

/// Where grains read their audio from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// The loaded [`SampleBuffer`].
    #[default]
    Sample,
    /// The live [`CaptureBuffer`], recording the capture input.
    Capture,
}

/// Optional per sample control voltage inputs of a block. Unconnected inputs are `None`.
/// Inputs shorter than the block read as 0 V past their end.
#[derive(Debug, Default, Clone, Copy)]
pub struct CvInputs<'a> {
    /// Anchor offset: +0.1 per volt.
    pub anchor: Option<&'a [f32]>,
    /// Pitch offset: 1 V per octave.
    pub pitch: Option<&'a [f32]>,
    /// Drift speed multiplier: `1 + 0.2 · V`.
    pub drift: Option<&'a [f32]>,
    /// Entropy offset: +0.2 per positive volt.
    pub entropy: Option<&'a [f32]>,
    /// Storm gate: storms while above 1 V.
    pub storm: Option<&'a [f32]>,
    /// Clock pulses: rising edges above 1 V.
    pub clock: Option<&'a [f32]>,
    /// Audio recorded into the capture buffer.
    pub capture: Option<&'a [f32]>,
}

/// Control voltage outputs of a block. Always replaced, never mixed.
#[derive(Debug)]
pub struct CvOutputs<'a> {
    /// Average drifter position, scaled to `0..cv_level`.
    pub position: &'a mut [f32],
    /// `cv_level` for one sample on every grain trigger, else 0.
    pub pulse: &'a mut [f32],
}

// -------------------------------------------------------------------------------------------------

/// Messages to control a [`DriftEngine`] from other threads. Messages get applied at the start
/// of the next processed block.
pub enum DriftMessage {
    /// Update a single parameter value.
    SetParameter {
        id: FourCC,
        value: Owned<ParameterValueUpdate>,
    },
    /// Update multiple parameter values at once.
    SetParameters {
        values: Owned<Vec<(FourCC, ParameterValueUpdate)>>,
    },
    /// Spike entropy to its maximum and let it decay slowly.
    TriggerStorm,
    /// Swap in a new sample. The old one stays playable until the swap.
    SetSample { sample: Owned<SampleBuffer> },
    /// Remove the current sample: sample mode then renders silence.
    ClearSample,
    /// Switch between sample playback and live capture.
    SetSourceMode { mode: SourceMode },
    /// Restart drifters, grains and smoothed controls. Reseeds the random source with the given
    /// seed, or the configured one.
    Reset { seed: Option<u64> },
}

// -------------------------------------------------------------------------------------------------

/// Read-only view of the engine's state for displays, published once per block.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftSnapshot {
    /// Total number of processed sample frames.
    pub sample_time: u64,
    pub positions: [f32; DRIFTER_COUNT],
    pub boredom: [f32; DRIFTER_COUNT],
    /// Smoothed anchor, including CV modulation.
    pub anchor: f32,
    /// Lower and upper bound of the wander window.
    pub wander_bounds: (f32, f32),
    pub active_grains: usize,
    /// Smoothed entropy, including CV modulation and storms.
    pub entropy: f32,
    pub storm: f32,
    /// Number of grain triggers per drifter since the last reset.
    pub trigger_counts: [u64; DRIFTER_COUNT],
    pub clock_present: bool,
    pub source_mode: SourceMode,
    /// Frame count of the current source, 0 when there is none.
    pub source_frames: usize,
    /// Sample rate of the current source, 0 when there is none.
    pub source_sample_rate: u32,
}

// -------------------------------------------------------------------------------------------------

/// Granular synthesis engine, driven by four autonomous drifters.
///
/// Per sample, the engine reads the CV inputs, smooths the controls, moves the drifters, asks
/// the grain scheduler whether drifters should spawn grains, renders all playing grains, and
/// finally normalizes and soft clips the mix.
pub struct DriftEngine {
    config: DriftConfig,
    controls: DriftControls,
    random: RandomSource,
    field: DrifterField,
    scheduler: GrainScheduler,
    clock: ClockDetector,
    pool: GrainPool,
    mix_context: GrainMixContext,
    anchor: ExponentialSmoothedValue,
    drift: ExponentialSmoothedValue,
    rate: ExponentialSmoothedValue,
    entropy: ExponentialSmoothedValue,
    normalization: ExponentialSmoothedValue,
    storm: f32,
    storm_decay: f32,
    sample: Option<Owned<SampleBuffer>>,
    capture: Option<CaptureBuffer>,
    source_mode: SourceMode,
    message_queue: Arc<ArrayQueue<DriftMessage>>,
    snapshot_queue: Arc<ArrayQueue<DriftSnapshot>>,
    sample_time: u64,
}

impl DriftEngine {
    /// Center frequencies of the drifters' spectral separation bands in Hz.
    pub const BAND_CENTERS: [f32; DRIFTER_COUNT] = [250.0, 750.0, 1550.0, 4000.0];
    /// Spectrum amounts at or below this bypass the band filters.
    const SPECTRUM_THRESHOLD: f32 = 0.01;
    /// Storm half-life in seconds.
    const STORM_HALF_LIFE: f32 = 4.0;
    /// Normalization gain never drops below this.
    const MIN_NORMALIZATION: f32 = 0.1;
    /// Input gain of the output soft clipper.
    const OUTPUT_DRIVE: f32 = 2.0;
    /// Smoothed rate of the default density.
    const INITIAL_RATE: f32 = 8.0;
    /// Pitch jitter at full entropy in semitones.
    const PITCH_JITTER: f32 = 2.0;
    /// Wander windows narrower than this don't pan.
    const MIN_PAN_WANDER: f32 = 0.01;
    const SNAPSHOT_QUEUE_SIZE: usize = 4;

    /// Create a new engine with the given config. Allocates all voices, buffers and queues
    /// upfront, so call this off the audio thread.
    pub fn new(config: DriftConfig) -> Result<Self, Error> {
        config.validate()?;
        let sample_rate = config.sample_rate;

        let mut random = RandomSource::new(config.seed);
        let field = DrifterField::new(&mut random);
        let capture = match config.capture_frames {
            Some(frames) => Some(CaptureBuffer::new(frames, config.capture_safety_margin)?),
            None => None,
        };
        let storm_decay = 0.5f32.powf(1.0 / (Self::STORM_HALF_LIFE * sample_rate as f32));

        log::info!(
            "Creating drift engine: {} Hz, seed {:#x}, {} max grains{}",
            sample_rate,
            config.seed,
            config.max_active_grains,
            match config.capture_frames {
                Some(frames) => format!(", {frames} frames capture buffer"),
                None => String::new(),
            }
        );

        let controls = DriftControls::new();
        Ok(Self {
            anchor: ExponentialSmoothedValue::new(controls.anchor(), sample_rate),
            drift: ExponentialSmoothedValue::new(controls.drift(), sample_rate),
            rate: ExponentialSmoothedValue::new(Self::INITIAL_RATE, sample_rate),
            entropy: ExponentialSmoothedValue::new(controls.entropy(), sample_rate),
            normalization: ExponentialSmoothedValue::new(1.0, sample_rate),
            controls,
            random,
            field,
            scheduler: GrainScheduler::new(),
            clock: ClockDetector::new(),
            pool: GrainPool::new(),
            mix_context: GrainMixContext::default(),
            storm: 0.0,
            storm_decay,
            sample: None,
            capture,
            source_mode: SourceMode::Sample,
            message_queue: Arc::new(ArrayQueue::new(config.message_queue_size)),
            snapshot_queue: Arc::new(ArrayQueue::new(Self::SNAPSHOT_QUEUE_SIZE)),
            sample_time: 0,
            config,
        })
    }

    /// The engine's construction settings.
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Current control values.
    pub fn controls(&self) -> &DriftControls {
        &self.controls
    }

    /// Parameter descriptors of all controls.
    pub fn parameters(&self) -> Vec<&dyn Parameter> {
        self.controls.parameters()
    }

    /// Queue to send [`DriftMessage`]s to the engine.
    pub fn message_queue(&self) -> Arc<ArrayQueue<DriftMessage>> {
        Arc::clone(&self.message_queue)
    }

    /// Queue the engine publishes [`DriftSnapshot`]s to. Only the most recent snapshots
    /// are kept.
    pub fn snapshot_queue(&self) -> Arc<ArrayQueue<DriftSnapshot>> {
        Arc::clone(&self.snapshot_queue)
    }

    pub fn drifters(&self) -> &DrifterField {
        &self.field
    }

    pub fn grains(&self) -> &GrainPool {
        &self.pool
    }

    /// Number of grain triggers per drifter since the last reset.
    pub fn trigger_counts(&self) -> &[u64; DRIFTER_COUNT] {
        self.scheduler.trigger_counts()
    }

    /// Current storm level in range \[0, 1\].
    pub fn storm_level(&self) -> f32 {
        self.storm
    }

    /// Current smoothed entropy level in range \[0, 1\].
    pub fn entropy_level(&self) -> f32 {
        self.entropy.current()
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source_mode
    }

    /// The currently loaded sample, if any.
    pub fn sample(&self) -> Option<&SampleBuffer> {
        self.sample.as_deref()
    }

    /// Apply a parameter update immediately. Use the message queue when the engine runs in
    /// another thread.
    pub fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        self.controls.process_parameter_update(id, value)?;
        self.update_block_context();
        Ok(())
    }

    /// Spike entropy immediately. Use the message queue when the engine runs in another thread.
    pub fn trigger_storm(&mut self) {
        self.storm = 1.0;
    }

    /// Create a snapshot of the engine's current state.
    pub fn snapshot(&self) -> DriftSnapshot {
        let drifters = self.field.drifters();
        let (source_frames, source_sample_rate) = match self.source_mode {
            SourceMode::Sample => self
                .sample
                .as_ref()
                .map_or((0, 0), |sample| (sample.frame_count(), sample.sample_rate())),
            SourceMode::Capture => self.capture.as_ref().map_or((0, 0), |capture| {
                (capture.frame_count(), self.config.sample_rate)
            }),
        };
        DriftSnapshot {
            sample_time: self.sample_time,
            positions: std::array::from_fn(|index| drifters[index].position()),
            boredom: std::array::from_fn(|index| drifters[index].boredom()),
            anchor: self.current_anchor(),
            wander_bounds: self.forces().bounds(),
            active_grains: self.pool.active_count(),
            entropy: self.entropy.current(),
            storm: self.storm,
            trigger_counts: *self.scheduler.trigger_counts(),
            clock_present: self.clock.is_present(),
            source_mode: self.source_mode,
            source_frames,
            source_sample_rate,
        }
    }

    /// Render one block of interleaved stereo audio into `output`.
    ///
    /// Pending messages get applied first. Without a playable source the block is silent:
    /// replaced outputs and the CV outputs get zeroed, added outputs stay untouched.
    pub fn process(
        &mut self,
        output: &mut [f32],
        mode: OutputMode,
        cv_inputs: &CvInputs,
        mut cv_outputs: Option<&mut CvOutputs>,
    ) {
        self.process_messages();
        if cv_inputs.clock.is_none() && self.clock.is_present() {
            self.clock.reset();
        }

        let frame_count = output.len() / 2;
        match self.source_mode {
            SourceMode::Sample => {
                let sample = self.sample.take();
                match sample.as_deref().filter(|sample| sample.is_playable()) {
                    Some(playable) => {
                        let region = SourceRegion::from_sample(playable);
                        let rate_ratio = playable.sample_rate() as f32 / self.sample_rate() as f32;
                        for (frame, out) in output.chunks_exact_mut(2).enumerate() {
                            let (left, right, position, pulse) =
                                self.process_frame(&region, rate_ratio, cv_inputs, frame);
                            Self::write_frame(out, mode, left, right);
                            Self::write_cv(&mut cv_outputs, frame, position, pulse);
                        }
                    }
                    None => self.write_silence(output, mode, &mut cv_outputs, 0..frame_count),
                }
                self.sample = sample;
            }
            SourceMode::Capture => {
                let Some(mut capture) = self.capture.take() else {
                    self.write_silence(output, mode, &mut cv_outputs, 0..frame_count);
                    self.publish_snapshot(frame_count);
                    return;
                };
                for (frame, out) in output.chunks_exact_mut(2).enumerate() {
                    capture.write(cv_value(cv_inputs.capture, frame).unwrap_or(0.0));
                    if let Some(region) = capture.readable() {
                        let (left, right, position, pulse) =
                            self.process_frame(&region, 1.0, cv_inputs, frame);
                        Self::write_frame(out, mode, left, right);
                        Self::write_cv(&mut cv_outputs, frame, position, pulse);
                    } else {
                        Self::write_frame(out, mode, 0.0, 0.0);
                        Self::write_cv(&mut cv_outputs, frame, 0.0, 0.0);
                    }
                }
                self.capture = Some(capture);
            }
        }
        self.publish_snapshot(frame_count);
    }

    fn process_messages(&mut self) {
        let mut controls_changed = false;
        while let Some(message) = self.message_queue.pop() {
            match message {
                DriftMessage::SetParameter { id, value } => {
                    if let Err(err) = self.controls.process_parameter_update(id, &value) {
                        log::warn!("Failed to process parameter '{id}' update: {err}");
                    }
                    controls_changed = true;
                }
                DriftMessage::SetParameters { values } => {
                    for (id, value) in values.iter() {
                        if let Err(err) = self.controls.process_parameter_update(*id, value) {
                            log::warn!("Failed to process parameter '{id}' update: {err}");
                        }
                    }
                    controls_changed = true;
                }
                DriftMessage::TriggerStorm => {
                    self.storm = 1.0;
                }
                DriftMessage::SetSample { sample } => {
                    log::info!(
                        "Swapping in new sample: {} frames at {} Hz",
                        sample.frame_count(),
                        sample.sample_rate()
                    );
                    // the old sample gets released by the collector, not here
                    self.sample = Some(sample);
                }
                DriftMessage::ClearSample => {
                    log::info!("Clearing sample");
                    self.sample = None;
                }
                DriftMessage::SetSourceMode { mode } => {
                    if mode == SourceMode::Capture && self.capture.is_none() {
                        log::warn!("Can't switch to live capture: no capture buffer configured");
                    } else if mode != self.source_mode {
                        log::info!("Switching source mode to {mode:?}");
                        self.source_mode = mode;
                    }
                }
                DriftMessage::Reset { seed } => {
                    self.reset(seed.unwrap_or(self.config.seed));
                }
            }
        }
        if controls_changed {
            self.update_block_context();
        }
    }

    fn reset(&mut self, seed: u64) {
        log::debug!("Resetting drift engine with seed {seed:#x}");
        self.random.reseed(seed);
        self.field = DrifterField::new(&mut self.random);
        self.scheduler.reset();
        self.clock.reset();
        self.pool.reset();
        self.anchor.init(self.controls.anchor());
        self.drift.init(self.controls.drift());
        self.rate.init(Self::INITIAL_RATE);
        self.entropy.init(self.controls.entropy());
        self.normalization.init(1.0);
        self.storm = 0.0;
        if let Some(capture) = &mut self.capture {
            capture.clear();
        }
    }

    /// Update per drifter tilt gains and band filters from the current controls.
    fn update_block_context(&mut self) {
        let tilt = self.controls.tilt();
        for (index, gain) in self.mix_context.tilt_gain.iter_mut().enumerate() {
            let offset = 2.0 * (index as f32 / (DRIFTER_COUNT - 1) as f32) - 1.0;
            *gain = 1.0 + 0.5 * offset * tilt;
        }
        let spectrum = self.controls.spectrum();
        if spectrum > Self::SPECTRUM_THRESHOLD {
            let q = 1.0 + 2.0 * spectrum;
            let sample_rate = self.config.sample_rate;
            self.mix_context.band_filters = Some(
                Self::BAND_CENTERS
                    .map(|center| BandFilterCoefficients::new(center, q, sample_rate)),
            );
            self.mix_context.band_gain = 1.0 + spectrum;
        } else {
            self.mix_context.band_filters = None;
            self.mix_context.band_gain = 1.0;
        }
    }

    #[inline]
    fn current_anchor(&self) -> f32 {
        self.anchor.current().clamp(0.0, 1.0)
    }

    #[inline]
    fn forces(&self) -> DriftForces {
        DriftForces {
            anchor: self.current_anchor(),
            wander: self.controls.wander(),
            gravity: self.controls.gravity(),
            drift: self.drift.current(),
            entropy: self.entropy.current(),
        }
    }

    /// Run one sample tick. Returns the stereo output followed by the position and pulse
    /// CV output values.
    #[inline]
    fn process_frame(
        &mut self,
        region: &SourceRegion,
        rate_ratio: f32,
        cv: &CvInputs,
        frame: usize,
    ) -> (f32, f32, f32, f32) {
        let dt = 1.0 / self.config.sample_rate as f32;

        let anchor_offset = cv_value(cv.anchor, frame).map_or(0.0, |v| v * 0.1);
        let pitch_offset = cv_value(cv.pitch, frame).map_or(0.0, |v| v * 12.0);
        let drift_scale = cv_value(cv.drift, frame).map_or(1.0, |v| 1.0 + v * 0.2);
        let entropy_offset = cv_value(cv.entropy, frame).map_or(0.0, |v| (v * 0.2).max(0.0));
        let storm_gate = cv_value(cv.storm, frame).is_some_and(|v| v > GATE_THRESHOLD);

        if storm_gate {
            self.storm = 1.0;
        } else {
            self.storm *= self.storm_decay;
        }

        self.anchor.approach(self.controls.anchor() + anchor_offset);
        self.drift.approach(self.controls.drift() * drift_scale);
        let rate = self.rate.approach(self.controls.grain_rate());
        let entropy = self
            .entropy
            .approach((self.controls.entropy() + entropy_offset + self.storm).min(1.0));

        let clock_edge = match cv_value(cv.clock, frame) {
            Some(value) => self.clock.process(value, dt),
            None => false,
        };

        let forces = self.forces();
        self.field.update(&forces, dt, &mut self.random);

        let deviation = self.controls.deviation();
        let inputs = SchedulerInputs {
            rate,
            entropy,
            deviation,
            mode: TriggerMode::new(self.clock.is_present(), deviation),
            clock_edge,
            clock_rate: self.clock.rate(),
        };
        let mut pulse = false;
        for index in 0..DRIFTER_COUNT {
            let drifter = &mut self.field.drifters_mut()[index];
            if self
                .scheduler
                .should_trigger(index, drifter, &inputs, dt, &mut self.random)
            {
                if self.spawn_grain(index, region, rate_ratio, pitch_offset, entropy) {
                    pulse = true;
                }
            }
        }

        for (index, drifter) in self.field.drifters().iter().enumerate() {
            self.mix_context.panning[index] = if forces.wander > Self::MIN_PAN_WANDER {
                ((drifter.position() - forces.anchor) / forces.wander).clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
        let ((left, right), active_count) = self.pool.render(region, &self.mix_context);

        let target_normalization = if active_count > 1 {
            1.0 / (active_count as f32).sqrt()
        } else {
            1.0
        };
        let normalization = self
            .normalization
            .approach(target_normalization)
            .max(Self::MIN_NORMALIZATION);

        let level = self.config.output_level;
        let left = sanitize_sample(soft_clip(left * normalization, Self::OUTPUT_DRIVE, level));
        let right = sanitize_sample(soft_clip(right * normalization, Self::OUTPUT_DRIVE, level));
        let cv_level = self.config.cv_level;
        let position = self.field.average_position() * cv_level;
        let pulse = if pulse { cv_level } else { 0.0 };
        (left, right, position, pulse)
    }

    /// Start a grain for the given drifter. Returns false when the grain got dropped.
    fn spawn_grain(
        &mut self,
        drifter_index: usize,
        region: &SourceRegion,
        rate_ratio: f32,
        pitch_offset: f32,
        entropy: f32,
    ) -> bool {
        // CPU guard: drop grains instead of pausing or stealing playing ones
        if self.pool.active_count() >= self.config.max_active_grains {
            return false;
        }
        let position = self.field.drifters()[drifter_index].position();
        let start = (position * region.len() as f32) as usize;
        let start = region.nearest_zero_crossing(start, self.config.zero_crossing_radius);

        let jitter = self.random.bipolar() * entropy * Self::PITCH_JITTER;
        let semitones = grain_pitch(
            self.controls.scale(),
            self.controls.pitch(),
            pitch_offset,
            self.controls.scatter(),
            drifter_index,
            jitter,
        );
        let spawn = GrainSpawn {
            read_position: start as f32,
            position_delta: 2f32.powf(semitones / 12.0) * rate_ratio,
            length: self.controls.grain_length() * self.config.sample_rate as f32,
            drifter_index,
            shape: self.controls.shape(),
            amplitude: 1.0,
        };
        self.pool.spawn(&spawn).is_some()
    }

    #[inline]
    fn write_frame(out: &mut [f32], mode: OutputMode, left: f32, right: f32) {
        match mode {
            OutputMode::Add => {
                out[0] += left;
                out[1] += right;
            }
            OutputMode::Replace => {
                out[0] = left;
                out[1] = right;
            }
        }
    }

    #[inline]
    fn write_cv(cv_outputs: &mut Option<&mut CvOutputs>, frame: usize, position: f32, pulse: f32) {
        if let Some(cv_outputs) = cv_outputs {
            if let Some(value) = cv_outputs.position.get_mut(frame) {
                *value = position;
            }
            if let Some(value) = cv_outputs.pulse.get_mut(frame) {
                *value = pulse;
            }
        }
    }

    fn write_silence(
        &self,
        output: &mut [f32],
        mode: OutputMode,
        cv_outputs: &mut Option<&mut CvOutputs>,
        frames: std::ops::Range<usize>,
    ) {
        if mode == OutputMode::Replace {
            output.fill(0.0);
        }
        for frame in frames {
            Self::write_cv(cv_outputs, frame, 0.0, 0.0);
        }
    }

    fn publish_snapshot(&mut self, frame_count: usize) {
        self.sample_time += frame_count as u64;
        self.snapshot_queue.force_push(self.snapshot());
    }
}

// -------------------------------------------------------------------------------------------------

/// CV input value at the given frame. Frames past the input's end read as 0 V.
#[inline]
fn cv_value(input: Option<&[f32]>, frame: usize) -> Option<f32> {
    input.map(|values| values.get(frame).copied().unwrap_or(0.0))
}

/// Scatter offset of a drifter in scale degrees: the outer drifters move up by the full
/// scatter amount, the inner ones down by a third of it.
#[inline]
pub fn scatter_degrees(drifter_index: usize, scatter: i32) -> i32 {
    let direction = if drifter_index == 0 || drifter_index == DRIFTER_COUNT - 1 {
        1.0
    } else {
        -1.0
    };
    let center = (DRIFTER_COUNT - 1) as f32 / 2.0;
    let spread = (drifter_index as f32 - center).abs() / center;
    (scatter as f32 * direction * spread).round() as i32
}

/// Pitch of a new grain in semitones.
///
/// `pitch_offset` (CV) gets quantized to the scale and added to the master transpose. The
/// drifter's scatter degrees plus the random `jitter` get converted to semitones and quantized
/// as well. The chromatic scale bypasses all quantization and returns the raw sum.
pub fn grain_pitch(
    scale: Scale,
    pitch: i32,
    pitch_offset: f32,
    scatter: i32,
    drifter_index: usize,
    jitter: f32,
) -> f32 {
    let degrees = scatter_degrees(drifter_index, scatter);
    if scale.is_chromatic() {
        pitch as f32 + pitch_offset + degrees as f32 + jitter
    } else {
        let base = pitch as f32 + scale.quantize(pitch_offset);
        let offset = scale.quantize(scale.degree_to_semitones(degrees) as f32 + jitter);
        base + offset
    }
}

// -------------------------------------------------------------------------------------------------
