//! Grain source buffers: preloaded mono samples and a live capture ring buffer.

use std::{f32::consts::PI, time::Duration};

#[cfg(feature = "wav-file")]
use std::path::Path;

use assume::assume;

use crate::{
    waveform::{peak_overview, waveform_from_frames, WaveformPoint},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A read-only mono sample the drifters play grains from.
///
/// Sample buffers are created off the audio thread. Construction mixes down multi-channel
/// content, limits the length and precomputes a peak overview for displays.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    frames: Box<[f32]>,
    sample_rate: u32,
    overview: Box<[f32]>,
}

impl SampleBuffer {
    /// Maximum number of frames kept from a sample: 32 seconds at 48 kHz.
    pub const MAX_FRAMES: usize = 48000 * 32;
    /// Samples shorter than this play silence.
    pub const MIN_FRAMES: usize = 100;
    /// Number of columns in the peak overview.
    pub const OVERVIEW_WIDTH: usize = 236;

    /// Create a new sample from the given mono frames, truncated to [`Self::MAX_FRAMES`].
    pub fn new(mut frames: Vec<f32>, sample_rate: u32) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Sample rate must be greater than zero".to_string(),
            ));
        }
        if frames.len() > Self::MAX_FRAMES {
            log::debug!(
                "Truncating sample from {} to {} frames",
                frames.len(),
                Self::MAX_FRAMES
            );
            frames.truncate(Self::MAX_FRAMES);
        }
        for frame in frames.iter_mut() {
            if !frame.is_finite() {
                *frame = 0.0;
            }
        }
        let overview = peak_overview(&frames, Self::OVERVIEW_WIDTH).into_boxed_slice();
        Ok(Self {
            frames: frames.into_boxed_slice(),
            sample_rate,
            overview,
        })
    }

    /// Create a new sample from an interleaved buffer, mixing all channels down to mono.
    pub fn from_interleaved(
        buffer: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        if channel_count == 0 {
            return Err(Error::ParameterError(
                "Channel count must be greater than zero".to_string(),
            ));
        }
        let frames = buffer
            .chunks_exact(channel_count)
            .take(Self::MAX_FRAMES)
            .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
            .collect::<Vec<_>>();
        Self::new(frames, sample_rate)
    }

    /// Decode a WAV file into a new mono sample buffer.
    #[cfg(feature = "wav-file")]
    pub fn from_wav_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        let channel_count = spec.channels as usize;
        let max_samples = Self::MAX_FRAMES * channel_count;
        let buffer = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .take(max_samples)
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(max_samples)
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        log::info!(
            "Decoded sample '{}': {} channels, {} Hz, {} frames",
            path.as_ref().display(),
            channel_count,
            spec.sample_rate,
            buffer.len() / channel_count.max(1)
        );
        Self::from_interleaved(&buffer, channel_count, spec.sample_rate)
    }

    /// A four second harmonic pad with slow amplitude motion, useful when no sample file is
    /// at hand.
    pub fn test_tone(sample_rate: u32) -> Self {
        const PARTIALS: [(f32, f32); 5] = [
            (220.0, 0.3),
            (440.0, 0.2),
            (330.0, 0.15),
            (550.0, 0.1),
            (660.0, 0.08),
        ];
        let sample_rate = sample_rate.max(1);
        let frame_count = (sample_rate as usize * 4).min(Self::MAX_FRAMES);
        let frames = (0..frame_count)
            .map(|index| {
                let time = index as f32 / sample_rate as f32;
                let pad = PARTIALS
                    .iter()
                    .map(|(frequency, amplitude)| (2.0 * PI * frequency * time).sin() * amplitude)
                    .sum::<f32>();
                let motion = 0.8 + 0.2 * (2.0 * PI * 0.5 * time).sin();
                pad * motion * 0.5
            })
            .collect::<Vec<_>>();
        let overview = peak_overview(&frames, Self::OVERVIEW_WIDTH).into_boxed_slice();
        Self {
            frames: frames.into_boxed_slice(),
            sample_rate,
            overview,
        }
    }

    /// The sample's mono frames.
    #[inline]
    pub fn frames(&self) -> &[f32] {
        &self.frames
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Native sample rate of the sample's frames.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames.len() as f64 / self.sample_rate as f64)
    }

    /// True when the sample is long enough to play grains from.
    #[inline]
    pub fn is_playable(&self) -> bool {
        self.frames.len() >= Self::MIN_FRAMES
    }

    /// Peak amplitude per column, [`Self::OVERVIEW_WIDTH`] columns wide.
    pub fn overview(&self) -> &[f32] {
        &self.overview
    }

    /// Min/max waveform plot data with the given resolution.
    pub fn waveform(&self, resolution: usize) -> Vec<WaveformPoint> {
        waveform_from_frames(&self.frames, self.sample_rate, resolution)
    }
}

// -------------------------------------------------------------------------------------------------

/// Circular buffer continuously recording a live input, which drifters play grains from.
///
/// The write head advances one frame per recorded sample. Frames close to the write head are
/// either about to be overwritten or were just written, so grains only ever read outside of a
/// safety margin around the head: [`CaptureBuffer::readable`] returns the region between.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    frames: Box<[f32]>,
    write_head: usize,
    recorded: usize,
    safety_margin: usize,
}

impl CaptureBuffer {
    /// Create a new, silent capture buffer. Allocates, so create it off the audio thread.
    ///
    /// Returns [`Error::SampleTooShort`] when the buffer can't hold a playable region next to
    /// the safety margins.
    pub fn new(frame_count: usize, safety_margin: usize) -> Result<Self, Error> {
        let min_frames = safety_margin
            .saturating_mul(2)
            .saturating_add(SampleBuffer::MIN_FRAMES);
        if frame_count < min_frames {
            return Err(Error::SampleTooShort(frame_count));
        }
        Ok(Self {
            frames: vec![0.0; frame_count].into_boxed_slice(),
            write_head: 0,
            recorded: 0,
            safety_margin,
        })
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn write_head(&self) -> usize {
        self.write_head
    }

    #[inline]
    pub fn safety_margin(&self) -> usize {
        self.safety_margin
    }

    /// Number of frames recorded so far, saturating at the buffer size.
    #[inline]
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Record a single frame at the write head and advance the head.
    #[inline]
    pub fn write(&mut self, value: f32) {
        self.frames[self.write_head] = if value.is_finite() { value } else { 0.0 };
        self.write_head = (self.write_head + 1) % self.frames.len();
        self.recorded = (self.recorded + 1).min(self.frames.len());
    }

    /// Clear all recorded content.
    pub fn clear(&mut self) {
        self.frames.fill(0.0);
        self.write_head = 0;
        self.recorded = 0;
    }

    /// The region grains may currently read from, or `None` when not enough frames were
    /// recorded yet.
    pub fn readable(&self) -> Option<SourceRegion<'_>> {
        let length = self.frames.len() - 2 * self.safety_margin;
        if self.recorded < length + self.safety_margin {
            return None;
        }
        Some(SourceRegion {
            frames: &self.frames,
            start: (self.write_head + self.safety_margin) % self.frames.len(),
            length,
            drift: 1.0,
        })
    }
}

// -------------------------------------------------------------------------------------------------

/// A readable, possibly wrapping window into a grain source.
///
/// Grain read positions are relative to the region's start: position 0 is the region's oldest
/// frame. Regions of capture buffers move along with the write head, by `drift` frames per
/// engine sample, so grains compensate their read rate by this amount.
#[derive(Debug, Clone, Copy)]
pub struct SourceRegion<'a> {
    frames: &'a [f32],
    start: usize,
    length: usize,
    drift: f32,
}

impl<'a> SourceRegion<'a> {
    /// A region spanning a whole sample.
    pub fn from_sample(sample: &'a SampleBuffer) -> Self {
        Self {
            frames: sample.frames(),
            start: 0,
            length: sample.frame_count(),
            drift: 0.0,
        }
    }

    /// Number of readable frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Frames the region moves per engine sample.
    #[inline]
    pub fn drift(&self) -> f32 {
        self.drift
    }

    /// Frame at the given region relative index, wrapping at the region's length.
    #[inline]
    pub fn frame(&self, index: usize) -> f32 {
        debug_assert!(self.length > 0, "Reading from an empty region");
        let len = self.frames.len();
        let absolute = (self.start + index % self.length) % len;
        assume!(unsafe: absolute < len, "Index wraps at the frame count");
        self.frames[absolute]
    }

    /// Linearly interpolated frame at a fractional, region relative position.
    #[inline]
    pub fn interpolated(&self, position: f32) -> f32 {
        let index = position.max(0.0) as usize;
        let fraction = position - index as f32;
        let a = self.frame(index);
        let b = self.frame(index + 1);
        a + (b - a) * fraction
    }

    /// Find the frame closest to zero near `start` within `radius` frames, preferring actual
    /// sign changes. Returns a region relative index.
    pub fn nearest_zero_crossing(&self, start: usize, radius: usize) -> usize {
        let length = self.length;
        if length == 0 {
            return 0;
        }
        let start = start % length;
        let mut best_index = start;
        let mut best_value = self.frame(start).abs();

        for offset in 1..=radius.min(length / 2) {
            for (index, previous) in [
                ((start + offset) % length, (start + offset - 1) % length),
                (
                    (start + length - offset) % length,
                    (start + length - offset + 1) % length,
                ),
            ] {
                let value = self.frame(index);
                let previous_value = self.frame(previous);
                if value.abs() < best_value {
                    best_value = value.abs();
                    best_index = index;
                }
                if value * previous_value < 0.0 {
                    return if previous_value.abs() < value.abs() {
                        previous
                    } else {
                        index
                    };
                }
            }
        }
        best_index
    }
}

// -------------------------------------------------------------------------------------------------
