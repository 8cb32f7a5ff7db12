//! Helper functions to generate waveform overviews of sample buffers for display collaborators.
//!
//! ## Examples
//!
//! Print a coarse text plot of the test tone's waveform.
//!
//! ```rust
//! use drifters::{waveform::waveform_from_frames, SampleBuffer};
//!
//! let sample = SampleBuffer::test_tone(48000);
//! let waveform = waveform_from_frames(sample.frames(), sample.sample_rate(), 32);
//! for point in waveform {
//!     let width = ((point.max - point.min) * 20.0) as usize;
//!     println!("{:>6.2}s {}", point.time.as_secs_f32(), "#".repeat(width));
//! }
//! ```

use std::time::Duration;

// -------------------------------------------------------------------------------------------------

/// A single point in a waveform view plot, which represents a condensed view of the audio data at
/// the specified time as min/max values.
/// The slice width is indirectly specified via the resolution parameter when generating the points.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WaveformPoint {
    /// Start time this point refers to in the original sample buffer.
    pub time: Duration,
    /// The minimum of all values which are represented by this time slice.
    pub min: f32,
    /// The maximum of all values which are represented by this time slice.
    pub max: f32,
}

// -------------------------------------------------------------------------------------------------

/// Generates display data for waveform plots with the given resolution from the given mono
/// frames.
///
/// Resolution usually is the width in pixels that you want to draw the waveform into. The returned
/// points are guaranteed to be smaller or equal to the given resolution. When they are smaller,
/// there are less sample frames than the specified resolution present in the buffer. The waveform
/// must then be drawn upscaled. Else the resulting plot data will represent a downscaled version
/// of the original waveform data.
pub fn waveform_from_frames(
    frames: &[f32],
    samples_per_sec: u32,
    resolution: usize,
) -> Vec<WaveformPoint> {
    if samples_per_sec == 0 || resolution == 0 {
        return Vec::new();
    }
    let time = |frame_index: usize| {
        Duration::from_secs_f32(frame_index as f32 / samples_per_sec as f32)
    };
    let frame_count = frames.len();

    // upscale
    if frame_count <= resolution {
        frames
            .iter()
            .enumerate()
            .map(|(frame_index, value)| WaveformPoint {
                time: time(frame_index),
                min: *value,
                max: *value,
            })
            .collect()
    }
    // downscale
    else {
        let step_size = frame_count as f32 / resolution as f32;
        let mut waveform = Vec::with_capacity(resolution);
        for index in 0..resolution {
            let slice_start = (index as f32 * step_size) as usize;
            let slice_end = (((index + 1) as f32 * step_size) as usize).min(frame_count);
            let slice = &frames[slice_start.min(slice_end)..slice_end];
            let (min, max) = if slice.is_empty() {
                (0.0, 0.0)
            } else {
                slice
                    .iter()
                    .fold((f32::MAX, f32::MIN), |(min, max), value| {
                        (min.min(*value), max.max(*value))
                    })
            };
            waveform.push(WaveformPoint {
                time: time(slice_start),
                min,
                max,
            });
        }
        waveform
    }
}

// -------------------------------------------------------------------------------------------------

/// Peak amplitude per column of a mono buffer: a compact overview for small displays.
///
/// Returns `width` values. Columns which cover no frames, because the buffer is shorter than
/// `width`, are zero.
pub fn peak_overview(frames: &[f32], width: usize) -> Vec<f32> {
    let mut overview = vec![0.0; width];
    if frames.is_empty() || width == 0 {
        return overview;
    }
    let frames_per_column = frames.len() as f32 / width as f32;
    for (column, peak) in overview.iter_mut().enumerate() {
        let start = (column as f32 * frames_per_column) as usize;
        let end = (((column + 1) as f32 * frames_per_column) as usize).min(frames.len());
        *peak = frames[start.min(end)..end]
            .iter()
            .fold(0.0f32, |peak, value| peak.max(value.abs()));
    }
    overview
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_downscale() {
        let frames = (0..1000)
            .map(|i| if i < 500 { 0.5 } else { -0.25 })
            .collect::<Vec<f32>>();
        let waveform = waveform_from_frames(&frames, 1000, 10);
        assert_eq!(waveform.len(), 10);
        assert_eq!(waveform[0].min, 0.5);
        assert_eq!(waveform[9].max, -0.25);
        assert_eq!(waveform[5].time, Duration::from_millis(500));

        // min and max of a single column
        let waveform = waveform_from_frames(&[0.1, -0.7, 0.9, 0.2], 4, 2);
        assert_eq!((waveform[0].min, waveform[0].max), (-0.7, 0.1));
        assert_eq!((waveform[1].min, waveform[1].max), (0.2, 0.9));
    }

    #[test]
    fn waveform_upscale() {
        let waveform = waveform_from_frames(&[0.0, 1.0, -1.0], 3, 100);
        assert_eq!(waveform.len(), 3);
        assert_eq!(waveform[2].min, -1.0);
        assert!(waveform_from_frames(&[0.0], 0, 100).is_empty());
        assert!(waveform_from_frames(&[0.0], 3, 0).is_empty());
    }

    #[test]
    fn peaks() {
        let frames = [0.1, -0.8, 0.3, 0.2, -0.1, 0.05];
        assert_eq!(peak_overview(&frames, 3), vec![0.8, 0.3, 0.1]);
        assert_eq!(peak_overview(&frames, 12)[11], 0.05);
        assert_eq!(peak_overview(&[], 4), vec![0.0; 4]);
    }
}
