//! Renders the drift engine offline into a stereo float WAV file.
//!
//! Plays the given WAV file, or the built-in test tone, optionally with a clock input and a
//! storm at a given time.

use std::path::PathBuf;

use arg::{parse_args, Args};

use drifters::{
    drift::DriftControls,
    parameters::Parameter,
    CvInputs, CvOutputs, DriftConfig, DriftController, DriftEngine, Error, OutputMode, SampleBuffer,
};

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: usize = 256;

// -------------------------------------------------------------------------------------------------

/// Render arguments.
#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "i", long = "input")]
    /// WAV file to play. Plays a test tone when not set.
    input_path: Option<PathBuf>,
    #[arg(short = "o", long = "output")]
    /// Path of the rendered WAV file. By default \"drifters.wav\".
    output_path: Option<PathBuf>,
    #[arg(short = "s", long = "seconds")]
    /// Length of the rendering in seconds. By default 10.
    seconds: Option<u32>,
    #[arg(long = "seed")]
    /// Random seed. By default the engine's default seed.
    seed: Option<u64>,
    #[arg(short = "d", long = "density")]
    /// Grain density in range 0..1.
    density: Option<f32>,
    #[arg(long = "storm-at")]
    /// Trigger a storm after the given number of seconds.
    storm_at: Option<f32>,
    #[arg(short = "c", long = "clock")]
    /// Feed a clock with the given tempo in BPM into the engine.
    clock_bpm: Option<f32>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    log_level: Option<log::Level>,
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    let args = parse_args::<Arguments>();

    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()
        .expect("Failed to set logger");

    // Create the engine
    let mut config = DriftConfig::default().sample_rate(SAMPLE_RATE);
    if let Some(seed) = args.seed {
        config = config.seed(seed);
    }
    let mut engine = DriftEngine::new(config)?;
    let mut controller = DriftController::new(&engine);

    // Load the sample
    let sample = match &args.input_path {
        Some(path) => SampleBuffer::from_wav_file(path)?,
        None => SampleBuffer::test_tone(SAMPLE_RATE),
    };
    println!(
        "Playing {} ({:.2} seconds)",
        args.input_path
            .as_ref()
            .map_or("test tone".to_string(), |path| path.display().to_string()),
        sample.duration().as_secs_f32()
    );
    controller.set_sample(sample)?;

    if let Some(density) = args.density {
        controller.set_parameter(DriftControls::DENSITY.normalized_update(density)?)?;
    }
    if args.clock_bpm.is_some() {
        // lock grains to the clock
        controller.set_parameter(DriftControls::DEVIATION.value_update(0.0))?;
    }

    // Create output
    let output_path = args
        .output_path
        .unwrap_or_else(|| PathBuf::from("drifters.wav"));
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&output_path, spec)?;

    // Render
    let total_frames = args.seconds.unwrap_or(10) as usize * SAMPLE_RATE as usize;
    let storm_frame = args
        .storm_at
        .map(|seconds| (seconds.max(0.0) * SAMPLE_RATE as f32) as usize);
    let clock_period = args
        .clock_bpm
        .filter(|bpm| *bpm > 0.0)
        .map(|bpm| ((60.0 / bpm) * SAMPLE_RATE as f32) as usize);

    let mut output = vec![0.0; BLOCK_SIZE * 2];
    let mut clock = vec![0.0; BLOCK_SIZE];
    let mut position = vec![0.0; BLOCK_SIZE];
    let mut pulse = vec![0.0; BLOCK_SIZE];
    let output_level = engine.config().output_level;

    let mut frame = 0;
    while frame < total_frames {
        let block_frames = BLOCK_SIZE.min(total_frames - frame);
        if let Some(storm_frame) = storm_frame {
            if (frame..frame + block_frames).contains(&storm_frame) {
                println!("Storm!");
                controller.trigger_storm()?;
            }
        }
        if let Some(period) = clock_period {
            for (index, value) in clock[..block_frames].iter_mut().enumerate() {
                // 5 ms pulses
                *value = if (frame + index) % period.max(1) < 240 {
                    5.0
                } else {
                    0.0
                };
            }
        }
        let cv_inputs = CvInputs {
            clock: clock_period.map(|_| &clock[..block_frames]),
            ..CvInputs::default()
        };
        engine.process(
            &mut output[..block_frames * 2],
            OutputMode::Replace,
            &cv_inputs,
            Some(&mut CvOutputs {
                position: &mut position[..block_frames],
                pulse: &mut pulse[..block_frames],
            }),
        );
        // scale Eurorack levels down to full scale
        for value in &output[..block_frames * 2] {
            writer.write_sample(value / output_level)?;
        }
        frame += block_frames;

        if frame % (SAMPLE_RATE as usize) < block_frames {
            if let Some(snapshot) = controller.snapshot() {
                println!(
                    "{:>4}s: positions {:.2?}, {} grains, entropy {:.2}",
                    frame / SAMPLE_RATE as usize,
                    snapshot.positions,
                    snapshot.active_grains,
                    snapshot.entropy
                );
            }
            controller.collect_garbage();
        }
    }
    writer.finalize()?;

    println!(
        "Rendered {} grains into '{}'",
        engine.trigger_counts().iter().sum::<u64>(),
        output_path.display()
    );
    Ok(())
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments() {
        assert!(Arguments::HELP.contains("\"drifters.wav\""));

        let args = Arguments::from_args(["-o", "out.wav", "--seconds", "3", "--storm-at", "1.5"])
            .unwrap();
        assert_eq!(args.output_path, Some(PathBuf::from("out.wav")));
        assert_eq!(args.seconds, Some(3));
        assert_eq!(args.storm_at, Some(1.5));
        assert!(args.input_path.is_none());
    }
}
