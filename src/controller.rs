use std::sync::Arc;
#[cfg(feature = "wav-file")]
use std::{path::PathBuf, thread};

use basedrop::{Collector, Handle, Owned};
use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;

use crate::{
    engine::{DriftEngine, DriftMessage, DriftSnapshot, SourceMode},
    error::Error,
    parameter::ParameterValueUpdate,
    sample::SampleBuffer,
};

// -------------------------------------------------------------------------------------------------

/// Controls a [`DriftEngine`] which runs in another, usually a real-time audio thread.
///
/// All messages get pushed into the engine's lock-free message queue and are applied at the
/// start of the engine's next block. Heap memory sent to the engine, such as samples and raw
/// parameter values, gets released by the controller's garbage collector and never in the
/// audio thread: call [`collect_garbage`](Self::collect_garbage) regularly, e.g. along with
/// polling [`snapshot`](Self::snapshot) in a UI loop.
pub struct DriftController {
    message_queue: Arc<ArrayQueue<DriftMessage>>,
    snapshot_queue: Arc<ArrayQueue<DriftSnapshot>>,
    collector: Collector,
    last_snapshot: Option<DriftSnapshot>,
}

impl DriftController {
    /// Create a new controller for the given engine. Call this before moving the engine into
    /// its audio thread.
    pub fn new(engine: &DriftEngine) -> Self {
        Self {
            message_queue: engine.message_queue(),
            snapshot_queue: engine.snapshot_queue(),
            collector: Collector::new(),
            last_snapshot: None,
        }
    }

    /// Handle of the controller's garbage collector, to create `Owned` values for custom
    /// [`DriftMessage`]s.
    pub fn collector_handle(&self) -> Handle {
        self.collector.handle()
    }

    /// Set a parameter's value via the given raw or normalized value update definition.
    ///
    /// Note: Value update (id, value) tuples can be created safely via `value_update` functions
    /// in [FloatParameter](crate::parameters::FloatParameter),
    /// [IntegerParameter](crate::parameters::IntegerParameter) and
    /// [EnumParameter](crate::parameters::EnumParameter).
    pub fn set_parameter(
        &self,
        (id, update): (FourCC, ParameterValueUpdate),
    ) -> Result<(), Error> {
        update.validate()?;
        let value = Owned::new(&self.collector.handle(), update);
        self.send(DriftMessage::SetParameter { id, value }, "set_parameter")
    }

    /// Set multiple parameter values at once. The updates get applied in the same block.
    pub fn set_parameters(&self, values: Vec<(FourCC, ParameterValueUpdate)>) -> Result<(), Error> {
        for (_, update) in &values {
            update.validate()?;
        }
        let values = Owned::new(&self.collector.handle(), values);
        self.send(DriftMessage::SetParameters { values }, "set_parameters")
    }

    /// Spike entropy to its maximum. The storm then decays with a 4 second half-life.
    pub fn trigger_storm(&self) -> Result<(), Error> {
        self.send(DriftMessage::TriggerStorm, "trigger_storm")
    }

    /// Swap in a new sample. The engine keeps playing the old one until the swap.
    pub fn set_sample(&self, sample: SampleBuffer) -> Result<(), Error> {
        let sample = Owned::new(&self.collector.handle(), sample);
        self.send(DriftMessage::SetSample { sample }, "set_sample")
    }

    /// Remove the current sample. The engine then renders silence in sample mode.
    pub fn clear_sample(&self) -> Result<(), Error> {
        self.send(DriftMessage::ClearSample, "clear_sample")
    }

    /// Switch between sample playback and live capture. Live capture needs an engine with a
    /// configured capture buffer.
    pub fn set_source_mode(&self, mode: SourceMode) -> Result<(), Error> {
        self.send(DriftMessage::SetSourceMode { mode }, "set_source_mode")
    }

    /// Restart the engine's drifters and grains. Uses the engine's configured seed when no
    /// seed is given.
    pub fn reset<S: Into<Option<u64>>>(&self, seed: S) -> Result<(), Error> {
        let seed = seed.into();
        self.send(DriftMessage::Reset { seed }, "reset")
    }

    /// Load a WAV file in a background thread and swap it in when done.
    ///
    /// The returned thread handle yields the load's result. Load errors are logged as well, so
    /// the handle may also be ignored.
    #[cfg(feature = "wav-file")]
    pub fn load_sample<P: Into<PathBuf>>(
        &self,
        path: P,
    ) -> Result<thread::JoinHandle<Result<(), Error>>, Error> {
        let path = path.into();
        let message_queue = Arc::clone(&self.message_queue);
        let collector_handle = self.collector.handle();
        let handle = thread::Builder::new()
            .name("drift_sample_loader".to_string())
            .spawn(move || {
                let sample = SampleBuffer::from_wav_file(&path).inspect_err(|err| {
                    log::error!("Failed to load sample '{}': {err}", path.display());
                })?;
                let sample = Owned::new(&collector_handle, sample);
                if message_queue
                    .push(DriftMessage::SetSample { sample })
                    .is_err()
                {
                    return Err(Self::message_queue_error("load_sample"));
                }
                Ok(())
            })?;
        Ok(handle)
    }

    /// Most recent engine snapshot. Returns the last known one when the engine published no
    /// new snapshots since the last call, and `None` when it never published one.
    pub fn snapshot(&mut self) -> Option<&DriftSnapshot> {
        while let Some(snapshot) = self.snapshot_queue.pop() {
            self.last_snapshot = Some(snapshot);
        }
        self.last_snapshot.as_ref()
    }

    /// Release memory the engine dropped since the last call.
    pub fn collect_garbage(&mut self) {
        self.collector.collect();
    }

    fn send(&self, message: DriftMessage, event_name: &str) -> Result<(), Error> {
        if self.message_queue.push(message).is_err() {
            Err(Self::message_queue_error(event_name))
        } else {
            Ok(())
        }
    }

    fn message_queue_error(event_name: &str) -> Error {
        log::warn!("Drift engine's message queue is full. Failed to send a {event_name} event.");
        log::warn!("Increase the engine's message queue size to prevent this from happening...");
        Error::SendError("Drift engine queue is full".to_string())
    }
}

impl Drop for DriftController {
    fn drop(&mut self) {
        self.collector.collect();
        log::debug!("Drift controller dropped");
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{controls::DriftControls, CvInputs, DriftConfig, OutputMode},
        parameter::Parameter,
        utils::scale::Scale,
    };

    fn process_block(engine: &mut DriftEngine) {
        let mut output = vec![0.0; 128];
        engine.process(&mut output, OutputMode::Replace, &CvInputs::default(), None);
    }

    #[test]
    fn parameter_updates() {
        let mut engine = DriftEngine::new(DriftConfig::default()).unwrap();
        let controller = DriftController::new(&engine);

        assert!(controller
            .set_parameter((
                DriftControls::DENSITY.id(),
                ParameterValueUpdate::Normalized(1.5)
            ))
            .is_err());
        assert!(controller
            .set_parameters(vec![
                DriftControls::ANCHOR.value_update(0.2),
                (DriftControls::DRIFT.id(), ParameterValueUpdate::Normalized(-0.1)),
            ])
            .is_err());

        controller
            .set_parameter(DriftControls::SCATTER.value_update(7))
            .unwrap();
        controller
            .set_parameters(vec![
                DriftControls::ANCHOR.value_update(0.2),
                DriftControls::scale_parameter().value_update(Scale::Yo),
            ])
            .unwrap();
        assert_eq!(engine.controls().scatter(), 0);
        process_block(&mut engine);
        assert_eq!(engine.controls().scatter(), 7);
        assert_eq!(engine.controls().anchor(), 0.2);
        assert_eq!(engine.controls().scale(), Scale::Yo);
    }

    #[test]
    fn full_queue() {
        let engine = DriftEngine::new(DriftConfig::default().message_queue_size(2)).unwrap();
        let controller = DriftController::new(&engine);
        assert!(controller.trigger_storm().is_ok());
        assert!(controller.reset(None).is_ok());
        assert!(matches!(
            controller.trigger_storm(),
            Err(Error::SendError(_))
        ));
    }

    #[test]
    fn sample_swaps_and_snapshots() {
        let mut engine = DriftEngine::new(DriftConfig::default()).unwrap();
        let mut controller = DriftController::new(&engine);
        assert!(controller.snapshot().is_none());

        controller.set_sample(SampleBuffer::test_tone(48000)).unwrap();
        process_block(&mut engine);
        let snapshot = controller.snapshot().cloned().unwrap();
        assert_eq!(snapshot.source_frames, 4 * 48000);
        assert_eq!(snapshot.source_sample_rate, 48000);
        assert_eq!(snapshot.sample_time, 64);

        // the last snapshot sticks until the engine publishes a new one
        assert_eq!(controller.snapshot(), Some(&snapshot));

        controller.set_sample(SampleBuffer::test_tone(44100)).unwrap();
        process_block(&mut engine);
        assert_eq!(controller.snapshot().unwrap().source_sample_rate, 44100);

        controller.clear_sample().unwrap();
        controller.trigger_storm().unwrap();
        process_block(&mut engine);
        let snapshot = controller.snapshot().unwrap();
        assert_eq!(snapshot.source_frames, 0);
        assert!(snapshot.storm > 0.0);
        assert!(engine.sample().is_none());

        drop(engine);
        controller.collect_garbage();
    }

    #[cfg(feature = "wav-file")]
    #[test]
    fn background_loading() {
        let mut engine = DriftEngine::new(DriftConfig::default()).unwrap();
        let controller = DriftController::new(&engine);

        let result = controller
            .load_sample("this/file/does/not/exist.wav")
            .unwrap()
            .join()
            .unwrap();
        assert!(result.is_err());

        let path = std::env::temp_dir().join("drifters_controller_test.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..22050 {
            let value = ((i as f32 * 0.05).sin() * 16000.0) as i16;
            writer.write_sample(value).unwrap();
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        controller
            .load_sample(&path)
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        process_block(&mut engine);
        let sample = engine.sample().unwrap();
        assert_eq!(sample.frame_count(), 22050);
        assert_eq!(sample.sample_rate(), 22050);
        let _ = std::fs::remove_file(path);
    }
}
