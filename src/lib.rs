#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod controller;
mod engine;
mod error;
mod parameter;
mod sample;

// public, flat re-exports
pub use error::Error;

pub use controller::DriftController;

pub use engine::{
    grain_pitch, scatter_degrees, CvInputs, CvOutputs, DriftConfig, DriftEngine, DriftMessage,
    DriftSnapshot, OutputMode, SourceMode,
};

pub use sample::{CaptureBuffer, SampleBuffer, SourceRegion};

// public mods
pub mod utils;
pub mod waveform;

pub mod drift {
    //! Building blocks of the [`DriftEngine`](crate::DriftEngine): drifters, grain scheduling,
    //! grain voices and the engine's controls.

    pub use super::engine::{
        controls::DriftControls,
        drifter::{DriftForces, Drifter, DrifterField, DRIFTER_COUNT},
        envelope::GrainShape,
        grain::{Grain, GrainMixContext, GrainPool, GrainSpawn, GRAIN_POOL_SIZE},
        scheduler::{ClockDetector, GrainScheduler, SchedulerInputs, TriggerMode, GATE_THRESHOLD},
    };
}

pub mod parameters {
    //! Parameter descriptors and value holders of the engine's controls.

    pub use super::parameter::{
        EnumParameter, EnumParameterValue, FloatParameter, FloatParameterValue, IntegerParameter,
        IntegerParameterValue, Parameter, ParameterType, ParameterValueUpdate,
    };
}

// -------------------------------------------------------------------------------------------------

#[cfg(all(test, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;
