//! Grain trigger scheduling: Poisson, clock locked and blended.

use super::drifter::{Drifter, DRIFTER_COUNT};
use crate::utils::random::RandomSource;

// -------------------------------------------------------------------------------------------------

/// Voltage a clock or gate input needs to exceed to count as high.
pub const GATE_THRESHOLD: f32 = 1.0;

// -------------------------------------------------------------------------------------------------

/// Detects rising edges of an external clock signal and measures the clock's period.
#[derive(Debug, Clone, Default)]
pub struct ClockDetector {
    previous: f32,
    elapsed: f32,
    period: Option<f32>,
    received: bool,
}

impl ClockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next clock input value. Returns true on rising edges.
    #[inline]
    pub fn process(&mut self, value: f32, dt: f32) -> bool {
        let edge = value > GATE_THRESHOLD && self.previous <= GATE_THRESHOLD;
        if edge {
            if self.received {
                self.period = Some(self.elapsed);
            }
            self.elapsed = 0.0;
            self.received = true;
        }
        self.previous = value;
        if self.received {
            self.elapsed += dt;
        }
        edge
    }

    /// True when at least one clock edge arrived since the last reset.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.received
    }

    /// Time between the two most recent rising edges in seconds.
    #[inline]
    pub fn period(&self) -> Option<f32> {
        self.period
    }

    /// Clock rate in Hz, derived from the measured period.
    #[inline]
    pub fn rate(&self) -> Option<f32> {
        self.period.filter(|p| *p > 0.0).map(|p| 1.0 / p)
    }

    /// Forget all clock state, e.g. when the clock input got disconnected.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// -------------------------------------------------------------------------------------------------

/// How grains get triggered, depending on the clock's presence and the deviation amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// No clock, or full deviation: pure Poisson process.
    FreeRunning,
    /// Clock present and zero deviation: trigger on clock edges only.
    ClockLocked,
    /// Clock edges always trigger, elapsed Poisson intervals trigger with probability
    /// `deviation`.
    Blended,
}

impl TriggerMode {
    pub fn new(clock_present: bool, deviation: f32) -> Self {
        if !clock_present || deviation >= 1.0 {
            TriggerMode::FreeRunning
        } else if deviation <= 0.0 {
            TriggerMode::ClockLocked
        } else {
            TriggerMode::Blended
        }
    }
}

/// Per tick inputs of the [`GrainScheduler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerInputs {
    /// Smoothed Poisson rate in grains per second.
    pub rate: f32,
    /// Current entropy level in range \[0, 1\].
    pub entropy: f32,
    /// Clock/Poisson blend in range \[0, 1\].
    pub deviation: f32,
    /// Trigger mode for this tick.
    pub mode: TriggerMode,
    /// True when a clock edge was detected in this tick.
    pub clock_edge: bool,
    /// Measured clock rate, if known.
    pub clock_rate: Option<f32>,
}

// -------------------------------------------------------------------------------------------------

/// Decides per drifter and tick whether to spawn a grain.
///
/// Poisson intervals are drawn from an exponential distribution. The rate gets jittered by
/// entropy once per interval, never per tick, so the distribution stays stable.
#[derive(Debug, Clone, Default)]
pub struct GrainScheduler {
    trigger_counts: [u64; DRIFTER_COUNT],
}

impl GrainScheduler {
    /// Maximum rate jitter at full entropy: ±50 %.
    const RATE_JITTER: f32 = 0.5;
    /// Lower rate limit, keeping drawn intervals finite.
    const MIN_RATE: f32 = 0.001;

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triggers per drifter since the last reset.
    pub fn trigger_counts(&self) -> &[u64; DRIFTER_COUNT] {
        &self.trigger_counts
    }

    pub fn reset(&mut self) {
        self.trigger_counts = [0; DRIFTER_COUNT];
    }

    /// Advance the drifter's scheduling state by `dt` seconds and decide whether it should
    /// spawn a grain now. On trigger, the next Poisson interval gets drawn.
    pub fn should_trigger(
        &mut self,
        drifter_index: usize,
        drifter: &mut Drifter,
        inputs: &SchedulerInputs,
        dt: f32,
        random: &mut RandomSource,
    ) -> bool {
        drifter.time_since_grain += dt;
        let interval_elapsed = drifter.time_since_grain >= drifter.next_grain_interval;

        let trigger = match inputs.mode {
            TriggerMode::FreeRunning => interval_elapsed,
            TriggerMode::ClockLocked => inputs.clock_edge,
            TriggerMode::Blended => {
                if inputs.clock_edge {
                    true
                } else if interval_elapsed {
                    if random.chance(inputs.deviation) {
                        true
                    } else {
                        // skip this interval and wait for the next one
                        self.restart_interval(drifter, inputs, random);
                        false
                    }
                } else {
                    false
                }
            }
        };

        if trigger {
            self.restart_interval(drifter, inputs, random);
            self.trigger_counts[drifter_index] += 1;
        }
        trigger
    }

    /// Effective Poisson rate for the next interval, including entropy jitter and, in blended
    /// mode, the clock rate.
    fn next_rate(&self, inputs: &SchedulerInputs, random: &mut RandomSource) -> f32 {
        let mut rate = inputs.rate;
        if inputs.mode == TriggerMode::Blended {
            if let Some(clock_rate) = inputs.clock_rate {
                rate = rate * inputs.deviation + clock_rate * (1.0 - inputs.deviation);
            }
        }
        rate *= 1.0 + random.bipolar() * inputs.entropy * Self::RATE_JITTER;
        rate.max(Self::MIN_RATE)
    }

    fn restart_interval(
        &self,
        drifter: &mut Drifter,
        inputs: &SchedulerInputs,
        random: &mut RandomSource,
    ) {
        let rate = self.next_rate(inputs, random);
        drifter.time_since_grain = 0.0;
        drifter.next_grain_interval = random.exponential(rate);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::drifter::DrifterField;

    const SAMPLE_RATE: usize = 48000;
    const DT: f32 = 1.0 / SAMPLE_RATE as f32;

    fn inputs(mode: TriggerMode, deviation: f32) -> SchedulerInputs {
        SchedulerInputs {
            rate: 8.0,
            entropy: 0.25,
            deviation,
            mode,
            clock_edge: false,
            clock_rate: None,
        }
    }

    #[test]
    fn clock_edges_and_period() {
        let mut clock = ClockDetector::new();
        assert!(!clock.is_present());
        let mut edges = 0;
        for i in 0..SAMPLE_RATE {
            // 4 Hz clock: 5 ms pulses every 250 ms
            let value = if i % 12000 < 240 { 5.0 } else { 0.0 };
            if clock.process(value, DT) {
                edges += 1;
            }
        }
        assert_eq!(edges, 4);
        assert!(clock.is_present());
        assert!((clock.period().unwrap() - 0.25).abs() < 1e-3);
        assert!((clock.rate().unwrap() - 4.0).abs() < 0.02);

        // gate held high is a single edge
        assert!(clock.process(5.0, DT));
        assert!(!clock.process(5.0, DT));
        clock.reset();
        assert!(!clock.is_present());
        assert_eq!(clock.period(), None);
    }

    #[test]
    fn trigger_modes() {
        assert_eq!(TriggerMode::new(false, 0.0), TriggerMode::FreeRunning);
        assert_eq!(TriggerMode::new(true, 1.0), TriggerMode::FreeRunning);
        assert_eq!(TriggerMode::new(true, 0.0), TriggerMode::ClockLocked);
        assert_eq!(TriggerMode::new(true, 0.5), TriggerMode::Blended);
    }

    #[test]
    fn poisson_rate() {
        let mut random = RandomSource::new(11);
        let mut field = DrifterField::new(&mut random);
        let mut scheduler = GrainScheduler::new();
        let inputs = inputs(TriggerMode::FreeRunning, 1.0);
        let seconds = 60;
        for _ in 0..(SAMPLE_RATE * seconds) {
            for (index, drifter) in field.drifters_mut().iter_mut().enumerate() {
                scheduler.should_trigger(index, drifter, &inputs, DT, &mut random);
            }
        }
        for count in scheduler.trigger_counts() {
            let rate = *count as f32 / seconds as f32;
            assert!((rate - 8.0).abs() < 1.5, "rate was {rate}");
        }
    }

    #[test]
    fn clock_locked_only_triggers_on_edges() {
        let mut random = RandomSource::new(5);
        let mut field = DrifterField::new(&mut random);
        let mut scheduler = GrainScheduler::new();
        let mut clock = ClockDetector::new();
        let mut edges = 0;
        // 2 Hz clock over 10 seconds, very high Poisson rate which must be ignored
        for i in 0..(SAMPLE_RATE * 10) {
            let value = if i % 24000 < 100 { 5.0 } else { 0.0 };
            let clock_edge = clock.process(value, DT);
            if clock_edge {
                edges += 1;
            }
            let inputs = SchedulerInputs {
                rate: 100.0,
                clock_edge,
                clock_rate: clock.rate(),
                ..inputs(TriggerMode::new(clock.is_present(), 0.0), 0.0)
            };
            for (index, drifter) in field.drifters_mut().iter_mut().enumerate() {
                let triggered = scheduler.should_trigger(index, drifter, &inputs, DT, &mut random);
                assert_eq!(triggered, clock_edge);
            }
        }
        assert_eq!(edges, 20);
        assert_eq!(scheduler.trigger_counts(), &[20; DRIFTER_COUNT]);
    }

    #[test]
    fn blended_mode_adds_poisson_triggers() {
        let run = |deviation: f32| {
            let mut random = RandomSource::new(9);
            let mut field = DrifterField::new(&mut random);
            let mut scheduler = GrainScheduler::new();
            for i in 0..(SAMPLE_RATE * 20) {
                let clock_edge = i % SAMPLE_RATE == 0;
                let inputs = SchedulerInputs {
                    clock_edge,
                    clock_rate: Some(1.0),
                    ..inputs(TriggerMode::new(true, deviation), deviation)
                };
                for (index, drifter) in field.drifters_mut().iter_mut().enumerate() {
                    scheduler.should_trigger(index, drifter, &inputs, DT, &mut random);
                }
            }
            scheduler.trigger_counts().iter().sum::<u64>()
        };
        let locked = run(0.0);
        let blended = run(0.5);
        let mostly_free = run(0.95);
        assert_eq!(locked, 20 * DRIFTER_COUNT as u64);
        // clock edges are a guaranteed floor
        assert!(blended > locked);
        assert!(mostly_free > blended);
    }
}
