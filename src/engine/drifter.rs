//! Drifter agents and their movement model.

use crate::utils::random::RandomSource;

// -------------------------------------------------------------------------------------------------

/// Number of drifters in a [`DrifterField`].
pub const DRIFTER_COUNT: usize = 4;

/// Distance a drifter keeps from the sample's start and end.
pub const POSITION_MARGIN: f32 = 0.001;

// -------------------------------------------------------------------------------------------------

/// Inputs of one [`DrifterField::update`] tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftForces {
    /// Center of the wander window in range \[0, 1\].
    pub anchor: f32,
    /// Half-width of the wander window.
    pub wander: f32,
    /// Attraction towards (positive) or repulsion from (negative) the anchor.
    pub gravity: f32,
    /// Speed of the directional base drift.
    pub drift: f32,
    /// Strength of the random walk.
    pub entropy: f32,
}

impl DriftForces {
    /// Lower and upper bound of the wander window, limited to the sample.
    #[inline]
    pub fn bounds(&self) -> (f32, f32) {
        let min = (self.anchor - self.wander).max(POSITION_MARGIN);
        let max = (self.anchor + self.wander).min(1.0 - POSITION_MARGIN);
        if min <= max {
            (min, max)
        } else {
            // window lies completely outside of the sample: pin to the nearest edge
            let edge = self.anchor.clamp(POSITION_MARGIN, 1.0 - POSITION_MARGIN);
            (edge, edge)
        }
    }
}

impl Default for DriftForces {
    fn default() -> Self {
        Self {
            anchor: 0.5,
            wander: 0.3,
            gravity: 0.0,
            drift: 0.3,
            entropy: 0.25,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// An autonomous agent wandering across the sample, spawning grains from its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drifter {
    /// Normalized read position in the sample.
    pub(crate) position: f32,
    /// Signed rate of change of the position.
    pub(crate) velocity: f32,
    /// Fixed speed multiplier in range \[0.5, 1\], set once at creation.
    pub(crate) variation: f32,
    /// Sign of the base drift. Flips when bouncing off the window's bounds.
    pub(crate) direction: f32,
    /// Seconds since this drifter spawned its last grain.
    pub(crate) time_since_grain: f32,
    /// Seconds until the next Poisson triggered grain.
    pub(crate) next_grain_interval: f32,
    /// Stagnation level in range \[0, 1\].
    pub(crate) boredom: f32,
    /// Position where boredom was reset the last time.
    pub(crate) last_significant_position: f32,
}

impl Drifter {
    /// Movement that counts as leaving the current region, resetting boredom.
    pub const BOREDOM_MOVEMENT_THRESHOLD: f32 = 0.03;
    /// Boredom gain per second while staying in a region: full boredom after 20 s.
    pub const BOREDOM_BUILD_RATE: f32 = 0.05;

    #[inline]
    pub fn position(&self) -> f32 {
        self.position
    }

    #[inline]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    #[inline]
    pub fn variation(&self) -> f32 {
        self.variation
    }

    #[inline]
    pub fn direction(&self) -> f32 {
        self.direction
    }

    #[inline]
    pub fn boredom(&self) -> f32 {
        self.boredom
    }

    /// Grow or reset boredom, depending on how far the drifter moved from its home.
    fn update_boredom(&mut self, dt: f32) {
        let movement = (self.position - self.last_significant_position).abs();
        if movement > Self::BOREDOM_MOVEMENT_THRESHOLD {
            self.boredom = 0.0;
            self.last_significant_position = self.position;
        } else {
            self.boredom = (self.boredom + Self::BOREDOM_BUILD_RATE * dt).min(1.0);
        }
    }

    /// Soft elastic bounce at the window's bounds, then a hard clamp into the window.
    fn bounce(&mut self, min: f32, max: f32) {
        if self.position < min {
            self.position = min + (min - self.position) * 0.5;
            self.velocity = self.velocity.abs() * 0.5;
            self.direction = 1.0;
        }
        if self.position > max {
            self.position = max - (self.position - max) * 0.5;
            self.velocity = -self.velocity.abs() * 0.5;
            self.direction = -1.0;
        }
        self.position = self.position.clamp(min, max);
    }
}

// -------------------------------------------------------------------------------------------------

/// The population of [`DRIFTER_COUNT`] drifters and their movement physics.
///
/// Each tick, every drifter feels the anchor's gravity, repulsion from close neighbours (which
/// fades and finally inverts while the drifter is bored), an entropy driven random walk and a
/// slow directional drift. Positions then bounce back into the anchor's wander window.
#[derive(Debug, Clone)]
pub struct DrifterField {
    drifters: [Drifter; DRIFTER_COUNT],
}

impl DrifterField {
    /// Gravity acceleration per unit of distance to the anchor.
    const GRAVITY_STRENGTH: f32 = 100.0;
    /// Drifters closer than this repel each other.
    const REPULSION_DISTANCE: f32 = 0.05;
    /// Drifters closer than this are considered to overlap and don't interact.
    const REPULSION_MIN_DISTANCE: f32 = 0.001;
    const REPULSION_STRENGTH: f32 = 0.00001;
    /// Repulsion scaling at full boredom is `1 - BOREDOM_REPULSION_INVERSION`: a slight
    /// attraction, so bored drifters may pass through each other.
    pub const BOREDOM_REPULSION_INVERSION: f32 = 1.05;
    const RANDOM_WALK_STRENGTH: f32 = 0.01;
    const VELOCITY_DAMPING: f32 = 0.995;
    const BASE_DRIFT_SPEED: f32 = 0.05;

    /// Create a new field with drifters spread across the sample. Draws each drifter's first
    /// grain interval and speed variation from the given random source.
    pub fn new(random: &mut RandomSource) -> Self {
        let drifters = std::array::from_fn(|index| {
            let position = 0.25 + index as f32 * 0.15;
            let next_grain_interval = random.uniform() * 0.5;
            let variation = 0.5 + random.uniform() * 0.5;
            let direction = if index % 2 == 0 { 1.0 } else { -1.0 };
            Drifter {
                position,
                velocity: 0.0,
                variation,
                direction,
                time_since_grain: 0.0,
                next_grain_interval,
                boredom: 0.0,
                last_significant_position: position,
            }
        });
        Self { drifters }
    }

    #[inline]
    pub fn drifters(&self) -> &[Drifter; DRIFTER_COUNT] {
        &self.drifters
    }

    #[inline]
    pub(crate) fn drifters_mut(&mut self) -> &mut [Drifter; DRIFTER_COUNT] {
        &mut self.drifters
    }

    /// Average position of all drifters.
    pub fn average_position(&self) -> f32 {
        self.drifters.iter().map(|d| d.position).sum::<f32>() / DRIFTER_COUNT as f32
    }

    /// Advance all drifters by `dt` seconds.
    pub fn update(&mut self, forces: &DriftForces, dt: f32, random: &mut RandomSource) {
        let (min, max) = forces.bounds();
        for index in 0..DRIFTER_COUNT {
            let repulsion = self.repulsion(index);
            let random_walk = random.bipolar() * forces.entropy * Self::RANDOM_WALK_STRENGTH;

            let drifter = &mut self.drifters[index];
            let gravity =
                -forces.gravity * (drifter.position - forces.anchor) * Self::GRAVITY_STRENGTH;

            drifter.velocity += gravity * dt;
            drifter.velocity += repulsion;
            drifter.velocity += random_walk;
            drifter.velocity *= Self::VELOCITY_DAMPING;

            let base_drift = forces.drift
                * drifter.variation
                * drifter.direction
                * dt
                * Self::BASE_DRIFT_SPEED;
            drifter.position += drifter.velocity * dt + base_drift;

            drifter.bounce(min, max);
            drifter.update_boredom(dt);
        }
    }

    /// Sum of the repulsion impulses the neighbours exert on the drifter at `index`,
    /// scaled by the drifter's boredom.
    fn repulsion(&self, index: usize) -> f32 {
        let drifter = &self.drifters[index];
        let mut repulsion = 0.0;
        for (other_index, other) in self.drifters.iter().enumerate() {
            if other_index == index {
                continue;
            }
            let diff = drifter.position - other.position;
            let distance = diff.abs();
            if distance < Self::REPULSION_DISTANCE && distance > Self::REPULSION_MIN_DISTANCE {
                repulsion += diff.signum() * Self::REPULSION_STRENGTH / distance;
            }
        }
        repulsion * Self::boredom_repulsion_scale(drifter.boredom)
    }

    /// Repulsion scaling for the given boredom: 1 when fresh, slightly negative when fully bored.
    #[inline]
    pub fn boredom_repulsion_scale(boredom: f32) -> f32 {
        1.0 - boredom * Self::BOREDOM_REPULSION_INVERSION
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    fn field() -> (DrifterField, RandomSource) {
        let mut random = RandomSource::new(0x12345678);
        let field = DrifterField::new(&mut random);
        (field, random)
    }

    #[test]
    fn initial_state() {
        let (field, _) = field();
        for (index, drifter) in field.drifters().iter().enumerate() {
            assert!((drifter.position() - (0.25 + index as f32 * 0.15)).abs() < 1e-6);
            assert!((0.5..=1.0).contains(&drifter.variation()));
            assert!((0.0..0.5).contains(&drifter.next_grain_interval));
            assert_eq!(drifter.direction(), if index % 2 == 0 { 1.0 } else { -1.0 });
            assert_eq!(drifter.boredom(), 0.0);
        }
    }

    #[test]
    fn boundary_containment() {
        let (mut field, mut random) = field();
        let scenarios = [
            DriftForces::default(),
            DriftForces {
                anchor: 0.1,
                wander: 0.05,
                gravity: -1.0,
                drift: 1.0,
                entropy: 1.0,
            },
            DriftForces {
                anchor: 0.95,
                wander: 0.4,
                gravity: 1.0,
                drift: 1.0,
                entropy: 1.0,
            },
            DriftForces {
                anchor: 0.5,
                wander: 0.0,
                gravity: 0.0,
                drift: 1.0,
                entropy: 0.5,
            },
        ];
        for forces in scenarios {
            let (min, max) = forces.bounds();
            for _ in 0..(SAMPLE_RATE as usize * 2) {
                field.update(&forces, 1.0 / SAMPLE_RATE, &mut random);
                for drifter in field.drifters() {
                    assert!(
                        drifter.position() >= min - 1e-6 && drifter.position() <= max + 1e-6,
                        "{} not in [{min}, {max}]",
                        drifter.position()
                    );
                }
            }
        }
    }

    #[test]
    fn bounce_reverses_direction() {
        let mut drifter = Drifter {
            position: 0.62,
            velocity: 0.3,
            variation: 1.0,
            direction: 1.0,
            time_since_grain: 0.0,
            next_grain_interval: 0.0,
            boredom: 0.0,
            last_significant_position: 0.62,
        };
        drifter.bounce(0.2, 0.6);
        assert!((drifter.position() - 0.59).abs() < 1e-6);
        assert!((drifter.velocity() + 0.15).abs() < 1e-6);
        assert_eq!(drifter.direction(), -1.0);

        drifter.position = 0.1;
        drifter.bounce(0.2, 0.6);
        assert!((drifter.position() - 0.25).abs() < 1e-6);
        assert!(drifter.velocity() > 0.0);
        assert_eq!(drifter.direction(), 1.0);
    }

    #[test]
    fn boredom_builds_and_resets() {
        let (mut field, mut random) = field();
        // a window narrower than the movement threshold: drifters can't escape boredom
        let forces = DriftForces {
            anchor: 0.5,
            wander: 0.01,
            gravity: 0.0,
            drift: 0.3,
            entropy: 0.0,
        };
        let dt = 1.0 / 1000.0;
        // first ticks pull drifters into the window, which resets their boredom once
        for _ in 0..100 {
            field.update(&forces, dt, &mut random);
        }
        for _ in 0..21_000 {
            field.update(&forces, dt, &mut random);
        }
        for drifter in field.drifters() {
            assert_eq!(drifter.boredom(), 1.0);
        }

        // move the window away: movement above the threshold resets boredom on the next tick
        let moved = DriftForces {
            anchor: 0.2,
            ..forces
        };
        field.update(&moved, dt, &mut random);
        for drifter in field.drifters() {
            assert_eq!(drifter.boredom(), 0.0);
        }
    }

    #[test]
    fn boredom_inverts_repulsion() {
        assert_eq!(DrifterField::boredom_repulsion_scale(0.0), 1.0);
        assert!(DrifterField::boredom_repulsion_scale(0.5) > 0.0);
        // crossover just below full boredom
        let crossover = 1.0 / DrifterField::BOREDOM_REPULSION_INVERSION;
        assert!(DrifterField::boredom_repulsion_scale(crossover).abs() < 1e-6);
        assert!((DrifterField::boredom_repulsion_scale(1.0) + 0.05).abs() < 1e-6);

        let random = &mut RandomSource::new(1);
        let mut field = DrifterField::new(random);
        let drifters = field.drifters_mut();
        drifters[0].position = 0.50;
        drifters[1].position = 0.52;
        drifters[2].position = 0.10;
        drifters[3].position = 0.90;
        // fresh drifters push each other apart
        assert!(field.repulsion(0) < 0.0);
        assert!(field.repulsion(1) > 0.0);
        // fully bored drifters attract each other slightly
        field.drifters_mut()[0].boredom = 1.0;
        let attraction = field.repulsion(0);
        assert!(attraction > 0.0);
        assert!((attraction - 0.00001 / 0.02 * 0.05).abs() < 1e-6);
        // far away drifters don't interact
        assert_eq!(field.repulsion(2), 0.0);
    }

    #[test]
    fn gravity_pulls_towards_anchor() {
        let (mut field, mut random) = field();
        let forces = DriftForces {
            anchor: 0.5,
            wander: 0.5,
            gravity: 1.0,
            drift: 0.0,
            entropy: 0.0,
        };
        let spread_before = field
            .drifters()
            .iter()
            .map(|d| (d.position() - 0.5).abs())
            .sum::<f32>();
        for _ in 0..(SAMPLE_RATE as usize / 10) {
            field.update(&forces, 1.0 / SAMPLE_RATE, &mut random);
        }
        let spread_after = field
            .drifters()
            .iter()
            .map(|d| (d.position() - 0.5).abs())
            .sum::<f32>();
        assert!(spread_after < spread_before);
    }

    #[test]
    fn deterministic_trajectories() {
        let run = || {
            let (mut field, mut random) = field();
            let forces = DriftForces::default();
            let mut trajectory = Vec::new();
            for _ in 0..5000 {
                field.update(&forces, 1.0 / SAMPLE_RATE, &mut random);
                trajectory.extend(field.drifters().iter().map(|d| d.position().to_bits()));
            }
            trajectory
        };
        assert_eq!(run(), run());
    }
}
