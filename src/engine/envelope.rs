use std::f32::consts::PI;

use strum::{Display, EnumCount, EnumIter, EnumString, VariantNames};

// -------------------------------------------------------------------------------------------------

/// Grain envelope shapes, ordered from soft to hard.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    EnumCount,
    VariantNames,
)]
#[repr(u8)]
pub enum GrainShape {
    /// Soft, diffuse `sin²` bell.
    Mist,
    /// Tukey window with α = 0.5: cosine tapers around a flat top.
    #[default]
    Cloud,
    /// Triangle: linear rise to the middle, linear fall.
    Rain,
    /// Sharp attack over the first 10 %, exponential decay after.
    Hail,
    /// Near-square with 2 % linear fades at both edges.
    Ice,
}

impl GrainShape {
    /// Length of the click-suppressing fade, applied on top of every shape.
    const EDGE_FADE: f32 = 0.03;

    /// Envelope amplitude at the given phase. Phases outside \[0, 1\] are silent.
    #[inline]
    pub fn amplitude(&self, phase: f32) -> f32 {
        if !(0.0..=1.0).contains(&phase) {
            return 0.0;
        }
        let fade = if phase < Self::EDGE_FADE {
            phase / Self::EDGE_FADE
        } else if phase > 1.0 - Self::EDGE_FADE {
            (1.0 - phase) / Self::EDGE_FADE
        } else {
            1.0
        };
        self.shape(phase) * fade
    }

    #[inline]
    fn shape(&self, phase: f32) -> f32 {
        match self {
            GrainShape::Mist => {
                let s = (PI * phase).sin();
                s * s
            }
            GrainShape::Cloud => {
                const ALPHA: f32 = 0.5;
                if phase < ALPHA / 2.0 {
                    0.5 * (1.0 - (2.0 * PI * phase / ALPHA).cos())
                } else if phase > 1.0 - ALPHA / 2.0 {
                    0.5 * (1.0 - (2.0 * PI * (1.0 - phase) / ALPHA).cos())
                } else {
                    1.0
                }
            }
            GrainShape::Rain => {
                if phase < 0.5 {
                    phase * 2.0
                } else {
                    (1.0 - phase) * 2.0
                }
            }
            GrainShape::Hail => {
                if phase < 0.1 {
                    phase * 10.0
                } else {
                    (-4.0 * (phase - 0.1)).exp()
                }
            }
            GrainShape::Ice => {
                if phase < 0.02 {
                    phase * 50.0
                } else if phase > 0.98 {
                    (1.0 - phase) * 50.0
                } else {
                    1.0
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
