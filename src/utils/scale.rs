//! Musical scale tables and pitch quantization.

use strum::{Display, EnumCount, EnumIter, EnumString, FromRepr, VariantNames};

// -------------------------------------------------------------------------------------------------

/// Musical scales for pitch quantization. [`Scale::Chromatic`] bypasses quantization.
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
    FromRepr,
)]
#[repr(u8)]
pub enum Scale {
    #[default]
    Chromatic,
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
    #[strum(serialize = "Major b6")]
    MajorFlat6,
    #[strum(serialize = "Minor b6")]
    MinorFlat6,
    #[strum(serialize = "Lydian #4")]
    LydianSharp4,
    Hungarian,
    Persian,
    Byzantine,
    Enigmatic,
    Neapolitan,
    Hirajoshi,
    Iwato,
    Pelog,
    Ryo,
    Ritsu,
    Yo,
}

impl Scale {
    /// Scale by selector index. Returns `None` for out of range indices.
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().and_then(Self::from_repr)
    }

    /// Semitone offsets of the scale's notes within one octave, ascending, starting at 0.
    pub const fn notes(&self) -> &'static [i32] {
        match self {
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Ionian => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Aeolian => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::MajorFlat6 => &[0, 2, 4, 5, 7, 8, 11],
            Scale::MinorFlat6 => &[0, 2, 3, 5, 7, 8, 10],
            Scale::LydianSharp4 => &[0, 2, 4, 6, 7, 9, 10],
            Scale::Hungarian => &[0, 2, 3, 6, 7, 8, 11],
            Scale::Persian => &[0, 1, 4, 5, 6, 8, 11],
            Scale::Byzantine => &[0, 1, 4, 5, 7, 8, 11],
            Scale::Enigmatic => &[0, 1, 4, 6, 8, 10, 11],
            Scale::Neapolitan => &[0, 1, 3, 5, 7, 8, 11],
            Scale::Hirajoshi => &[0, 2, 3, 7, 8],
            Scale::Iwato => &[0, 1, 5, 6, 10],
            Scale::Pelog => &[0, 1, 3, 7, 10],
            Scale::Ryo => &[0, 2, 4, 7, 9],
            Scale::Ritsu => &[0, 2, 5, 7, 9],
            Scale::Yo => &[0, 2, 5, 7, 10],
        }
    }

    /// Number of notes per octave.
    pub const fn len(&self) -> usize {
        self.notes().len()
    }

    #[inline]
    pub const fn is_chromatic(&self) -> bool {
        matches!(self, Scale::Chromatic)
    }

    /// Convert a scale degree offset to semitones, wrapping whole octaves.
    ///
    /// Degree 0 is the root. Negative degrees walk down: in Ionian, degree -1 is the leading
    /// tone one semitone below the root. The chromatic scale treats degrees as semitones.
    pub fn degree_to_semitones(&self, degree: i32) -> i32 {
        if self.is_chromatic() {
            return degree;
        }
        let notes = self.notes();
        let size = notes.len() as i32;
        let octave = degree.div_euclid(size);
        let index = degree.rem_euclid(size) as usize;
        octave * 12 + notes[index]
    }

    /// Snap an arbitrary semitone value to the nearest note of the scale.
    ///
    /// Octaves fold, so the search also considers the next octave's root. Values exactly
    /// between two scale notes resolve upwards. The chromatic scale returns the value as is.
    pub fn quantize(&self, semitones: f32) -> f32 {
        if self.is_chromatic() || !semitones.is_finite() {
            return semitones;
        }
        let octave = (semitones / 12.0).floor();
        let within_octave = semitones - octave * 12.0;

        let mut best_note = 0.0;
        let mut best_distance = f32::MAX;
        let candidates = self.notes().iter().map(|n| *n as f32).chain([12.0]);
        for note in candidates {
            let distance = (within_octave - note).abs();
            // candidates ascend: on ties, the later (higher) note wins
            if distance <= best_distance {
                best_distance = distance;
                best_note = note;
            }
        }
        octave * 12.0 + best_note
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn scale_table() {
        assert_eq!(Scale::COUNT, 22);
        assert_eq!(Scale::from_index(0), Some(Scale::Chromatic));
        assert_eq!(Scale::from_index(16), Some(Scale::Hirajoshi));
        assert_eq!(Scale::from_index(22), None);
        assert_eq!(Scale::from_str("Major b6"), Ok(Scale::MajorFlat6));
        assert_eq!(Scale::LydianSharp4.to_string(), "Lydian #4");
        assert_eq!(Scale::VARIANTS[21], "Yo");
        for scale in <Scale as strum::IntoEnumIterator>::iter() {
            let notes = scale.notes();
            assert_eq!(notes[0], 0);
            assert!(notes.windows(2).all(|w| w[0] < w[1] && w[1] < 12));
            assert!(matches!(scale.len(), 5 | 7 | 12));
        }
    }

    #[test]
    fn degrees_to_semitones() {
        let ionian = Scale::Ionian;
        assert_eq!(ionian.degree_to_semitones(0), 0);
        assert_eq!(ionian.degree_to_semitones(2), 4);
        assert_eq!(ionian.degree_to_semitones(7), 12);
        assert_eq!(ionian.degree_to_semitones(9), 16);
        assert_eq!(ionian.degree_to_semitones(-1), -1);
        assert_eq!(ionian.degree_to_semitones(-7), -12);
        assert_eq!(ionian.degree_to_semitones(-8), -13);
        assert_eq!(Scale::Hirajoshi.degree_to_semitones(5), 12);
        assert_eq!(Scale::Hirajoshi.degree_to_semitones(-2), -5);
        assert_eq!(Scale::Chromatic.degree_to_semitones(-5), -5);
    }

    #[test]
    fn quantization() {
        let ionian = Scale::Ionian;
        assert_eq!(ionian.quantize(2.5), 2.0);
        assert_eq!(ionian.quantize(3.0), 4.0);
        assert_eq!(ionian.quantize(4.2), 4.0);
        assert_eq!(ionian.quantize(11.6), 12.0);
        assert_eq!(ionian.quantize(-0.4), 0.0);
        assert_eq!(ionian.quantize(-1.2), -1.0);
        assert_eq!(ionian.quantize(12.8), 12.0);
        assert_eq!(ionian.quantize(13.0), 14.0);
        assert_eq!(ionian.quantize(-6.0), -5.0);
        assert_eq!(Scale::Hirajoshi.quantize(5.0), 7.0);
        assert_eq!(Scale::Hirajoshi.quantize(9.5), 8.0);
        assert_eq!(Scale::Hirajoshi.quantize(10.0), 12.0);
        // chromatic bypass keeps fractional values
        assert_eq!(Scale::Chromatic.quantize(2.37), 2.37);
    }
}
