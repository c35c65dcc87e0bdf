// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use super::{cents_to_ratio, Scale};

/// Middle C in Hz.
pub const DEFAULT_FUNDAMENTAL: f64 = 261.625_565_3;

/// MIDI note played by the coordinate (0, 0) when the octave offset is zero.
pub const DEFAULT_CENTER_MIDI_NOTE: i32 = 60;

/// A key on the hex grid, in steps along its two lattice axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub r: i32,
    pub ur: i32,
}

impl Coord {
    pub fn new(r: i32, ur: i32) -> Coord {
        Coord { r, ur }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.r, self.ur)
    }
}

/// Everything needed to turn a coordinate into a pitch. Components get an immutable copy and
/// receive a new one when the tuning changes.
#[derive(Clone, Debug, PartialEq)]
pub struct TuningConfig {
    pub scale: Scale,
    /// Scale steps per move along the right axis.
    pub r_steps: i32,
    /// Scale steps per move along the up-right axis.
    pub ur_steps: i32,
    /// Whole equivalence intervals added to every pitch.
    pub octave_offset: i32,
    /// Frequency of degree 0 with no octave offset, in Hz.
    pub fundamental: f64,
    pub center_midi_note: i32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        TuningConfig {
            scale: Scale::equal(12, 1200.0),
            r_steps: 2,
            ur_steps: 7,
            octave_offset: 0,
            fundamental: DEFAULT_FUNDAMENTAL,
            center_midi_note: DEFAULT_CENTER_MIDI_NOTE,
        }
    }
}

impl TuningConfig {
    /// Returns the frequency of a resolved pitch.
    pub fn frequency(&self, pitch: &Pitch) -> f64 {
        self.fundamental * cents_to_ratio(pitch.cents)
    }

    /// Returns the MIDI note for a resolved pitch, counting one MIDI note per scale step. None if
    /// the note falls outside the MIDI range.
    pub fn midi_note(&self, pitch: &Pitch) -> Option<u8> {
        let note = self.center_midi_note as i64
            + pitch.linear_steps
            + self.octave_offset as i64 * self.scale.len() as i64;
        u8::try_from(note).ok().filter(|note| *note <= 127)
    }
}

/// A resolved pitch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pitch {
    /// Cents above the fundamental, including the octave offset.
    pub cents: f64,
    /// The scale degree, always within `[0, scale.len())`.
    pub reduced_step: usize,
    /// Total steps from the origin before reduction.
    pub linear_steps: i64,
    /// Equivalence intervals above the origin, excluding the octave offset.
    pub octave: i64,
}

/// Resolves a coordinate to a pitch. Floor division keeps negative coordinates on a valid degree
/// one equivalence interval lower.
pub fn resolve_pitch(coord: Coord, config: &TuningConfig) -> Pitch {
    let len = config.scale.len() as i64;
    let linear_steps =
        coord.r as i64 * config.r_steps as i64 + coord.ur as i64 * config.ur_steps as i64;
    let octave = linear_steps.div_euclid(len);
    let reduced_step = linear_steps.rem_euclid(len) as usize;
    let cents = (octave + config.octave_offset as i64) as f64 * config.scale.equivalence()
        + config.scale.degree(reduced_step);

    Pitch {
        cents,
        reduced_step,
        linear_steps,
        octave,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(scale: Scale, r_steps: i32, ur_steps: i32) -> TuningConfig {
        TuningConfig {
            scale,
            r_steps,
            ur_steps,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let config = config(Scale::parse("5/4\n3/2\n2/1"), 1, 2);
        for r in -5..5 {
            for ur in -5..5 {
                let coord = Coord::new(r, ur);
                assert_eq!(resolve_pitch(coord, &config), resolve_pitch(coord, &config));
            }
        }
    }

    #[test]
    fn test_negative_coordinates_wrap() {
        let config = config(Scale::equal(12, 1200.0), 1, 0);
        let below = resolve_pitch(Coord::new(-1, 0), &config);
        let above = resolve_pitch(Coord::new(11, 0), &config);

        assert_eq!(below.linear_steps, -1);
        assert_eq!(below.reduced_step, 11);
        assert_eq!(below.octave, -1);
        assert_eq!(below.reduced_step, above.reduced_step);
        assert!((above.cents - below.cents - 1200.0).abs() < 1e-9);
        assert!((below.cents + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_lattice_axes() {
        let config = config(Scale::equal(12, 1200.0), 2, 7);
        let pitch = resolve_pitch(Coord::new(1, 1), &config);
        assert_eq!(pitch.linear_steps, 9);
        assert_eq!(pitch.reduced_step, 9);
        assert!((pitch.cents - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_degree_scale() {
        let config = config(Scale::default(), 1, 3);
        let pitch = resolve_pitch(Coord::new(-2, 1), &config);
        assert_eq!(pitch.reduced_step, 0);
        assert!((pitch.cents - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_octave_offset() {
        let mut config = config(Scale::equal(12, 1200.0), 1, 0);
        config.octave_offset = -1;
        let pitch = resolve_pitch(Coord::new(0, 0), &config);
        assert!((pitch.cents + 1200.0).abs() < 1e-9);
        assert!((config.frequency(&pitch) - DEFAULT_FUNDAMENTAL / 2.0).abs() < 1e-9);
        assert_eq!(config.midi_note(&pitch), Some(48));
    }

    #[test]
    fn test_frequency_and_midi_note() {
        let config = config(Scale::equal(12, 1200.0), 1, 0);
        let a4 = resolve_pitch(Coord::new(9, 0), &config);
        assert!((config.frequency(&a4) - 440.0).abs() < 1e-3);
        assert_eq!(config.midi_note(&a4), Some(69));

        assert_eq!(config.midi_note(&resolve_pitch(Coord::new(68, 0), &config)), None);
        assert_eq!(config.midi_note(&resolve_pitch(Coord::new(-61, 0), &config)), None);
    }
}
