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
use serde::Deserialize;

use crate::tuning::{Scale, TuningConfig, DEFAULT_CENTER_MIDI_NOTE, DEFAULT_FUNDAMENTAL};

const DEFAULT_R_STEPS: i32 = 2;
const DEFAULT_UR_STEPS: i32 = 7;

/// A YAML representation of the tuning.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Tuning {
    /// Scale definition text. Defaults to 12 equal divisions of the octave.
    scale: Option<String>,

    /// Scale steps per move to the right.
    r_steps: Option<i32>,

    /// Scale steps per move up and to the right.
    ur_steps: Option<i32>,

    /// Frequency of the first degree in Hz.
    fundamental: Option<f64>,

    octave_offset: Option<i32>,

    center_midi_note: Option<i32>,
}

impl Tuning {
    /// Returns the scale. Malformed lines are skipped, never rejected.
    pub fn scale(&self) -> Scale {
        match &self.scale {
            Some(text) => Scale::parse(text),
            None => Scale::equal(12, crate::tuning::DEFAULT_EQUIVALENCE),
        }
    }

    /// Builds the snapshot handed to the note manager.
    pub fn to_tuning_config(&self) -> TuningConfig {
        TuningConfig {
            scale: self.scale(),
            r_steps: self.r_steps.unwrap_or(DEFAULT_R_STEPS),
            ur_steps: self.ur_steps.unwrap_or(DEFAULT_UR_STEPS),
            octave_offset: self.octave_offset.unwrap_or(0),
            fundamental: self
                .fundamental
                .filter(|fundamental| *fundamental > 0.0)
                .unwrap_or(DEFAULT_FUNDAMENTAL),
            center_midi_note: self.center_midi_note.unwrap_or(DEFAULT_CENTER_MIDI_NOTE),
        }
    }

    /// Shifts the octave offset.
    pub fn shift_octave(&mut self, octaves: i32) {
        self.octave_offset = Some(self.octave_offset.unwrap_or(0) + octaves);
    }
}
