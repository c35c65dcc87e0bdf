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
//! Turns note intents from the grid into sound and keeps track of what is sounding.
use std::time::Duration;

use crate::{
    harmony::Analysis,
    tuning::{Coord, Pitch},
};

mod active;
mod manager;
mod output;

pub use active::{ActiveNote, Voice};
pub use manager::{NoteEventManager, CLEANUP_INTERVAL, RETARGET_TIME, STALE_NOTE_AGE, STOP_MARGIN};
pub use output::{MidiTarget, OutputTarget, SampleOutput};

/// Default instrument gain before the volume multiplier.
pub const DEFAULT_GAIN: f32 = 0.3;

/// The gain envelope applied to sample voices. Handed over as an immutable snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvelopeConfig {
    pub gain: f32,
    /// Time from near silence to full gain at note start.
    pub attack: Duration,
    /// Time from the current gain to silence at note end.
    pub fadeout: Duration,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        EnvelopeConfig {
            gain: DEFAULT_GAIN,
            attack: Duration::from_millis(20),
            fadeout: Duration::from_millis(300),
        }
    }
}

/// Receives note transitions and chord analyses. Called after the manager's state lock is
/// released, so observers may call back into the manager.
pub trait NoteObserver: Send + Sync {
    fn note_on(&self, coord: Coord, pitch: &Pitch);

    fn note_off(&self, coord: Coord);

    /// Called with a fresh analysis after every change to the sounding notes when a chord system
    /// is configured.
    fn analysis(&self, _analysis: &Analysis) {}
}
