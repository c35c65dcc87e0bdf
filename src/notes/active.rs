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
use std::time::Duration;

use tokio::time::Instant;

use crate::{
    audio::pool::PoolHandle,
    tuning::{Coord, Pitch},
};

/// What is producing the sound of a note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Voice {
    Midi { note: u8 },
    Sample { handle: PoolHandle },
    /// Nothing is sounding, either because no sample was ready or the note was out of range. The
    /// note is still tracked so the grid reflects it.
    Silent,
}

/// A sounding grid coordinate.
#[derive(Clone, Debug)]
pub struct ActiveNote {
    pub coord: Coord,
    pub pitch: Pitch,
    pub frequency: f64,
    pub voice: Voice,
    pub started: Instant,
    /// Set when the note was released while sustain was engaged.
    pub sustained: bool,
}

impl ActiveNote {
    pub fn new(coord: Coord, pitch: Pitch, frequency: f64, voice: Voice) -> ActiveNote {
        ActiveNote {
            coord,
            pitch,
            frequency,
            voice,
            started: Instant::now(),
            sustained: false,
        }
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}
