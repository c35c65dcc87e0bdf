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

const DEFAULT_CHANNELS: [u8; 1] = [1];
const DEFAULT_VELOCITY: u8 = 100;

/// A YAML representation of MIDI output. When present, notes go to the MIDI device instead of
/// being played from samples.
#[derive(Deserialize, Clone, Debug)]
pub struct Midi {
    /// The MIDI output device. Names starting with "mock" select the recording device.
    device: String,

    /// The channels notes are sent on, 1-indexed (default: [1])
    channels: Option<Vec<u8>>,

    /// Note on velocity (default: 100)
    velocity: Option<u8>,
}

impl Midi {
    pub fn new(device: &str) -> Midi {
        Midi {
            device: device.to_string(),
            channels: None,
            velocity: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn channels(&self) -> Vec<u8> {
        self.channels
            .clone()
            .unwrap_or_else(|| DEFAULT_CHANNELS.to_vec())
    }

    pub fn velocity(&self) -> u8 {
        self.velocity.unwrap_or(DEFAULT_VELOCITY).min(127)
    }
}
