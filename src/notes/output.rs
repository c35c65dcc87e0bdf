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
use std::{fmt, sync::Arc};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use tracing::warn;

use crate::{
    audio::{pool::NodePool, Backend},
    midi::Device,
    samples::SampleCache,
};

/// Controller number for all sound off.
const ALL_SOUND_OFF: u8 = 120;

/// Controller number for all notes off.
const ALL_NOTES_OFF: u8 = 123;

/// Sends notes to a MIDI device on one or more channels.
pub struct MidiTarget {
    device: Arc<dyn Device>,
    channels: Vec<u4>,
    velocity: u7,
}

impl MidiTarget {
    /// Creates a target. Channels are 1-indexed; anything outside 1..=16 is dropped, and an empty
    /// list means channel 1.
    pub fn new(device: Arc<dyn Device>, channels: &[u8], velocity: u8) -> MidiTarget {
        let mut converted = Vec::new();
        for channel in channels {
            match channel.checked_sub(1).and_then(u4::try_from) {
                Some(channel) => converted.push(channel),
                None => warn!(channel, "Ignoring invalid MIDI channel."),
            }
        }
        if converted.is_empty() {
            converted.push(u4::from(0));
        }

        MidiTarget {
            device,
            channels: converted,
            velocity: u7::from(velocity.min(127)),
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Returns the channels, 1-indexed.
    pub fn channels(&self) -> Vec<u8> {
        self.channels
            .iter()
            .map(|channel| channel.as_int() + 1)
            .collect()
    }

    pub fn note_on(&self, note: u8) {
        let Some(key) = u7::try_from(note) else {
            return;
        };
        let vel = self.velocity;
        self.send(|| MidiMessage::NoteOn { key, vel });
    }

    pub fn note_off(&self, note: u8) {
        let Some(key) = u7::try_from(note) else {
            return;
        };
        self.send(|| MidiMessage::NoteOff {
            key,
            vel: u7::from(0),
        });
    }

    /// Silences every channel: all sound off followed by all notes off.
    pub fn all_sound_off(&self) {
        for channel in &self.channels {
            for controller in [ALL_SOUND_OFF, ALL_NOTES_OFF] {
                self.emit(
                    *channel,
                    MidiMessage::Controller {
                        controller: u7::from(controller),
                        value: u7::from(0),
                    },
                );
            }
        }
    }

    fn send<F>(&self, message: F)
    where
        F: Fn() -> MidiMessage,
    {
        for channel in &self.channels {
            self.emit(*channel, message());
        }
    }

    fn emit(&self, channel: u4, message: MidiMessage) {
        if let Err(err) = self.device.emit(LiveEvent::Midi { channel, message }) {
            warn!(device = self.device.name(), err = %err, "Unable to emit MIDI event.");
        }
    }
}

impl fmt::Debug for MidiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiTarget")
            .field("device", &self.device.name())
            .field("channels", &self.channels())
            .field("velocity", &self.velocity.as_int())
            .finish()
    }
}

/// Everything needed to play notes from samples.
#[derive(Clone)]
pub struct SampleOutput {
    pub backend: Arc<dyn Backend>,
    pub cache: Arc<SampleCache>,
    pub pool: Arc<NodePool>,
}

/// Where notes go.
pub enum OutputTarget {
    Midi(MidiTarget),
    Sample(SampleOutput),
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Midi(target) => write!(f, "MIDI {}", target.device),
            OutputTarget::Sample(output) => write!(f, "samples on {}", output.backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::midi;

    use super::MidiTarget;

    #[test]
    fn test_channels_are_one_indexed() {
        let device = midi::test::Device::get("mock-out");
        let target = MidiTarget::new(Arc::new(device.clone()), &[2, 0, 17, 10], 90);
        assert_eq!(vec![2, 10], target.channels());

        target.note_on(64);
        target.note_off(64);
        assert_eq!(
            vec![
                vec![0x91, 64, 90],
                vec![0x99, 64, 90],
                vec![0x81, 64, 0],
                vec![0x89, 64, 0],
            ],
            device.emitted()
        );
    }

    #[test]
    fn test_empty_channels_default_to_first() {
        let device = midi::test::Device::get("mock-out");
        let target = MidiTarget::new(Arc::new(device), &[], 200);
        assert_eq!(vec![1], target.channels());
    }

    #[test]
    fn test_all_sound_off() {
        let device = midi::test::Device::get("mock-out");
        let target = MidiTarget::new(Arc::new(device.clone()), &[1, 2], 100);
        target.all_sound_off();
        assert_eq!(
            vec![
                vec![0xB0, 120, 0],
                vec![0xB0, 123, 0],
                vec![0xB1, 120, 0],
                vec![0xB1, 123, 0],
            ],
            device.emitted()
        );
    }
}
