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
// Core mixing logic shared by the cpal output stream and its tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::automation::Timeline;
use super::{NodeId, SampleBuffer};

/// Mutable parameters of a playback unit, written by the control side and read by the mixer.
#[derive(Debug, Default)]
pub(crate) struct VoiceState {
    pub rate: f64,
    pub start: Option<f64>,
    pub stop: Option<f64>,
    pub gain: Option<NodeId>,
    pub disconnected: bool,
    /// Set by the mixer once the voice ran off the end of its buffer or hit its stop time.
    pub finished: bool,
}

/// A playback unit as seen by both sides.
pub(crate) struct PlaybackShared {
    pub id: NodeId,
    pub buffer: SampleBuffer,
    pub state: Mutex<VoiceState>,
}

/// A gain unit as seen by both sides.
pub(crate) struct GainShared {
    pub id: NodeId,
    pub timeline: Mutex<Timeline>,
    pub routed: AtomicBool,
    pub disconnected: AtomicBool,
}

/// Registers new units with the mixer.
pub(crate) enum Command {
    Playback(Arc<PlaybackShared>),
    Gain(Arc<GainShared>),
}

struct Voice {
    shared: Arc<PlaybackShared>,
    /// Read position in source frames.
    position: f64,
}

/// Mixes every started voice through its gain unit into an interleaved output buffer.
pub(crate) struct Mixer {
    num_channels: u16,
    sample_rate: u32,
    /// Total frames rendered so far. This is the backend's clock.
    frames_rendered: Arc<AtomicU64>,
    commands: crossbeam_channel::Receiver<Command>,
    voices: Vec<Voice>,
    gains: HashMap<NodeId, Arc<GainShared>>,
}

impl Mixer {
    pub fn new(
        num_channels: u16,
        sample_rate: u32,
        commands: crossbeam_channel::Receiver<Command>,
        frames_rendered: Arc<AtomicU64>,
    ) -> Mixer {
        Mixer {
            num_channels,
            sample_rate,
            frames_rendered,
            commands,
            voices: Vec::new(),
            gains: HashMap::new(),
        }
    }

    /// Returns the number of voices the mixer is still tracking.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Renders one block. The block length is `output.len() / num_channels` frames.
    pub fn process_into_output(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = self.num_channels as usize;
        if channels == 0 || self.sample_rate == 0 {
            return;
        }

        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Playback(shared) => self.voices.push(Voice {
                    shared,
                    position: 0.0,
                }),
                Command::Gain(shared) => {
                    self.gains.insert(shared.id, shared);
                }
            }
        }
        self.gains
            .retain(|_, gain| !gain.disconnected.load(Ordering::Relaxed));

        let sample_rate = self.sample_rate as f64;
        let start_frame = self.frames_rendered.load(Ordering::Acquire);
        let block_start = start_frame as f64 / sample_rate;

        let gains = &self.gains;
        self.voices.retain_mut(|voice| {
            mix_voice(voice, gains, output, channels, block_start, sample_rate)
        });

        for gain in self.gains.values() {
            gain.timeline.lock().prune(block_start);
        }

        let frames = (output.len() / channels) as u64;
        self.frames_rendered
            .store(start_frame + frames, Ordering::Release);
    }
}

/// Mixes a single voice into the output. Returns false once the voice should be dropped.
fn mix_voice(
    voice: &mut Voice,
    gains: &HashMap<NodeId, Arc<GainShared>>,
    output: &mut [f32],
    channels: usize,
    block_start: f64,
    sample_rate: f64,
) -> bool {
    let (rate, start, stop, gain_id) = {
        let state = voice.shared.state.lock();
        if state.disconnected || state.finished {
            return false;
        }
        match state.start {
            Some(start) => (state.rate, start, state.stop, state.gain),
            None => return true,
        }
    };

    let buffer = &voice.shared.buffer;
    let data = buffer.data();
    let source_channels = buffer.channel_count() as usize;
    let source_frames = buffer.frames();
    let step = rate * buffer.sample_rate() as f64 / sample_rate;

    let gain = gain_id
        .and_then(|id| gains.get(&id))
        .filter(|gain| gain.routed.load(Ordering::Relaxed));
    let timeline = gain.map(|gain| gain.timeline.lock());

    let frames = output.len() / channels;
    for frame in 0..frames {
        let time = block_start + frame as f64 / sample_rate;
        if time < start {
            continue;
        }
        let index = voice.position as usize;
        if index >= source_frames || stop.is_some_and(|stop| time >= stop) {
            voice.shared.state.lock().finished = true;
            return false;
        }

        if let Some(timeline) = &timeline {
            let level = timeline.value_at(time);
            let next = (index + 1).min(source_frames - 1);
            let frac = (voice.position - index as f64) as f32;
            for channel in 0..channels {
                let source_channel = channel % source_channels;
                let a = data[index * source_channels + source_channel];
                let b = data[next * source_channels + source_channel];
                output[frame * channels + channel] += (a + (b - a) * frac) * level;
            }
        }
        voice.position += step;
    }

    true
}
