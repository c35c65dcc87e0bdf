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
//! The audio rendering backend seen by the note engine.
//!
//! A backend hands out two kinds of units: a playback unit that plays a decoded buffer at a
//! given rate, and a gain unit whose value follows a scheduled automation timeline. A note is a
//! playback unit connected to a gain unit connected to the output. All scheduling is expressed
//! against the backend's own clock, in seconds.

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::config;

pub mod automation;
pub mod cpal;
mod mixer;
pub mod mock;
pub mod pool;

/// Identifies a unit created by a backend.
pub type NodeId = u64;

/// Global node ID counter.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh node ID.
pub fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Errors raised by audio units. Teardown errors are expected and callers only log them.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio node {0} is already disconnected")]
    Disconnected(NodeId),

    #[error("Audio node {0} was already started")]
    AlreadyStarted(NodeId),

    #[error("Audio node {0} has not been started")]
    NotStarted(NodeId),

    #[error("Audio node {0} was already stopped")]
    AlreadyStopped(NodeId),

    #[error("Audio backend is closed")]
    Closed,

    #[error("Audio device error: {0}")]
    Device(String),
}

/// A decoded audio buffer. The sample data is stored in an Arc so many playback units can share
/// one buffer.
#[derive(Clone)]
pub struct SampleBuffer {
    /// The sample data as f32 samples (interleaved if multi-channel).
    data: Arc<Vec<f32>>,
    /// Number of channels in the buffer.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a new buffer from interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the interleaved samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Returns the duration of the buffer at its native rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Plays a buffer, optionally rate-shifted.
pub trait PlaybackUnit: Send + Sync {
    /// Returns the ID of the unit.
    fn id(&self) -> NodeId;

    /// Sets the playback rate multiplier. 1.0 plays the buffer at its recorded pitch.
    fn set_playback_rate(&self, rate: f64);

    /// Starts playback at the given backend time. A unit can only be started once.
    fn start(&self, when: f64) -> Result<(), AudioError>;

    /// Stops playback at the given backend time. A unit can only be stopped once.
    fn stop(&self, when: f64) -> Result<(), AudioError>;

    /// Routes the unit's output into the given gain unit.
    fn connect(&self, gain: &dyn GainUnit) -> Result<(), AudioError>;

    /// Removes the unit from the graph.
    fn disconnect(&self) -> Result<(), AudioError>;
}

/// A gain stage whose value follows an automation timeline.
pub trait GainUnit: Send + Sync {
    /// Returns the ID of the unit.
    fn id(&self) -> NodeId;

    /// Returns the gain at the backend's current time.
    fn value(&self) -> f32;

    /// Jumps to `value` at time `when`.
    fn set_value_at_time(&self, value: f32, when: f64);

    /// Ramps linearly from the previous scheduled value to `value`, arriving at `when`.
    fn linear_ramp_to_value_at_time(&self, value: f32, when: f64);

    /// Ramps exponentially from the previous scheduled value to `value`, arriving at `when`.
    /// Exponential ramps are only defined between positive values.
    fn exponential_ramp_to_value_at_time(&self, value: f32, when: f64);

    /// Drops every scheduled change at or after `from`.
    fn cancel_scheduled_values(&self, from: f64);

    /// Routes the unit into the backend's output.
    fn connect_to_output(&self) -> Result<(), AudioError>;

    /// Removes the unit from the graph.
    fn disconnect(&self) -> Result<(), AudioError>;
}

/// An audio rendering backend.
pub trait Backend: fmt::Display + Send + Sync {
    /// Returns the backend's clock, in seconds.
    fn current_time(&self) -> f64;

    /// Creates a playback unit for the given buffer.
    fn create_playback(&self, buffer: SampleBuffer) -> Result<Arc<dyn PlaybackUnit>, AudioError>;

    /// Creates a gain unit. New gain units start at 1.0.
    fn create_gain(&self) -> Result<Arc<dyn GainUnit>, AudioError>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Backend::list()
}

/// Gets a backend for the given configuration.
pub fn get_backend(config: &config::Audio) -> Result<Arc<dyn Backend>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Backend::get(device)));
    };

    Ok(Arc::new(cpal::Backend::get(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_dimensions() {
        let buffer = SampleBuffer::new(vec![0.0; 88_200], 2, 44_100);
        assert_eq!(buffer.frames(), 44_100);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
        assert_eq!(buffer.memory_size(), 88_200 * 4);
    }

    #[test]
    fn test_zero_channel_buffer_is_treated_as_mono() {
        let buffer = SampleBuffer::new(vec![0.0; 10], 0, 10);
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.frames(), 10);
    }

    #[test]
    fn test_node_ids_are_unique() {
        let a = next_node_id();
        let b = next_node_id();
        assert_ne!(a, b);
    }
}
