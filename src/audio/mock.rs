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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::debug;

use super::{automation::Timeline, next_node_id, AudioError, NodeId, SampleBuffer};

/// A manually advanced clock shared by a mock backend and its units.
#[derive(Clone, Default)]
struct Clock(Arc<Mutex<f64>>);

impl Clock {
    fn now(&self) -> f64 {
        *self.0.lock()
    }
}

/// A mock backend. Doesn't render anything, but records every unit it hands out so tests can
/// inspect the graph and the scheduled automation.
#[derive(Clone)]
pub struct Backend {
    name: String,
    clock: Clock,
    playbacks: Arc<Mutex<Vec<Arc<Playback>>>>,
    gains: Arc<Mutex<Vec<Arc<Gain>>>>,
    closed: Arc<AtomicBool>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            clock: Clock::default(),
            playbacks: Arc::new(Mutex::new(Vec::new())),
            gains: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: f64) {
        *self.clock.0.lock() += seconds;
    }

    /// Makes every subsequent unit creation fail, as a torn-down backend would.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Returns every playback unit created so far.
    pub fn playbacks(&self) -> Vec<Arc<Playback>> {
        self.playbacks.lock().clone()
    }

    /// Returns every gain unit created so far.
    pub fn gains(&self) -> Vec<Arc<Gain>> {
        self.gains.lock().clone()
    }

    /// Returns the number of gain units still routed to the output.
    pub fn live_gain_count(&self) -> usize {
        self.gains
            .lock()
            .iter()
            .filter(|gain| gain.is_routed())
            .count()
    }
}

impl super::Backend for Backend {
    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn create_playback(
        &self,
        buffer: SampleBuffer,
    ) -> Result<Arc<dyn super::PlaybackUnit>, AudioError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(AudioError::Closed);
        }
        let playback = Arc::new(Playback {
            id: next_node_id(),
            buffer,
            state: Mutex::new(PlaybackState {
                rate: 1.0,
                started_at: None,
                stopped_at: None,
                gain: None,
                disconnected: false,
            }),
        });
        self.playbacks.lock().push(playback.clone());
        Ok(playback)
    }

    fn create_gain(&self) -> Result<Arc<dyn super::GainUnit>, AudioError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(AudioError::Closed);
        }
        let gain = Arc::new(Gain {
            id: next_node_id(),
            clock: self.clock.clone(),
            timeline: Mutex::new(Timeline::default()),
            routed: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        });
        self.gains.lock().push(gain.clone());
        Ok(gain)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct PlaybackState {
    rate: f64,
    started_at: Option<f64>,
    stopped_at: Option<f64>,
    gain: Option<NodeId>,
    disconnected: bool,
}

/// A mock playback unit.
pub struct Playback {
    id: NodeId,
    buffer: SampleBuffer,
    state: Mutex<PlaybackState>,
}

impl Playback {
    /// Returns the buffer this unit plays.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Returns the playback rate.
    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Returns when the unit was started.
    pub fn started_at(&self) -> Option<f64> {
        self.state.lock().started_at
    }

    /// Returns when the unit is scheduled to stop.
    pub fn stopped_at(&self) -> Option<f64> {
        self.state.lock().stopped_at
    }

    /// Returns the gain unit this unit feeds.
    pub fn gain(&self) -> Option<NodeId> {
        self.state.lock().gain
    }

    /// Returns true once the unit has been removed from the graph.
    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }
}

impl super::PlaybackUnit for Playback {
    fn id(&self) -> NodeId {
        self.id
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    fn start(&self, when: f64) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        if state.started_at.is_some() {
            return Err(AudioError::AlreadyStarted(self.id));
        }
        state.started_at = Some(when);
        Ok(())
    }

    fn stop(&self, when: f64) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        if state.started_at.is_none() {
            return Err(AudioError::NotStarted(self.id));
        }
        if state.stopped_at.is_some() {
            return Err(AudioError::AlreadyStopped(self.id));
        }
        state.stopped_at = Some(when);
        Ok(())
    }

    fn connect(&self, gain: &dyn super::GainUnit) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(AudioError::Disconnected(self.id));
        }
        state.gain = Some(gain.id());
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(AudioError::Disconnected(self.id));
        }
        debug!(id = self.id, "Disconnecting mock playback unit.");
        state.disconnected = true;
        state.gain = None;
        Ok(())
    }
}

/// A mock gain unit. Its value follows the timeline against the backend's mock clock.
pub struct Gain {
    id: NodeId,
    clock: Clock,
    timeline: Mutex<Timeline>,
    routed: AtomicBool,
    disconnected: AtomicBool,
}

impl Gain {
    /// Returns the value at an arbitrary time.
    pub fn value_at(&self, time: f64) -> f32 {
        self.timeline.lock().value_at(time)
    }

    /// Returns true while the unit is connected to the output.
    pub fn is_routed(&self) -> bool {
        self.routed.load(Ordering::Relaxed)
    }

    /// Returns true once the unit has been removed from the graph.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }
}

impl super::GainUnit for Gain {
    fn id(&self) -> NodeId {
        self.id
    }

    fn value(&self) -> f32 {
        self.timeline.lock().value_at(self.clock.now())
    }

    fn set_value_at_time(&self, value: f32, when: f64) {
        self.timeline.lock().set_value_at_time(value, when);
    }

    fn linear_ramp_to_value_at_time(&self, value: f32, when: f64) {
        self.timeline.lock().linear_ramp_to_value_at_time(value, when);
    }

    fn exponential_ramp_to_value_at_time(&self, value: f32, when: f64) {
        self.timeline
            .lock()
            .exponential_ramp_to_value_at_time(value, when);
    }

    fn cancel_scheduled_values(&self, from: f64) {
        self.timeline.lock().cancel_scheduled_values(from);
    }

    fn connect_to_output(&self) -> Result<(), AudioError> {
        if self.is_disconnected() {
            return Err(AudioError::Disconnected(self.id));
        }
        self.routed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AudioError> {
        if self.disconnected.swap(true, Ordering::Relaxed) {
            return Err(AudioError::Disconnected(self.id));
        }
        debug!(id = self.id, "Disconnecting mock gain unit.");
        self.routed.store(false, Ordering::Relaxed);
        Ok(())
    }
}
