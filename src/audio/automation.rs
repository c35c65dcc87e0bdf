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

//! Scheduled gain automation, shared by every backend.

/// Default value of a new gain unit.
pub const DEFAULT_GAIN: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Kind {
    Set,
    Linear,
    Exponential,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Event {
    kind: Kind,
    value: f32,
    time: f64,
}

/// A gain automation timeline. Ramps run from the previous event (or the initial value) to the
/// ramp's own value, arriving at the ramp's time.
#[derive(Clone, Debug)]
pub struct Timeline {
    /// The value before the first event.
    initial: f32,
    /// Scheduled events, ordered by time. Events with equal times keep insertion order.
    events: Vec<Event>,
}

impl Default for Timeline {
    fn default() -> Self {
        Timeline::new(DEFAULT_GAIN)
    }
}

impl Timeline {
    /// Creates a timeline holding `initial` until something is scheduled.
    pub fn new(initial: f32) -> Timeline {
        Timeline {
            initial,
            events: Vec::new(),
        }
    }

    /// Jumps to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event {
            kind: Kind::Set,
            value,
            time,
        });
    }

    /// Linear ramp arriving at `value` at `time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event {
            kind: Kind::Linear,
            value,
            time,
        });
    }

    /// Exponential ramp arriving at `value` at `time`. A non-positive target can't be reached
    /// exponentially, so it is scheduled as a linear ramp instead.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        let kind = if value > 0.0 {
            Kind::Exponential
        } else {
            Kind::Linear
        };
        self.insert(Event { kind, value, time });
    }

    /// Drops every event scheduled at or after `from`.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|event| event.time < from);
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the value at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut value = self.initial;
        let mut from_time = f64::NEG_INFINITY;

        for event in self.events.iter() {
            if event.time <= time {
                value = event.value;
                from_time = event.time;
                continue;
            }

            // The first future event decides whether we are mid-ramp.
            return match event.kind {
                Kind::Set => value,
                Kind::Linear | Kind::Exponential if !from_time.is_finite() => value,
                Kind::Linear => {
                    let progress = ((time - from_time) / (event.time - from_time)) as f32;
                    value + (event.value - value) * progress
                }
                Kind::Exponential => {
                    let progress = (time - from_time) / (event.time - from_time);
                    if value <= 0.0 {
                        let progress = progress as f32;
                        value + (event.value - value) * progress
                    } else {
                        (value as f64 * (event.value as f64 / value as f64).powf(progress)) as f32
                    }
                }
            };
        }

        value
    }

    /// Folds events that can no longer influence values at or after `time` into the initial value.
    pub fn prune(&mut self, time: f64) {
        while self.events.len() >= 2 && self.events[1].time <= time {
            self.initial = self.events[0].value;
            self.events.remove(0);
        }
    }

    fn insert(&mut self, event: Event) {
        let index = self
            .events
            .iter()
            .position(|existing| existing.time > event.time)
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }
}
