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
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, span, warn, Level};

use crate::{
    audio::{
        pool::{PoolHandle, SILENCE_THRESHOLD},
        AudioError, GainUnit, PlaybackUnit,
    },
    harmony::{analyze, Analysis, ChordSystem},
    playsync::{run_after, spawn_periodic, CancelHandle},
    tuning::{resolve_pitch, Coord, Pitch, TuningConfig},
};

use super::{
    active::{ActiveNote, Voice},
    output::{OutputTarget, SampleOutput},
    EnvelopeConfig, NoteObserver,
};

/// Notes older than this are released even without a note-off.
pub const STALE_NOTE_AGE: Duration = Duration::from_secs(30);

/// How often stale notes are looked for.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Time taken to move live gains to a new volume.
pub const RETARGET_TIME: Duration = Duration::from_millis(20);

/// Playback stops this long after its fade completes.
pub const STOP_MARGIN: Duration = Duration::from_millis(50);

/// Level a fade decays to.
const FADE_FLOOR: f32 = 0.0001;

/// Ramps `gain` to `target` by `when`. Targets at or near silence ramp linearly.
fn ramp_to(gain: &dyn GainUnit, target: f32, when: f64) {
    if target <= SILENCE_THRESHOLD {
        gain.linear_ramp_to_value_at_time(target, when);
    } else {
        gain.exponential_ramp_to_value_at_time(target, when);
    }
}

/// Best-effort teardown of units that never made it into the pool.
fn discard(playback: &dyn PlaybackUnit, gain: &dyn GainUnit) {
    if let Err(err) = playback.disconnect() {
        debug!(err = %err, "Error disconnecting discarded playback unit.");
    }
    if let Err(err) = gain.disconnect() {
        debug!(err = %err, "Error disconnecting discarded gain unit.");
    }
}

/// Observer calls collected under the state lock and made after it is released.
enum Notification {
    On(Coord, Pitch),
    Off(Coord),
    Analysis(Analysis),
}

struct State {
    tuning: TuningConfig,
    envelope: EnvelopeConfig,
    output: OutputTarget,
    harmony: Option<Arc<ChordSystem>>,
    /// Notes whose key is down.
    active: HashMap<Coord, ActiveNote>,
    /// Notes released while sustain was engaged.
    held: HashMap<Coord, ActiveNote>,
    sustain: bool,
    volume: f32,
}

impl State {
    fn target_gain(&self) -> f32 {
        self.envelope.gain * self.volume
    }

    fn sounding(&self) -> impl Iterator<Item = &ActiveNote> {
        self.active.values().chain(self.held.values())
    }

    fn analysis(&self) -> Option<Analysis> {
        let system = self.harmony.as_ref()?;
        let equivalence = self.tuning.scale.equivalence();
        let steps = self
            .sounding()
            .map(|note| system.step_for_cents(note.pitch.cents, equivalence))
            .collect::<Vec<i64>>();
        Some(analyze(system, &steps))
    }

    fn start_voice(&self, coord: Coord, pitch: &Pitch, frequency: f64) -> Voice {
        match &self.output {
            OutputTarget::Midi(target) => match self.tuning.midi_note(pitch) {
                Some(note) => {
                    target.note_on(note);
                    Voice::Midi { note }
                }
                None => {
                    debug!(coord = %coord, "Note is outside the MIDI range, not sending it.");
                    Voice::Silent
                }
            },
            OutputTarget::Sample(output) => match self.start_sample(output, frequency) {
                Ok(Some(handle)) => Voice::Sample { handle },
                Ok(None) => {
                    debug!(
                        coord = %coord,
                        frequency,
                        loading = output.cache.is_loading(),
                        "No sample ready, note will be silent."
                    );
                    Voice::Silent
                }
                Err(err) => {
                    warn!(coord = %coord, err = %err, "Unable to start sample voice.");
                    Voice::Silent
                }
            },
        }
    }

    fn start_sample(
        &self,
        output: &SampleOutput,
        frequency: f64,
    ) -> Result<Option<PoolHandle>, AudioError> {
        let Some((buffer, bucket)) = output.cache.get_buffer(frequency) else {
            return Ok(None);
        };

        let playback = output.backend.create_playback(buffer)?;
        let gain = match output.backend.create_gain() {
            Ok(gain) => gain,
            Err(err) => {
                if let Err(err) = playback.disconnect() {
                    debug!(err = %err, "Error disconnecting discarded playback unit.");
                }
                return Err(err);
            }
        };

        playback.set_playback_rate(frequency / bucket.base_frequency());
        let now = output.backend.current_time();
        gain.set_value_at_time(SILENCE_THRESHOLD, now);
        ramp_to(
            gain.as_ref(),
            self.target_gain(),
            now + self.envelope.attack.as_secs_f64(),
        );

        let wired = playback
            .connect(gain.as_ref())
            .and_then(|_| gain.connect_to_output())
            .and_then(|_| playback.start(now));
        if let Err(err) = wired {
            discard(playback.as_ref(), gain.as_ref());
            return Err(err);
        }

        Ok(Some(output.pool.acquire(playback, gain, frequency)))
    }

    /// Ends the sound of a note. Sample voices fade out and go back to the pool once the fade is
    /// over.
    /// The note must already be out of `active` and `held`.
    fn teardown(&self, note: &ActiveNote) {
        match (&note.voice, &self.output) {
            (Voice::Midi { note: key }, OutputTarget::Midi(target)) => {
                if self.midi_key_sounding(*key) {
                    debug!(coord = %note.coord, key, "Another key still sounds this note.");
                } else {
                    target.note_off(*key);
                }
            }
            (Voice::Sample { handle }, OutputTarget::Sample(output)) => {
                self.fade(output, *handle)
            }
            (Voice::Silent, _) => {}
            (voice, _) => debug!(
                coord = %note.coord,
                voice = ?voice,
                "Voice doesn't belong to the current output, dropping it."
            ),
        }
    }

    /// Returns true if a tracked note is sending the MIDI key.
    fn midi_key_sounding(&self, key: u8) -> bool {
        self.active
            .values()
            .chain(self.held.values())
            .any(|note| matches!(note.voice, Voice::Midi { note: sent } if sent == key))
    }

    fn fade(&self, output: &SampleOutput, handle: PoolHandle) {
        let Some((playback, gain)) = output.pool.units(handle) else {
            debug!(handle = %handle, "Voice was already reaped.");
            return;
        };

        let now = output.backend.current_time();
        let fadeout = self.envelope.fadeout.as_secs_f64();
        let current = gain.value();
        gain.cancel_scheduled_values(now);
        gain.set_value_at_time(current.max(FADE_FLOOR), now);
        gain.exponential_ramp_to_value_at_time(FADE_FLOOR, now + fadeout);
        if let Err(err) = playback.stop(now + fadeout + STOP_MARGIN.as_secs_f64()) {
            debug!(handle = %handle, err = %err, "Unable to schedule playback stop.");
        }

        let pool = Arc::clone(&output.pool);
        run_after(self.envelope.fadeout + STOP_MARGIN, move || {
            pool.release(handle);
        });
    }

    /// Moves every live sample gain to the current target without restarting it.
    fn retarget(&self) {
        let OutputTarget::Sample(output) = &self.output else {
            return;
        };

        let target = self.target_gain();
        let now = output.backend.current_time();
        let when = now + RETARGET_TIME.as_secs_f64();
        for note in self.sounding() {
            let Voice::Sample { handle } = note.voice else {
                continue;
            };
            if let Some((_, gain)) = output.pool.units(handle) {
                let current = gain.value();
                gain.cancel_scheduled_values(now);
                gain.set_value_at_time(current, now);
                ramp_to(gain.as_ref(), target, when);
            }
        }
    }
}

/// Owns the sounding notes. Note intents arrive keyed by grid coordinate; each one is resolved
/// against the current tuning and routed to MIDI or to sample playback.
pub struct NoteEventManager {
    state: Mutex<State>,
    observers: RwLock<Vec<Arc<dyn NoteObserver>>>,
    cancel_handle: CancelHandle,
}

impl NoteEventManager {
    /// Creates a manager without the stale note cleanup task.
    pub fn new(
        tuning: TuningConfig,
        envelope: EnvelopeConfig,
        output: OutputTarget,
    ) -> NoteEventManager {
        NoteEventManager {
            state: Mutex::new(State {
                tuning,
                envelope,
                output,
                harmony: None,
                active: HashMap::new(),
                held: HashMap::new(),
                sustain: false,
                volume: 1.0,
            }),
            observers: RwLock::new(Vec::new()),
            cancel_handle: CancelHandle::new(),
        }
    }

    /// Creates a manager and starts the stale note cleanup task. The task holds a weak reference
    /// and stops once the manager is dropped or shut down. Must be called within a tokio runtime.
    pub fn spawn(
        tuning: TuningConfig,
        envelope: EnvelopeConfig,
        output: OutputTarget,
    ) -> Arc<NoteEventManager> {
        let manager = Arc::new(NoteEventManager::new(tuning, envelope, output));
        let weak = Arc::downgrade(&manager);
        spawn_periodic(
            CLEANUP_INTERVAL,
            manager.cancel_handle.clone(),
            move || match weak.upgrade() {
                Some(manager) => {
                    let released = manager.cleanup_stale();
                    if released > 0 {
                        info!(released, "Released stale notes.");
                    }
                    true
                }
                None => false,
            },
        );
        manager
    }

    pub fn add_observer(&self, observer: Arc<dyn NoteObserver>) {
        self.observers.write().push(observer);
    }

    /// Starts a note. Returns false if the coordinate is already sounding. A coordinate held only
    /// by sustain is released and started again.
    pub fn note_on(&self, coord: Coord) -> bool {
        let span = span!(Level::DEBUG, "note on");
        let _enter = span.enter();

        let mut notifications = Vec::new();
        {
            let mut state = self.state.lock();
            if state.active.contains_key(&coord) {
                debug!(coord = %coord, "Note is already sounding.");
                return false;
            }
            if let Some(held) = state.held.remove(&coord) {
                debug!(coord = %coord, "Retriggering sustained note.");
                state.teardown(&held);
            }

            let pitch = resolve_pitch(coord, &state.tuning);
            let frequency = state.tuning.frequency(&pitch);
            let voice = state.start_voice(coord, &pitch, frequency);
            debug!(
                coord = %coord,
                cents = pitch.cents,
                frequency,
                voice = ?voice,
                "Note on."
            );
            state
                .active
                .insert(coord, ActiveNote::new(coord, pitch, frequency, voice));

            notifications.push(Notification::On(coord, pitch));
            notifications.extend(state.analysis().map(Notification::Analysis));
        }
        self.notify(notifications);
        true
    }

    /// Ends a note, or holds it if sustain is engaged. Returns false if the coordinate wasn't
    /// sounding, which happens routinely with overlapping gestures.
    pub fn note_off(&self, coord: Coord) -> bool {
        let span = span!(Level::DEBUG, "note off");
        let _enter = span.enter();

        let mut notifications = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(mut note) = state.active.remove(&coord) else {
                debug!(coord = %coord, "Note off for a coordinate that isn't sounding.");
                return false;
            };

            if state.sustain {
                debug!(coord = %coord, "Holding note for sustain.");
                note.sustained = true;
                state.held.insert(coord, note);
                return true;
            }

            debug!(coord = %coord, "Note off.");
            state.teardown(&note);
            notifications.push(Notification::Off(coord));
            notifications.extend(state.analysis().map(Notification::Analysis));
        }
        self.notify(notifications);
        true
    }

    /// Engages or releases sustain. Releasing ends every held note.
    pub fn set_sustain(&self, on: bool) {
        let mut notifications = Vec::new();
        {
            let mut state = self.state.lock();
            if state.sustain == on {
                return;
            }
            state.sustain = on;
            debug!(on, "Sustain changed.");
            if on {
                return;
            }

            let held = state
                .held
                .drain()
                .map(|(_, note)| note)
                .collect::<Vec<ActiveNote>>();
            for note in &held {
                state.teardown(note);
                notifications.push(Notification::Off(note.coord));
            }
            if !held.is_empty() {
                notifications.extend(state.analysis().map(Notification::Analysis));
            }
        }
        self.notify(notifications);
    }

    /// Scales the gain of every sample voice, including the ones already sounding.
    pub fn set_volume_multiplier(&self, multiplier: f32) {
        if !multiplier.is_finite() {
            warn!(multiplier, "Ignoring invalid volume multiplier.");
            return;
        }

        let mut state = self.state.lock();
        state.volume = multiplier.max(0.0);
        state.retarget();
    }

    /// Releases notes that have been sounding for longer than [STALE_NOTE_AGE]. Returns how many
    /// were released.
    pub fn cleanup_stale(&self) -> usize {
        let mut notifications = Vec::new();
        let released;
        {
            let mut state = self.state.lock();
            let stale = state
                .sounding()
                .filter(|note| note.age() > STALE_NOTE_AGE)
                .map(|note| note.coord)
                .collect::<Vec<Coord>>();

            for coord in &stale {
                let note = match state.active.remove(coord) {
                    Some(note) => Some(note),
                    None => state.held.remove(coord),
                };
                if let Some(note) = note {
                    debug!(coord = %coord, age = ?note.age(), "Releasing stale note.");
                    state.teardown(&note);
                    notifications.push(Notification::Off(note.coord));
                }
            }
            released = stale.len();
            if released > 0 {
                notifications.extend(state.analysis().map(Notification::Analysis));
            }
        }
        self.notify(notifications);
        released
    }

    /// Silences everything immediately and forgets all notes, sustained or not. Sustain is
    /// disengaged. Returns how many notes were tracked.
    pub fn release_all(&self) -> usize {
        let mut notifications = Vec::new();
        let released;
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let notes = state
                .active
                .drain()
                .chain(state.held.drain())
                .map(|(_, note)| note)
                .collect::<Vec<ActiveNote>>();
            state.sustain = false;

            match &state.output {
                OutputTarget::Midi(target) => {
                    for note in &notes {
                        if let Voice::Midi { note: key } = note.voice {
                            target.note_off(key);
                        }
                    }
                    target.all_sound_off();
                }
                OutputTarget::Sample(output) => {
                    output.pool.release_all();
                }
            }

            released = notes.len();
            if released > 0 {
                info!(released, "Released all notes.");
                notifications.extend(notes.iter().map(|note| Notification::Off(note.coord)));
                notifications.extend(state.analysis().map(Notification::Analysis));
            }
        }
        self.notify(notifications);
        released
    }

    /// Replaces the tuning. Sounding notes keep their pitch.
    pub fn retune(&self, tuning: TuningConfig) {
        info!(
            steps = tuning.scale.len(),
            r_steps = tuning.r_steps,
            ur_steps = tuning.ur_steps,
            "Retuning."
        );
        self.state.lock().tuning = tuning;
    }

    /// Replaces the envelope used by notes started from now on, and moves live gains to the new
    /// level.
    pub fn set_envelope(&self, envelope: EnvelopeConfig) {
        let mut state = self.state.lock();
        state.envelope = envelope;
        state.retarget();
    }

    /// Switches outputs. Everything sounding on the old output is released first.
    pub fn set_output(&self, output: OutputTarget) {
        self.release_all();
        info!(output = %output, "Switching output.");
        self.state.lock().output = output;
    }

    pub fn set_harmony(&self, system: Option<Arc<ChordSystem>>) {
        self.state.lock().harmony = system;
    }

    /// Returns every sounding coordinate, including held ones, in order.
    pub fn active_coords(&self) -> Vec<Coord> {
        let mut coords = self
            .state
            .lock()
            .sounding()
            .map(|note| note.coord)
            .collect::<Vec<Coord>>();
        coords.sort();
        coords
    }

    /// Returns the coordinates held only by sustain, in order.
    pub fn held_coords(&self) -> Vec<Coord> {
        let mut coords = self
            .state
            .lock()
            .held
            .keys()
            .copied()
            .collect::<Vec<Coord>>();
        coords.sort();
        coords
    }

    pub fn is_sustained(&self) -> bool {
        self.state.lock().sustain
    }

    pub fn volume_multiplier(&self) -> f32 {
        self.state.lock().volume
    }

    /// Analyzes the sounding notes. None when no chord system is configured.
    pub fn analysis(&self) -> Option<Analysis> {
        self.state.lock().analysis()
    }

    /// Stops the cleanup task and releases everything.
    pub fn shutdown(&self) {
        self.cancel_handle.cancel();
        self.release_all();
    }

    fn notify(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        let observers = self.observers.read().clone();
        for notification in &notifications {
            for observer in &observers {
                match notification {
                    Notification::On(coord, pitch) => observer.note_on(*coord, pitch),
                    Notification::Off(coord) => observer.note_off(*coord),
                    Notification::Analysis(analysis) => observer.analysis(analysis),
                }
            }
        }
    }
}

impl Drop for NoteEventManager {
    fn drop(&mut self) {
        self.cancel_handle.cancel();
    }
}

impl fmt::Debug for NoteEventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NoteEventManager")
            .field("output", &state.output.to_string())
            .field("active", &state.active.len())
            .field("held", &state.held.len())
            .field("sustain", &state.sustain)
            .field("volume", &state.volume)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;

    use crate::{
        audio::{
            mock,
            pool::{NodePool, SILENCE_THRESHOLD},
            GainUnit,
        },
        harmony::{self, Analysis},
        midi,
        notes::{EnvelopeConfig, MidiTarget, NoteObserver, OutputTarget, SampleOutput},
        samples::{CacheConfig, MemorySource, SampleCache},
        tuning::{Coord, Pitch, Scale, TuningConfig, DEFAULT_FUNDAMENTAL},
    };

    use super::NoteEventManager;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl NoteObserver for Recorder {
        fn note_on(&self, coord: Coord, _pitch: &Pitch) {
            self.events.lock().push(format!("on {}", coord));
        }

        fn note_off(&self, coord: Coord) {
            self.events.lock().push(format!("off {}", coord));
        }

        fn analysis(&self, analysis: &Analysis) {
            self.events.lock().push(format!("chord {}", analysis));
        }
    }

    fn close(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-4
    }

    async fn sample_output(load: bool) -> (OutputTarget, mock::Backend, Arc<NodePool>) {
        let backend = mock::Backend::get("mock-out");
        let cache = Arc::new(SampleCache::new(
            Arc::new(MemorySource::new().with_instrument("piano")),
            CacheConfig::default(),
        ));
        if load {
            cache.load_instrument("piano").await;
        }
        let pool = Arc::new(NodePool::new());
        let output = OutputTarget::Sample(SampleOutput {
            backend: Arc::new(backend.clone()),
            cache,
            pool: pool.clone(),
        });
        (output, backend, pool)
    }

    fn midi_output() -> (OutputTarget, midi::test::Device) {
        let device = midi::test::Device::get("mock-keys");
        let target = MidiTarget::new(Arc::new(device.clone()), &[1], 100);
        (OutputTarget::Midi(target), device)
    }

    fn manager(output: OutputTarget) -> NoteEventManager {
        NoteEventManager::new(TuningConfig::default(), EnvelopeConfig::default(), output)
    }

    #[tokio::test]
    async fn test_note_on_starts_pitched_voice() {
        let (output, backend, pool) = sample_output(true).await;
        let manager = manager(output);

        assert!(manager.note_on(Coord::new(0, 0)));
        assert_eq!(1, pool.len());

        let playback = &backend.playbacks()[0];
        // Middle C plays from the 220 Hz bucket.
        assert!((playback.rate() - DEFAULT_FUNDAMENTAL / 220.0).abs() < 1e-9);
        assert_eq!(Some(0.0), playback.started_at());

        let gain = &backend.gains()[0];
        assert!(gain.is_routed());
        assert_eq!(Some(gain.id()), playback.gain());
        assert!(close(SILENCE_THRESHOLD, gain.value_at(0.0)));
        assert!(close(0.3, gain.value_at(0.02)));
    }

    #[tokio::test]
    async fn test_note_on_is_idempotent() {
        let (output, backend, pool) = sample_output(true).await;
        let manager = manager(output);

        assert!(manager.note_on(Coord::new(1, 0)));
        assert!(!manager.note_on(Coord::new(1, 0)));
        assert_eq!(1, pool.len());
        assert_eq!(1, backend.playbacks().len());
        assert_eq!(vec![Coord::new(1, 0)], manager.active_coords());
    }

    #[tokio::test]
    async fn test_note_on_without_samples_is_silent_but_tracked() {
        let (output, backend, pool) = sample_output(false).await;
        let manager = manager(output);
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());

        assert!(manager.note_on(Coord::new(0, 1)));
        assert!(pool.is_empty());
        assert!(backend.playbacks().is_empty());
        assert_eq!(vec![Coord::new(0, 1)], manager.active_coords());
        assert_eq!(vec!["on (0, 1)".to_string()], recorder.events());

        assert!(manager.note_off(Coord::new(0, 1)));
        assert!(manager.active_coords().is_empty());
    }

    #[tokio::test]
    async fn test_closed_backend_is_silent() {
        let (output, backend, pool) = sample_output(true).await;
        let manager = manager(output);
        backend.close();

        assert!(manager.note_on(Coord::new(0, 0)));
        assert!(pool.is_empty());
        assert_eq!(vec![Coord::new(0, 0)], manager.active_coords());
    }

    #[tokio::test(start_paused = true)]
    async fn test_note_off_fades_and_releases() {
        let (output, backend, pool) = sample_output(true).await;
        let manager = manager(output);

        manager.note_on(Coord::new(0, 0));
        backend.advance(0.1);
        assert!(manager.note_off(Coord::new(0, 0)));
        assert!(manager.active_coords().is_empty());

        let playback = &backend.playbacks()[0];
        let gain = &backend.gains()[0];
        assert!(close(0.3, gain.value_at(0.1)));
        assert!(close(0.0001, gain.value_at(0.4)));
        let stopped_at = playback.stopped_at().unwrap();
        assert!((stopped_at - 0.45).abs() < 1e-9);

        // Still in the pool until the fade is over.
        assert_eq!(1, pool.len());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(pool.is_empty());
        assert!(playback.is_disconnected());
        assert!(gain.is_disconnected());
    }

    #[tokio::test]
    async fn test_unknown_note_off_is_ignored() {
        let (output, device) = midi_output();
        let manager = manager(output);
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());

        assert!(!manager.note_off(Coord::new(3, 3)));
        assert!(device.emitted().is_empty());
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_sustain_holds_notes_until_released() {
        let (output, backend, pool) = sample_output(true).await;
        let manager = manager(output);
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());

        manager.set_sustain(true);
        manager.note_on(Coord::new(0, 0));
        assert!(manager.note_off(Coord::new(0, 0)));

        assert_eq!(vec![Coord::new(0, 0)], manager.active_coords());
        assert_eq!(vec![Coord::new(0, 0)], manager.held_coords());
        assert_eq!(1, pool.len());
        let playback = &backend.playbacks()[0];
        assert_eq!(None, playback.stopped_at());

        manager.set_sustain(false);
        assert!(manager.active_coords().is_empty());
        assert!(manager.held_coords().is_empty());
        assert!(playback.stopped_at().is_some());
        assert_eq!(
            vec!["on (0, 0)".to_string(), "off (0, 0)".to_string()],
            recorder.events()
        );
    }

    #[tokio::test]
    async fn test_retrigger_of_held_note_starts_fresh() {
        let (output, backend, _pool) = sample_output(true).await;
        let manager = manager(output);

        manager.set_sustain(true);
        manager.note_on(Coord::new(0, 0));
        manager.note_off(Coord::new(0, 0));
        assert!(manager.note_on(Coord::new(0, 0)));

        let playbacks = backend.playbacks();
        assert_eq!(2, playbacks.len());
        assert!(playbacks[0].stopped_at().is_some());
        assert_eq!(None, playbacks[1].stopped_at());
        assert!(manager.held_coords().is_empty());
        assert_eq!(vec![Coord::new(0, 0)], manager.active_coords());
    }

    #[tokio::test]
    async fn test_volume_retargets_live_gains() {
        let (output, backend, _pool) = sample_output(true).await;
        let manager = manager(output);

        manager.note_on(Coord::new(0, 0));
        backend.advance(0.1);
        manager.set_volume_multiplier(0.5);
        let gain = &backend.gains()[0];
        assert!(close(0.3, gain.value_at(0.1)));
        assert!(close(0.15, gain.value_at(0.12)));

        // Silence ramps linearly.
        backend.advance(0.1);
        manager.set_volume_multiplier(0.0);
        assert!(close(0.075, gain.value_at(0.21)));
        assert!(close(0.0, gain.value_at(0.22)));

        manager.set_volume_multiplier(f32::NAN);
        assert_eq!(0.0, manager.volume_multiplier());

        // New notes start at the scaled gain.
        manager.set_volume_multiplier(0.5);
        manager.note_on(Coord::new(1, 0));
        let gain = &backend.gains()[1];
        assert!(close(0.15, gain.value_at(0.22)));
    }

    #[tokio::test]
    async fn test_midi_notes() {
        let (output, device) = midi_output();
        let manager = manager(output);

        // Two right, one up-right: 2 + 7 steps above middle C.
        assert!(manager.note_on(Coord::new(1, 1)));
        assert!(manager.note_off(Coord::new(1, 1)));
        assert_eq!(
            vec![vec![0x90, 69, 100], vec![0x80, 69, 0]],
            device.emitted()
        );
    }

    #[tokio::test]
    async fn test_midi_note_shared_by_two_keys() {
        let (output, device) = midi_output();
        let manager = manager(output);

        // Seven left, two up-right lands back on middle C.
        assert!(manager.note_on(Coord::new(0, 0)));
        assert!(manager.note_on(Coord::new(-7, 2)));
        device.reset();

        assert!(manager.note_off(Coord::new(0, 0)));
        assert!(device.emitted().is_empty());
        assert_eq!(vec![Coord::new(-7, 2)], manager.active_coords());

        assert!(manager.note_off(Coord::new(-7, 2)));
        assert_eq!(vec![vec![0x80, 60, 0]], device.emitted());
    }

    #[tokio::test]
    async fn test_midi_out_of_range_is_silent() {
        let (output, device) = midi_output();
        let manager = manager(output);

        assert!(manager.note_on(Coord::new(0, 10)));
        assert!(device.emitted().is_empty());
        assert_eq!(vec![Coord::new(0, 10)], manager.active_coords());
    }

    #[tokio::test]
    async fn test_release_all_midi() {
        let (output, device) = midi_output();
        let manager = manager(output);

        manager.note_on(Coord::new(0, 0));
        manager.set_sustain(true);
        device.reset();

        assert_eq!(1, manager.release_all());
        assert!(manager.active_coords().is_empty());
        assert!(!manager.is_sustained());
        assert_eq!(
            vec![
                vec![0x80, 60, 0],
                vec![0xB0, 120, 0],
                vec![0xB0, 123, 0]
            ],
            device.emitted()
        );
    }

    #[tokio::test]
    async fn test_release_all_samples() {
        let (output, _backend, pool) = sample_output(true).await;
        let manager = manager(output);

        manager.note_on(Coord::new(0, 0));
        manager.note_on(Coord::new(1, 0));
        manager.set_sustain(true);
        manager.note_off(Coord::new(1, 0));
        assert_eq!(2, pool.len());

        assert_eq!(2, manager.release_all());
        assert!(pool.is_empty());
        assert!(manager.active_coords().is_empty());
        assert!(manager.held_coords().is_empty());
    }

    #[tokio::test]
    async fn test_set_output_releases_old_notes() {
        let (output, device) = midi_output();
        let manager = manager(output);
        manager.note_on(Coord::new(0, 0));

        let (samples, _backend, pool) = sample_output(true).await;
        manager.set_output(samples);
        assert!(device.emitted().contains(&vec![0x80, 60, 0]));

        manager.note_on(Coord::new(0, 0));
        assert_eq!(1, pool.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stale() {
        let (output, device) = midi_output();
        let manager = manager(output);

        manager.note_on(Coord::new(0, 0));
        tokio::time::advance(Duration::from_secs(10)).await;
        manager.note_on(Coord::new(1, 0));
        assert_eq!(0, manager.cleanup_stale());

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(1, manager.cleanup_stale());
        assert_eq!(vec![Coord::new(1, 0)], manager.active_coords());
        assert!(device.emitted().contains(&vec![0x80, 60, 0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup() {
        let (output, _device) = midi_output();
        let manager = NoteEventManager::spawn(
            TuningConfig::default(),
            EnvelopeConfig::default(),
            output,
        );

        manager.note_on(Coord::new(0, 0));
        tokio::time::sleep(Duration::from_secs(36)).await;
        assert!(manager.active_coords().is_empty());
    }

    #[tokio::test]
    async fn test_chord_analysis_reaches_observers() {
        let (output, _device) = midi_output();
        let tuning = TuningConfig {
            scale: Scale::equal(53, 1200.0),
            r_steps: 1,
            ur_steps: 0,
            ..Default::default()
        };
        let manager = NoteEventManager::new(tuning, EnvelopeConfig::default(), output);
        manager.set_harmony(harmony::system("53edo"));
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());

        for r in [0, 17, 31] {
            manager.note_on(Coord::new(r, 0));
        }
        assert_eq!(
            Some("chord C downmajor".to_string()),
            recorder.events().last().cloned()
        );
        match manager.analysis() {
            Some(Analysis::Chord(chord)) => assert_eq!(Some(0), chord.inversion),
            other => panic!("expected a chord, got {:?}", other),
        }

        manager.note_off(Coord::new(0, 0));
        assert!(matches!(
            manager.analysis(),
            Some(Analysis::Interval { .. })
        ));
    }
}
