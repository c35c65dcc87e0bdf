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
use std::{error::Error, io, path::Path, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, warn, Level};

use crate::{
    audio::{self, pool::NodePool},
    config::{ConfigError, KeyboardConfig},
    harmony::Analysis,
    midi,
    notes::{MidiTarget, NoteEventManager, NoteObserver, OutputTarget, SampleOutput},
    samples::{BucketStatus, PitchBucket, SampleCache},
    tuning::{Coord, Pitch},
};

pub mod keyboard;

/// Controller events that drive the keyboard.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A key at the coordinate went down.
    NoteOn(Coord),

    /// A key at the coordinate went up.
    NoteOff(Coord),

    /// The sustain control was engaged or released.
    Sustain(bool),

    /// Scales the gain of every sample voice.
    Volume(f32),

    /// Switches to another sampled instrument.
    Instrument(String),

    /// Shifts every new note by whole equivalence intervals.
    Octave(i32),

    /// Silences everything.
    Panic,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Logs note transitions and chord labels.
pub struct LogObserver {}

impl NoteObserver for LogObserver {
    fn note_on(&self, coord: Coord, pitch: &Pitch) {
        debug!(coord = %coord, cents = pitch.cents, step = pitch.reduced_step, "Key down.");
    }

    fn note_off(&self, coord: Coord) {
        debug!(coord = %coord, "Key up.");
    }

    fn analysis(&self, analysis: &Analysis) {
        if *analysis != Analysis::Silence {
            info!(chord = %analysis, "Sounding.");
        }
    }
}

/// Owns the configuration and the note manager. Configuration changes are applied by handing
/// the manager fresh snapshots.
pub struct Controller {
    config: Mutex<KeyboardConfig>,
    manager: Arc<NoteEventManager>,
    samples: Option<SampleOutput>,
}

impl Controller {
    /// Creates a new controller around an existing manager.
    pub fn new(
        config: KeyboardConfig,
        manager: Arc<NoteEventManager>,
        samples: Option<SampleOutput>,
    ) -> Controller {
        let tuning = config.tuning().to_tuning_config();
        manager.set_harmony(config.harmony().system(&tuning.scale));
        Controller {
            config: Mutex::new(config),
            manager,
            samples,
        }
    }

    /// Builds the whole keyboard from a configuration file: the output, the note manager and,
    /// for sample playback, the cache and the resource pool. The configured instrument starts
    /// loading in the background. Must be called within a tokio runtime.
    pub fn init_from_config(path: &Path) -> Result<Arc<Controller>, Box<dyn Error>> {
        let config = KeyboardConfig::deserialize(path)?;
        let tuning = config.tuning().to_tuning_config();
        let envelope = config.instrument().envelope()?;

        let (output, samples) = match config.midi() {
            Some(midi) => {
                let device = midi::get_device(midi.device())?;
                info!(device = %device, "Sending notes to MIDI.");
                let target = MidiTarget::new(device, &midi.channels(), midi.velocity());
                (OutputTarget::Midi(target), None)
            }
            None => {
                let backend = audio::get_backend(config.audio())?;
                info!(backend = %backend, "Playing samples.");
                let source = config.samples().source(&config.base_path());
                let cache = Arc::new(SampleCache::new(
                    Arc::new(source),
                    config.samples().cache_config()?,
                ));
                let samples = SampleOutput {
                    backend,
                    cache,
                    pool: NodePool::spawn(),
                };
                (OutputTarget::Sample(samples.clone()), Some(samples))
            }
        };

        let manager = NoteEventManager::spawn(tuning, envelope, output);
        manager.add_observer(Arc::new(LogObserver {}));
        let controller = Arc::new(Controller::new(config, manager, samples));

        let instrument = controller.config.lock().instrument().name().to_string();
        controller.load_instrument(&instrument);
        Ok(controller)
    }

    pub fn manager(&self) -> &Arc<NoteEventManager> {
        &self.manager
    }

    pub fn samples(&self) -> Option<&SampleOutput> {
        self.samples.as_ref()
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> KeyboardConfig {
        self.config.lock().clone()
    }

    /// Applies a single event. Never waits on sample loading. Must be called within a tokio
    /// runtime.
    pub fn handle(&self, event: Event) -> Result<(), ConfigError> {
        match event {
            Event::NoteOn(coord) => {
                self.manager.note_on(coord);
            }
            Event::NoteOff(coord) => {
                self.manager.note_off(coord);
            }
            Event::Sustain(on) => self.manager.set_sustain(on),
            Event::Volume(multiplier) => self.manager.set_volume_multiplier(multiplier),
            Event::Instrument(name) => self.set_instrument(&name)?,
            Event::Octave(octaves) => self.shift_octave(octaves),
            Event::Panic => {
                self.manager.release_all();
            }
        }
        Ok(())
    }

    /// Switches instruments. The samples load in the background and notes played until they
    /// arrive are silent.
    pub fn set_instrument(&self, name: &str) -> Result<(), ConfigError> {
        let envelope = {
            let mut config = self.config.lock();
            config.instrument_mut().set_name(name);
            config.instrument().envelope()?
        };
        self.manager.set_envelope(envelope);
        self.load_instrument(name);
        Ok(())
    }

    /// Moves the keyboard by whole equivalence intervals and republishes the tuning.
    pub fn shift_octave(&self, octaves: i32) {
        let tuning = {
            let mut config = self.config.lock();
            config.tuning_mut().shift_octave(octaves);
            config.tuning().to_tuning_config()
        };
        self.manager.retune(tuning);
    }

    fn load_instrument(&self, name: &str) {
        let Some(samples) = &self.samples else {
            debug!(instrument = name, "Not playing samples, nothing to load.");
            return;
        };
        let cache = samples.cache.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            cache.load_instrument(&name).await;
            report_loaded(&cache, &name);
        });
    }

    /// Watches the driver and applies its events until it stops, then releases everything.
    pub fn run(self: Arc<Self>, driver: Arc<dyn Driver>) -> JoinHandle<()> {
        let span = span!(Level::INFO, "controller");
        tokio::spawn(tracing::Instrument::instrument(
            async move { self.trigger_events(driver).await },
            span,
        ))
    }

    async fn trigger_events(&self, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);
        info!("Controller started.");

        while let Some(event) = events_rx.recv().await {
            debug!(event = ?event, "Received event.");
            if let Err(e) = self.handle(event) {
                error!(err = %e, "Error applying event.");
            }
        }

        info!("Controller closing.");
        self.manager.shutdown();
        match join_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(err = %e, "Event monitor failed."),
            Err(e) => error!(err = %e, "Error waiting for event monitor to stop."),
        }
    }
}

/// Logs buckets that were substituted or lost. Says nothing if another instrument has been
/// selected since.
fn report_loaded(cache: &SampleCache, instrument: &str) {
    if cache.instrument().as_deref() != Some(instrument) {
        return;
    }
    for bucket in PitchBucket::ALL {
        match cache.bucket_status(bucket) {
            BucketStatus::Ready {
                instrument: loaded, ..
            } if loaded != instrument => {
                warn!(instrument, %bucket, fallback = %loaded, "Playing bucket from the fallback.");
            }
            _ => {}
        }
    }
    if !cache.has_loaded_samples() {
        error!(instrument, "No samples could be loaded, notes will be silent.");
    }
}

#[cfg(test)]
mod test {
    use std::{fs, io, sync::Arc, time::Duration};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::{mock, pool::NodePool},
        config::KeyboardConfig,
        midi,
        notes::{EnvelopeConfig, MidiTarget, NoteEventManager, OutputTarget, SampleOutput},
        samples::{CacheConfig, MemorySource, SampleCache},
        testutil::{eventually_async, write_instrument},
        tuning::Coord,
    };

    use super::{Controller, Driver, Event};

    /// Sends a fixed list of events, then closes.
    struct ScriptDriver {
        events: Vec<Event>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::spawn(async move {
                for event in events {
                    events_tx
                        .send(event)
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
                Ok(())
            })
        }
    }

    /// Sends a fixed list of events, then holds the channel open.
    struct HoldingDriver {
        events: Vec<Event>,
    }

    impl Driver for HoldingDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::spawn(async move {
                for event in events {
                    events_tx
                        .send(event)
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
                std::future::pending::<()>().await;
                Ok(())
            })
        }
    }

    fn midi_controller(yaml: &str) -> (Arc<Controller>, midi::test::Device) {
        let config = KeyboardConfig::from_yaml(yaml).unwrap();
        let device = midi::test::Device::get("mock-keys");
        let target = MidiTarget::new(Arc::new(device.clone()), &[1], 100);
        let manager = Arc::new(NoteEventManager::new(
            config.tuning().to_tuning_config(),
            EnvelopeConfig::default(),
            OutputTarget::Midi(target),
        ));
        (Arc::new(Controller::new(config, manager, None)), device)
    }

    /// A sample controller whose cache already holds piano. Every fetch takes a second.
    async fn sample_controller() -> (Arc<Controller>, SampleOutput) {
        let source = MemorySource::new()
            .with_instrument("piano")
            .with_delay(Duration::from_secs(1));
        let cache = Arc::new(SampleCache::new(Arc::new(source), CacheConfig::default()));
        cache.load_instrument("piano").await;
        let samples = SampleOutput {
            backend: Arc::new(mock::Backend::get("mock-out")),
            cache,
            pool: Arc::new(NodePool::new()),
        };
        let config = KeyboardConfig::from_yaml("").unwrap();
        let manager = Arc::new(NoteEventManager::new(
            config.tuning().to_tuning_config(),
            EnvelopeConfig::default(),
            OutputTarget::Sample(samples.clone()),
        ));
        let controller = Arc::new(Controller::new(config, manager, Some(samples.clone())));
        (controller, samples)
    }

    #[tokio::test(start_paused = true)]
    async fn test_instrument_switch_does_not_hold_back_notes() {
        let (controller, samples) = sample_controller().await;
        let driver = Arc::new(HoldingDriver {
            events: vec![
                Event::Instrument("missing".to_string()),
                Event::NoteOn(Coord::new(0, 0)),
            ],
        });
        let run = controller.clone().run(driver);

        // Loading "missing" retries for seconds before falling back. The note can't wait.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(samples.cache.is_loading());
        assert_eq!(vec![Coord::new(0, 0)], controller.manager().active_coords());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!samples.cache.is_loading());
        assert!(samples.cache.has_loaded_samples());
        assert_eq!(Some("missing".to_string()), samples.cache.instrument());

        run.abort();
        controller.manager().shutdown();
    }

    #[tokio::test]
    async fn test_controller_runs_script() {
        let (controller, device) = midi_controller("");
        let driver = Arc::new(ScriptDriver {
            events: vec![
                Event::NoteOn(Coord::new(0, 0)),
                Event::Sustain(true),
                Event::NoteOff(Coord::new(0, 0)),
                Event::NoteOn(Coord::new(1, 0)),
                Event::Panic,
                Event::Octave(1),
                Event::NoteOn(Coord::new(0, 0)),
            ],
        });

        let manager = controller.manager().clone();
        controller.run(driver).await.unwrap();

        let emitted = device.emitted();
        assert_eq!(vec![0x90, 60, 100], emitted[0]);
        assert_eq!(vec![0x90, 62, 100], emitted[1]);
        assert!(emitted.contains(&vec![0xB0, 120, 0]));
        // An octave up after the panic.
        assert!(emitted.contains(&vec![0x90, 72, 100]));
        // Closing the driver shuts everything down.
        assert!(manager.active_coords().is_empty());
        assert_eq!(vec![0x80, 72, 0], device.emitted()[emitted.len() - 3]);
    }

    #[tokio::test]
    async fn test_shift_octave_republishes_tuning() {
        let (controller, device) = midi_controller("tuning:\n  octave_offset: -1\n");
        controller.shift_octave(2);
        assert_eq!(1, controller.config().tuning().to_tuning_config().octave_offset);

        controller.handle(Event::NoteOn(Coord::new(0, 0))).unwrap();
        assert_eq!(vec![vec![0x90, 72, 100]], device.emitted());
    }

    #[tokio::test]
    async fn test_harmony_follows_scale() {
        let (controller, _device) = midi_controller("tuning:\n  scale: \"1200.0\"\n");
        // A single-degree scale has no chord system.
        assert!(controller.manager().analysis().is_none());

        let (controller, _device) = midi_controller("");
        controller.handle(Event::NoteOn(Coord::new(0, 0))).unwrap();
        assert_eq!("C", controller.manager().analysis().unwrap().to_string());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_init_from_config_plays_samples() {
        let dir = tempfile::tempdir().unwrap();
        let sounds = dir.path().join("sounds");
        fs::create_dir(&sounds).unwrap();
        write_instrument(&sounds, "piano", 8000).unwrap();
        write_instrument(&sounds, "organ", 8000).unwrap();

        let path = dir.path().join("keyboard.yaml");
        fs::write(
            &path,
            "audio:\n  device: mock-audio\nsamples:\n  directory: sounds\n  max_retries: 0\n",
        )
        .unwrap();

        let controller = Controller::init_from_config(&path).unwrap();
        let samples = controller.samples().unwrap().clone();
        eventually_async(
            || {
                let cache = samples.cache.clone();
                async move { cache.has_loaded_samples() && !cache.is_loading() }
            },
            "Samples never loaded",
        )
        .await;

        controller.handle(Event::NoteOn(Coord::new(0, 0))).unwrap();
        assert_eq!(1, samples.pool.len());

        controller
            .handle(Event::Instrument("organ".to_string()))
            .unwrap();
        assert_eq!("organ", controller.config().instrument().name());
        eventually_async(
            || {
                let cache = samples.cache.clone();
                async move {
                    cache.instrument().as_deref() == Some("organ")
                        && cache.has_loaded_samples()
                        && !cache.is_loading()
                }
            },
            "Organ never loaded",
        )
        .await;

        controller.handle(Event::Panic).unwrap();
        assert!(samples.pool.is_empty());
        controller.manager().shutdown();
    }

    #[tokio::test]
    async fn test_init_from_config_midi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyboard.yaml");
        fs::write(&path, "midi:\n  device: mock-keys\n  channels: [2]\n").unwrap();

        let controller = Controller::init_from_config(&path).unwrap();
        assert!(controller.samples().is_none());
        controller.handle(Event::NoteOn(Coord::new(0, 0))).unwrap();
        assert_eq!(vec![Coord::new(0, 0)], controller.manager().active_coords());
        controller.manager().shutdown();
    }
}
