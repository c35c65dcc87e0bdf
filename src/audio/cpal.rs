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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{
    automation::Timeline,
    mixer::{Command, GainShared, Mixer, PlaybackShared, VoiceState},
    next_node_id, AudioError, NodeId, SampleBuffer,
};
use crate::config;

/// A backend rendering to a cpal output device. The stream lives on its own thread and mixes
/// every registered unit in the device callback.
pub struct Backend {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// Output channel count.
    num_channels: u16,
    /// Output sample rate.
    sample_rate: u32,
    /// Frames rendered by the stream. This is the backend clock.
    frames_rendered: Arc<AtomicU64>,
    /// Registers new units with the mixer.
    commands: crossbeam_channel::Sender<Command>,
    /// Tells the stream thread to exit.
    shutdown: Arc<AtomicBool>,
    /// Handle to the stream thread (keeps the stream alive).
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name,
            self.num_channels,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

/// Integer callback: mix into f32 scratch and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mut mixer: Mixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.process_into_output(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

/// Finds a device by name across all hosts. "default" selects the default host's default output.
fn find_device(name: &str) -> Result<(cpal::HostId, cpal::Device), Box<dyn Error>> {
    if name == "default" {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("no default output device")?;
        return Ok((host.id(), device));
    }

    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok((host_id, device));
            }
        }
    }

    Err(format!("no device found with name {}", name).into())
}

impl Backend {
    /// Lists output devices across all hosts.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let mut names: Vec<String> = Vec::new();
        for host_id in cpal::available_hosts() {
            let devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in devices {
                let has_outputs = device
                    .supported_output_configs()
                    .map(|mut configs| configs.next().is_some())
                    .unwrap_or(false);
                if has_outputs {
                    names.push(format!("{} ({})", device.name()?, host_id.name()));
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Opens the configured device and starts its output stream.
    pub fn get(config: &config::Audio) -> Result<Backend, Box<dyn Error>> {
        let span = span!(Level::INFO, "audio backend (cpal)");
        let _enter = span.enter();

        let (host_id, device) = find_device(config.device())?;
        let name = device.name()?;
        let default_config = device.default_output_config()?;
        let num_channels = default_config.channels();
        let sample_format = default_config.sample_format();
        let sample_rate = config.sample_rate();

        let (commands, command_rx) = crossbeam_channel::unbounded();
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mixer = Mixer::new(num_channels, sample_rate, command_rx, frames_rendered.clone());

        // cpal streams aren't Send everywhere, so the stream is built and owned by its thread.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let thread_shutdown = shutdown.clone();
        let stream_thread = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: num_channels,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => {
                    let mut mixer = mixer;
                    device.build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            mixer.process_into_output(data);
                        },
                        on_error,
                        None,
                    )
                }
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &stream_config,
                    create_converting_callback::<i16>(mixer),
                    on_error,
                    None,
                ),
                cpal::SampleFormat::I32 => device.build_output_stream(
                    &stream_config,
                    create_converting_callback::<i32>(mixer),
                    on_error,
                    None,
                ),
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {}", other)));
                    return;
                }
            };

            let stream = match stream_result {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create CPAL stream: {}", e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start CPAL stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while !thread_shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
            debug!("CPAL output stream stopped");
        });

        ready_rx.recv()??;

        info!(
            device = name,
            channels = num_channels,
            sample_rate,
            "CPAL output stream started."
        );

        Ok(Backend {
            name,
            host_id,
            num_channels,
            sample_rate,
            frames_rendered,
            commands,
            shutdown,
            stream_thread: Some(stream_thread),
        })
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.stream_thread.take() {
            let _ = thread.join();
        }
    }
}

impl super::Backend for Backend {
    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn create_playback(
        &self,
        buffer: SampleBuffer,
    ) -> Result<Arc<dyn super::PlaybackUnit>, AudioError> {
        let shared = Arc::new(PlaybackShared {
            id: next_node_id(),
            buffer,
            state: Mutex::new(VoiceState {
                rate: 1.0,
                ..Default::default()
            }),
        });
        self.commands
            .send(Command::Playback(shared.clone()))
            .map_err(|_| AudioError::Closed)?;
        Ok(Arc::new(Playback { shared }))
    }

    fn create_gain(&self) -> Result<Arc<dyn super::GainUnit>, AudioError> {
        let shared = Arc::new(GainShared {
            id: next_node_id(),
            timeline: Mutex::new(Timeline::default()),
            routed: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        });
        self.commands
            .send(Command::Gain(shared.clone()))
            .map_err(|_| AudioError::Closed)?;
        Ok(Arc::new(Gain {
            shared,
            frames_rendered: self.frames_rendered.clone(),
            sample_rate: self.sample_rate,
        }))
    }
}

struct Playback {
    shared: Arc<PlaybackShared>,
}

impl super::PlaybackUnit for Playback {
    fn id(&self) -> NodeId {
        self.shared.id
    }

    fn set_playback_rate(&self, rate: f64) {
        self.shared.state.lock().rate = rate;
    }

    fn start(&self, when: f64) -> Result<(), AudioError> {
        let mut state = self.shared.state.lock();
        if state.start.is_some() {
            return Err(AudioError::AlreadyStarted(self.shared.id));
        }
        state.start = Some(when);
        Ok(())
    }

    fn stop(&self, when: f64) -> Result<(), AudioError> {
        let mut state = self.shared.state.lock();
        if state.start.is_none() {
            return Err(AudioError::NotStarted(self.shared.id));
        }
        if state.stop.is_some() {
            return Err(AudioError::AlreadyStopped(self.shared.id));
        }
        state.stop = Some(when);
        Ok(())
    }

    fn connect(&self, gain: &dyn super::GainUnit) -> Result<(), AudioError> {
        let mut state = self.shared.state.lock();
        if state.disconnected {
            return Err(AudioError::Disconnected(self.shared.id));
        }
        state.gain = Some(gain.id());
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AudioError> {
        let mut state = self.shared.state.lock();
        if state.disconnected {
            return Err(AudioError::Disconnected(self.shared.id));
        }
        state.disconnected = true;
        state.gain = None;
        Ok(())
    }
}

struct Gain {
    shared: Arc<GainShared>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
}

impl super::GainUnit for Gain {
    fn id(&self) -> NodeId {
        self.shared.id
    }

    fn value(&self) -> f32 {
        let now = self.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64;
        self.shared.timeline.lock().value_at(now)
    }

    fn set_value_at_time(&self, value: f32, when: f64) {
        self.shared.timeline.lock().set_value_at_time(value, when);
    }

    fn linear_ramp_to_value_at_time(&self, value: f32, when: f64) {
        self.shared
            .timeline
            .lock()
            .linear_ramp_to_value_at_time(value, when);
    }

    fn exponential_ramp_to_value_at_time(&self, value: f32, when: f64) {
        self.shared
            .timeline
            .lock()
            .exponential_ramp_to_value_at_time(value, when);
    }

    fn cancel_scheduled_values(&self, from: f64) {
        self.shared.timeline.lock().cancel_scheduled_values(from);
    }

    fn connect_to_output(&self) -> Result<(), AudioError> {
        if self.shared.disconnected.load(Ordering::Relaxed) {
            return Err(AudioError::Disconnected(self.shared.id));
        }
        self.shared.routed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), AudioError> {
        if self.shared.disconnected.swap(true, Ordering::Relaxed) {
            return Err(AudioError::Disconnected(self.shared.id));
        }
        self.shared.routed.store(false, Ordering::Relaxed);
        Ok(())
    }
}
