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
use std::{error::Error, fmt, sync::Arc};

use midly::live::LiveEvent;
use thiserror::Error;

mod midir;
mod mock;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("unable to initialize MIDI output: {0}")]
    Init(String),
    #[error("unable to connect to MIDI device {device}: {reason}")]
    Connect { device: String, reason: String },
    #[error("unable to encode MIDI event: {0}")]
    Encode(String),
    #[error("unable to send MIDI event to {device}: {reason}")]
    Send { device: String, reason: String },
}

/// A MIDI output device that notes are sent to.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Emits an event.
    fn emit(&self, event: LiveEvent<'static>) -> Result<(), MidiError>;
}

/// Encodes a live event into its wire bytes.
pub(crate) fn encode(event: &LiveEvent<'static>) -> Result<Vec<u8>, MidiError> {
    // Channel messages are never longer than three bytes.
    let mut buf: Vec<u8> = Vec::with_capacity(8);
    event
        .write(&mut buf)
        .map_err(|err| MidiError::Encode(err.to_string()))?;
    Ok(buf)
}

/// Lists output devices known to midir.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::Device::get(name)?))
}
