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
use std::{error::Error, fmt};

use midir::{MidiOutput, MidiOutputConnection};
use midly::live::LiveEvent;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::MidiError;

/// A midir output port with a connection held open for the life of the device.
pub struct Device {
    name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl Device {
    /// Connects to the single output port whose name contains the given name.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        let output =
            MidiOutput::new("isokey output").map_err(|err| MidiError::Init(err.to_string()))?;
        let mut matches = Vec::new();
        for port in output.ports() {
            let port_name = output.port_name(&port)?;
            if port_name.contains(name) {
                matches.push((port_name, port));
            }
        }

        if matches.is_empty() {
            return Err(format!("no device found with name {}", name).into());
        }
        if matches.len() > 1 {
            return Err(format!(
                "found too many devices that match ({}), use a less ambiguous device name",
                matches
                    .iter()
                    .map(|(port_name, _)| port_name.clone())
                    .collect::<Vec<String>>()
                    .join(", ")
            )
            .into());
        }

        let (port_name, port) = matches.swap_remove(0);
        let connection = output
            .connect(&port, "isokey notes")
            .map_err(|err| MidiError::Connect {
                device: port_name.clone(),
                reason: err.to_string(),
            })?;
        info!(device = port_name, "Connected to MIDI output.");

        Ok(Device {
            name: port_name,
            connection: Mutex::new(connection),
        })
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn emit(&self, event: LiveEvent<'static>) -> Result<(), MidiError> {
        debug!(device = self.name, event = ?event, "Emitting event.");

        let buf = super::encode(&event)?;
        self.connection
            .lock()
            .send(&buf)
            .map_err(|err| MidiError::Send {
                device: self.name.clone(),
                reason: err.to_string(),
            })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

/// Lists the names of all midir output ports.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let output = MidiOutput::new("isokey output listing")?;
    let mut names = output
        .ports()
        .iter()
        .map(|port| output.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    names.sort();
    Ok(names)
}
