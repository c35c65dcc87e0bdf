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
use serde::Deserialize;

use crate::notes::{EnvelopeConfig, DEFAULT_GAIN};

use super::{error::ConfigError, parse_duration};

const DEFAULT_INSTRUMENT: &str = "piano";

/// A YAML representation of the instrument played from samples.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Instrument {
    /// The instrument name, used to find its samples.
    name: Option<String>,

    /// Gain at full volume (default: 0.3)
    gain: Option<f32>,

    /// Time taken to fade in, e.g. 20ms.
    attack: Option<String>,

    /// Time taken to fade out after note off, e.g. 300ms.
    fadeout: Option<String>,
}

impl Instrument {
    /// Returns the instrument name.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_INSTRUMENT)
    }

    /// Switches to another instrument.
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    /// Builds the envelope snapshot.
    pub fn envelope(&self) -> Result<EnvelopeConfig, ConfigError> {
        let defaults = EnvelopeConfig::default();
        let gain = self.gain.unwrap_or(DEFAULT_GAIN);
        if !gain.is_finite() || gain < 0.0 {
            return Err(ConfigError::Invalid {
                field: "instrument.gain".to_string(),
                reason: format!("{} is not a non-negative number", gain),
            });
        }

        Ok(EnvelopeConfig {
            gain,
            attack: parse_duration("instrument.attack", &self.attack, defaults.attack)?,
            fadeout: parse_duration("instrument.fadeout", &self.fadeout, defaults.fadeout)?,
        })
    }
}
