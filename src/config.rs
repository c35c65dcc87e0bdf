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
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

mod audio;
mod error;
mod harmony;
mod instrument;
mod midi;
mod samples;
mod tuning;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::harmony::Harmony;
pub use self::instrument::Instrument;
pub use self::midi::Midi;
pub use self::samples::Samples;
pub use self::tuning::Tuning;

/// Parses an optional duration string such as `300ms`, falling back to the default when unset.
pub(crate) fn parse_duration(
    field: &str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => DurationString::from_string(value.clone())
            .map(Duration::from)
            .map_err(|err| ConfigError::Invalid {
                field: field.to_string(),
                reason: err.to_string(),
            }),
        None => Ok(default),
    }
}

/// The keyboard configuration. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct KeyboardConfig {
    #[serde(default)]
    tuning: Tuning,

    #[serde(default)]
    instrument: Instrument,

    #[serde(default)]
    samples: Samples,

    /// Sends notes to a MIDI device instead of playing samples.
    midi: Option<Midi>,

    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    harmony: Harmony,

    /// The directory relative paths are resolved against.
    #[serde(skip)]
    base_path: Option<PathBuf>,
}

impl KeyboardConfig {
    /// Parse a keyboard configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<KeyboardConfig, ConfigError> {
        let mut config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<KeyboardConfig>()?;
        config.base_path = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse a keyboard configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<KeyboardConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<KeyboardConfig>()?)
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn tuning_mut(&mut self) -> &mut Tuning {
        &mut self.tuning
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn instrument_mut(&mut self) -> &mut Instrument {
        &mut self.instrument
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn harmony(&self) -> &Harmony {
        &self.harmony
    }

    /// Returns the directory relative paths are resolved against.
    pub fn base_path(&self) -> PathBuf {
        self.base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
