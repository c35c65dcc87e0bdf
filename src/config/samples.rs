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
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::samples::{CacheConfig, DirectorySource};

use super::{error::ConfigError, parse_duration};

const DEFAULT_DIRECTORY: &str = "samples";
const DEFAULT_EXTENSION: &str = "wav";

/// A YAML representation of where samples come from and how they're loaded.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Samples {
    /// Directory holding `<instrument><bucket>.<extension>` files, e.g. `piano440.wav`. Relative
    /// paths are resolved against the configuration file's directory.
    directory: Option<PathBuf>,

    /// Sample file extension (default: wav)
    extension: Option<String>,

    /// Instrument used when another one's samples can't be loaded (default: piano)
    fallback: Option<String>,

    /// Retries after the first failed attempt (default: 3)
    max_retries: Option<u32>,

    /// Delay before the first retry, growing linearly with each attempt, e.g. 500ms.
    retry_base_delay: Option<String>,
}

impl Samples {
    /// Returns the sample directory, resolved against `base`.
    pub fn directory(&self, base: &Path) -> PathBuf {
        let directory = self
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY));
        if directory.is_absolute() {
            directory
        } else {
            base.join(directory)
        }
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_EXTENSION)
    }

    /// Builds the asset source for the sample directory.
    pub fn source(&self, base: &Path) -> DirectorySource {
        DirectorySource::new(&self.directory(base), self.extension())
    }

    /// Builds the cache snapshot.
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let defaults = CacheConfig::default();
        Ok(CacheConfig {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_base_delay: parse_duration(
                "samples.retry_base_delay",
                &self.retry_base_delay,
                defaults.retry_base_delay,
            )?,
            fallback: self.fallback.clone().unwrap_or(defaults.fallback),
        })
    }
}
