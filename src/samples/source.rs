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
    io,
    path::{Path, PathBuf},
};

use futures_util::future::BoxFuture;
#[cfg(test)]
use futures_util::FutureExt;

use super::SampleError;

/// Fetches raw sample assets by name. Asset names are `{instrument}{bucket}`, e.g. `piano440`.
pub trait AssetSource: Send + Sync {
    /// Fetches the bytes of the named asset.
    fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SampleError>>;

    /// Returns the file extension of the assets, used as a decoder hint.
    fn extension(&self) -> &str;
}

/// Serves assets from a directory as `{directory}/{name}.{extension}`.
pub struct DirectorySource {
    directory: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(directory: &Path, extension: &str) -> DirectorySource {
        DirectorySource {
            directory: directory.to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Returns the path the named asset is read from.
    pub fn path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, self.extension))
    }
}

impl AssetSource for DirectorySource {
    fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SampleError>> {
        Box::pin(async move {
            let path = self.path(name);
            let result = tokio::fs::read(&path).await;
            match result {
                Ok(bytes) => Ok(bytes),
                Err(source) if source.kind() == io::ErrorKind::NotFound => {
                    Err(SampleError::NotFound(name.to_string()))
                }
                Err(source) => Err(SampleError::Io { path, source }),
            }
        })
    }

    fn extension(&self) -> &str {
        &self.extension
    }
}

/// An in-memory asset source that can be told to fail.
#[cfg(test)]
pub struct MemorySource {
    assets: std::collections::HashMap<String, Vec<u8>>,
    failures: parking_lot::Mutex<std::collections::HashMap<String, usize>>,
    fetches: parking_lot::Mutex<std::collections::HashMap<String, usize>>,
    delay: std::time::Duration,
}

#[cfg(test)]
impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource {
            assets: std::collections::HashMap::new(),
            failures: parking_lot::Mutex::new(std::collections::HashMap::new()),
            fetches: parking_lot::Mutex::new(std::collections::HashMap::new()),
            delay: std::time::Duration::ZERO,
        }
    }

    /// Adds an asset.
    pub fn with_asset(mut self, name: &str, bytes: Vec<u8>) -> MemorySource {
        self.assets.insert(name.to_string(), bytes);
        self
    }

    /// Adds a decodable asset for every pitch bucket of an instrument.
    pub fn with_instrument(self, instrument: &str) -> MemorySource {
        super::PitchBucket::ALL.iter().fold(self, |source, bucket| {
            source.with_asset(
                &bucket.asset_name(instrument),
                super::decode::tests::wav_bytes(1, 8_000, 800),
            )
        })
    }

    /// Makes the next `times` fetches of the asset fail.
    pub fn fail_times(self, name: &str, times: usize) -> MemorySource {
        self.failures.lock().insert(name.to_string(), times);
        self
    }

    /// Delays every fetch.
    pub fn with_delay(mut self, delay: std::time::Duration) -> MemorySource {
        self.delay = delay;
        self
    }

    /// Returns how many times the asset was fetched.
    pub fn fetches(&self, name: &str) -> usize {
        self.fetches.lock().get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
impl AssetSource for MemorySource {
    fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SampleError>> {
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            *self.fetches.lock().entry(name.to_string()).or_default() += 1;

            if let Some(remaining) = self.failures.lock().get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SampleError::Io {
                        path: PathBuf::from(name),
                        source: io::Error::new(io::ErrorKind::ConnectionReset, "flaky"),
                    });
                }
            }

            self.assets
                .get(name)
                .cloned()
                .ok_or_else(|| SampleError::NotFound(name.to_string()))
        }
        .boxed()
    }

    fn extension(&self) -> &str {
        "wav"
    }
}
