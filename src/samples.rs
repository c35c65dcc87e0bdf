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

//! Sample asset loading and caching.
//!
//! This module provides:
//! - Asset sources that fetch raw sample files by name
//! - Decoding of fetched bytes into audio buffers
//! - Per-bucket loading with retry, backoff and a fallback instrument
//! - The sample cache consulted on every note-on

use std::{io, path::PathBuf};

mod cache;
mod decode;
mod loader;
mod source;

pub use cache::{BucketStatus, CacheConfig, PitchBucket, SampleCache};
pub use decode::decode;
pub use loader::{load_bucket, LoadOutcome};
#[cfg(test)]
pub use source::MemorySource;
pub use source::{AssetSource, DirectorySource};

/// Errors raised while fetching or decoding a sample asset. They never reach the note path: the
/// cache retries, falls back, and finally leaves the bucket empty.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Sample asset {0} not found")]
    NotFound(String),

    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to decode {name}: {reason}")]
    Decode { name: String, reason: String },

    #[error("Decoder task failed: {0}")]
    Task(String),
}
