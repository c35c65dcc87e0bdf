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

use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{load_bucket, AssetSource, LoadOutcome};
use crate::audio::SampleBuffer;

/// The reference pitches samples are recorded at. Other pitches are rate-shifted from the
/// nearest bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchBucket {
    A2,
    A3,
    A4,
    A5,
}

impl PitchBucket {
    pub const ALL: [PitchBucket; 4] = [
        PitchBucket::A2,
        PitchBucket::A3,
        PitchBucket::A4,
        PitchBucket::A5,
    ];

    /// Returns the frequency the bucket's sample was recorded at.
    pub fn base_frequency(&self) -> f64 {
        match self {
            PitchBucket::A2 => 110.0,
            PitchBucket::A3 => 220.0,
            PitchBucket::A4 => 440.0,
            PitchBucket::A5 => 880.0,
        }
    }

    /// Picks the bucket for a frequency. The thresholds sit roughly halfway (in cents) between
    /// neighbouring buckets.
    pub fn for_frequency(frequency: f64) -> PitchBucket {
        if frequency < 155.0 {
            PitchBucket::A2
        } else if frequency < 311.0 {
            PitchBucket::A3
        } else if frequency < 622.0 {
            PitchBucket::A4
        } else {
            PitchBucket::A5
        }
    }

    /// Returns the asset name for an instrument's sample at this bucket.
    pub fn asset_name(&self, instrument: &str) -> String {
        format!("{}{}", instrument, self)
    }
}

impl fmt::Display for PitchBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_frequency() as u32)
    }
}

/// What the cache needs to know about loading. Handed over as an immutable snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Instrument substituted for buckets that can't be loaded.
    pub fallback: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            fallback: "piano".to_string(),
        }
    }
}

/// The state of one bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketStatus {
    Empty,
    Loading,
    /// Loaded, possibly from the fallback instrument.
    Ready { instrument: String, attempts: u32 },
    Failed(String),
}

enum Slot {
    Loading,
    Ready(LoadOutcome),
    Failed(String),
}

struct State {
    instrument: Option<String>,
    /// Bumped whenever the slots are replaced so loads for a previous instrument are dropped.
    generation: u64,
    slots: HashMap<PitchBucket, Slot>,
}

/// Decoded buffers for the current instrument, one per pitch bucket.
pub struct SampleCache {
    source: Arc<dyn AssetSource>,
    config: CacheConfig,
    state: Mutex<State>,
}

impl SampleCache {
    pub fn new(source: Arc<dyn AssetSource>, config: CacheConfig) -> SampleCache {
        SampleCache {
            source,
            config,
            state: Mutex::new(State {
                instrument: None,
                generation: 0,
                slots: HashMap::new(),
            }),
        }
    }

    /// Loads every bucket of an instrument in parallel, replacing whatever was cached. Buckets
    /// become available as they finish. Loading the instrument that's already fully cached is a
    /// no-op.
    pub async fn load_instrument(&self, instrument: &str) {
        let generation = {
            let mut state = self.state.lock();
            let cached = state.instrument.as_deref() == Some(instrument)
                && PitchBucket::ALL
                    .iter()
                    .all(|bucket| matches!(state.slots.get(bucket), Some(Slot::Ready(_))));
            if cached {
                debug!(instrument, "Instrument already cached.");
                return;
            }

            state.generation += 1;
            state.instrument = Some(instrument.to_string());
            state.slots = PitchBucket::ALL
                .iter()
                .map(|bucket| (*bucket, Slot::Loading))
                .collect();
            state.generation
        };

        info!(instrument, "Loading instrument samples.");
        let loads = PitchBucket::ALL.iter().map(|bucket| async move {
            let result = load_bucket(self.source.as_ref(), &self.config, instrument, *bucket).await;
            self.store(generation, *bucket, result);
        });
        join_all(loads).await;

        let state = self.state.lock();
        if state.generation == generation {
            let ready = state
                .slots
                .values()
                .filter(|slot| matches!(slot, Slot::Ready(_)))
                .count();
            info!(instrument, ready, total = PitchBucket::ALL.len(), "Instrument loaded.");
        }
    }

    fn store(
        &self,
        generation: u64,
        bucket: PitchBucket,
        result: Result<LoadOutcome, super::SampleError>,
    ) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(%bucket, "Dropping sample loaded for a replaced instrument.");
            return;
        }
        let slot = match result {
            Ok(outcome) => Slot::Ready(outcome),
            Err(e) => {
                warn!(%bucket, err = %e, "No sample available for bucket, it will stay silent.");
                Slot::Failed(e.to_string())
            }
        };
        state.slots.insert(bucket, slot);
    }

    /// Returns the buffer to play a frequency from, along with the bucket it belongs to.
    pub fn get_buffer(&self, frequency: f64) -> Option<(SampleBuffer, PitchBucket)> {
        let bucket = PitchBucket::for_frequency(frequency);
        match self.state.lock().slots.get(&bucket) {
            Some(Slot::Ready(outcome)) => Some((outcome.buffer.clone(), bucket)),
            _ => None,
        }
    }

    /// Returns true while any bucket of the current instrument is still loading.
    pub fn is_loading(&self) -> bool {
        self.state
            .lock()
            .slots
            .values()
            .any(|slot| matches!(slot, Slot::Loading))
    }

    /// Returns true once at least one bucket of the current instrument is playable.
    pub fn has_loaded_samples(&self) -> bool {
        self.state
            .lock()
            .slots
            .values()
            .any(|slot| matches!(slot, Slot::Ready(_)))
    }

    /// Returns the status of a bucket.
    pub fn bucket_status(&self, bucket: PitchBucket) -> BucketStatus {
        match self.state.lock().slots.get(&bucket) {
            None => BucketStatus::Empty,
            Some(Slot::Loading) => BucketStatus::Loading,
            Some(Slot::Ready(outcome)) => BucketStatus::Ready {
                instrument: outcome.instrument.clone(),
                attempts: outcome.attempts,
            },
            Some(Slot::Failed(reason)) => BucketStatus::Failed(reason.clone()),
        }
    }

    /// Returns the currently selected instrument.
    pub fn instrument(&self) -> Option<String> {
        self.state.lock().instrument.clone()
    }

    /// Returns the memory held by cached buffers in bytes.
    pub fn memory_size(&self) -> usize {
        self.state
            .lock()
            .slots
            .values()
            .map(|slot| match slot {
                Slot::Ready(outcome) => outcome.buffer.memory_size(),
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SampleCache")
            .field("instrument", &state.instrument)
            .field("generation", &state.generation)
            .field("buckets", &state.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::MemorySource;

    fn cache(source: MemorySource) -> (Arc<MemorySource>, SampleCache) {
        let source = Arc::new(source);
        let cache = SampleCache::new(source.clone(), CacheConfig::default());
        (source, cache)
    }

    #[test]
    fn test_bucket_selection() {
        assert_eq!(PitchBucket::for_frequency(20.0), PitchBucket::A2);
        assert_eq!(PitchBucket::for_frequency(154.9), PitchBucket::A2);
        assert_eq!(PitchBucket::for_frequency(155.0), PitchBucket::A3);
        assert_eq!(PitchBucket::for_frequency(440.0), PitchBucket::A4);
        assert_eq!(PitchBucket::for_frequency(621.9), PitchBucket::A4);
        assert_eq!(PitchBucket::for_frequency(5000.0), PitchBucket::A5);
        assert_eq!(PitchBucket::A4.asset_name("piano"), "piano440");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_instrument() {
        let (source, cache) = cache(MemorySource::new().with_instrument("piano"));
        assert!(!cache.has_loaded_samples());
        assert!(cache.get_buffer(440.0).is_none());

        cache.load_instrument("piano").await;
        assert!(!cache.is_loading());
        assert!(cache.has_loaded_samples());
        assert_eq!(cache.instrument(), Some("piano".to_string()));

        let (buffer, bucket) = cache.get_buffer(300.0).unwrap();
        assert_eq!(bucket, PitchBucket::A3);
        assert_eq!(buffer.sample_rate(), 8_000);
        assert!(cache.memory_size() > 0);

        // Already cached, nothing is fetched again.
        cache.load_instrument("piano").await;
        assert_eq!(source.fetches("piano440"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_bucket_falls_back_to_piano() {
        let source = MemorySource::new()
            .with_instrument("piano")
            .with_instrument("foo")
            .fail_times("foo440", 10);
        let (_, cache) = cache(source);

        cache.load_instrument("foo").await;
        assert_eq!(
            cache.bucket_status(PitchBucket::A4),
            BucketStatus::Ready {
                instrument: "piano".to_string(),
                attempts: 5
            }
        );
        assert_eq!(
            cache.bucket_status(PitchBucket::A3),
            BucketStatus::Ready {
                instrument: "foo".to_string(),
                attempts: 1
            }
        );
        assert!(cache.get_buffer(440.0).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_fails_when_fallback_fails() {
        let (_, cache) = cache(MemorySource::new().with_asset("foo110", Vec::new()));
        cache.load_instrument("foo").await;

        assert!(matches!(
            cache.bucket_status(PitchBucket::A2),
            BucketStatus::Failed(_)
        ));
        assert!(!cache.has_loaded_samples());
        assert!(!cache.is_loading());
        assert!(cache.get_buffer(100.0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_state_is_visible() {
        let (_, cache) = cache(
            MemorySource::new()
                .with_instrument("piano")
                .with_delay(Duration::from_secs(1)),
        );
        let cache = Arc::new(cache);
        let load = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.load_instrument("piano").await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(cache.is_loading());
        assert!(cache.get_buffer(440.0).is_none());

        load.await.unwrap();
        assert!(!cache.is_loading());
        assert!(cache.get_buffer(440.0).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_instruments_discards_in_flight_loads() {
        let (_, cache) = cache(
            MemorySource::new()
                .with_instrument("piano")
                .with_instrument("organ")
                .with_delay(Duration::from_secs(1)),
        );
        let cache = Arc::new(cache);
        let piano = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.load_instrument("piano").await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        let organ = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.load_instrument("organ").await })
        };

        piano.await.unwrap();
        assert_eq!(cache.instrument(), Some("organ".to_string()));
        assert_eq!(cache.bucket_status(PitchBucket::A4), BucketStatus::Loading);
        assert!(!cache.has_loaded_samples());

        organ.await.unwrap();
        assert_eq!(
            cache.bucket_status(PitchBucket::A4),
            BucketStatus::Ready {
                instrument: "organ".to_string(),
                attempts: 1
            }
        );
    }
}
