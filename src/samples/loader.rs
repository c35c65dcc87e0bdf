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
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{AssetSource, CacheConfig, PitchBucket, SampleError};
use crate::audio::SampleBuffer;

/// A successfully loaded bucket.
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    pub buffer: SampleBuffer,
    /// The instrument the buffer came from. Differs from the requested one after a fallback.
    pub instrument: String,
    /// Total fetch attempts across the requested and fallback instruments.
    pub attempts: u32,
}

/// Loads one pitch bucket of an instrument. Each failed attempt is retried after
/// `attempt × retry_base_delay`, up to `max_retries` retries. If every attempt fails and the
/// instrument isn't the fallback instrument, the bucket is loaded from the fallback instead.
pub async fn load_bucket(
    source: &dyn AssetSource,
    config: &CacheConfig,
    instrument: &str,
    bucket: PitchBucket,
) -> Result<LoadOutcome, SampleError> {
    let (result, attempts) = load_with_retries(source, config, instrument, bucket).await;
    let error = match result {
        Ok(buffer) => {
            return Ok(LoadOutcome {
                buffer,
                instrument: instrument.to_string(),
                attempts,
            })
        }
        Err(e) => e,
    };

    if instrument == config.fallback {
        return Err(error);
    }

    warn!(
        instrument,
        fallback = config.fallback,
        %bucket,
        err = %error,
        "Sample unavailable, substituting fallback instrument."
    );
    let (result, fallback_attempts) =
        load_with_retries(source, config, &config.fallback, bucket).await;
    result.map(|buffer| LoadOutcome {
        buffer,
        instrument: config.fallback.clone(),
        attempts: attempts + fallback_attempts,
    })
}

async fn load_with_retries(
    source: &dyn AssetSource,
    config: &CacheConfig,
    instrument: &str,
    bucket: PitchBucket,
) -> (Result<SampleBuffer, SampleError>, u32) {
    let name = bucket.asset_name(instrument);
    let mut attempt: u32 = 1;
    loop {
        match fetch_and_decode(source, &name).await {
            Ok(buffer) => {
                info!(
                    asset = name,
                    attempt,
                    channels = buffer.channel_count(),
                    sample_rate = buffer.sample_rate(),
                    duration_ms = buffer.duration().as_millis(),
                    "Sample loaded"
                );
                return (Ok(buffer), attempt);
            }
            Err(e) if attempt > config.max_retries => {
                warn!(asset = name, attempts = attempt, err = %e, "Giving up on sample.");
                return (Err(e), attempt);
            }
            Err(e) => {
                let delay = retry_delay(config.retry_base_delay, attempt);
                warn!(
                    asset = name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    err = %e,
                    "Sample load failed, retrying."
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Linear backoff: the nth retry waits n base delays.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

async fn fetch_and_decode(source: &dyn AssetSource, name: &str) -> Result<SampleBuffer, SampleError> {
    let bytes = source.fetch(name).await?;
    debug!(asset = name, bytes = bytes.len(), "Fetched sample asset.");

    let name = name.to_string();
    let extension = source.extension().to_string();
    tokio::task::spawn_blocking(move || super::decode(&name, bytes, &extension))
        .await
        .map_err(|e| SampleError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::MemorySource;

    fn config() -> CacheConfig {
        CacheConfig {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            fallback: "piano".to_string(),
        }
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 3), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_first_try() {
        let source = MemorySource::new().with_instrument("piano");
        let outcome = load_bucket(&source, &config(), "piano", PitchBucket::A4)
            .await
            .unwrap();
        assert_eq!(outcome.instrument, "piano");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(source.fetches("piano440"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff() {
        let source = MemorySource::new()
            .with_instrument("organ")
            .fail_times("organ220", 2);

        let start = tokio::time::Instant::now();
        let outcome = load_bucket(&source, &config(), "organ", PitchBucket::A3)
            .await
            .unwrap();

        assert_eq!(outcome.instrument, "organ");
        assert_eq!(outcome.attempts, 3);
        // 500ms before the first retry, 1000ms before the second.
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_after_exhausting_retries() {
        let source = MemorySource::new()
            .with_instrument("piano")
            .with_asset("foo440", b"corrupt".to_vec());

        let outcome = load_bucket(&source, &config(), "foo", PitchBucket::A4)
            .await
            .unwrap();
        assert_eq!(outcome.instrument, "piano");
        assert_eq!(outcome.attempts, 5);
        assert_eq!(source.fetches("foo440"), 4);
        assert_eq!(source.fetches("piano440"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_instrument_does_not_fall_back() {
        let source = MemorySource::new();
        let result = load_bucket(&source, &config(), "piano", PitchBucket::A2).await;
        assert!(matches!(result, Err(SampleError::NotFound(_))));
        assert_eq!(source.fetches("piano110"), 4);
    }
}
