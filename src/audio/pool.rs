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
//! The pool of live audio units. Each sounding note owns one playback unit feeding one gain
//! unit, and the pool is the only place those pairs are torn down. A reaper sweeps the pool on a
//! fixed interval and frees pairs that are too old or have faded to silence, so a lost note-off
//! can never leak units for long.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{GainUnit, PlaybackUnit};
use crate::playsync::{spawn_periodic, CancelHandle};

/// Pooled units older than this are reaped regardless of their gain.
pub const MAX_NODE_AGE: Duration = Duration::from_secs(30);

/// Pooled units whose gain is below this are considered silent and reaped.
pub const SILENCE_THRESHOLD: f32 = 0.001;

/// How often the reaper sweeps the pool.
pub const REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Identifies a pooled playback/gain pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolHandle(u64);

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct PooledNode {
    playback: Arc<dyn PlaybackUnit>,
    gain: Arc<dyn GainUnit>,
    created: Instant,
    frequency: f64,
}

impl PooledNode {
    fn disconnect(self, handle: PoolHandle) {
        if let Err(e) = self.playback.disconnect() {
            debug!(%handle, err = %e, "Playback unit was already disconnected.");
        }
        if let Err(e) = self.gain.disconnect() {
            debug!(%handle, err = %e, "Gain unit was already disconnected.");
        }
    }
}

/// Owns every live playback/gain pair.
pub struct NodePool {
    nodes: Mutex<HashMap<PoolHandle, PooledNode>>,
    next_handle: AtomicU64,
    reaper: CancelHandle,
}

impl NodePool {
    /// Creates a pool without a background reaper. `reap` can still be called by hand.
    pub fn new() -> NodePool {
        NodePool {
            nodes: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            reaper: CancelHandle::new(),
        }
    }

    /// Creates a pool and starts its reaper. The reaper stops when the pool is dropped. Must be
    /// called from within a tokio runtime.
    pub fn spawn() -> Arc<NodePool> {
        let pool = Arc::new(NodePool::new());
        let weak: Weak<NodePool> = Arc::downgrade(&pool);
        spawn_periodic(REAP_INTERVAL, pool.reaper.clone(), move || {
            let Some(pool) = weak.upgrade() else {
                return false;
            };
            let reaped = pool.reap();
            if reaped > 0 {
                debug!(reaped, remaining = pool.len(), "Reaped pooled audio units.");
            }
            true
        });
        pool
    }

    /// Registers a playback/gain pair and returns its handle.
    pub fn acquire(
        &self,
        playback: Arc<dyn PlaybackUnit>,
        gain: Arc<dyn GainUnit>,
        frequency: f64,
    ) -> PoolHandle {
        let handle = PoolHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.nodes.lock().insert(
            handle,
            PooledNode {
                playback,
                gain,
                created: Instant::now(),
                frequency,
            },
        );
        handle
    }

    /// Disconnects and frees the pair behind the handle. Returns false if the handle was
    /// unknown, which happens routinely when the reaper and a note-off race.
    pub fn release(&self, handle: PoolHandle) -> bool {
        let node = self.nodes.lock().remove(&handle);
        match node {
            Some(node) => {
                node.disconnect(handle);
                true
            }
            None => false,
        }
    }

    /// Returns the units behind a handle, if it's still live.
    pub fn units(&self, handle: PoolHandle) -> Option<(Arc<dyn PlaybackUnit>, Arc<dyn GainUnit>)> {
        self.nodes
            .lock()
            .get(&handle)
            .map(|node| (node.playback.clone(), node.gain.clone()))
    }

    #[cfg(test)]
    pub(crate) fn frequency(&self, handle: PoolHandle) -> Option<f64> {
        self.nodes.lock().get(&handle).map(|node| node.frequency)
    }

    /// Returns true if the handle is still live.
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.nodes.lock().contains_key(&handle)
    }

    /// Releases every pair that is older than `MAX_NODE_AGE` or whose gain has dropped below
    /// `SILENCE_THRESHOLD`. Returns the number of pairs released.
    pub fn reap(&self) -> usize {
        let expired: Vec<(PoolHandle, PooledNode)> = {
            let mut nodes = self.nodes.lock();
            let handles: Vec<PoolHandle> = nodes
                .iter()
                .filter(|(_, node)| {
                    node.created.elapsed() > MAX_NODE_AGE
                        || node.gain.value() < SILENCE_THRESHOLD
                })
                .map(|(handle, _)| *handle)
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| nodes.remove(&handle).map(|node| (handle, node)))
                .collect()
        };

        let count = expired.len();
        for (handle, node) in expired {
            debug!(%handle, frequency = node.frequency, "Reaping audio units.");
            node.disconnect(handle);
        }
        count
    }

    /// Releases every pair. Returns the number released.
    pub fn release_all(&self) -> usize {
        let drained: Vec<(PoolHandle, PooledNode)> = self.nodes.lock().drain().collect();
        let count = drained.len();
        for (handle, node) in drained {
            node.disconnect(handle);
        }
        if count > 0 {
            info!(count, "Released all pooled audio units.");
        }
        count
    }

    /// Returns the number of live pairs.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl Default for NodePool {
    fn default() -> Self {
        NodePool::new()
    }
}

impl Drop for NodePool {
    fn drop(&mut self) {
        self.reaper.cancel();
    }
}

impl fmt::Debug for NodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("live", &self.len())
            .finish()
    }
}
