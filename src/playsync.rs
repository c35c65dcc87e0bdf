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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    select,
    sync::Notify,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

/// A cancel handle is shared between the owner of a background task and the task itself. It's the
/// task's responsibility to respect a cancel request.
#[derive(Clone, Default)]
pub struct CancelHandle {
    /// Set to true once the owner requested cancellation. Never reset.
    cancelled: Arc<AtomicBool>,
    /// Wakes any task waiting in `cancelled`.
    notify: Arc<Notify>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    /// Returns true if the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the handle. Cancelling more than once is a no-op.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Resolves once the handle has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel can't slip in between.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs `tick` every `period` until the cancel handle fires or `tick` returns false. The first
/// tick happens one full period after spawning.
pub fn spawn_periodic<F>(period: Duration, cancel_handle: CancelHandle, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = cancel_handle.cancelled() => return,
                _ = interval.tick() => {
                    if !tick() {
                        return;
                    }
                }
            }
        }
    })
}

/// Runs `f` once after `delay`. Outside of a tokio runtime there is nothing to schedule on, so
/// `f` runs immediately instead.
pub fn run_after<F>(delay: Duration, f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                time::sleep(delay).await;
                f();
            });
        }
        Err(_) => f(),
    }
}
