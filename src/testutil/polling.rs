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
    future::Future,
    thread,
    time::{Duration, Instant},
};

/// How long a condition gets before the test fails.
const TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the polling interval.
const MAX_TICK: Duration = Duration::from_millis(100);

struct Deadline {
    start: Instant,
    tick: Duration,
}

impl Deadline {
    fn new() -> Deadline {
        Deadline {
            start: Instant::now(),
            tick: Duration::from_millis(5),
        }
    }

    /// Panics once the timeout has passed, otherwise returns how long to wait before polling
    /// again.
    fn next_tick(&mut self, error_msg: &str) -> Duration {
        if self.start.elapsed() > TIMEOUT {
            panic!("{}", error_msg);
        }
        let tick = self.tick;
        self.tick = std::cmp::min(self.tick * 2, MAX_TICK);
        tick
    }
}

/// Wait for the given predicate to return true or fail.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let mut deadline = Deadline::new();
    while !predicate() {
        thread::sleep(deadline.next_tick(error_msg));
    }
}

/// Wait for the given async predicate to return true or fail. Uses wall clock time, so it must
/// not be used with a paused tokio clock.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut deadline = Deadline::new();
    while !predicate().await {
        tokio::time::sleep(deadline.next_tick(error_msg)).await;
    }
}
