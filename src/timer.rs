// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Resettable countdown timers.
//!
//! A [`TimerOperation`] counts whole seconds on a background Tokio task and
//! fires its callback once the elapsed count reaches the duration. Progress
//! can push the deadline out with [`TimerOperation::reset_time`] or
//! [`TimerOperation::increment_by`].

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

const TICK: Duration = Duration::from_secs(1);

type TimeoutCallback = Box<dyn FnOnce() + Send + 'static>;

struct TimerState {
    duration: u64,
    elapsed: u64,
    cancelled: bool,
    fired: bool,
    callback: Option<TimeoutCallback>,
}

/// Handle to a running countdown.
///
/// Clones refer to the same countdown.
#[derive(Clone)]
pub struct TimerOperation {
    state: Arc<Mutex<TimerState>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TimerOperation {
    fn new(duration: u64, callback: TimeoutCallback) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState {
                duration,
                elapsed: 0,
                cancelled: false,
                fired: false,
                callback: Some(callback),
            })),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Extend the duration by `seconds`.
    pub fn increment_by(&self, seconds: u64) {
        let mut state = self.state.lock();
        state.duration = state.duration.saturating_add(seconds);
        debug!("Timer extended to {}s", state.duration);
    }

    /// Restart the count without changing the duration.
    pub fn reset_time(&self) {
        self.state.lock().elapsed = 0;
    }

    pub fn elapsed(&self) -> u64 {
        self.state.lock().elapsed
    }

    pub fn duration(&self) -> u64 {
        self.state.lock().duration
    }

    pub fn is_fired(&self) -> bool {
        self.state.lock().fired
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn cancel(&self) {
        {
            let mut state = self.state.lock();
            if state.fired || state.cancelled {
                return;
            }
            state.cancelled = true;
            state.callback = None;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        debug!("Timer cancelled");
    }

    /// Advance by one tick. Returns the callback when the timer fires.
    fn tick(&self) -> Option<TimeoutCallback> {
        let mut state = self.state.lock();
        if state.cancelled || state.fired {
            return None;
        }
        state.elapsed += 1;
        if state.elapsed < state.duration {
            return None;
        }
        state.fired = true;
        state.callback.take()
    }

    fn is_done(&self) -> bool {
        let state = self.state.lock();
        state.cancelled || state.fired
    }
}

impl fmt::Debug for TimerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimerOperation")
            .field("duration", &state.duration)
            .field("elapsed", &state.elapsed)
            .field("cancelled", &state.cancelled)
            .field("fired", &state.fired)
            .finish()
    }
}

/// Starts and cancels countdowns.
#[derive(Debug, Clone, Default)]
pub struct TimeoutController;

impl TimeoutController {
    pub fn new() -> Self {
        Self
    }

    /// Count `seconds` whole seconds, then run `on_timeout` once.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn count_for_seconds(
        &self,
        seconds: u64,
        on_timeout: impl FnOnce() + Send + 'static,
    ) -> TimerOperation {
        let operation = TimerOperation::new(seconds, Box::new(on_timeout));
        debug!("Starting {}s countdown", seconds);

        let ticking = operation.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            loop {
                ticker.tick().await;
                if let Some(callback) = ticking.tick() {
                    info!("Countdown of {}s expired", ticking.duration());
                    callback();
                    return;
                }
                if ticking.is_done() {
                    return;
                }
            }
        });
        *operation.task.lock() = Some(task);

        operation
    }

    /// Stop `operation` if present. Its callback will not run afterwards.
    pub fn cancel(&self, operation: Option<&TimerOperation>) {
        if let Some(operation) = operation {
            operation.cancel();
        }
    }
}
