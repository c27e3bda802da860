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

//! Pairing with a progress watchdog.

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use super::engine::PairingEngine;
use super::event::{PairEvent, PairEventKind};
use crate::device::Device;
use crate::error::{HelperError, Result};
use crate::timer::{TimeoutController, TimerOperation};

/// Seconds without progress before a pairing attempt is abandoned.
pub const DEFAULT_PAIRING_TIMEOUT_SECS: u64 = 20;

/// One pairing attempt with a single device.
///
/// Once bonding starts a countdown runs; every sign of progress restarts it.
/// When it runs out a `pairing-timeout` is broadcast and the attempt ends
/// with [`HelperError::PairingTimeout`].
pub struct PairingRequest {
    engine: PairingEngine,
    timer: TimeoutController,
    address: String,
    timeout_secs: u64,
    strict_not_done: bool,
}

impl PairingRequest {
    pub fn new(engine: PairingEngine, timer: TimeoutController, address: &str) -> Self {
        Self {
            engine,
            timer,
            address: address.to_string(),
            timeout_secs: DEFAULT_PAIRING_TIMEOUT_SECS,
            strict_not_done: false,
        }
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Treat a "not bonded" report before any progress as a failure too.
    pub fn strict_not_done(mut self, strict: bool) -> Self {
        self.strict_not_done = strict;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run the attempt, yielding the forwarded progress events.
    ///
    /// Dropping the stream cancels the attempt and its countdown.
    pub fn events(self) -> BoxStream<'static, Result<PairEvent>> {
        let source = self.engine.pair(&self.address);
        let mut watchdog = Watchdog {
            slot: TimerSlot {
                controller: self.timer,
                operation: None,
            },
            engine: self.engine,
            address: self.address,
            timeout_secs: self.timeout_secs,
            strict_not_done: self.strict_not_done,
            progressed: false,
        };

        source
            .filter_map(move |item| future::ready(watchdog.observe(item)))
            .boxed()
    }

    /// Run the attempt to completion and return the bonded device.
    pub async fn perform(self) -> Result<Device> {
        let address = self.address.clone();
        let mut events = self.events();
        while let Some(event) = events.next().await {
            let event = event?;
            if event.kind() == PairEventKind::Succeeded {
                return Ok(event.into_device());
            }
        }
        Err(HelperError::pairing_failed(&address, "pairing ended without bonding"))
    }
}

/// Countdown cancelled when the slot goes away.
struct TimerSlot {
    controller: TimeoutController,
    operation: Option<TimerOperation>,
}

impl TimerSlot {
    fn cancel(&mut self) {
        self.controller.cancel(self.operation.take().as_ref());
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Watchdog {
    slot: TimerSlot,
    engine: PairingEngine,
    address: String,
    timeout_secs: u64,
    strict_not_done: bool,
    progressed: bool,
}

impl Watchdog {
    fn arm(&mut self) {
        if self.slot.operation.is_some() {
            return;
        }
        debug!("Arming {}s pairing timeout for {}", self.timeout_secs, self.address);
        let engine = self.engine.clone();
        let address = self.address.clone();
        let operation = self.slot.controller.count_for_seconds(self.timeout_secs, move || {
            warn!("No pairing progress from {}", address);
            engine.notify_timeout(&address);
        });
        self.slot.operation = Some(operation);
    }

    fn observe(&mut self, item: Result<PairEvent>) -> Option<Result<PairEvent>> {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                self.slot.cancel();
                return Some(Err(e));
            }
        };

        match event.kind() {
            PairEventKind::Started => self.arm(),
            PairEventKind::OnProgress => {
                self.arm();
                if let Some(operation) = &self.slot.operation {
                    operation.reset_time();
                }
                self.progressed = true;
            }
            PairEventKind::NotDone => {
                if self.progressed || self.strict_not_done {
                    warn!("{} reported not bonded, failing attempt", self.address);
                    self.engine.notify_error(&self.address);
                    return None;
                }
            }
            PairEventKind::Succeeded => self.slot.cancel(),
        }
        Some(Ok(event))
    }
}
