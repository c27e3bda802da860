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

//! Continuous scanning.
//!
//! A scan keeps re-arming itself after every finished cycle until
//! [`DiscoveryEngine::stop`] is called.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::event::SearchEvent;
use crate::bluetooth::{AdapterPower, BluetoothAdapter};
use crate::bridge::{until_error, EventBridge};
use crate::bus::EventBus;
use crate::device::Device;
use crate::error::{BridgeError, HelperError, Result};
use crate::events::{EventKind, RawEvent};

const SCAN_EVENTS: [EventKind; 3] = [
    EventKind::DiscoveryStarted,
    EventKind::DiscoveryFinished,
    EventKind::DeviceFound,
];

#[derive(Clone)]
pub struct DiscoveryEngine {
    adapter: Arc<dyn BluetoothAdapter>,
    bus: Arc<dyn EventBus>,
    power: AdapterPower,
    stop_requested: Arc<AtomicBool>,
}

impl DiscoveryEngine {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, bus: Arc<dyn EventBus>, power_cycle: bool) -> Self {
        let power = AdapterPower::new(adapter.clone(), bus.clone(), power_cycle);
        Self {
            adapter,
            bus,
            power,
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Power the adapter and scan until stopped.
    pub fn search(&self) -> BoxStream<'static, Result<SearchEvent>> {
        info!("Starting device discovery");

        let scanning = {
            let engine = self.clone();
            async move {
                engine.power.ensure_on().await?;
                engine.scanning().map_err(scan_error)
            }
        };

        let engine = self.clone();
        let events = stream::once(scanning)
            .map_ok(|bridge| bridge.map_err(scan_error))
            .try_flatten()
            .try_filter_map(move |event| {
                future::ready(Ok::<_, HelperError>(engine.classify(&event)))
            });

        until_error(events.boxed())
    }

    /// End the running scan after its current cycle. Repeated calls are ignored.
    ///
    /// Starting a scan clears the request, so a stop issued before the scan's
    /// start operation ran (while the adapter is still powering up) is lost.
    pub fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!("Discovery stop already requested");
            return;
        }
        info!("Stopping device discovery");
        self.adapter.stop_discovery_scan();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn scanning(&self) -> std::result::Result<EventBridge, BridgeError> {
        let adapter = self.adapter.clone();
        let stop_requested = self.stop_requested.clone();
        let exit_stop = self.stop_requested.clone();

        EventBridge::builder(self.bus.clone())
            .add_filters(SCAN_EVENTS)
            .start_operation(move || {
                stop_requested.store(false, Ordering::SeqCst);
                adapter.start_discovery_scan()?;
                Ok(None)
            })
            .exit_condition(move |event| {
                event.kind() == EventKind::DiscoveryFinished && exit_stop.load(Ordering::SeqCst)
            })
            .build()
    }

    fn classify(&self, event: &RawEvent) -> Option<SearchEvent> {
        match event.kind() {
            EventKind::DiscoveryStarted => Some(SearchEvent::Started),
            EventKind::DeviceFound => {
                let device = Device::from_event(event)?;
                debug!("Found {}", device);
                Some(SearchEvent::DeviceFound(device))
            }
            EventKind::DiscoveryFinished => {
                if !self.is_stop_requested() {
                    debug!("Scan cycle finished, starting another");
                    if let Err(e) = self.adapter.start_discovery_scan() {
                        warn!("Failed to restart discovery: {}", e);
                    }
                }
                None
            }
            _ => None,
        }
    }
}

fn scan_error(err: BridgeError) -> HelperError {
    match err {
        BridgeError::StartOperation(e) => HelperError::DiscoveryStartFailed(e.to_string()),
        other => HelperError::Bridge(other),
    }
}
