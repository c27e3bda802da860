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

//! Time-boxed, filtered discovery.

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::engine::DiscoveryEngine;
use super::event::SearchEvent;
use crate::device::Device;
use crate::error::Result;
use crate::timer::{TimeoutController, TimerOperation};

/// Seconds a discovery request scans once the first cycle started.
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 30;

/// Name prefix and signal strength criteria for scan results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub name_prefix: Option<String>,
    /// Minimum normalized signal. Ignored unless positive.
    pub min_signal: Option<i32>,
}

impl DeviceFilter {
    pub fn accepts(&self, device: &Device) -> bool {
        if let Some(prefix) = &self.name_prefix {
            let matches = device
                .name
                .as_deref()
                .map(|name| name.starts_with(prefix.as_str()))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }

        match self.min_signal {
            Some(threshold) if threshold > 0 => device.normalized_signal() > threshold,
            _ => true,
        }
    }
}

/// Builder for [`DiscoveryRequest`].
pub struct DiscoveryRequestBuilder {
    engine: DiscoveryEngine,
    timer: TimeoutController,
    filter: DeviceFilter,
    timeout_secs: u64,
}

impl DiscoveryRequestBuilder {
    pub fn filter_by_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filter.name_prefix = Some(prefix.into());
        self
    }

    pub fn filter_by_signal(mut self, threshold: i32) -> Self {
        self.filter.min_signal = Some(threshold);
        self
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn build(self) -> DiscoveryRequest {
        DiscoveryRequest {
            engine: self.engine,
            timer: self.timer,
            filter: Arc::new(self.filter),
            timeout_secs: self.timeout_secs,
            devices: Arc::new(Mutex::new(Vec::new())),
            operation: Arc::new(Mutex::new(None)),
        }
    }
}

/// Scans for a limited time and collects the devices passing a filter.
#[derive(Clone)]
pub struct DiscoveryRequest {
    engine: DiscoveryEngine,
    timer: TimeoutController,
    filter: Arc<DeviceFilter>,
    timeout_secs: u64,
    devices: Arc<Mutex<Vec<Device>>>,
    operation: Arc<Mutex<Option<TimerOperation>>>,
}

impl DiscoveryRequest {
    pub fn builder(engine: DiscoveryEngine, timer: TimeoutController) -> DiscoveryRequestBuilder {
        DiscoveryRequestBuilder {
            engine,
            timer,
            filter: DeviceFilter::default(),
            timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
        }
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    /// Start scanning, yielding every accepted device.
    ///
    /// Clears the collected devices. The stream ends once the scan stops,
    /// either through [`DiscoveryRequest::stop`] or when the time runs out.
    pub fn perform(&self) -> BoxStream<'static, Result<Device>> {
        self.devices.lock().clear();
        self.cancel_timer();

        let mut watch = ScanWatch {
            request: self.clone(),
            armed: None,
        };
        self.engine
            .search()
            .filter_map(move |item| future::ready(watch.observe(item)))
            .boxed()
    }

    /// Run [`DiscoveryRequest::perform`] to the end and return the devices.
    pub async fn perform_and_collect(&self) -> Result<Vec<Device>> {
        let mut found = self.perform();
        while let Some(item) = found.next().await {
            item?;
        }
        Ok(self.devices())
    }

    /// Devices accepted by the current or last scan.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.lock().clone()
    }

    /// Stop scanning. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel_timer();
        self.engine.stop();
    }

    fn cancel_timer(&self) {
        let operation = self.operation.lock().take();
        self.timer.cancel(operation.as_ref());
    }

    fn arm_timer(&self) -> TimerOperation {
        info!("Scanning for {}s", self.timeout_secs);
        let engine = self.engine.clone();
        let operation = self.timer.count_for_seconds(self.timeout_secs, move || {
            info!("Discovery time is up");
            engine.stop();
        });
        *self.operation.lock() = Some(operation.clone());
        operation
    }
}

/// Per-scan state. Cancels the countdown it armed when the scan goes away.
struct ScanWatch {
    request: DiscoveryRequest,
    armed: Option<TimerOperation>,
}

impl ScanWatch {
    fn observe(&mut self, item: Result<SearchEvent>) -> Option<Result<Device>> {
        match item {
            Err(e) => Some(Err(e)),
            Ok(SearchEvent::Started) => {
                if self.armed.is_none() {
                    self.armed = Some(self.request.arm_timer());
                }
                None
            }
            Ok(SearchEvent::DeviceFound(device)) => {
                if !self.request.filter.accepts(&device) {
                    debug!("Filtered out {}", device);
                    return None;
                }
                self.request.devices.lock().push(device.clone());
                Some(Ok(device))
            }
        }
    }
}

impl Drop for ScanWatch {
    fn drop(&mut self) {
        self.request.timer.cancel(self.armed.as_ref());
    }
}
