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

//! Entry point tying an adapter, a bus and the configuration together.

use std::sync::Arc;

use crate::bluetooth::BluetoothAdapter;
use crate::bus::EventBus;
use crate::config::Config;
use crate::discovery::{DiscoveryEngine, DiscoveryRequest, DiscoveryRequestBuilder};
use crate::pairing::{PairingEngine, PairingRequest};
use crate::timer::TimeoutController;

/// Creates pairing and discovery operations configured from [`Config`].
#[derive(Clone)]
pub struct BluetoothHelper {
    adapter: Arc<dyn BluetoothAdapter>,
    bus: Arc<dyn EventBus>,
    timer: TimeoutController,
    config: Config,
}

impl BluetoothHelper {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, bus: Arc<dyn EventBus>, config: Config) -> Self {
        Self {
            adapter,
            bus,
            timer: TimeoutController::new(),
            config,
        }
    }

    /// Use `timer` for every countdown started by this helper.
    pub fn with_timer(mut self, timer: TimeoutController) -> Self {
        self.timer = timer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn pairing_engine(&self) -> PairingEngine {
        PairingEngine::new(
            self.adapter.clone(),
            self.bus.clone(),
            self.config.adapter.power_cycle,
        )
    }

    /// Pairing attempt with `address` using the configured timeout.
    pub fn pair_request(&self, address: &str) -> PairingRequest {
        PairingRequest::new(self.pairing_engine(), self.timer.clone(), address)
            .timeout_secs(self.config.pairing.timeout_secs)
            .strict_not_done(self.config.pairing.strict_not_done)
    }

    pub fn discovery_engine(&self) -> DiscoveryEngine {
        DiscoveryEngine::new(
            self.adapter.clone(),
            self.bus.clone(),
            self.config.adapter.power_cycle,
        )
    }

    /// Discovery request builder preset with the configured filter and timeout.
    pub fn search_request(&self) -> DiscoveryRequestBuilder {
        let discovery = &self.config.discovery;
        let mut builder = DiscoveryRequest::builder(self.discovery_engine(), self.timer.clone())
            .timeout_secs(discovery.timeout_secs);
        if let Some(prefix) = &discovery.name_prefix {
            builder = builder.filter_by_prefix(prefix.clone());
        }
        if let Some(threshold) = discovery.min_signal {
            builder = builder.filter_by_signal(threshold);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::SimulatedAdapter;
    use crate::bus::LocalEventBus;

    #[test]
    fn test_requests_follow_config() {
        let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new().unwrap());
        let adapter = Arc::new(SimulatedAdapter::new(bus.clone()));

        let mut config = Config::default();
        config.discovery.name_prefix = Some("PAX".to_string());
        config.discovery.min_signal = Some(50);
        let helper = BluetoothHelper::new(adapter, bus, config);

        let request = helper.search_request().build();
        assert_eq!(request.filter().name_prefix.as_deref(), Some("PAX"));
        assert_eq!(request.filter().min_signal, Some(50));

        let pairing = helper.pair_request("AA:BB:CC:DD:EE:FF");
        assert_eq!(pairing.address(), "AA:BB:CC:DD:EE:FF");
    }
}
