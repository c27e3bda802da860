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

//! Scripted in-process adapter.
//!
//! Every trigger is recorded and answered with scripted events on the bus,
//! which makes pairing and discovery flows reproducible without hardware.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use super::{AdapterError, BluetoothAdapter};
use crate::bus::EventBus;
use crate::device::Device;
use crate::events::{BondState, EventKind, PowerState, RawEvent};

/// Adapter trigger recorded by [`SimulatedAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    TurnOn,
    TurnOff,
    StartBond(String),
    CancelPairingPrompt,
    StartDiscovery,
    StopDiscovery,
}

struct SimulatedState {
    on: bool,
    auto_power: bool,
    bonded: HashSet<String>,
    names: HashMap<String, String>,
    bond_script: Vec<RawEvent>,
    scan_script: VecDeque<Vec<RawEvent>>,
    bond_failure: Option<String>,
    scan_failure: Option<String>,
    calls: Vec<AdapterCall>,
}

/// Adapter answering triggers with scripted bus events.
pub struct SimulatedAdapter {
    bus: Arc<dyn EventBus>,
    state: Mutex<SimulatedState>,
}

fn key(address: &str) -> String {
    address.to_ascii_uppercase()
}

impl SimulatedAdapter {
    /// Create a powered-off adapter that confirms power changes.
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(SimulatedState {
                on: false,
                auto_power: true,
                bonded: HashSet::new(),
                names: HashMap::new(),
                bond_script: Vec::new(),
                scan_script: VecDeque::new(),
                bond_failure: None,
                scan_failure: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn set_on(&self, on: bool) {
        self.state.lock().on = on;
    }

    /// When disabled, power triggers are accepted but never confirmed.
    pub fn set_auto_power(&self, enabled: bool) {
        self.state.lock().auto_power = enabled;
    }

    pub fn set_bonded(&self, address: &str) {
        self.state.lock().bonded.insert(key(address));
    }

    pub fn set_name(&self, address: &str, name: &str) {
        self.state.lock().names.insert(key(address), name.to_string());
    }

    /// Events emitted after every accepted `start_bond`.
    pub fn script_bond(&self, events: Vec<RawEvent>) {
        self.state.lock().bond_script = events;
    }

    /// Events emitted after the next `discovery-started`. Batches are used in
    /// order, one per scan cycle.
    pub fn push_scan_batch(&self, events: Vec<RawEvent>) {
        self.state.lock().scan_script.push_back(events);
    }

    pub fn fail_bond(&self, reason: &str) {
        self.state.lock().bond_failure = Some(reason.to_string());
    }

    pub fn fail_scan(&self, reason: &str) {
        self.state.lock().scan_failure = Some(reason.to_string());
    }

    /// Triggers received so far, oldest first.
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.state.lock().calls.clone()
    }

    /// Broadcast an arbitrary event, as the platform would.
    pub fn emit(&self, event: RawEvent) {
        self.bus.emit(event);
    }

    fn record(&self, call: AdapterCall) {
        debug!("Simulated adapter call: {:?}", call);
        self.state.lock().calls.push(call);
    }

    fn power(&self, target: PowerState) {
        let confirm = {
            let mut state = self.state.lock();
            if state.auto_power {
                state.on = target == PowerState::On;
            }
            state.auto_power
        };
        if confirm {
            self.bus.emit(RawEvent::adapter_state(target));
        }
    }
}

impl BluetoothAdapter for SimulatedAdapter {
    fn is_on(&self) -> bool {
        self.state.lock().on
    }

    fn turn_on(&self) -> Result<(), AdapterError> {
        self.record(AdapterCall::TurnOn);
        self.power(PowerState::On);
        Ok(())
    }

    fn turn_off(&self) -> Result<(), AdapterError> {
        self.record(AdapterCall::TurnOff);
        self.power(PowerState::Off);
        Ok(())
    }

    fn start_bond(&self, address: &str) -> Result<(), AdapterError> {
        self.record(AdapterCall::StartBond(address.to_string()));
        let script = {
            let state = self.state.lock();
            if let Some(reason) = &state.bond_failure {
                return Err(AdapterError::BondFailed(reason.clone()));
            }
            state.bond_script.clone()
        };
        for event in script {
            self.bus.emit(event);
        }
        Ok(())
    }

    fn cancel_pending_pairing_prompt(&self) {
        self.record(AdapterCall::CancelPairingPrompt);
    }

    fn start_discovery_scan(&self) -> Result<(), AdapterError> {
        self.record(AdapterCall::StartDiscovery);
        let batch = {
            let mut state = self.state.lock();
            if let Some(reason) = &state.scan_failure {
                return Err(AdapterError::DiscoveryFailed(reason.clone()));
            }
            state.scan_script.pop_front().unwrap_or_default()
        };
        self.bus.emit(RawEvent::new(EventKind::DiscoveryStarted));
        for event in batch {
            self.bus.emit(event);
        }
        Ok(())
    }

    fn stop_discovery_scan(&self) {
        self.record(AdapterCall::StopDiscovery);
        self.bus.emit(RawEvent::new(EventKind::DiscoveryFinished));
    }

    fn resolve_device(&self, address: &str) -> Device {
        let device = Device::new(address);
        match self.state.lock().names.get(&key(address)) {
            Some(name) => device.with_name(name.clone()),
            None => device,
        }
    }

    fn bond_state(&self, address: &str) -> BondState {
        if self.state.lock().bonded.contains(&key(address)) {
            BondState::Bonded
        } else {
            BondState::None
        }
    }
}
