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

//! Platform adapter capability.

use thiserror::Error;

use crate::device::Device;
use crate::events::BondState;

/// Failure reported synchronously by an adapter trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Bonding could not be started: {0}")]
    BondFailed(String),

    #[error("Discovery scan could not be started: {0}")]
    DiscoveryFailed(String),

    #[error("Power change rejected: {0}")]
    Power(String),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
}

/// Operations a Bluetooth adapter backend provides.
///
/// Every method is a trigger: it returns once the request was issued, and
/// completion is reported later as events on the bus.
pub trait BluetoothAdapter: Send + Sync {
    /// Whether the adapter is currently powered.
    fn is_on(&self) -> bool;

    /// Request power on. Confirmed by `adapter-state-changed` with `state=on`.
    fn turn_on(&self) -> Result<(), AdapterError>;

    /// Request power off. Confirmed by `adapter-state-changed` with `state=off`.
    fn turn_off(&self) -> Result<(), AdapterError>;

    /// Start bonding with the device at `address`.
    fn start_bond(&self, address: &str) -> Result<(), AdapterError>;

    /// Dismiss a pairing dialog the platform may be showing. Best effort.
    fn cancel_pending_pairing_prompt(&self);

    /// Start a scan cycle. Reported by `discovery-started`, `device-found`
    /// and finally `discovery-finished`.
    fn start_discovery_scan(&self) -> Result<(), AdapterError>;

    /// Stop the running scan cycle.
    fn stop_discovery_scan(&self);

    /// Describe the device at `address`.
    fn resolve_device(&self, address: &str) -> Device;

    /// Current bond state of the device at `address`.
    fn bond_state(&self, address: &str) -> BondState;
}
