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

//! Adapter power transitions awaited through the bus.

use std::sync::Arc;
use tracing::info;

use super::BluetoothAdapter;
use crate::bridge::EventBridge;
use crate::bus::EventBus;
use crate::error::{BridgeError, HelperError, Result};
use crate::events::{EventKind, PowerState};

/// Turns the adapter on or off and waits for the confirmation event.
#[derive(Clone)]
pub struct AdapterPower {
    adapter: Arc<dyn BluetoothAdapter>,
    bus: Arc<dyn EventBus>,
    power_cycle: bool,
}

impl AdapterPower {
    /// With `power_cycle` set, [`AdapterPower::ensure_on`] restarts an
    /// adapter that is already on.
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, bus: Arc<dyn EventBus>, power_cycle: bool) -> Self {
        Self {
            adapter,
            bus,
            power_cycle,
        }
    }

    /// Bridge completing once the adapter reports `on`.
    pub fn turn_on(&self) -> std::result::Result<EventBridge, BridgeError> {
        self.transition(PowerState::On)
    }

    /// Bridge completing once the adapter reports `off`.
    pub fn turn_off(&self) -> std::result::Result<EventBridge, BridgeError> {
        self.transition(PowerState::Off)
    }

    fn transition(&self, target: PowerState) -> std::result::Result<EventBridge, BridgeError> {
        let adapter = self.adapter.clone();
        EventBridge::builder(self.bus.clone())
            .add_filter(EventKind::AdapterStateChanged)
            .start_operation(move || {
                match target {
                    PowerState::On => adapter.turn_on()?,
                    PowerState::Off => adapter.turn_off()?,
                }
                Ok(None)
            })
            .exit_condition(move |event| event.power_state() == Some(target))
            .build()
    }

    /// Make sure the adapter is powered, following the power-cycle policy.
    pub async fn ensure_on(&self) -> Result<()> {
        if self.adapter.is_on() {
            if !self.power_cycle {
                return Ok(());
            }
            info!("Power cycling Bluetooth adapter");
            self.turn_off()
                .map_err(HelperError::from_power)?
                .drain()
                .await
                .map_err(HelperError::from_power)?;
        } else {
            info!("Powering on Bluetooth adapter");
        }

        self.turn_on()
            .map_err(HelperError::from_power)?
            .drain()
            .await
            .map_err(HelperError::from_power)
    }
}
