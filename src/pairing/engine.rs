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

//! Bonding state machine.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::event::{PairEvent, PairEventKind};
use crate::bluetooth::{AdapterPower, BluetoothAdapter};
use crate::bridge::{until_error, EventBridge};
use crate::bus::EventBus;
use crate::device::Device;
use crate::error::{BridgeError, HelperError, Result};
use crate::events::{BondState, EventKind, RawEvent};

const BONDING_EVENTS: [EventKind; 6] = [
    EventKind::BondStateChanged,
    EventKind::AclConnected,
    EventKind::AclDisconnected,
    EventKind::PairingRequestShown,
    EventKind::PairingFailed,
    EventKind::PairingTimeout,
];

/// Pairs one device at a time with the adapter.
#[derive(Clone)]
pub struct PairingEngine {
    adapter: Arc<dyn BluetoothAdapter>,
    bus: Arc<dyn EventBus>,
    power: AdapterPower,
}

impl PairingEngine {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, bus: Arc<dyn EventBus>, power_cycle: bool) -> Self {
        let power = AdapterPower::new(adapter.clone(), bus.clone(), power_cycle);
        Self {
            adapter,
            bus,
            power,
        }
    }

    /// Power the adapter, bond with `address` and report progress.
    ///
    /// The stream ends after `Succeeded` or after the first error.
    pub fn pair(&self, address: &str) -> BoxStream<'static, Result<PairEvent>> {
        let target = address.to_string();
        info!("Pairing with {}", target);

        let bonding = {
            let engine = self.clone();
            let target = target.clone();
            async move {
                engine.power.ensure_on().await?;
                engine
                    .bonding(&target)
                    .map_err(|e| bonding_error(&target, e))
            }
        };

        let bridge_target = target.clone();
        let engine = self.clone();
        let events = stream::once(bonding)
            .map_ok(move |bridge| {
                let target = bridge_target.clone();
                bridge.map_err(move |e| bonding_error(&target, e))
            })
            .try_flatten()
            .try_filter_map(move |event| future::ready(engine.classify(&target, &event)));

        until_error(events.boxed())
    }

    /// Broadcast a pairing timeout for `address`.
    pub fn notify_timeout(&self, address: &str) {
        self.bus
            .emit(RawEvent::for_device(EventKind::PairingTimeout, address));
    }

    /// Broadcast a pairing failure for `address`.
    pub fn notify_error(&self, address: &str) {
        self.bus
            .emit(RawEvent::for_device(EventKind::PairingFailed, address));
    }

    fn bonding(&self, address: &str) -> std::result::Result<EventBridge, BridgeError> {
        let adapter = self.adapter.clone();
        let target = address.to_string();
        let exit_target = target.clone();

        EventBridge::builder(self.bus.clone())
            .add_filters(BONDING_EVENTS)
            .start_operation(move || {
                if adapter.bond_state(&target) == BondState::Bonded {
                    info!("{} is already bonded", target);
                    return Ok(Some(RawEvent::bond_state_changed(&target, BondState::Bonded)));
                }
                adapter.start_bond(&target)?;
                Ok(Some(RawEvent::for_device(EventKind::PairingStarted, &target)))
            })
            .exit_condition(move |event| {
                event.is_about(&exit_target) && event.bond_state() == Some(BondState::Bonded)
            })
            .include_exit_event()
            .build()
    }

    fn classify(&self, target: &str, event: &RawEvent) -> Result<Option<PairEvent>> {
        if !event.is_about(target) {
            debug!("Ignoring {} while pairing {}", event, target);
            return Ok(None);
        }

        let kind = match event.kind() {
            EventKind::BondStateChanged => match event.bond_state() {
                Some(BondState::Bonded) => PairEventKind::Succeeded,
                Some(BondState::None) => PairEventKind::NotDone,
                _ => return Ok(None),
            },
            EventKind::PairingStarted => PairEventKind::Started,
            EventKind::AclConnected | EventKind::PairingRequestShown => PairEventKind::OnProgress,
            EventKind::PairingFailed => {
                return Err(HelperError::pairing_failed(target, "pairing rejected"));
            }
            EventKind::AclDisconnected => {
                return Err(HelperError::pairing_failed(target, "device disconnected"));
            }
            EventKind::PairingTimeout => {
                warn!("Pairing with {} timed out", target);
                self.adapter.cancel_pending_pairing_prompt();
                return Err(HelperError::PairingTimeout {
                    address: target.to_string(),
                });
            }
            _ => return Ok(None),
        };

        debug!("{} -> {}", event, kind.as_str());
        Ok(Some(PairEvent::new(kind, self.describe(target, event))))
    }

    /// Device details for `target`; name and signal carried by the event win.
    fn describe(&self, target: &str, event: &RawEvent) -> Device {
        let mut device = self.adapter.resolve_device(target);
        if let Some(name) = event.name() {
            device = device.with_name(name);
        }
        if let Some(signal) = event.signal() {
            device = device.with_signal(signal);
        }
        device
    }
}

fn bonding_error(address: &str, err: BridgeError) -> HelperError {
    match err {
        BridgeError::StartOperation(e) => HelperError::pairing_failed(address, e.to_string()),
        other => HelperError::Bridge(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{AdapterCall, SimulatedAdapter};
    use crate::bus::LocalEventBus;
    use crate::events::attr;

    const TARGET: &str = "AA:BB:CC:DD:EE:FF";

    fn engine() -> (PairingEngine, Arc<SimulatedAdapter>) {
        let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new().unwrap());
        let adapter = Arc::new(SimulatedAdapter::new(bus.clone()));
        (PairingEngine::new(adapter.clone(), bus, true), adapter)
    }

    fn kind_of(result: Result<Option<PairEvent>>) -> Option<PairEventKind> {
        result.unwrap().map(|event| event.kind())
    }

    #[tokio::test]
    async fn test_classifies_progress_signals() {
        let (engine, _) = engine();

        let bonded = RawEvent::bond_state_changed(TARGET, BondState::Bonded);
        let none = RawEvent::bond_state_changed(TARGET, BondState::None);
        let bonding = RawEvent::bond_state_changed(TARGET, BondState::Bonding);
        let acl = RawEvent::for_device(EventKind::AclConnected, TARGET);
        let prompt = RawEvent::for_device(EventKind::PairingRequestShown, TARGET);
        let started = RawEvent::for_device(EventKind::PairingStarted, TARGET);

        assert_eq!(kind_of(engine.classify(TARGET, &bonded)), Some(PairEventKind::Succeeded));
        assert_eq!(kind_of(engine.classify(TARGET, &none)), Some(PairEventKind::NotDone));
        assert_eq!(kind_of(engine.classify(TARGET, &bonding)), None);
        assert_eq!(kind_of(engine.classify(TARGET, &acl)), Some(PairEventKind::OnProgress));
        assert_eq!(kind_of(engine.classify(TARGET, &prompt)), Some(PairEventKind::OnProgress));
        assert_eq!(kind_of(engine.classify(TARGET, &started)), Some(PairEventKind::Started));
    }

    #[tokio::test]
    async fn test_other_devices_are_ignored() {
        let (engine, _) = engine();
        let other = RawEvent::for_device(EventKind::AclDisconnected, "00:11:22:33:44:55");
        assert_eq!(kind_of(engine.classify(TARGET, &other)), None);

        let anonymous = RawEvent::new(EventKind::PairingFailed);
        assert_eq!(kind_of(engine.classify(TARGET, &anonymous)), None);

        let lowercase = RawEvent::for_device(EventKind::AclConnected, "aa:bb:cc:dd:ee:ff");
        assert_eq!(kind_of(engine.classify(TARGET, &lowercase)), Some(PairEventKind::OnProgress));
    }

    #[tokio::test]
    async fn test_failure_signals_are_terminal() {
        let (engine, adapter) = engine();

        let failed = RawEvent::for_device(EventKind::PairingFailed, TARGET);
        assert!(matches!(
            engine.classify(TARGET, &failed),
            Err(HelperError::PairingFailed { .. })
        ));

        let disconnected = RawEvent::for_device(EventKind::AclDisconnected, TARGET);
        assert!(matches!(
            engine.classify(TARGET, &disconnected),
            Err(HelperError::PairingFailed { .. })
        ));

        let timeout = RawEvent::for_device(EventKind::PairingTimeout, TARGET);
        assert_eq!(
            engine.classify(TARGET, &timeout).unwrap_err(),
            HelperError::PairingTimeout {
                address: TARGET.to_string()
            }
        );
        assert_eq!(adapter.calls(), vec![AdapterCall::CancelPairingPrompt]);
    }

    #[tokio::test]
    async fn test_event_details_override_adapter_lookup() {
        let (engine, adapter) = engine();
        adapter.set_name(TARGET, "Cached");

        let plain = RawEvent::bond_state_changed(TARGET, BondState::Bonded);
        let event = engine.classify(TARGET, &plain).unwrap().unwrap();
        assert_eq!(event.device().name.as_deref(), Some("Cached"));

        let detailed = RawEvent::bond_state_changed(TARGET, BondState::Bonded)
            .with(attr::NAME, "Headset")
            .with(attr::SIGNAL, -40);
        let event = engine.classify(TARGET, &detailed).unwrap().unwrap();
        assert_eq!(event.kind(), PairEventKind::Succeeded);
        assert_eq!(event.device().name.as_deref(), Some("Headset"));
        assert_eq!(event.device().signal, -40);
    }
}
