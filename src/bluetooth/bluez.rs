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

//! BlueZ adapter backend.
//!
//! Translates BlueZ D-Bus signals into bus events. BlueZ has no notion of a
//! finite inquiry cycle, so each scan runs for a fixed window and then
//! reports `discovery-finished`.
//!
//! Adapter triggers may be called from a tokio task, so they never block on
//! D-Bus there. Device names and signal strength are read by the spawned
//! scan and bonding tasks and kept in a cache that `resolve_device` serves.

use anyhow::Result;
use bluer::{AdapterEvent, AdapterProperty, Address, DeviceEvent, DeviceProperty, Session};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{AdapterError, BluetoothAdapter};
use crate::bus::EventBus;
use crate::device::Device;
use crate::events::{attr, BondState, EventKind, PowerState, RawEvent};

/// Adapter backed by the system BlueZ daemon.
pub struct BluezAdapter {
    _session: Session,
    adapter: bluer::Adapter,
    bus: Arc<dyn EventBus>,
    runtime: Handle,
    powered: Arc<AtomicBool>,
    scan_window: Duration,
    scan_stop: Mutex<Option<oneshot::Sender<()>>>,
    pairing: Mutex<Option<Address>>,
    known: Arc<KnownDevices>,
}

fn key(address: &str) -> String {
    address.to_ascii_uppercase()
}

/// Devices seen by the scan and bonding tasks.
#[derive(Default)]
struct KnownDevices {
    devices: Mutex<HashMap<String, Device>>,
    bonded: Mutex<HashSet<String>>,
}

impl KnownDevices {
    fn remember(&self, device: Device) {
        self.devices.lock().insert(key(&device.id), device);
    }

    fn mark_bonded(&self, address: &str) {
        self.bonded.lock().insert(key(address));
    }

    fn resolve(&self, address: &str) -> Device {
        self.devices
            .lock()
            .get(&key(address))
            .cloned()
            .unwrap_or_else(|| Device::new(address))
    }

    fn is_bonded(&self, address: &str) -> bool {
        self.bonded.lock().contains(&key(address))
    }
}

/// Run `future` on `runtime` when the caller is outside any runtime.
/// Returns `None` on a runtime thread, which must not be blocked.
fn block_outside_runtime<F: Future>(runtime: &Handle, future: F) -> Option<F::Output> {
    match Handle::try_current() {
        Ok(_) => None,
        Err(_) => Some(runtime.block_on(future)),
    }
}

impl BluezAdapter {
    /// Connect to BlueZ and start mirroring adapter power changes to `bus`.
    pub async fn new(bus: Arc<dyn EventBus>, scan_window: Duration) -> Result<Self> {
        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        let powered = Arc::new(AtomicBool::new(adapter.is_powered().await?));

        let this = Self {
            _session: session,
            adapter,
            bus,
            runtime: Handle::current(),
            powered,
            scan_window,
            scan_stop: Mutex::new(None),
            pairing: Mutex::new(None),
            known: Arc::new(KnownDevices::default()),
        };
        this.monitor_power().await?;
        Ok(this)
    }

    async fn monitor_power(&self) -> Result<()> {
        let events = self.adapter.events().await?;
        let powered = self.powered.clone();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) = event {
                    debug!("Adapter powered: {}", on);
                    powered.store(on, Ordering::SeqCst);
                    let state = if on { PowerState::On } else { PowerState::Off };
                    bus.emit(RawEvent::adapter_state(state));
                }
            }
            debug!("Adapter event stream ended");
        });

        Ok(())
    }

    fn set_powered(&self, target: PowerState) {
        let on = target == PowerState::On;
        if self.powered.load(Ordering::SeqCst) == on {
            // No property change will follow, confirm right away.
            self.bus.emit(RawEvent::adapter_state(target));
            return;
        }

        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.set_powered(on).await {
                warn!("Failed to set adapter power to {}: {}", target.as_str(), e);
            }
        });
    }

    fn device(&self, address: &str) -> Result<bluer::Device, AdapterError> {
        let address: Address = address
            .parse()
            .map_err(|_| AdapterError::InvalidAddress(address.to_string()))?;
        self.adapter
            .device(address)
            .map_err(|e| AdapterError::BondFailed(e.to_string()))
    }
}

async fn describe(device: &bluer::Device) -> Device {
    let mut described = Device::new(device.address().to_string());
    if let Ok(Some(name)) = device.name().await {
        described = described.with_name(name);
    }
    if let Ok(Some(rssi)) = device.rssi().await {
        described = described.with_signal(i32::from(rssi));
    }
    described
}

fn found_event(device: &Device) -> RawEvent {
    RawEvent::device_found(&device.id, device.name.as_deref(), Some(device.signal))
}

impl BluetoothAdapter for BluezAdapter {
    fn is_on(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn turn_on(&self) -> Result<(), AdapterError> {
        self.set_powered(PowerState::On);
        Ok(())
    }

    fn turn_off(&self) -> Result<(), AdapterError> {
        self.set_powered(PowerState::Off);
        Ok(())
    }

    fn start_bond(&self, address: &str) -> Result<(), AdapterError> {
        let device = self.device(address)?;
        *self.pairing.lock() = Some(device.address());

        let bus = self.bus.clone();
        let known = self.known.clone();
        let address = address.to_string();
        self.runtime.spawn(async move {
            bus.emit(RawEvent::bond_state_changed(&address, BondState::Bonding));

            let watcher = match device.events().await {
                Ok(events) => {
                    let bus = bus.clone();
                    let address = address.clone();
                    Some(tokio::spawn(async move {
                        pin_mut!(events);
                        while let Some(event) = events.next().await {
                            if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event {
                                let kind = if connected {
                                    EventKind::AclConnected
                                } else {
                                    EventKind::AclDisconnected
                                };
                                bus.emit(RawEvent::for_device(kind, &address));
                            }
                        }
                    }))
                }
                Err(e) => {
                    warn!("Cannot watch connection of {}: {}", address, e);
                    None
                }
            };

            match device.pair().await {
                Ok(()) => {
                    info!("Paired with {}", address);
                    let paired = describe(&device).await;
                    let mut bonded = RawEvent::bond_state_changed(&address, BondState::Bonded)
                        .with(attr::SIGNAL, paired.signal);
                    if let Some(name) = &paired.name {
                        bonded = bonded.with(attr::NAME, name.as_str());
                    }
                    known.mark_bonded(&address);
                    known.remember(paired);
                    bus.emit(bonded);
                }
                Err(e) => {
                    warn!("Pairing with {} failed: {}", address, e);
                    bus.emit(RawEvent::for_device(EventKind::PairingFailed, &address));
                }
            }

            if let Some(watcher) = watcher {
                watcher.abort();
            }
        });

        Ok(())
    }

    fn cancel_pending_pairing_prompt(&self) {
        let Some(address) = self.pairing.lock().take() else {
            return;
        };
        let Ok(device) = self.adapter.device(address) else {
            return;
        };
        self.runtime.spawn(async move {
            if let Err(e) = device.cancel_pairing().await {
                debug!("Cancel pairing for {}: {}", address, e);
            }
        });
    }

    fn start_discovery_scan(&self) -> Result<(), AdapterError> {
        if !self.is_on() {
            return Err(AdapterError::DiscoveryFailed("adapter is off".to_string()));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        if let Some(previous) = self.scan_stop.lock().replace(stop_tx) {
            let _ = previous.send(());
        }

        let adapter = self.adapter.clone();
        let bus = self.bus.clone();
        let known = self.known.clone();
        let window = self.scan_window;
        self.runtime.spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Discovery failed to start: {}", e);
                    bus.emit(RawEvent::new(EventKind::DiscoveryFinished));
                    return;
                }
            };
            pin_mut!(events);
            bus.emit(RawEvent::new(EventKind::DiscoveryStarted));

            let deadline = tokio::time::sleep(window);
            pin_mut!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = &mut stop_rx => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            if let Ok(device) = adapter.device(address) {
                                let found = describe(&device).await;
                                bus.emit(found_event(&found));
                                known.remember(found);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }

            debug!("Scan window closed");
            bus.emit(RawEvent::new(EventKind::DiscoveryFinished));
        });

        Ok(())
    }

    fn stop_discovery_scan(&self) {
        let delivered = self
            .scan_stop
            .lock()
            .take()
            .map(|stop| stop.send(()).is_ok())
            .unwrap_or(false);
        if !delivered {
            // No scan running, report the end of the cycle ourselves.
            self.bus.emit(RawEvent::new(EventKind::DiscoveryFinished));
        }
    }

    fn resolve_device(&self, address: &str) -> Device {
        self.known.resolve(address)
    }

    fn bond_state(&self, address: &str) -> BondState {
        let Ok(device) = self.device(address) else {
            return BondState::None;
        };
        let paired = match block_outside_runtime(&self.runtime, device.is_paired()) {
            Some(Ok(paired)) => paired,
            Some(Err(e)) => {
                warn!("Cannot read bond state of {}: {}", address, e);
                false
            }
            None => {
                debug!("Bond state of {} taken from cache", address);
                self.known.is_bonded(address)
            }
        };
        if paired {
            BondState::Bonded
        } else {
            BondState::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_devices_resolve_case_insensitively() {
        let known = KnownDevices::default();
        assert_eq!(known.resolve("aa:bb:cc:dd:ee:ff"), Device::new("aa:bb:cc:dd:ee:ff"));

        known.remember(Device::new("AA:BB:CC:DD:EE:FF").with_name("Headset").with_signal(-48));
        known.mark_bonded("AA:BB:CC:DD:EE:FF");

        let device = known.resolve("aa:bb:cc:dd:ee:ff");
        assert_eq!(device.name.as_deref(), Some("Headset"));
        assert_eq!(device.signal, -48);
        assert!(known.is_bonded("aa:bb:cc:dd:ee:ff"));
        assert!(!known.is_bonded("00:11:22:33:44:55"));
    }

    #[test]
    fn test_blocking_is_refused_on_runtime_threads() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();

        // On the runtime's own thread nothing blocks and nothing panics.
        let inside = runtime.block_on(async { block_outside_runtime(&handle, async { 7 }) });
        assert_eq!(inside, None);

        let outside = std::thread::spawn(move || block_outside_runtime(&handle, async { 7 }))
            .join()
            .unwrap();
        assert_eq!(outside, Some(7));
    }
}
