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

//! Bluetooth pairing and discovery on top of adapter broadcast events.
//!
//! Adapter backends report everything as [`RawEvent`]s on an [`EventBus`].
//! An [`EventBridge`] turns a listener registration into a cancellable
//! stream, and the pairing and discovery engines build their protocols on
//! those streams.

pub mod bluetooth;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod helper;
pub mod pairing;
pub mod timer;

pub use bluetooth::{AdapterError, AdapterPower, BluetoothAdapter};
pub use bridge::EventBridge;
pub use bus::{EventBus, EventFilter, LocalEventBus, OwnerContext};
pub use config::Config;
pub use device::Device;
pub use discovery::{DeviceFilter, DiscoveryEngine, DiscoveryRequest, SearchEvent};
pub use error::{BridgeError, HelperError, Result};
pub use events::{BondState, EventKind, PowerState, RawEvent};
pub use helper::BluetoothHelper;
pub use pairing::{PairEvent, PairEventKind, PairingEngine, PairingRequest};
pub use timer::{TimeoutController, TimerOperation};
