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

//! Bluetooth adapter backends.
//!
//! Backends issue triggers and report their outcome as bus events.

mod adapter;
#[cfg(feature = "bluez")]
mod bluez;
mod power;
mod simulated;

pub use adapter::{AdapterError, BluetoothAdapter};
#[cfg(feature = "bluez")]
pub use bluez::BluezAdapter;
pub use power::AdapterPower;
pub use simulated::{AdapterCall, SimulatedAdapter};
