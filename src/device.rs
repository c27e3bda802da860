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

//! Remote device description.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::{EventKind, RawEvent};

/// Signal strength used when a scan result carries no RSSI.
pub const DEFAULT_SIGNAL: i32 = -99;

/// A remote Bluetooth device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Stable hardware address (e.g., "00:11:22:33:44:55").
    pub id: String,
    /// Display name, when the remote advertised one.
    pub name: Option<String>,
    /// RSSI in dBm.
    pub signal: i32,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            signal: DEFAULT_SIGNAL,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_signal(mut self, signal: i32) -> Self {
        self.signal = signal;
        self
    }

    /// Build a device from a `device-found` event.
    pub fn from_event(event: &RawEvent) -> Option<Self> {
        if event.kind() != EventKind::DeviceFound {
            return None;
        }
        let id = event.device_address()?;
        Some(Self {
            id: id.to_string(),
            name: event.name().map(str::to_string),
            signal: event.signal().unwrap_or(DEFAULT_SIGNAL),
        })
    }

    /// Signal on a 0..100 scale: negative RSSI values are shifted by 100,
    /// non-negative values are returned unchanged.
    pub fn normalized_signal(&self) -> i32 {
        if self.signal < 0 {
            100 + self.signal
        } else {
            self.signal
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} dBm)",
            self.name.as_deref().unwrap_or("Unknown"),
            self.id,
            self.signal
        )
    }
}
