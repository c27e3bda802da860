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

//! Raw broadcast events carried by the event bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute keys used by the adapter event kinds.
pub mod attr {
    pub const DEVICE: &str = "device";
    pub const STATE: &str = "state";
    pub const BOND_STATE: &str = "bondState";
    pub const NAME: &str = "name";
    pub const SIGNAL: &str = "signal";
}

/// Action identifiers understood by the bus.
///
/// The string forms are part of the contract with adapter backends and must
/// not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "adapter-state-changed")]
    AdapterStateChanged,
    #[serde(rename = "bond-state-changed")]
    BondStateChanged,
    #[serde(rename = "acl-connected")]
    AclConnected,
    #[serde(rename = "acl-disconnected")]
    AclDisconnected,
    #[serde(rename = "pairing-request-shown")]
    PairingRequestShown,
    #[serde(rename = "discovery-started")]
    DiscoveryStarted,
    #[serde(rename = "discovery-finished")]
    DiscoveryFinished,
    #[serde(rename = "device-found")]
    DeviceFound,
    #[serde(rename = "pairing-started")]
    PairingStarted,
    #[serde(rename = "pairing-failed")]
    PairingFailed,
    #[serde(rename = "pairing-timeout")]
    PairingTimeout,
}

impl EventKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdapterStateChanged => "adapter-state-changed",
            Self::BondStateChanged => "bond-state-changed",
            Self::AclConnected => "acl-connected",
            Self::AclDisconnected => "acl-disconnected",
            Self::PairingRequestShown => "pairing-request-shown",
            Self::DiscoveryStarted => "discovery-started",
            Self::DiscoveryFinished => "discovery-finished",
            Self::DeviceFound => "device-found",
            Self::PairingStarted => "pairing-started",
            Self::PairingFailed => "pairing-failed",
            Self::PairingTimeout => "pairing-timeout",
        }
    }

    /// Parse a string identifier.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "adapter-state-changed" => Self::AdapterStateChanged,
            "bond-state-changed" => Self::BondStateChanged,
            "acl-connected" => Self::AclConnected,
            "acl-disconnected" => Self::AclDisconnected,
            "pairing-request-shown" => Self::PairingRequestShown,
            "discovery-started" => Self::DiscoveryStarted,
            "discovery-finished" => Self::DiscoveryFinished,
            "device-found" => Self::DeviceFound,
            "pairing-started" => Self::PairingStarted,
            "pairing-failed" => Self::PairingFailed,
            "pairing-timeout" => Self::PairingTimeout,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on" => Some(PowerState::On),
            "off" => Some(PowerState::Off),
            _ => None,
        }
    }
}

/// Bond state of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondState {
    Bonded,
    Bonding,
    None,
}

impl BondState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondState::Bonded => "bonded",
            BondState::Bonding => "bonding",
            BondState::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bonded" => Some(BondState::Bonded),
            "bonding" => Some(BondState::Bonding),
            "none" => Some(BondState::None),
            _ => None,
        }
    }
}

/// A broadcast message as delivered by the bus.
///
/// Events are immutable once built; attributes are added with [`RawEvent::with`]
/// while constructing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    kind: EventKind,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

impl RawEvent {
    /// Create an event without attributes.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Create an event of `kind` about the device at `address`.
    pub fn for_device(kind: EventKind, address: &str) -> Self {
        Self::new(kind).with(attr::DEVICE, address)
    }

    /// Create an `adapter-state-changed` event.
    pub fn adapter_state(state: PowerState) -> Self {
        Self::new(EventKind::AdapterStateChanged).with(attr::STATE, state.as_str())
    }

    /// Create a `bond-state-changed` event.
    pub fn bond_state_changed(address: &str, state: BondState) -> Self {
        Self::for_device(EventKind::BondStateChanged, address).with(attr::BOND_STATE, state.as_str())
    }

    /// Create a `device-found` event.
    pub fn device_found(address: &str, name: Option<&str>, signal: Option<i32>) -> Self {
        let mut event = Self::for_device(EventKind::DeviceFound, address);
        if let Some(name) = name {
            event = event.with(attr::NAME, name);
        }
        if let Some(signal) = signal {
            event = event.with(attr::SIGNAL, signal);
        }
        event
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Hardware address of the device this event refers to, if any.
    pub fn device_address(&self) -> Option<&str> {
        self.attribute(attr::DEVICE).and_then(Value::as_str)
    }

    /// True when the event refers to `address` (addresses compare case-insensitively).
    pub fn is_about(&self, address: &str) -> bool {
        self.device_address()
            .map(|a| a.eq_ignore_ascii_case(address))
            .unwrap_or(false)
    }

    pub fn power_state(&self) -> Option<PowerState> {
        self.attribute(attr::STATE)
            .and_then(Value::as_str)
            .and_then(PowerState::parse)
    }

    pub fn bond_state(&self) -> Option<BondState> {
        self.attribute(attr::BOND_STATE)
            .and_then(Value::as_str)
            .and_then(BondState::parse)
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute(attr::NAME).and_then(Value::as_str)
    }

    pub fn signal(&self) -> Option<i32> {
        self.attribute(attr::SIGNAL)
            .and_then(Value::as_i64)
            .and_then(|s| i32::try_from(s).ok())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(address) = self.device_address() {
            write!(f, " [{}]", address)?;
        }
        Ok(())
    }
}
