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

use std::fmt;

use crate::device::Device;

/// Progress reported while bonding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairEventKind {
    /// Bonding was requested.
    Started,
    /// Link-layer connection or pairing prompt observed.
    OnProgress,
    /// The device is bonded. Always the last event.
    Succeeded,
    /// The platform reported the device as not bonded.
    NotDone,
}

impl PairEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::OnProgress => "on-progress",
            Self::Succeeded => "succeeded",
            Self::NotDone => "not-done",
        }
    }
}

/// A pairing progress signal for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairEvent {
    kind: PairEventKind,
    device: Device,
}

impl PairEvent {
    pub(crate) fn new(kind: PairEventKind, device: Device) -> Self {
        Self { kind, device }
    }

    pub fn kind(&self) -> PairEventKind {
        self.kind
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn into_device(self) -> Device {
        self.device
    }
}

impl fmt::Display for PairEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind.as_str(), self.device.id)
    }
}
