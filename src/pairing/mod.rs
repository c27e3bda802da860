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

//! Device bonding.
//!
//! [`PairingEngine`] turns bus traffic into [`PairEvent`]s for one device;
//! [`PairingRequest`] adds the progress watchdog on top.

mod engine;
mod event;
mod request;

pub use engine::PairingEngine;
pub use event::{PairEvent, PairEventKind};
pub use request::{PairingRequest, DEFAULT_PAIRING_TIMEOUT_SECS};
