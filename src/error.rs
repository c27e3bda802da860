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

//! Error types for pairing and discovery operations.

use thiserror::Error;

use crate::bluetooth::AdapterError;

/// Errors raised by an event bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The bridge was built without any event kind to listen for.
    #[error("Event bridge needs at least one event kind")]
    EmptyFilter,

    /// The start operation failed before the listener was registered.
    #[error("Start operation failed: {0}")]
    StartOperation(#[from] AdapterError),
}

/// Terminal errors surfaced to callers of pairing and discovery requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HelperError {
    /// Explicit platform failure, disconnect during bonding, or bonding could
    /// not be started.
    #[error("Pairing with {address} failed: {reason}")]
    PairingFailed { address: String, reason: String },

    /// No qualifying progress within the pairing window.
    #[error("Pairing with {address} timed out")]
    PairingTimeout { address: String },

    /// Discovery could not be started.
    #[error("Discovery could not be started: {0}")]
    DiscoveryStartFailed(String),

    /// The adapter could not be powered on or off.
    #[error("Adapter power change failed: {0}")]
    AdapterPower(String),

    /// Misconfigured event bridge.
    #[error("Event bridge error: {0}")]
    Bridge(BridgeError),
}

impl HelperError {
    pub(crate) fn pairing_failed(address: &str, reason: impl Into<String>) -> Self {
        Self::PairingFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Map a failure while powering the adapter.
    pub(crate) fn from_power(err: BridgeError) -> Self {
        match err {
            BridgeError::StartOperation(e) => Self::AdapterPower(e.to_string()),
            other => Self::Bridge(other),
        }
    }
}

/// Convenience Result type for pairing and discovery operations.
pub type Result<T> = std::result::Result<T, HelperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formats() {
        let err = HelperError::pairing_failed("00:11:22:33:44:55", "acl-disconnected");
        assert!(err.to_string().contains("00:11:22:33:44:55"));
        assert!(err.to_string().contains("acl-disconnected"));

        let err = HelperError::PairingTimeout {
            address: "00:11:22:33:44:55".to_string(),
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_power_errors_are_classified() {
        let err = HelperError::from_power(BridgeError::StartOperation(AdapterError::Power(
            "rfkill".to_string(),
        )));
        assert!(matches!(err, HelperError::AdapterPower(ref msg) if msg.contains("rfkill")));

        let err = HelperError::from_power(BridgeError::EmptyFilter);
        assert_eq!(err, HelperError::Bridge(BridgeError::EmptyFilter));
    }
}
