// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Bridge State
//!
//! The only state the bridge owns: whether the zero-key sentinel has been
//! seeded. Bootstrap is an explicit startup phase, not ambient global
//! state: [`BridgeState`] can only be obtained from a successful
//! [`BridgeState::bootstrap`] call, and the forwarder requires it at
//! construction, so no forwarding call can precede the seeding.

use tracing::info;
use uuid::Uuid;

use crate::fhe::{FheClientError, FheComputeClient};
use crate::models::CiphertextHandle;

/// Witness that the one-time zero-key bootstrap completed.
#[derive(Debug)]
pub struct BridgeState {
    zero_key_initialized: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Seeding the zero-key sentinel failed. Startup must abort rather
    /// than run partially initialized.
    #[error("zero-key seeding failed: {0}")]
    Seed(#[from] FheClientError),
}

impl BridgeState {
    /// Seed the all-zero handle with value 0 on the encryption service.
    ///
    /// Other service operations rely on the zero record as a safe default
    /// operand. The store is last-write-wins per key, so re-running the
    /// bootstrap (on restart, or after a redelivered call) leaves the
    /// value at 0.
    pub async fn bootstrap(client: &FheComputeClient) -> Result<Self, BootstrapError> {
        let idempotency_key = Uuid::new_v5(&Uuid::NAMESPACE_OID, b"cipher-relay/zero-key");
        client
            .store(CiphertextHandle::ZERO, 0, idempotency_key)
            .await?;

        info!(handle = %CiphertextHandle::ZERO, "zero-key sentinel seeded");
        Ok(Self {
            zero_key_initialized: true,
        })
    }

    /// True once the sentinel record exists; always true for a constructed
    /// state.
    pub fn zero_key_initialized(&self) -> bool {
        self.zero_key_initialized
    }
}
