// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Bridge Data Models
//!
//! This module defines the typed records that flow through the relayer:
//! raw log batches from the ledger subscription, the ciphertext handle
//! newtype shared with the encryption service, and the typed events the
//! extractor produces from log text.
//!
//! ## Ciphertext Handle Type
//!
//! The [`CiphertextHandle`] newtype wraps the 32-byte opaque identifier used
//! both as an on-ledger derivation seed and as the encryption-service record
//! key. On the wire it is always a JSON array of 32 integers; it never
//! carries plaintext.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Ciphertext Handle Type
// =============================================================================

/// Opaque 32-byte ciphertext handle.
///
/// Serializes as a JSON array of 32 integers, the wire shape shared by the
/// on-chain log text and the encryption-service API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    /// The all-zero sentinel handle seeded at bootstrap.
    pub const ZERO: CiphertextHandle = CiphertextHandle([0u8; 32]);

    /// Raw bytes of the handle.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for CiphertextHandle {
    /// Renders the first four bytes as hex, enough to correlate log lines
    /// without dumping the full handle.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}…",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl From<[u8; 32]> for CiphertextHandle {
    fn from(value: [u8; 32]) -> Self {
        CiphertextHandle(value)
    }
}

impl TryFrom<&[u8]> for CiphertextHandle {
    type Error = usize;

    /// Fails with the actual length when the slice is not exactly 32 bytes.
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 32] = value.try_into().map_err(|_| value.len())?;
        Ok(CiphertextHandle(bytes))
    }
}

// =============================================================================
// Raw Log Batch
// =============================================================================

/// The ordered log lines from one ledger transaction's execution.
///
/// The `(slot, signature)` pair is the sequence marker used for ordering and
/// duplicate detection; delivery from the subscription is at-least-once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogBatch {
    /// Transaction signature the lines were emitted under.
    pub signature: String,
    /// Ledger slot the transaction was confirmed in.
    pub slot: u64,
    /// Log lines in execution order.
    pub logs: Vec<String>,
}

// =============================================================================
// Bridge Events
// =============================================================================

/// A typed business event reconstructed from one log batch.
///
/// Constructed by the extractor, consumed exactly once by the forwarder,
/// then discarded. The bridge keeps no durable record of past events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A user deposited lamports; the program minted a ciphertext handle
    /// for the encrypted balance record.
    Deposit {
        /// Depositor as logged by the program (opaque text, not re-validated).
        owner: String,
        /// Public deposit amount in lamports.
        lamports: u64,
        /// Handle the encryption service will store the balance under.
        handle: CiphertextHandle,
    },
    /// An encrypted transfer between two existing deposit records.
    ///
    /// Deposit records for all three handles are assumed to exist already;
    /// the ledger's instruction ordering enforces that, not the bridge.
    Transfer {
        /// Handle of the encrypted transfer amount.
        amount_handle: CiphertextHandle,
        /// Sender's balance handle.
        sender_handle: CiphertextHandle,
        /// Recipient's balance handle.
        recipient_handle: CiphertextHandle,
    },
    /// A homomorphic addition requested on-chain.
    HomomorphicAdd {
        /// Left operand handle.
        lhs: CiphertextHandle,
        /// Right operand handle.
        rhs: CiphertextHandle,
        /// Result handle as derived on-chain; opaque to the bridge.
        result: CiphertextHandle,
    },
}

/// UUID namespace for deriving idempotency keys from event content.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

impl BridgeEvent {
    /// Short tag used in logs and metrics fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::Deposit { .. } => "deposit",
            BridgeEvent::Transfer { .. } => "transfer",
            BridgeEvent::HomomorphicAdd { .. } => "homomorphic_add",
        }
    }

    /// Deterministic idempotency key for the forwarded call.
    ///
    /// Derived as a UUIDv5 over the event's canonical content bytes, so a
    /// redelivered batch produces the same key and the service can
    /// deduplicate if it supports it. Delivery stays at-least-once either
    /// way.
    pub fn idempotency_key(&self) -> Uuid {
        let mut content = Vec::with_capacity(128);
        content.extend_from_slice(self.kind().as_bytes());
        content.push(0);
        match self {
            BridgeEvent::Deposit {
                owner,
                lamports,
                handle,
            } => {
                content.extend_from_slice(owner.as_bytes());
                content.push(0);
                content.extend_from_slice(&lamports.to_le_bytes());
                content.extend_from_slice(handle.as_bytes());
            }
            BridgeEvent::Transfer {
                amount_handle,
                sender_handle,
                recipient_handle,
            } => {
                content.extend_from_slice(sender_handle.as_bytes());
                content.extend_from_slice(recipient_handle.as_bytes());
                content.extend_from_slice(amount_handle.as_bytes());
            }
            BridgeEvent::HomomorphicAdd { lhs, rhs, result } => {
                content.extend_from_slice(lhs.as_bytes());
                content.extend_from_slice(rhs.as_bytes());
                content.extend_from_slice(result.as_bytes());
            }
        }
        Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, &content)
    }
}
