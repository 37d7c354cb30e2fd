// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Encryption Service Client
//!
//! Thin protocol adapter for the off-chain confidential-compute service.
//! Four operations, each one JSON request/response round trip against a
//! configurable base URL:
//!
//! | Operation | Method | Path | Response |
//! |-----------|--------|------|----------|
//! | `store` | POST | `/post` | acknowledgement |
//! | `decrypt` | POST | `/view` | `{ "result": u64 }` |
//! | `transfer` | POST | `/transfer` | acknowledgement |
//! | `add` | POST | `/add` | `{ "result_key": [u8; 32] }` |
//!
//! The client performs no retries; the forwarder owns the retry policy and
//! uses [`FheClientError::is_retryable`] to distinguish transport failures
//! from application rejections. Every request carries an `Idempotency-Key`
//! header supplied by the caller.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::CiphertextHandle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from encryption-service calls.
#[derive(Debug, thiserror::Error)]
pub enum FheClientError {
    /// HTTP transport failure (connection error, timeout).
    #[error("HTTP error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status.
    #[error("encryption service {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The service answered 2xx but the body did not match the contract.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl FheClientError {
    /// Whether the forwarder may retry the call.
    ///
    /// Transport failures and server errors are transient; client errors
    /// mean the request itself was rejected and a retry would repeat the
    /// same rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            FheClientError::Transport { .. } => true,
            FheClientError::Api { status, .. } => *status >= 500,
            FheClientError::InvalidResponse { .. } => false,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct StoreRequest {
    key: CiphertextHandle,
    value: u64,
}

#[derive(Debug, Serialize)]
struct DecryptRequest {
    key: CiphertextHandle,
}

#[derive(Debug, Deserialize)]
struct DecryptResponse {
    result: u64,
}

#[derive(Debug, Serialize)]
struct TransferRequest {
    sender_key: CiphertextHandle,
    recipient_key: CiphertextHandle,
    transfer_value: CiphertextHandle,
}

#[derive(Debug, Serialize)]
struct AddRequest {
    lhs_key: CiphertextHandle,
    rhs_key: CiphertextHandle,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    result_key: CiphertextHandle,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the encryption service.
#[derive(Debug, Clone)]
pub struct FheComputeClient {
    base_url: String,
    http: Client,
}

impl FheComputeClient {
    /// Build a client for the given base URL.
    pub fn new(base_url: &str) -> Result<Self, FheClientError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FheClientError::Transport {
                endpoint: "client".to_string(),
                source: e,
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Store `value` under `key`, encrypting it service-side.
    ///
    /// Last write wins per key, so the call is naturally idempotent.
    pub async fn store(
        &self,
        key: CiphertextHandle,
        value: u64,
        idempotency_key: Uuid,
    ) -> Result<(), FheClientError> {
        self.post_json("/post", &StoreRequest { key, value }, idempotency_key)
            .await?;
        Ok(())
    }

    /// Decrypt the value stored under `key`.
    pub async fn decrypt(
        &self,
        key: CiphertextHandle,
        idempotency_key: Uuid,
    ) -> Result<u64, FheClientError> {
        let response = self
            .post_json("/view", &DecryptRequest { key }, idempotency_key)
            .await?;
        let parsed: DecryptResponse =
            serde_json::from_value(response).map_err(|e| FheClientError::InvalidResponse {
                endpoint: "/view".to_string(),
                reason: e.to_string(),
            })?;
        Ok(parsed.result)
    }

    /// Move the encrypted `amount` from `sender` to `recipient`.
    ///
    /// Deposit records for all three handles must already exist; the service
    /// rejects the call otherwise.
    pub async fn transfer(
        &self,
        sender: CiphertextHandle,
        recipient: CiphertextHandle,
        amount: CiphertextHandle,
        idempotency_key: Uuid,
    ) -> Result<(), FheClientError> {
        let request = TransferRequest {
            sender_key: sender,
            recipient_key: recipient,
            transfer_value: amount,
        };
        self.post_json("/transfer", &request, idempotency_key)
            .await?;
        Ok(())
    }

    /// Homomorphically add the two operands; returns the handle the service
    /// stored the sum under.
    pub async fn add(
        &self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
        idempotency_key: Uuid,
    ) -> Result<CiphertextHandle, FheClientError> {
        let request = AddRequest {
            lhs_key: lhs,
            rhs_key: rhs,
        };
        let response = self.post_json("/add", &request, idempotency_key).await?;
        let parsed: AddResponse =
            serde_json::from_value(response).map_err(|e| FheClientError::InvalidResponse {
                endpoint: "/add".to_string(),
                reason: e.to_string(),
            })?;
        Ok(parsed.result_key)
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
        idempotency_key: Uuid,
    ) -> Result<serde_json::Value, FheClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Idempotency-Key", idempotency_key.to_string())
            .json(payload)
            .send()
            .await
            .map_err(|e| FheClientError::Transport {
                endpoint: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FheClientError::Api {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // Acknowledgement-only endpoints answer with an empty body.
        let text = response
            .text()
            .await
            .map_err(|e| FheClientError::Transport {
                endpoint: path.to_string(),
                source: e,
            })?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| FheClientError::InvalidResponse {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }
}
