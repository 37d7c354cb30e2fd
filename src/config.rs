// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Empty or
//! whitespace-only values are treated as unset.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SOLANA_RPC_URL` | Ledger JSON-RPC endpoint | `http://localhost:8899` |
//! | `SOLANA_WS_URL` | Ledger log-stream (pubsub) endpoint | `ws://localhost:8900` |
//! | `RELAY_PROGRAM_ID` | Program identifier to watch (base58) | Required |
//! | `FHE_SERVICE_URL` | Encryption-service base URL | `http://localhost:3000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use url::Url;

const DEFAULT_RPC_URL: &str = "http://localhost:8899";
const DEFAULT_WS_URL: &str = "ws://localhost:8900";
const DEFAULT_FHE_SERVICE_URL: &str = "http://localhost:3000";

/// Resolved relayer configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// Ledger pubsub endpoint the log subscription connects to.
    pub ws_url: String,
    /// The on-chain program whose logs are bridged.
    pub program_id: Pubkey,
    /// Base URL of the encryption service, without a trailing slash.
    pub fhe_service_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    Missing(String),

    #[error("invalid program id in {name}: {reason}")]
    InvalidProgramId { name: String, reason: String },

    #[error("invalid URL in {name}: {reason}")]
    InvalidUrl { name: String, reason: String },
}

impl BridgeConfig {
    /// Load the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = env_or_default("SOLANA_RPC_URL", DEFAULT_RPC_URL);
        let ws_url = env_or_default("SOLANA_WS_URL", DEFAULT_WS_URL);

        let program_id_raw = env_required("RELAY_PROGRAM_ID")?;
        let program_id =
            Pubkey::from_str(&program_id_raw).map_err(|e| ConfigError::InvalidProgramId {
                name: "RELAY_PROGRAM_ID".to_string(),
                reason: e.to_string(),
            })?;

        let fhe_service_url = env_or_default("FHE_SERVICE_URL", DEFAULT_FHE_SERVICE_URL);
        Url::parse(&fhe_service_url).map_err(|e| ConfigError::InvalidUrl {
            name: "FHE_SERVICE_URL".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            rpc_url,
            ws_url,
            program_id,
            fhe_service_url: fhe_service_url.trim_end_matches('/').to_string(),
        })
    }
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    env_optional(name).ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests mutate process environment, so each uses a distinct
    // variable name and never the names read by from_env.

    #[test]
    fn env_optional_treats_blank_as_unset() {
        std::env::set_var("CIPHER_RELAY_TEST_BLANK", "   ");
        assert_eq!(env_optional("CIPHER_RELAY_TEST_BLANK"), None);
        std::env::remove_var("CIPHER_RELAY_TEST_BLANK");
    }

    #[test]
    fn env_optional_trims_values() {
        std::env::set_var("CIPHER_RELAY_TEST_TRIM", "  value  ");
        assert_eq!(
            env_optional("CIPHER_RELAY_TEST_TRIM"),
            Some("value".to_string())
        );
        std::env::remove_var("CIPHER_RELAY_TEST_TRIM");
    }

    #[test]
    fn env_or_default_falls_back() {
        assert_eq!(
            env_or_default("CIPHER_RELAY_TEST_UNSET", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn env_required_reports_the_variable_name() {
        let err = env_required("CIPHER_RELAY_TEST_MISSING").unwrap_err();
        assert!(err.to_string().contains("CIPHER_RELAY_TEST_MISSING"));
    }
}
