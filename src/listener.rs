// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Log Source Adapter
//!
//! Subscribes to the ledger's confirmed-transaction log stream for the
//! bridged program and pushes [`RawLogBatch`] values into the forwarding
//! channel. Delivery is at-least-once: a reconnect can replay batches,
//! and downstream consumers key on the `(slot, signature)` marker.
//!
//! ## Strategy
//!
//! 1. Connect the pubsub client and issue `logsSubscribe` with a mentions
//!    filter on the program id, confirmed commitment.
//! 2. Forward every successful-transaction batch; batches whose error flag
//!    is set are discarded (the transaction failed, its effects never
//!    happened).
//! 3. On transient loss, reconnect with exponential backoff. A successful
//!    subscription resets the failure counter; after
//!    `MAX_CONSECUTIVE_FAILURES` failed attempts in a row the listener
//!    surfaces a terminal [`ListenerError::SubscriptionClosed`].
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`: stop accepting batches,
//! unsubscribe, and release the connection without leaking it.

use std::time::Duration;

use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::models::RawLogBatch;

/// Reconnect attempts tolerated in a row before giving up.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// First reconnect delay; doubles per failure.
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delay cap.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("pubsub connection failed: {0}")]
    Connect(String),

    #[error("log subscription failed: {0}")]
    Subscribe(String),

    /// Terminal condition: the reconnect ceiling was exhausted.
    #[error("subscription closed after {attempts} consecutive failed reconnects")]
    SubscriptionClosed { attempts: u32 },
}

/// How one subscription session ended.
enum SessionEnd {
    /// Cancellation requested, or the consumer went away.
    Shutdown,
    /// The server closed the stream; reconnect.
    Lost,
}

/// Ledger log subscription task.
pub struct LogListener {
    ws_url: String,
    program_id: Pubkey,
}

impl LogListener {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            program_id: config.program_id,
        }
    }

    /// Run the subscription until shutdown or the reconnect ceiling.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(listener.run(batch_tx, shutdown.clone()));
    /// ```
    pub async fn run(
        self,
        tx: mpsc::Sender<RawLogBatch>,
        shutdown: CancellationToken,
    ) -> Result<(), ListenerError> {
        info!(
            ws_url = %self.ws_url,
            program_id = %self.program_id,
            "log listener starting"
        );

        let mut consecutive_failures = 0u32;
        let mut retry_delay = RECONNECT_BASE_DELAY;

        loop {
            if shutdown.is_cancelled() {
                info!("log listener shutting down");
                return Ok(());
            }

            match self.subscribe_session(&tx, &shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("log listener shutting down");
                    return Ok(());
                }
                Ok(SessionEnd::Lost) => {
                    // The subscription itself succeeded, so the endpoint is
                    // healthy enough to start the backoff ladder over.
                    consecutive_failures = 0;
                    retry_delay = RECONNECT_BASE_DELAY;
                    warn!("log stream ended, resubscribing");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(ListenerError::SubscriptionClosed {
                            attempts: consecutive_failures,
                        });
                    }
                    warn!(
                        error = %e,
                        attempt = consecutive_failures,
                        max_attempts = MAX_CONSECUTIVE_FAILURES,
                        "subscription attempt failed, retrying in {retry_delay:?}"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {},
                _ = shutdown.cancelled() => {
                    info!("log listener shutting down");
                    return Ok(());
                }
            }
            retry_delay = next_delay(retry_delay);
        }
    }

    /// One connect-subscribe-drain cycle.
    async fn subscribe_session(
        &self,
        tx: &mpsc::Sender<RawLogBatch>,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd, ListenerError> {
        let client = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| ListenerError::Connect(e.to_string()))?;

        let filter = RpcTransactionLogsFilter::Mentions(vec![self.program_id.to_string()]);
        let config = RpcTransactionLogsConfig {
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let (mut stream, unsubscribe) = client
            .logs_subscribe(filter, config)
            .await
            .map_err(|e| ListenerError::Subscribe(e.to_string()))?;

        info!(program_id = %self.program_id, "log subscription established");

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
                item = stream.next() => match item {
                    Some(response) => {
                        let slot = response.context.slot;
                        let value = response.value;
                        if value.err.is_some() {
                            // Failed transaction: its effects never happened.
                            debug!(
                                signature = %value.signature,
                                slot,
                                "discarding failed-transaction batch"
                            );
                            continue;
                        }
                        let batch = RawLogBatch {
                            signature: value.signature,
                            slot,
                            logs: value.logs,
                        };
                        if tx.send(batch).await.is_err() {
                            // Consumer gone; the process is coming down.
                            break SessionEnd::Shutdown;
                        }
                    }
                    None => break SessionEnd::Lost,
                }
            }
        };

        unsubscribe().await;
        drop(stream);
        if let Err(e) = client.shutdown().await {
            debug!(error = %e, "pubsub client shutdown reported an error");
        }

        Ok(outcome)
    }
}

fn next_delay(current: Duration) -> Duration {
    std::cmp::min(current * 2, RECONNECT_MAX_DELAY)
}
