// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! # Event Forwarder
//!
//! Single-consumer worker that drains the batch channel, extracts typed
//! events, and maps them onto encryption-service calls:
//!
//! - `Deposit` → `store(handle, lamports)`
//! - `Transfer` → `transfer(sender, recipient, amount)`
//! - `HomomorphicAdd` → `add(lhs, rhs)`, result handle discarded
//!
//! Routing everything through one worker serializes effects in ledger
//! arrival order, and in parse order within a batch. The ledger's own
//! instruction ordering is what guarantees a transfer's deposit records
//! exist before the transfer event arrives; the bridge adds no bookkeeping
//! of its own.
//!
//! ## Retry policy
//!
//! Transport failures and server errors retry up to [`MAX_ATTEMPTS`] with
//! linear backoff. Application rejections are logged and dropped without
//! retry. Exhausted retries drop the forward; there is no durable
//! dead-letter queue, and the error log carries the idempotency key so
//! an operator can replay by hand.
//!
//! ## Shutdown
//!
//! On cancellation the worker closes its receiver, finishes the batches
//! already queued, and exits.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::extractor::extract_events;
use crate::fhe::{FheClientError, FheComputeClient};
use crate::models::{BridgeEvent, RawLogBatch};
use crate::state::BridgeState;

/// Total tries per forwarded call, the first included.
pub const MAX_ATTEMPTS: u32 = 3;

/// Linear backoff step: attempt n waits n times this long.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Single-consumer forwarding worker.
pub struct Forwarder {
    client: FheComputeClient,
    state: BridgeState,
    retry_base_delay: Duration,
}

impl Forwarder {
    /// Requires the bootstrap witness: a forwarder cannot exist before the
    /// zero-key sentinel is seeded.
    pub fn new(client: FheComputeClient, state: BridgeState) -> Self {
        Self {
            client,
            state,
            retry_base_delay: RETRY_BASE_DELAY,
        }
    }

    /// Shrink the backoff step, for tests that exercise the retry path.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Run the worker until cancellation, then drain what is queued.
    pub async fn run(self, mut rx: mpsc::Receiver<RawLogBatch>, shutdown: CancellationToken) {
        info!(
            zero_key_initialized = self.state.zero_key_initialized(),
            "forwarder starting"
        );

        let mut draining = false;
        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if !draining => {
                    // Close the channel; recv keeps yielding whatever was
                    // already queued, then returns None.
                    rx.close();
                    draining = true;
                }
                batch = rx.recv() => match batch {
                    Some(batch) => self.process_batch(batch).await,
                    None => break,
                }
            }
        }

        info!("forwarder stopped");
    }

    /// Extract and forward one batch, preserving parse order.
    async fn process_batch(&self, batch: RawLogBatch) {
        let events = extract_events(&batch);
        if events.is_empty() {
            return;
        }

        debug!(
            signature = %batch.signature,
            slot = batch.slot,
            events = events.len(),
            "forwarding batch"
        );

        for event in events {
            self.forward_event(event).await;
        }
    }

    /// Forward one event, applying the retry policy. Never fails upward:
    /// every outcome ends in a log line and the event being dropped.
    async fn forward_event(&self, event: BridgeEvent) {
        let idempotency_key = event.idempotency_key();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.dispatch(&event, idempotency_key).await {
                Ok(()) => {
                    info!(
                        kind = event.kind(),
                        idempotency_key = %idempotency_key,
                        "event forwarded"
                    );
                    return;
                }
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = self.retry_base_delay * attempt;
                    warn!(
                        kind = event.kind(),
                        error = %e,
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        "forward attempt failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    error!(
                        kind = event.kind(),
                        error = %e,
                        idempotency_key = %idempotency_key,
                        "dropping event after exhausted retries"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        kind = event.kind(),
                        error = %e,
                        idempotency_key = %idempotency_key,
                        "dropping event rejected by the service"
                    );
                    return;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        event: &BridgeEvent,
        idempotency_key: Uuid,
    ) -> Result<(), FheClientError> {
        match event {
            BridgeEvent::Deposit {
                owner,
                lamports,
                handle,
            } => {
                debug!(owner = %owner, lamports, handle = %handle, "storing deposit");
                self.client.store(*handle, *lamports, idempotency_key).await
            }
            BridgeEvent::Transfer {
                amount_handle,
                sender_handle,
                recipient_handle,
            } => {
                self.client
                    .transfer(
                        *sender_handle,
                        *recipient_handle,
                        *amount_handle,
                        idempotency_key,
                    )
                    .await
            }
            BridgeEvent::HomomorphicAdd { lhs, rhs, result } => {
                let service_result = self.client.add(*lhs, *rhs, idempotency_key).await?;
                if service_result != *result {
                    // Derivation rules live on-chain; divergence is worth a
                    // trace but the bridge persists neither handle.
                    debug!(
                        onchain = %result,
                        service = %service_result,
                        "service result handle differs from on-chain derivation"
                    );
                }
                Ok(())
            }
        }
    }
}
