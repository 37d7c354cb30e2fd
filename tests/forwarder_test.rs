// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

//! End-to-end forwarding tests: log batches in, encryption-service calls
//! out, observed through a mock server's request log.
//!
//! Each test bootstraps the zero key against the mock, then resets the
//! server so assertions only see the traffic under test.

use std::time::Duration;

use cipher_relay::fhe::FheComputeClient;
use cipher_relay::forwarder::{Forwarder, MAX_ATTEMPTS};
use cipher_relay::models::RawLogBatch;
use cipher_relay::state::BridgeState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn array_text(first: u8) -> String {
    let mut values = vec![0u8; 32];
    values[0] = first;
    format!(
        "[{}]",
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn handle_json(first: u8) -> serde_json::Value {
    let mut values = vec![0u8; 32];
    values[0] = first;
    serde_json::json!(values)
}

fn batch(signature: &str, slot: u64, lines: &[String]) -> RawLogBatch {
    RawLogBatch {
        signature: signature.to_string(),
        slot,
        logs: lines.to_vec(),
    }
}

fn deposit_batch(signature: &str, slot: u64, owner: &str, lamports: u64, first: u8) -> RawLogBatch {
    batch(
        signature,
        slot,
        &[
            format!("Program log: User {owner} deposited {lamports} lamports"),
            format!("Program log: Deposit info: {}", array_text(first)),
        ],
    )
}

/// Bootstrap against the mock, then wipe its mocks and request log so the
/// test only observes its own traffic.
async fn bootstrapped_forwarder(server: &MockServer) -> Forwarder {
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    let client = FheComputeClient::new(&server.uri()).unwrap();
    let state = BridgeState::bootstrap(&client).await.unwrap();
    server.reset().await;

    Forwarder::new(client, state).with_retry_base_delay(Duration::from_millis(5))
}

/// Feed the batches through the channel and run the worker to completion.
async fn run_batches(forwarder: Forwarder, batches: Vec<RawLogBatch>) {
    let (tx, rx) = mpsc::channel(batches.len().max(1));
    for b in batches {
        tx.send(b).await.unwrap();
    }
    drop(tx);
    forwarder.run(rx, CancellationToken::new()).await;
}

#[tokio::test]
async fn deposit_batch_issues_one_store() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_json(serde_json::json!({
            "key": handle_json(1),
            "value": 1_000_000_000u64
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    run_batches(
        forwarder,
        vec![deposit_batch("sig-a", 10, "Abc", 1_000_000_000, 1)],
    )
    .await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn add_batch_issues_add_and_discards_the_result() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    Mock::given(method("POST"))
        .and(path("/add"))
        .and(body_json(serde_json::json!({
            "lhs_key": handle_json(1),
            "rhs_key": handle_json(4)
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            // A handle that matches nothing on-chain; the bridge must not
            // care, the result is discarded locally.
            "result_key": handle_json(99)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let add_batch = batch(
        "sig-b",
        11,
        &[
            format!("Program log: FHE Add - LHS: {}", array_text(1)),
            format!("Program log: FHE Add - RHS: {}", array_text(4)),
            format!("Program log: FHE addition result: {}", array_text(5)),
        ],
    );
    run_batches(forwarder, vec![add_batch]).await;

    // Exactly the one add call, nothing persisted or fetched afterwards.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stores_are_issued_before_the_dependent_transfer_in_arrival_order() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/transfer"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transfer_batch = batch(
        "sig-3",
        3,
        &[
            format!("Program log: Sender's deposit value: {}", array_text(2)),
            format!("Program log: Recipient's deposit value: {}", array_text(1)),
            format!(
                "Program log: Transferring {} from Sender111 to Recipient111",
                array_text(9)
            ),
        ],
    );

    run_batches(
        forwarder,
        vec![
            deposit_batch("sig-1", 1, "Alice", 100, 1),
            deposit_batch("sig-2", 2, "Bob", 50, 2),
            transfer_batch,
        ],
    )
    .await;

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/post", "/post", "/transfer"]);

    let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(first["value"], 100);
    assert_eq!(second["value"], 50);
}

#[tokio::test]
async fn transport_failure_then_success_is_one_effective_store() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    // First attempt hits a transient server error, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    run_batches(forwarder, vec![deposit_batch("sig-r", 5, "Abc", 77, 3)]).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2, "one failed attempt plus one retry");

    // Both attempts are byte-identical and carry the same deterministic
    // idempotency key, so a deduplicating server applies the write once;
    // without dedup the store is last-write-wins on the same key either
    // way.
    assert_eq!(requests[0].body, requests[1].body);
    assert_eq!(
        requests[0].headers.get("Idempotency-Key"),
        requests[1].headers.get("Idempotency-Key")
    );
}

#[tokio::test]
async fn application_rejection_is_not_retried() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(400).set_body_string("rejected handle"))
        .expect(1)
        .mount(&server)
        .await;

    run_batches(forwarder, vec![deposit_batch("sig-x", 6, "Abc", 5, 4)]).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_drop_the_event_and_the_worker_continues() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    // The first deposit's handle always fails; the second succeeds.
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_json(serde_json::json!({
            "key": handle_json(1),
            "value": 10u64
        })))
        .respond_with(ResponseTemplate::new(500))
        .expect(u64::from(MAX_ATTEMPTS))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_json(serde_json::json!({
            "key": handle_json(2),
            "value": 20u64
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    run_batches(
        forwarder,
        vec![
            deposit_batch("sig-f", 7, "Abc", 10, 1),
            deposit_batch("sig-g", 8, "Def", 20, 2),
        ],
    )
    .await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), MAX_ATTEMPTS as usize + 1);
}

#[tokio::test]
async fn unrelated_batches_produce_no_calls() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    let noise = batch(
        "sig-n",
        9,
        &[
            "Program 11111111111111111111111111111111 invoke [1]".to_string(),
            "Program 11111111111111111111111111111111 success".to_string(),
        ],
    );
    run_batches(forwarder, vec![noise]).await;

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn queued_batches_drain_after_cancellation() {
    let server = MockServer::start().await;
    let forwarder = bootstrapped_forwarder(&server).await;

    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(deposit_batch("sig-d", 12, "Abc", 33, 6))
        .await
        .unwrap();

    // Cancel before the worker ever runs: the queued batch must still be
    // forwarded before the worker exits.
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    forwarder.run(rx, shutdown).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn bootstrap_twice_leaves_the_zero_value_stored_once_each_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_json(serde_json::json!({
            "key": vec![0u8; 32],
            "value": 0
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = FheComputeClient::new(&server.uri()).unwrap();
    BridgeState::bootstrap(&client).await.unwrap();
    BridgeState::bootstrap(&client).await.unwrap();

    // Identical writes of value 0 under the zero key: the second run is a
    // no-op by last-write-wins, and both carry the same idempotency key.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
    assert_eq!(
        requests[0].headers.get("Idempotency-Key"),
        requests[1].headers.get("Idempotency-Key")
    );
}
