// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Cipher Relay Contributors

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cipher_relay::config::BridgeConfig;
use cipher_relay::fhe::FheComputeClient;
use cipher_relay::forwarder::Forwarder;
use cipher_relay::listener::LogListener;
use cipher_relay::state::BridgeState;

/// Batches buffered between the listener and the forwarder. The channel
/// applies backpressure to the subscription reader when the service is
/// slow; the ledger side is never blocked.
const BATCH_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        rpc_url = %config.rpc_url,
        ws_url = %config.ws_url,
        program_id = %config.program_id,
        fhe_service_url = %config.fhe_service_url,
        "starting cipher relay"
    );

    let client = match FheComputeClient::new(&config.fhe_service_url) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to build encryption service client");
            std::process::exit(1);
        }
    };

    // One-time zero-key bootstrap. Runs before the subscription starts and
    // aborts the process on failure rather than running partially
    // initialized.
    let state = match BridgeState::bootstrap(&client).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "bootstrap failed, aborting startup");
            std::process::exit(1);
        }
    };

    let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
    let shutdown = CancellationToken::new();

    let listener = LogListener::new(&config);
    let mut listener_task = tokio::spawn(listener.run(batch_tx, shutdown.clone()));

    let forwarder = Forwarder::new(client, state);
    let forwarder_task = tokio::spawn(forwarder.run(batch_rx, shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
            match (&mut listener_task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "listener exited with error"),
                Err(e) => tracing::error!(error = %e, "listener task panicked"),
            }
        }
        result = &mut listener_task => {
            match result {
                Ok(Ok(())) => tracing::info!("listener finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "log subscription closed"),
                Err(e) => tracing::error!(error = %e, "listener task panicked"),
            }
            shutdown.cancel();
        }
    }

    // Let queued forwards drain before exiting.
    if let Err(e) = forwarder_task.await {
        tracing::error!(error = %e, "forwarder task panicked");
    }

    tracing::info!("cipher relay stopped");
}

/// Initialize tracing from `RUST_LOG` and `LOG_FORMAT` (`json` or
/// `pretty`, defaulting to pretty).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
