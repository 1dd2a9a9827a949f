//! Binary entry point: load config, stand up shared state, and run the BLS
//! and Relay servers side by side. Peer bootstrap and the Relay Monitor are
//! optional — they only start when `discovery_relays` is non-empty.

use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use nostr_sdk::{Keys, SecretKey};
use relay_sdk::channel::ChannelManager;
use relay_sdk::connector::HttpConnectorAdapter;
use relay_sdk::{BootstrapConfig, BootstrapService, IlpPeerInfo, RelayMonitor};
use relay_node::config::Cli;
use relay_node::state::AppState;
use relay_node::{bls, relay};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Cli::parse().resolve().map_err(|e| {
        error!("configuration error: {e}");
        e
    })?;

    let secret_key = SecretKey::from_hex(config.node_secret_key.trim())
        .map_err(|e| format!("invalid node_secret_key: {e}"))?;
    let keys = Keys::new(secret_key);
    let connector = Arc::new(HttpConnectorAdapter::new(config.connector_url.clone()));
    let state = Arc::new(
        AppState::new(&config, keys.clone(), connector.clone())
            .map_err(|e| format!("failed to initialize app state: {e}"))?,
    );

    if !config.discovery_relays.is_empty() {
        spawn_bootstrap(&config, keys, connector);
    }

    let bls_listener = TcpListener::bind(&config.bls_listen_addr).await?;
    let relay_listener = TcpListener::bind(&config.relay_listen_addr).await?;
    info!("BLS listening on {}", config.bls_listen_addr);
    info!("Relay listening on {}", config.relay_listen_addr);

    let bls_server = axum::serve(bls_listener, bls::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let relay_server = axum::serve(relay_listener, relay::router(state))
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async { bls_server.await.map_err(Box::<dyn std::error::Error>::from) },
        async { relay_server.await.map_err(Box::<dyn std::error::Error>::from) },
    )?;

    Ok(())
}

/// Starts the Relay Monitor watching `discovery_relays` and, as peers are
/// discovered, runs them through the Bootstrap Service. Runs detached —
/// failures are logged, not propagated, since the BLS/Relay servers are the
/// node's actual liveness contract.
fn spawn_bootstrap(
    config: &relay_node::config::Config,
    keys: Keys,
    connector: Arc<HttpConnectorAdapter>,
) {
    let (monitor, mut discovered_rx) = RelayMonitor::new(keys.clone(), config.discovery_relays.clone());
    let monitor = Arc::new(monitor);

    let bootstrap_config = BootstrapConfig {
        discovery_timeout: std::time::Duration::from_secs(config.bootstrap.discovery_timeout_secs),
        spsp_roundtrip_timeout: std::time::Duration::from_secs(
            config.bootstrap.spsp_roundtrip_timeout_secs,
        ),
        channel_open_timeout: std::time::Duration::from_secs(config.spsp.channel_open_timeout_secs),
        channel_open_poll_interval: std::time::Duration::from_millis(
            config.spsp.channel_open_poll_interval_ms,
        ),
        max_concurrent_peers: config.bootstrap.max_concurrent_peers,
        own_ilp_address: config.ilp_address.clone(),
        own_peer_info: IlpPeerInfo {
            ilp_address: config.ilp_address.clone(),
            btp_endpoint: config.connector_url.clone(),
            asset_code: config.asset_code.clone(),
            asset_scale: config.asset_scale,
            supported_chains: config.supported_chains.clone(),
            settlement_addresses: config.spsp.settlement_addresses.clone(),
            preferred_tokens: config.spsp.token_addresses.clone(),
            token_networks: config.spsp.token_network_addresses.clone(),
        },
    };
    let channel_manager = Arc::new(ChannelManager::new());
    let (bootstrap, _bootstrap_events) =
        BootstrapService::new(keys, bootstrap_config, connector, channel_manager);
    let bootstrap = Arc::new(bootstrap);

    tokio::spawn(async move {
        if let Err(e) = monitor.start().await {
            error!("relay monitor failed to start: {e}");
            return;
        }
        while let Ok(peer) = discovered_rx.recv().await {
            let bootstrap = bootstrap.clone();
            tokio::spawn(async move {
                bootstrap.bootstrap_peers(vec![peer]).await;
            });
        }
        warn!("relay monitor discovery channel closed");
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install ctrl-c handler: {e}");
    }
    info!("shutting down");
}
