//! Application state shared across the BLS and Relay servers: the Event
//! Store behind a lock (Diesel's `SqliteConnection` needs `&mut` even for
//! reads), the Pricing Service, the SPSP Handler, the Balance-Proof
//! Verifier, and the broadcast channel the Relay Server subscribes to for
//! newly accepted events.

use std::sync::Arc;

use nostr_sdk::{Event, Keys};
use relay_sdk::connector::ConnectorAdapter;
use relay_sdk::{BalanceProofVerifier, PricingConfig, PricingService};
use relay_store::EventStore;
use tokio::sync::{broadcast, Mutex};

use crate::config::Config;
use crate::spsp_handler::{SpspHandler, SpspHandlerConfig};

/// Relay-server admission limits, carried out of `RelaySettings` so the
/// relay module doesn't need the whole `Config`.
#[derive(Debug, Clone, Copy)]
pub struct RelayLimits {
    pub max_connections: usize,
    pub max_subscriptions_per_connection: usize,
    pub max_filters_per_subscription: usize,
}

pub struct AppState<C: ConnectorAdapter> {
    pub store: Mutex<EventStore>,
    pub pricing: PricingService,
    pub spsp_handler: SpspHandler<C>,
    pub balance_verifier: Arc<BalanceProofVerifier>,
    pub relay_limits: RelayLimits,
    /// Broadcasts every event newly accepted by the BLS, so the Relay
    /// Server can push it to live subscriptions without re-querying the
    /// store without re-querying the event store.
    pub event_tx: broadcast::Sender<Event>,
}

impl<C: ConnectorAdapter> AppState<C> {
    pub fn new(config: &Config, keys: Keys, connector: Arc<C>) -> Result<Self, String> {
        let store = EventStore::open(&config.store_path).map_err(|e| e.to_string())?;

        let pricing = PricingService::new(PricingConfig {
            base_price_per_byte: config.pricing.base_price_per_byte,
            kind_overrides: config.pricing.kind_overrides.clone(),
            spsp_min_price: config.pricing.spsp_min_price,
            owner_pubkey: config.pricing.owner_pubkey.clone(),
        })
        .map_err(|e| e.to_string())?;

        let spsp_config = SpspHandlerConfig {
            own_supported_chains: config.supported_chains.clone(),
            settlement_addresses: config.spsp.settlement_addresses.clone(),
            token_addresses: config.spsp.token_addresses.clone(),
            token_network_addresses: config.spsp.token_network_addresses.clone(),
            own_ilp_address: config.ilp_address.clone(),
            channel_open_timeout: std::time::Duration::from_secs(
                config.spsp.channel_open_timeout_secs,
            ),
            channel_open_poll_interval: std::time::Duration::from_millis(
                config.spsp.channel_open_poll_interval_ms,
            ),
            settlement_timeout: config.spsp.settlement_timeout_secs,
        };
        let spsp_handler = SpspHandler::new(keys, spsp_config, connector);

        let (event_tx, _) = broadcast::channel(1024);

        Ok(Self {
            store: Mutex::new(store),
            pricing,
            spsp_handler,
            balance_verifier: Arc::new(BalanceProofVerifier::new()),
            relay_limits: RelayLimits {
                max_connections: config.relay.max_connections,
                max_subscriptions_per_connection: config.relay.max_subscriptions_per_connection,
                max_filters_per_subscription: config.relay.max_filters_per_subscription,
            },
            event_tx,
        })
    }
}
