//! Node configuration: a TOML file with CLI overrides layered on top via
//! `clap`, covering the BLS's enumerated options plus the
//! relay/store/bootstrap wiring a runnable node needs.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingSettings {
    #[serde(default)]
    pub base_price_per_byte: u128,
    #[serde(default)]
    pub kind_overrides: HashMap<u16, u128>,
    #[serde(default)]
    pub spsp_min_price: Option<u128>,
    #[serde(default)]
    pub owner_pubkey: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,
    #[serde(default = "default_max_filters")]
    pub max_filters_per_subscription: usize,
}

fn default_max_connections() -> usize {
    1024
}
fn default_max_subscriptions() -> usize {
    20
}
fn default_max_filters() -> usize {
    10
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_subscriptions_per_connection: default_max_subscriptions(),
            max_filters_per_subscription: default_max_filters(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpspSettings {
    /// Settlement address this node receives claims at, per chain.
    #[serde(default)]
    pub settlement_addresses: HashMap<String, String>,
    /// ERC-20 token address used for settlement, per chain.
    #[serde(default)]
    pub token_addresses: HashMap<String, String>,
    /// TokenNetwork contract address, per chain.
    #[serde(default)]
    pub token_network_addresses: HashMap<String, String>,
    #[serde(default = "default_channel_open_timeout_secs")]
    pub channel_open_timeout_secs: u64,
    #[serde(default = "default_channel_open_poll_interval_ms")]
    pub channel_open_poll_interval_ms: u64,
    #[serde(default = "default_settlement_timeout_secs")]
    pub settlement_timeout_secs: u64,
}

fn default_channel_open_timeout_secs() -> u64 {
    30
}
fn default_channel_open_poll_interval_ms() -> u64 {
    1000
}
fn default_settlement_timeout_secs() -> u64 {
    3600
}

impl Default for SpspSettings {
    fn default() -> Self {
        Self {
            settlement_addresses: HashMap::new(),
            token_addresses: HashMap::new(),
            token_network_addresses: HashMap::new(),
            channel_open_timeout_secs: default_channel_open_timeout_secs(),
            channel_open_poll_interval_ms: default_channel_open_poll_interval_ms(),
            settlement_timeout_secs: default_settlement_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapSettings {
    #[serde(default = "default_max_concurrent_peers")]
    pub max_concurrent_peers: usize,
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_spsp_roundtrip_timeout_secs")]
    pub spsp_roundtrip_timeout_secs: u64,
}

fn default_max_concurrent_peers() -> usize {
    4
}
fn default_discovery_timeout_secs() -> u64 {
    30
}
fn default_spsp_roundtrip_timeout_secs() -> u64 {
    10
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            max_concurrent_peers: default_max_concurrent_peers(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            spsp_roundtrip_timeout_secs: default_spsp_roundtrip_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the SQLite event store.
    #[serde(default = "default_store_path")]
    pub store_path: String,
    /// Address the BLS's HTTP server binds to.
    #[serde(default = "default_bls_addr")]
    pub bls_listen_addr: String,
    /// Address the NIP-01 relay's WebSocket server binds to.
    #[serde(default = "default_relay_addr")]
    pub relay_listen_addr: String,
    /// Nostr relays the Relay Monitor watches for kind-10032 peer info.
    #[serde(default)]
    pub discovery_relays: Vec<String>,
    /// Hex-encoded secp256k1 secret key for this node's Nostr identity.
    pub node_secret_key: String,
    /// Settlement chains this node supports, most preferred first
    /// (`blockchain:network:chainId`, e.g. `evm:anvil:31337`).
    #[serde(default)]
    pub supported_chains: Vec<String>,
    /// This node's own ILP address, advertised in its kind-10032 peer info
    /// and used as the SPSP `destinationAccount`.
    #[serde(default)]
    pub ilp_address: String,
    /// Base URL of the external ILP connector's admin API.
    #[serde(default)]
    pub connector_url: String,
    #[serde(default = "default_asset_code")]
    pub asset_code: String,
    #[serde(default = "default_asset_scale")]
    pub asset_scale: u8,

    #[serde(default)]
    pub pricing: PricingSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub spsp: SpspSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
}

fn default_asset_code() -> String {
    "USD".to_string()
}
fn default_asset_scale() -> u8 {
    6
}

fn default_store_path() -> String {
    "relay-node.sqlite3".to_string()
}
fn default_bls_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_relay_addr() -> String {
    "0.0.0.0:8081".to_string()
}

impl Config {
    pub fn load(path: &PathBuf) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("reading config {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("parsing config {}: {e}", path.display()))
    }
}

/// CLI entry point: `--config` names the TOML file; every other flag
/// overrides a single config field so deployments don't need a file at all.
#[derive(Debug, Parser)]
#[command(name = "relay-node", about = "ILP-gated Nostr relay network node")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "RELAY_NODE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "RELAY_NODE_SECRET_KEY")]
    pub node_secret_key: Option<String>,

    #[arg(long, env = "RELAY_NODE_STORE_PATH")]
    pub store_path: Option<String>,

    #[arg(long, env = "RELAY_NODE_BLS_ADDR")]
    pub bls_listen_addr: Option<String>,

    #[arg(long, env = "RELAY_NODE_RELAY_ADDR")]
    pub relay_listen_addr: Option<String>,
}

impl Cli {
    /// Load the named config file (if any) and apply CLI/env overrides.
    pub fn resolve(self) -> Result<Config, String> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => {
                return Err(
                    "no --config provided and no default config file convention defined".into(),
                )
            }
        };
        if let Some(v) = self.node_secret_key {
            config.node_secret_key = v;
        }
        if let Some(v) = self.store_path {
            config.store_path = v;
        }
        if let Some(v) = self.bls_listen_addr {
            config.bls_listen_addr = v;
        }
        if let Some(v) = self.relay_listen_addr {
            config.relay_listen_addr = v;
        }
        Ok(config)
    }
}
