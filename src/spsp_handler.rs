//! SPSP Handler (C9): the receiving side of a bootstrap handshake. Takes a
//! decrypted `SpspRequest`, negotiates a settlement chain, opens a channel
//! via the Connector Adapter, and builds the encrypted `SpspResponse` the
//! BLS embeds in its fulfillment metadata.

use std::sync::Arc;

use nostr_sdk::{Event, Keys, PublicKey};
use rand::RngCore;
use relay_sdk::connector::{ConnectorAdapter, OpenChannelParams};
use relay_sdk::{spsp, Error, Result, SpspRequest, SpspResponse};

/// Local settlement configuration the SPSP Handler negotiates against.
#[derive(Debug, Clone)]
pub struct SpspHandlerConfig {
    /// Chains this node can settle on, most preferred first.
    pub own_supported_chains: Vec<String>,
    /// Address this node receives balance-proof claims at, per chain.
    pub settlement_addresses: std::collections::HashMap<String, String>,
    /// ERC-20 token address used for settlement, per chain.
    pub token_addresses: std::collections::HashMap<String, String>,
    /// TokenNetwork contract address, per chain.
    pub token_network_addresses: std::collections::HashMap<String, String>,
    /// ILP address this node's SPSP responses report as the destination.
    pub own_ilp_address: String,
    pub channel_open_timeout: std::time::Duration,
    pub channel_open_poll_interval: std::time::Duration,
    pub settlement_timeout: u64,
}

pub struct SpspHandler<C: ConnectorAdapter> {
    keys: Keys,
    config: SpspHandlerConfig,
    connector: Arc<C>,
}

impl<C: ConnectorAdapter> SpspHandler<C> {
    pub fn new(keys: Keys, config: SpspHandlerConfig, connector: Arc<C>) -> Self {
        Self {
            keys,
            config,
            connector,
        }
    }

    /// Decrypt and parse `event` (a kind-23194 event) into an `SpspRequest`.
    pub fn decrypt_request(&self, event: &Event) -> Result<SpspRequest> {
        let plaintext = spsp::decrypt_event_content(&self.keys, event)?;
        spsp::parse_spsp_request(&plaintext)
    }

    /// Run the full handshake: negotiate chain, open channel,
    /// build and sign the encrypted kind-23195 response event.
    pub async fn handle_request(
        &self,
        requester_pubkey: &PublicKey,
        request: &SpspRequest,
        initial_deposit: &str,
    ) -> Result<Event> {
        let chain = request
            .supported_chains
            .iter()
            .find(|c| self.config.own_supported_chains.contains(c))
            .cloned()
            .ok_or(Error::NoCommonChain)?;

        let peer_address = request
            .settlement_addresses
            .get(&chain)
            .cloned()
            .ok_or_else(|| Error::BadRequest(format!("no settlement address for chain {chain}")))?;
        let token_network_address = self
            .config
            .token_network_addresses
            .get(&chain)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no token network configured for chain {chain}")))?;
        let token_address = self
            .config
            .token_addresses
            .get(&chain)
            .cloned()
            .unwrap_or_default();
        let own_settlement_address = self
            .config
            .settlement_addresses
            .get(&chain)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no settlement address configured for chain {chain}")))?;

        let opened = self
            .connector
            .open_channel(OpenChannelParams {
                peer_id: requester_pubkey.to_hex(),
                chain: chain.clone(),
                token_network: token_network_address.clone(),
                peer_address,
                initial_deposit: initial_deposit.to_string(),
                settlement_timeout: self.config.settlement_timeout,
            })
            .await?;

        self.connector
            .wait_for_open(
                &opened.channel_id,
                self.config.channel_open_poll_interval,
                self.config.channel_open_timeout,
            )
            .await?;

        let mut secret_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let shared_secret = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            secret_bytes,
        );

        let response = SpspResponse {
            request_id: request.request_id.clone(),
            destination_account: self.config.own_ilp_address.clone(),
            shared_secret,
            negotiated_chain: chain,
            settlement_address: own_settlement_address,
            token_address,
            token_network_address,
            channel_id: opened.channel_id,
            settlement_timeout: self.config.settlement_timeout,
        };

        spsp::build_spsp_response_event(&self.keys, requester_pubkey, &response)
    }
}
