//! Bootstrap Service (C11): drives a set of known peers from `idle` through
//! to `ready`, wiring discovery, the SPSP handshake, connector registration,
//! and self-announcement into one per-peer state machine. The hardest piece
//! of the core — it forms a cycle with the Connector Adapter and
//! Channel Manager, resolved here by passing the claim signer in as a plain
//! callback value rather than sharing ownership.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::{Keys, PublicKey};
use tokio::sync::{broadcast, Mutex, Semaphore};

use crate::channel::ChannelManager;
use crate::connector::{ConnectorAdapter, RegisterPeerParams, Route, SettlementBlock};
use crate::discovery::PeerDiscovered;
use crate::error::{Error, Result};
use crate::spsp::{self, IlpPeerInfo, SpspRequest, SpspResponse};
use crate::toon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    Idle,
    Discovering,
    Handshaking,
    Registering,
    Announcing,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub enum BootstrapEvent {
    PhaseChanged {
        peer_pubkey: PublicKey,
        phase: PeerPhase,
    },
    Ready {
        peer_pubkey: PublicKey,
    },
    Failed {
        peer_pubkey: PublicKey,
        reason: String,
    },
}

#[derive(Debug, Clone)]
struct PeerRecord {
    phase: PeerPhase,
    last_info: Option<IlpPeerInfo>,
    channel_id: Option<String>,
}

/// Static bootstrap configuration: timeouts and fan-out bound, with
/// sensible out-of-the-box defaults.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub discovery_timeout: Duration,
    pub spsp_roundtrip_timeout: Duration,
    pub channel_open_timeout: Duration,
    pub channel_open_poll_interval: Duration,
    pub max_concurrent_peers: usize,
    pub own_ilp_address: String,
    pub own_peer_info: IlpPeerInfo,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(30),
            spsp_roundtrip_timeout: Duration::from_secs(10),
            channel_open_timeout: Duration::from_secs(30),
            channel_open_poll_interval: Duration::from_secs(1),
            max_concurrent_peers: 4,
            own_ilp_address: String::new(),
            own_peer_info: IlpPeerInfo {
                ilp_address: String::new(),
                btp_endpoint: String::new(),
                asset_code: String::new(),
                asset_scale: 0,
                supported_chains: Vec::new(),
                settlement_addresses: HashMap::new(),
                preferred_tokens: HashMap::new(),
                token_networks: HashMap::new(),
            },
        }
    }
}

/// Turns a set of known peers plus a live Relay Monitor into a connected,
/// registered, channel-opened, announced state, one peer at a time but up
/// to `max_concurrent_peers` peers in parallel.
pub struct BootstrapService<C: ConnectorAdapter> {
    keys: Keys,
    config: BootstrapConfig,
    connector: Arc<C>,
    channel_manager: Arc<ChannelManager>,
    peers: Mutex<HashMap<PublicKey, PeerRecord>>,
    fanout: Arc<Semaphore>,
    events_tx: broadcast::Sender<BootstrapEvent>,
}

impl<C: ConnectorAdapter + 'static> BootstrapService<C> {
    pub fn new(
        keys: Keys,
        config: BootstrapConfig,
        connector: Arc<C>,
        channel_manager: Arc<ChannelManager>,
    ) -> (Self, broadcast::Receiver<BootstrapEvent>) {
        let (events_tx, events_rx) = broadcast::channel(256);
        let max_concurrent = config.max_concurrent_peers;
        (
            Self {
                keys,
                config,
                connector,
                channel_manager,
                peers: Mutex::new(HashMap::new()),
                fanout: Arc::new(Semaphore::new(max_concurrent)),
                events_tx,
            },
            events_rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BootstrapEvent> {
        self.events_tx.subscribe()
    }

    /// Bootstrap a batch of peers discovered up front (already holding a
    /// kind-10032 event), running up to `max_concurrent_peers` in parallel.
    pub async fn bootstrap_peers(self: &Arc<Self>, discovered: Vec<PeerDiscovered>) {
        let mut handles = Vec::with_capacity(discovered.len());
        for peer in discovered {
            let service = self.clone();
            let permit = service.fanout.clone().acquire_owned().await.unwrap();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                service.run_peer(peer.pubkey, peer.info).await
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Feed a live `PeerDiscovered` from the Relay Monitor into the state
    /// machine for that peer. A peer already `ready` moves back to
    /// `discovering` only if the peer-info actually changed.
    pub async fn on_peer_discovered(self: &Arc<Self>, peer: PeerDiscovered) {
        {
            let peers = self.peers.lock().await;
            if let Some(record) = peers.get(&peer.pubkey)
                && record.phase == PeerPhase::Ready
                && record.last_info.as_ref() == Some(&peer.info)
            {
                // Idempotence: an unchanged kind-10032 event is a no-op.
                drop(peers);
                return;
            }
        }
        let service = self.clone();
        tokio::spawn(async move {
            let _permit = service.fanout.clone().acquire_owned().await.unwrap();
            service.run_peer(peer.pubkey, peer.info).await
        });
    }

    fn emit_phase(&self, peer_pubkey: PublicKey, phase: PeerPhase) {
        let _ = self.events_tx.send(BootstrapEvent::PhaseChanged {
            peer_pubkey,
            phase,
        });
    }

    async fn set_phase(&self, peer_pubkey: PublicKey, phase: PeerPhase) {
        let mut peers = self.peers.lock().await;
        peers
            .entry(peer_pubkey)
            .or_insert(PeerRecord {
                phase: PeerPhase::Idle,
                last_info: None,
                channel_id: None,
            })
            .phase = phase;
        drop(peers);
        self.emit_phase(peer_pubkey, phase);
    }

    async fn fail(&self, peer_pubkey: PublicKey, reason: impl Into<String>) {
        let reason = reason.into();
        let channel_id = self
            .peers
            .lock()
            .await
            .get(&peer_pubkey)
            .and_then(|record| record.channel_id.clone());
        if let Some(channel_id) = channel_id {
            let _ = self.connector.remove_peer(&peer_pubkey.to_hex()).await;
            log::warn!(
                "bootstrap: tearing down partial registration for {peer_pubkey} (channel {channel_id})"
            );
        }
        self.set_phase(peer_pubkey, PeerPhase::Failed).await;
        let _ = self.events_tx.send(BootstrapEvent::Failed {
            peer_pubkey,
            reason,
        });
    }

    /// Drive one peer through `discovering → handshaking → registering →
    /// announcing → ready`, sequentially for this peer.
    async fn run_peer(self: Arc<Self>, peer_pubkey: PublicKey, info: IlpPeerInfo) {
        self.set_phase(peer_pubkey, PeerPhase::Discovering).await;
        // Discovery is satisfied by the caller already holding `info` —
        // either from cache, a direct query, or the Relay Monitor.
        self.peers
            .lock()
            .await
            .entry(peer_pubkey)
            .or_insert(PeerRecord {
                phase: PeerPhase::Discovering,
                last_info: None,
                channel_id: None,
            })
            .last_info = Some(info.clone());

        self.set_phase(peer_pubkey, PeerPhase::Handshaking).await;
        let handshake = match self.handshake(&peer_pubkey, &info).await {
            Ok(handshake) => handshake,
            Err(e) => {
                self.fail(peer_pubkey, e.to_string()).await;
                return;
            }
        };

        self.set_phase(peer_pubkey, PeerPhase::Registering).await;
        if let Err(e) = self.register(&peer_pubkey, &info, &handshake).await {
            self.fail(peer_pubkey, e.to_string()).await;
            return;
        }

        self.set_phase(peer_pubkey, PeerPhase::Announcing).await;
        if let Err(e) = self.announce(&peer_pubkey, &info).await {
            self.fail(peer_pubkey, e.to_string()).await;
            return;
        }

        self.set_phase(peer_pubkey, PeerPhase::Ready).await;
        let _ = self.events_tx.send(BootstrapEvent::Ready { peer_pubkey });
    }

    async fn handshake(
        &self,
        peer_pubkey: &PublicKey,
        info: &IlpPeerInfo,
    ) -> Result<SpspResponse> {
        let request = SpspRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            receiver_id: info.ilp_address.clone(),
            supported_chains: info.supported_chains.clone(),
            settlement_addresses: self.config.own_peer_info.settlement_addresses.clone(),
        };
        let request_event =
            spsp::build_spsp_request_event(&self.keys, peer_pubkey, &request)?;
        let encoded = toon::encode(&request_event)?;

        let result = tokio::time::timeout(
            self.config.spsp_roundtrip_timeout,
            self.connector.send_ilp_packet(crate::connector::SendIlpPacketParams {
                destination: info.ilp_address.clone(),
                amount: "0".to_string(),
                data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &encoded),
                claim: None,
            }),
        )
        .await
        .map_err(|_| Error::ChannelOpenTimeout)??;

        if !result.accepted {
            return Err(Error::ChannelOpenFailed(
                result.message.unwrap_or_else(|| "handshake rejected".into()),
            ));
        }
        // The fulfillment itself is always base64(SHA-256(event.id)) — the
        // SPSP response event travels in metadata instead.
        let response_event_b64 = result
            .metadata
            .as_ref()
            .and_then(|m| m.get("spspResponseEvent"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::ChannelOpenFailed("missing spspResponseEvent in metadata".into()))?;
        let response_bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            response_event_b64,
        )
        .map_err(|e| Error::ChannelOpenFailed(format!("bad spspResponseEvent payload: {e}")))?;
        let response_event = toon::decode(&response_bytes)?;
        crate::event::verify_event(&response_event)?;
        let plaintext = spsp::decrypt_event_content(&self.keys, &response_event)?;
        spsp::parse_spsp_response(&plaintext)
    }

    async fn register(
        &self,
        peer_pubkey: &PublicKey,
        info: &IlpPeerInfo,
        handshake: &SpspResponse,
    ) -> Result<()> {
        self.connector
            .register_peer(RegisterPeerParams {
                id: peer_pubkey.to_hex(),
                url: info.btp_endpoint.clone(),
                auth_token: handshake.shared_secret.clone(),
                routes: vec![Route {
                    prefix: info.ilp_address.clone(),
                    priority: 0,
                }],
                settlement: Some(SettlementBlock {
                    chain: handshake.negotiated_chain.clone(),
                    channel_id: handshake.channel_id.clone(),
                    token_network_address: handshake.token_network_address.clone(),
                }),
            })
            .await?;

        let chain_id = parse_chain_id(&handshake.negotiated_chain)?;
        let token_network_address: alloy_primitives::Address = handshake
            .token_network_address
            .parse()
            .map_err(|e| Error::BadRequest(format!("token network address: {e}")))?;
        let channel_id: alloy_primitives::Address = handshake
            .channel_id
            .parse()
            .map_err(|e| Error::BadRequest(format!("channel id: {e}")))?;
        self.channel_manager
            .track(channel_id, chain_id, token_network_address)
            .await;

        let mut peers = self.peers.lock().await;
        if let Some(record) = peers.get_mut(peer_pubkey) {
            record.channel_id = Some(handshake.channel_id.clone());
        }
        Ok(())
    }

    async fn announce(&self, peer_pubkey: &PublicKey, info: &IlpPeerInfo) -> Result<()> {
        let own_event = spsp::build_peer_info_event(&self.keys, &self.config.own_peer_info)?;
        let encoded = toon::encode(&own_event)?;
        let amount = if self.announcement_is_free() { "0" } else { "1" };

        let result = self
            .connector
            .send_ilp_packet(crate::connector::SendIlpPacketParams {
                destination: info.ilp_address.clone(),
                amount: amount.to_string(),
                data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &encoded),
                claim: None,
            })
            .await?;
        if !result.accepted {
            return Err(Error::ChannelOpenFailed(
                result.message.unwrap_or_else(|| "announce rejected".into()),
            ));
        }
        Ok(())
    }

    /// Whether the peer's own ownerPubkey bypass should make this
    /// announcement free. There's no channel back to the peer's own
    /// pricing configuration, so this defaults to paid, which is always
    /// safe for the payer.
    fn announcement_is_free(&self) -> bool {
        false
    }
}

fn parse_chain_id(chain_ref: &str) -> Result<u64> {
    chain_ref
        .parse::<crate::chain::ChainRef>()
        .map(|c| c.chain_id)
        .map_err(|e| Error::BadRequest(format!("negotiated chain: {e}")))
}
