//! Core domain logic for the ILP-gated relay: event verification, NIP-01
//! filtering, pricing, payment channels, SPSP-over-Nostr, and the
//! connector/bootstrap machinery that wires a relay into an ILP network.
//! This crate holds pure domain logic; `relay-store` holds the
//! Diesel-backed persistence.

pub mod balance_proof;
pub mod bootstrap;
pub mod chain;
pub mod channel;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod event;
pub mod filter;
pub mod pricing;
pub mod spsp;
#[cfg(feature = "testing")]
pub mod testing;
pub mod toon;

pub use balance_proof::{BalanceProofVerifier, ChannelDomain, SignedBalanceProof};
pub use bootstrap::{BootstrapConfig, BootstrapEvent, BootstrapService, PeerPhase};
pub use chain::{ChainRef, ChainRefError};
pub use channel::ChannelManager;
pub use connector::{
    ChannelState, ChannelStatus, ConnectorAdapter, HttpConnectorAdapter, OpenChannelParams,
    OpenChannelResult, PeerInfo, RegisterPeerParams, SendIlpPacketParams, SendIlpPacketResult,
    SettlementBlock,
};
pub use discovery::{PeerDiscovered, RelayMonitor};
pub use error::{Error, Result};
pub use event::verify_event;
pub use filter::{matches, matches_any, Filter};
pub use pricing::{Price, PriceBasis, PricingConfig, PricingService};
pub use spsp::{
    IlpPeerInfo, SpspRequest, SpspResponse, PEER_INFO_KIND, SPSP_INFO_KIND, SPSP_REQUEST_KIND,
    SPSP_RESPONSE_KIND,
};
