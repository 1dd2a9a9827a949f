//! SPSP-over-Nostr (C9): the request/response event kinds, the peer-info
//! kind carrying NIP-44 details, and the NIP-44 encrypt/decrypt helpers used
//! to wrap SPSP payloads inside ephemeral events.

use nostr_sdk::nostr::nips::nip44;
use nostr_sdk::{Event, EventBuilder, Keys, Kind, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// NIP-01 peer-info event kind (replaceable, per-peer ILP connector details).
pub const PEER_INFO_KIND: u16 = 10032;
/// SPSP-info event kind (replaceable, advertises the SPSP receiver address).
pub const SPSP_INFO_KIND: u16 = 10047;
/// Ephemeral: a payer asking a receiver to set up a payment.
pub const SPSP_REQUEST_KIND: u16 = 23194;
/// Ephemeral: the receiver's SPSP response (shared secret + destination).
pub const SPSP_RESPONSE_KIND: u16 = 23195;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IlpPeerInfo {
    pub ilp_address: String,
    pub btp_endpoint: String,
    pub asset_code: String,
    pub asset_scale: u8,
    /// Ordered `blockchain:network:chainId` identifiers, most preferred first.
    #[serde(alias = "chains")]
    pub supported_chains: Vec<String>,
    /// chain -> settlement address this peer can receive claims at.
    #[serde(default)]
    pub settlement_addresses: std::collections::HashMap<String, String>,
    /// chain -> preferred ERC-20 token address for settlement.
    #[serde(default)]
    pub preferred_tokens: std::collections::HashMap<String, String>,
    /// chain -> TokenNetwork contract address.
    #[serde(default)]
    pub token_networks: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpspRequest {
    pub request_id: String,
    pub receiver_id: String,
    /// Ordered sequence of `blockchain:network:chainId` identifiers, most
    /// preferred first.
    pub supported_chains: Vec<String>,
    /// chain -> settlement address this payer can receive claims at.
    pub settlement_addresses: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpspResponse {
    pub request_id: String,
    pub destination_account: String,
    /// base64-encoded fresh shared secret for this SPSP session.
    pub shared_secret: String,
    pub negotiated_chain: String,
    pub settlement_address: String,
    pub token_address: String,
    pub token_network_address: String,
    pub channel_id: String,
    pub settlement_timeout: u64,
}

/// Build and sign the replaceable kind-10032 peer-info event.
pub fn build_peer_info_event(keys: &Keys, info: &IlpPeerInfo) -> Result<Event> {
    let content =
        serde_json::to_string(info).map_err(|e| Error::BadRequest(format!("peer info: {e}")))?;
    EventBuilder::new(Kind::Custom(PEER_INFO_KIND), content)
        .sign_with_keys(keys)
        .map_err(|e| Error::BadRequest(e.to_string()))
}

/// Encrypt `plaintext` under NIP-44 v2 between `keys` and `their_pubkey`,
/// wrapped in a signed, unsigned-kind ephemeral event of `kind`.
pub fn build_encrypted_event(
    keys: &Keys,
    their_pubkey: &PublicKey,
    kind: u16,
    plaintext: &str,
) -> Result<Event> {
    let ciphertext = nip44::encrypt(
        keys.secret_key(),
        their_pubkey,
        plaintext,
        nip44::Version::V2,
    )
    .map_err(|e| Error::DecryptError(e.to_string()))?;
    EventBuilder::new(Kind::Custom(kind), ciphertext)
        .sign_with_keys(keys)
        .map_err(|e| Error::BadRequest(e.to_string()))
}

/// Decrypt `event`'s content as NIP-44 ciphertext from `event.pubkey`.
pub fn decrypt_event_content(keys: &Keys, event: &Event) -> Result<String> {
    nip44::decrypt(keys.secret_key(), &event.pubkey, &event.content)
        .map_err(|e| Error::DecryptError(e.to_string()))
}

pub fn build_spsp_request_event(
    keys: &Keys,
    receiver_pubkey: &PublicKey,
    request: &SpspRequest,
) -> Result<Event> {
    let plaintext = serde_json::to_string(request)
        .map_err(|e| Error::BadRequest(format!("spsp request: {e}")))?;
    build_encrypted_event(keys, receiver_pubkey, SPSP_REQUEST_KIND, &plaintext)
}

pub fn build_spsp_response_event(
    keys: &Keys,
    requester_pubkey: &PublicKey,
    response: &SpspResponse,
) -> Result<Event> {
    let plaintext = serde_json::to_string(response)
        .map_err(|e| Error::BadRequest(format!("spsp response: {e}")))?;
    build_encrypted_event(keys, requester_pubkey, SPSP_RESPONSE_KIND, &plaintext)
}

pub fn parse_spsp_request(plaintext: &str) -> Result<SpspRequest> {
    serde_json::from_str(plaintext).map_err(|e| Error::BadRequest(format!("spsp request: {e}")))
}

pub fn parse_spsp_response(plaintext: &str) -> Result<SpspResponse> {
    serde_json::from_str(plaintext).map_err(|e| Error::BadRequest(format!("spsp response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_info_round_trips_through_event_content() {
        let keys = Keys::generate();
        let info = IlpPeerInfo {
            ilp_address: "g.relay.alice".into(),
            btp_endpoint: "https://connector.example".into(),
            asset_code: "USD".into(),
            asset_scale: 6,
            supported_chains: vec!["evm:anvil:31337".into()],
            settlement_addresses: std::collections::HashMap::from([(
                "evm:anvil:31337".to_string(),
                "0xabc".to_string(),
            )]),
            preferred_tokens: std::collections::HashMap::new(),
            token_networks: std::collections::HashMap::new(),
        };
        let event = build_peer_info_event(&keys, &info).unwrap();
        assert_eq!(event.kind.as_u16(), PEER_INFO_KIND);
        let parsed: IlpPeerInfo = serde_json::from_str(&event.content).unwrap();
        assert_eq!(parsed.ilp_address, info.ilp_address);
    }

    #[test]
    fn spsp_request_decrypts_to_original_plaintext() {
        let payer = Keys::generate();
        let receiver = Keys::generate();
        let request = SpspRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            receiver_id: "bob".into(),
            supported_chains: vec!["evm:anvil:31337".into()],
            settlement_addresses: std::collections::HashMap::from([(
                "evm:anvil:31337".to_string(),
                "0xabc".to_string(),
            )]),
        };
        let event = build_spsp_request_event(&payer, &receiver.public_key(), &request).unwrap();
        assert_eq!(event.kind.as_u16(), SPSP_REQUEST_KIND);

        let plaintext = decrypt_event_content(&receiver, &event).unwrap();
        let parsed = parse_spsp_request(&plaintext).unwrap();
        assert_eq!(parsed.receiver_id, "bob");
    }

    #[test]
    fn wrong_recipient_cannot_decrypt() {
        let payer = Keys::generate();
        let receiver = Keys::generate();
        let eavesdropper = Keys::generate();
        let request = SpspRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            receiver_id: "bob".into(),
            supported_chains: vec!["evm:anvil:31337".into()],
            settlement_addresses: std::collections::HashMap::from([(
                "evm:anvil:31337".to_string(),
                "0xabc".to_string(),
            )]),
        };
        let event = build_spsp_request_event(&payer, &receiver.public_key(), &request).unwrap();
        assert!(decrypt_event_content(&eavesdropper, &event).is_err());
    }
}
