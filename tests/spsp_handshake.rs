//! End-to-end SPSP handshake (spec §8 scenario 5): a payer submits a
//! kind-23194 request through the BLS's `/handle-packet`, the response
//! carries an encrypted kind-23195 event the payer can decrypt back into
//! an `SpspResponse` with a fresh shared secret and an open channel id.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use nostr_sdk::{Keys, SecretKey};
use relay_node::config::{Config, PricingSettings, SpspSettings};
use relay_node::state::AppState;
use relay_node::bls;
use relay_sdk::testing::MockConnectorAdapter;
use relay_sdk::{spsp, toon, SpspRequest};
use serde_json::{json, Value};
use tower::ServiceExt;

fn relay_config(node_keys: &Keys) -> Config {
    let mut settlement_addresses = HashMap::new();
    settlement_addresses.insert(
        "evm:anvil:31337".to_string(),
        "0x1111111111111111111111111111111111111111".to_string(),
    );
    let mut token_addresses = HashMap::new();
    token_addresses.insert(
        "evm:anvil:31337".to_string(),
        "0x2222222222222222222222222222222222222222".to_string(),
    );
    let mut token_network_addresses = HashMap::new();
    token_network_addresses.insert(
        "evm:anvil:31337".to_string(),
        "0x3333333333333333333333333333333333333333".to_string(),
    );

    Config {
        store_path: ":memory:".into(),
        bls_listen_addr: "127.0.0.1:0".into(),
        relay_listen_addr: "127.0.0.1:0".into(),
        discovery_relays: vec![],
        node_secret_key: node_keys.secret_key().to_secret_hex(),
        supported_chains: vec!["evm:anvil:31337".into()],
        ilp_address: "g.relay.test".into(),
        connector_url: "http://localhost:9999".into(),
        asset_code: "USD".into(),
        asset_scale: 6,
        pricing: PricingSettings {
            base_price_per_byte: 0,
            kind_overrides: HashMap::new(),
            spsp_min_price: None,
            owner_pubkey: None,
        },
        relay: Default::default(),
        spsp: SpspSettings {
            settlement_addresses,
            token_addresses,
            token_network_addresses,
            ..Default::default()
        },
        bootstrap: Default::default(),
    }
}

#[tokio::test]
async fn spsp_request_yields_decryptable_response_with_open_channel() {
    let node_keys = Keys::new(SecretKey::from_hex(
        "0000000000000000000000000000000000000000000000000000000000aa",
    ).unwrap());
    let payer_keys = Keys::new(SecretKey::from_hex(
        "0000000000000000000000000000000000000000000000000000000000bb",
    ).unwrap());

    let config = relay_config(&node_keys);
    let state = Arc::new(
        AppState::new(&config, node_keys.clone(), Arc::new(MockConnectorAdapter::new())).unwrap(),
    );
    let app = bls::router(state);

    let request = SpspRequest {
        request_id: "handshake-1".into(),
        receiver_id: "g.relay.test".into(),
        supported_chains: vec!["evm:anvil:31337".into()],
        settlement_addresses: HashMap::from([(
            "evm:anvil:31337".to_string(),
            "0x4444444444444444444444444444444444444444".to_string(),
        )]),
    };
    let request_event =
        spsp::build_spsp_request_event(&payer_keys, &node_keys.public_key(), &request).unwrap();
    let encoded = toon::encode(&request_event).unwrap();
    let data_b64 = base64::engine::general_purpose::STANDARD.encode(&encoded);

    let body = json!({
        "amount": "0",
        "destination": "g.relay.test",
        "data": data_b64,
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/handle-packet")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["accept"], true);

    let response_event_b64 = parsed["metadata"]["spspResponseEvent"]
        .as_str()
        .expect("handshake response must carry an spspResponseEvent");
    let response_event_bytes = base64::engine::general_purpose::STANDARD
        .decode(response_event_b64)
        .unwrap();
    let response_event: nostr_sdk::Event = toon::decode(&response_event_bytes).unwrap();

    let plaintext = spsp::decrypt_event_content(&payer_keys, &response_event).unwrap();
    let spsp_response = spsp::parse_spsp_response(&plaintext).unwrap();

    assert_eq!(spsp_response.request_id, "handshake-1");
    assert_eq!(spsp_response.negotiated_chain, "evm:anvil:31337");
    assert_eq!(spsp_response.destination_account, "g.relay.test");
    assert!(!spsp_response.channel_id.is_empty());
    assert!(!spsp_response.shared_secret.is_empty());
}
