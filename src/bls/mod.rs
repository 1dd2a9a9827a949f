//! Business Logic Server (C7): the connector's only client-facing contract.
//! `POST /handle-packet` runs the nine-step validate/price/verify/store
//! pipeline; `GET /health` is a liveness probe.
//!
//! Follows the x402-rs facilitator's axum shape: a
//! `State<Arc<...>>`-threaded router, handlers that return a typed
//! `Result<Json<_>, RejectT>` so every failure path produces the same
//! reject body via `IntoResponse`.

use std::sync::Arc;

use alloy_primitives::{Address, PrimitiveSignature, U256};
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use chrono::Utc;
use relay_sdk::connector::ConnectorAdapter;
use relay_sdk::{toon, verify_event, SignedBalanceProof, SPSP_REQUEST_KIND};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::BlsReject;
use crate::state::AppState;

pub fn router<C: ConnectorAdapter + 'static>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/handle-packet", post(handle_packet::<C>))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Steps numbered to match the pipeline description above.
async fn handle_packet<C: ConnectorAdapter + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, BlsReject> {
    // 1. Validate fields present.
    let amount_str = body
        .get("amount")
        .and_then(Value::as_str)
        .ok_or_else(|| BlsReject::bad_request("missing field: amount"))?;
    let data_b64 = body
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| BlsReject::bad_request("missing field: data"))?;
    if body.get("destination").and_then(Value::as_str).is_none() {
        return Err(BlsReject::bad_request("missing field: destination"));
    }
    let amount: u128 = amount_str
        .parse()
        .map_err(|_| BlsReject::bad_request("amount is not a valid unsigned integer"))?;

    // 2. Base64-decode data.
    let toon_bytes = base64::engine::general_purpose::STANDARD
        .decode(data_b64)
        .map_err(|e| BlsReject::bad_request(format!("invalid base64 data: {e}")))?;

    // 3. TOON-decode to a Nostr event.
    let event = toon::decode(&toon_bytes).map_err(BlsReject::from)?;

    // 4. Verify event signature.
    verify_event(&event).map_err(|_| BlsReject::bad_request("Invalid event signature"))?;

    // 5. Price the event.
    let price = state.pricing.price(&event, toon_bytes.len());

    // 6. Compare amount to required.
    if amount < price.required {
        return Err(BlsReject::insufficient_payment(price.required, amount));
    }

    // 7. SPSP requests route to the SPSP Handler; everything else persists
    // and is handed to live relay subscribers.
    let mut spsp_response_b64 = None;
    if event.kind.as_u16() == SPSP_REQUEST_KIND {
        let request = state
            .spsp_handler
            .decrypt_request(&event)
            .map_err(BlsReject::from)?;
        let response_event = state
            .spsp_handler
            .handle_request(&event.pubkey, &request, "0")
            .await
            .map_err(BlsReject::from)?;
        let encoded = toon::encode(&response_event).map_err(BlsReject::from)?;
        spsp_response_b64 = Some(base64::engine::general_purpose::STANDARD.encode(encoded));
    } else {
        let mut store = state.store.lock().await;
        store.store(&event).map_err(BlsReject::from)?;
        drop(store);
        let _ = state.event_tx.send(event.clone());
    }

    // 8. Optional inbound balance proof, for settlement netting.
    if let Some(claim) = body.get("claim") {
        let proof = parse_claim(claim).map_err(BlsReject::from)?;
        state
            .balance_verifier
            .verify(&proof)
            .await
            .map_err(BlsReject::from)?;
    }

    // 9. Fulfillment + accept.
    let digest = Sha256::digest(event.id.as_bytes());
    let fulfillment = base64::engine::general_purpose::STANDARD.encode(digest);

    let mut metadata = json!({
        "eventId": event.id.to_hex(),
        "storedAt": Utc::now().to_rfc3339(),
    });
    if let Some(spsp_response_b64) = spsp_response_b64 {
        metadata["spspResponseEvent"] = Value::String(spsp_response_b64);
    }

    Ok(Json(json!({
        "accept": true,
        "fulfillment": fulfillment,
        "metadata": metadata,
    })))
}

/// Parse the optional `claim` envelope (a signed balance proof attached to
/// an incoming payment for off-chain settlement netting).
fn parse_claim(claim: &Value) -> relay_sdk::Result<SignedBalanceProof> {
    let channel: Address = claim
        .get("channelId")
        .and_then(Value::as_str)
        .ok_or_else(|| relay_sdk::Error::BadRequest("missing claim.channelId".into()))?
        .parse()
        .map_err(|e| relay_sdk::Error::BadRequest(format!("invalid claim.channelId: {e}")))?;
    let nonce: U256 = claim
        .get("nonce")
        .and_then(Value::as_str)
        .ok_or_else(|| relay_sdk::Error::BadRequest("missing claim.nonce".into()))?
        .parse()
        .map_err(|e| relay_sdk::Error::BadRequest(format!("invalid claim.nonce: {e}")))?;
    let cumulative_amount: U256 = claim
        .get("cumulativeAmount")
        .and_then(Value::as_str)
        .ok_or_else(|| relay_sdk::Error::BadRequest("missing claim.cumulativeAmount".into()))?
        .parse()
        .map_err(|e| {
            relay_sdk::Error::BadRequest(format!("invalid claim.cumulativeAmount: {e}"))
        })?;
    let signature: PrimitiveSignature = claim
        .get("signature")
        .and_then(Value::as_str)
        .ok_or_else(|| relay_sdk::Error::BadRequest("missing claim.signature".into()))?
        .parse()
        .map_err(|e| relay_sdk::Error::BadRequest(format!("invalid claim.signature: {e}")))?;
    Ok(SignedBalanceProof {
        channel,
        nonce,
        cumulative_amount,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use nostr_sdk::{EventBuilder, JsonUtil, Keys, Kind};
    use relay_sdk::testing::MockConnectorAdapter;
    use tower::ServiceExt;

    use crate::config::Config;

    fn test_config(base_price_per_byte: u128, owner_pubkey: Option<String>) -> Config {
        Config {
            store_path: ":memory:".into(),
            bls_listen_addr: "127.0.0.1:0".into(),
            relay_listen_addr: "127.0.0.1:0".into(),
            discovery_relays: vec![],
            node_secret_key: Keys::generate().secret_key().to_secret_hex(),
            supported_chains: vec!["evm:anvil:31337".into()],
            ilp_address: "g.relay.test".into(),
            connector_url: "http://localhost:9999".into(),
            asset_code: "USD".into(),
            asset_scale: 6,
            pricing: crate::config::PricingSettings {
                base_price_per_byte,
                kind_overrides: Default::default(),
                spsp_min_price: None,
                owner_pubkey,
            },
            relay: Default::default(),
            spsp: Default::default(),
            bootstrap: Default::default(),
        }
    }

    async fn test_state(config: &Config, keys: Keys) -> Arc<AppState<MockConnectorAdapter>> {
        Arc::new(
            AppState::new(config, keys, Arc::new(MockConnectorAdapter::new())).unwrap(),
        )
    }

    fn toon_b64(event: &nostr_sdk::Event) -> String {
        let bytes = toon::encode(event).unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    async fn post_handle_packet(app: Router, body: Value) -> (StatusCode, Value) {
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
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn happy_path_publish_is_accepted() {
        let keys = Keys::generate();
        let config = test_config(10, None);
        let state = test_state(&config, keys.clone()).await;
        let app = router(state);

        let event = EventBuilder::new(Kind::TextNote, "x".repeat(32))
            .sign_with_keys(&keys)
            .unwrap();
        let encoded_len = toon::encode(&event).unwrap().len();
        let body = json!({
            "amount": (encoded_len as u128 * 10).to_string(),
            "destination": "g.relay.test",
            "data": toon_b64(&event),
        });

        let (status, json) = post_handle_packet(app, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["accept"], true);
        assert_eq!(json["metadata"]["eventId"], event.id.to_hex());
    }

    #[tokio::test]
    async fn insufficient_payment_is_rejected_f06() {
        let keys = Keys::generate();
        let config = test_config(10, None);
        let state = test_state(&config, keys.clone()).await;
        let app = router(state);

        let event = EventBuilder::new(Kind::TextNote, "x".repeat(32))
            .sign_with_keys(&keys)
            .unwrap();
        let encoded_len = toon::encode(&event).unwrap().len() as u128;
        let body = json!({
            "amount": (encoded_len * 10 - 1).to_string(),
            "destination": "g.relay.test",
            "data": toon_b64(&event),
        });

        let (status, json) = post_handle_packet(app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "F06");
        assert_eq!(json["metadata"]["required"], (encoded_len * 10).to_string());
        assert_eq!(json["metadata"]["received"], (encoded_len * 10 - 1).to_string());
    }

    #[tokio::test]
    async fn owner_bypass_accepts_zero_amount() {
        let keys = Keys::generate();
        let config = test_config(10, Some(keys.public_key().to_hex()));
        let state = test_state(&config, Keys::generate()).await;
        let app = router(state);

        let event = EventBuilder::new(Kind::TextNote, "owner post")
            .sign_with_keys(&keys)
            .unwrap();
        let body = json!({
            "amount": "0",
            "destination": "g.relay.test",
            "data": toon_b64(&event),
        });

        let (status, json) = post_handle_packet(app, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["accept"], true);
    }

    #[tokio::test]
    async fn tampered_event_is_rejected_f00_with_exact_message() {
        let keys = Keys::generate();
        let config = test_config(10, None);
        let state = test_state(&config, keys.clone()).await;
        let app = router(state);

        let event = EventBuilder::new(Kind::TextNote, "original")
            .sign_with_keys(&keys)
            .unwrap();
        let mut json_value: Value = serde_json::from_str(&event.as_json()).unwrap();
        json_value["content"] = Value::String("tampered".into());
        let tampered: nostr_sdk::Event = serde_json::from_value(json_value).unwrap();
        let bytes = toon::encode(&tampered).unwrap();

        let body = json!({
            "amount": "1000000",
            "destination": "g.relay.test",
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        });

        let (status, json) = post_handle_packet(app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "F00");
        assert_eq!(json["message"], "Invalid event signature");
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let keys = Keys::generate();
        let config = test_config(10, None);
        let state = test_state(&config, keys).await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
