//! NIP-01 Relay Server (C8): a free-to-read, pay-to-write WebSocket relay.
//! `REQ`/`CLOSE`/`EVENT` framing, admission limits from
//! `AppState::relay_limits`, and a historical-query-then-live-stream
//! handoff that stages events arriving mid-flush so nothing enqueued
//! during the historical read is lost.
//!
//! The per-connection task split (one task owns the sink, one drains the
//! broadcast channel, the read loop drives both) follows the same "set up
//! the receiver before anything blocking" discipline as
//! `discovery/relay_monitor.rs`'s subscription loop.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use nostr_sdk::Event;
use relay_sdk::connector::ConnectorAdapter;
use relay_sdk::{matches_any, Filter};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};

use crate::state::AppState;

/// A live subscription. While `staging` is `Some`, matching events are
/// buffered instead of sent directly — the historical-query flush for
/// this subscription id is still in flight.
struct Subscription {
    filters: Vec<Filter>,
    staging: Option<Vec<Event>>,
}

type Subscriptions = Arc<Mutex<HashMap<String, Subscription>>>;

/// Outbound message buffer per connection, beyond which the relay drops
/// the offending subscription rather than block other clients.
const OUT_BUFFER: usize = 256;

struct RelayState<C: ConnectorAdapter> {
    app: Arc<AppState<C>>,
    connections: Arc<Semaphore>,
}

impl<C: ConnectorAdapter> Clone for RelayState<C> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            connections: self.connections.clone(),
        }
    }
}

pub fn router<C: ConnectorAdapter + 'static>(state: Arc<AppState<C>>) -> Router {
    let connections = Arc::new(Semaphore::new(state.relay_limits.max_connections));
    Router::new()
        .route("/", get(ws_handler::<C>))
        .with_state(RelayState {
            app: state,
            connections,
        })
}

async fn ws_handler<C: ConnectorAdapter + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<RelayState<C>>,
) -> Response {
    let Ok(permit) = state.connections.clone().try_acquire_owned() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state.app).await;
        drop(permit);
    })
}

async fn handle_socket<C: ConnectorAdapter + 'static>(socket: WebSocket, app: Arc<AppState<C>>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUT_BUFFER);
    let subs: Subscriptions = Arc::new(Mutex::new(HashMap::new()));

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Subscribe before handling any client message so a live event can
    // never slip in between a REQ's historical query and its registration.
    let mut events_rx = app.event_tx.subscribe();
    let broadcast_subs = subs.clone();
    let broadcast_out = out_tx.clone();
    let broadcaster = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => dispatch_live_event(&broadcast_subs, &broadcast_out, event).await,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => handle_client_message(&text, &app, &subs, &out_tx).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    broadcaster.abort();
    drop(out_tx);
    let _ = writer.await;
}

/// Fan a newly accepted event out to matching subscriptions. Buffers into
/// `staging` for a subscription whose historical flush hasn't finished;
/// drops (with a `NOTICE`) any subscription whose outbound buffer is full.
async fn dispatch_live_event(subs: &Subscriptions, out_tx: &mpsc::Sender<Message>, event: Event) {
    let mut subs_guard = subs.lock().await;
    let mut to_drop = Vec::new();
    for (sub_id, sub) in subs_guard.iter_mut() {
        if !matches_any(&event, &sub.filters) {
            continue;
        }
        if let Some(staging) = &mut sub.staging {
            staging.push(event.clone());
            continue;
        }
        let frame = json!(["EVENT", sub_id, event]).to_string();
        if out_tx.try_send(Message::Text(frame)).is_err() {
            to_drop.push(sub_id.clone());
        }
    }
    for sub_id in to_drop {
        subs_guard.remove(&sub_id);
        let notice = json!(["NOTICE", format!("closed {sub_id}: client too slow")]).to_string();
        let _ = out_tx.try_send(Message::Text(notice));
    }
}

async fn handle_client_message<C: ConnectorAdapter + 'static>(
    text: &str,
    app: &Arc<AppState<C>>,
    subs: &Subscriptions,
    out_tx: &mpsc::Sender<Message>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return send_notice(out_tx, "error: malformed JSON").await,
    };
    let arr = match value.as_array() {
        Some(a) if !a.is_empty() => a,
        _ => return send_notice(out_tx, "error: expected a non-empty JSON array").await,
    };
    match arr[0].as_str() {
        Some("REQ") => handle_req(arr, app, subs, out_tx).await,
        Some("CLOSE") => handle_close(arr, subs).await,
        Some("EVENT") => handle_event(arr, app, out_tx).await,
        _ => send_notice(out_tx, "error: unrecognized message type").await,
    }
}

async fn handle_req<C: ConnectorAdapter + 'static>(
    arr: &[Value],
    app: &Arc<AppState<C>>,
    subs: &Subscriptions,
    out_tx: &mpsc::Sender<Message>,
) {
    let Some(sub_id) = arr.get(1).and_then(Value::as_str) else {
        return send_notice(out_tx, "error: REQ missing subscription id").await;
    };
    let sub_id = sub_id.to_string();
    let filter_values = &arr[2..];
    if filter_values.len() > app.relay_limits.max_filters_per_subscription {
        return send_notice(out_tx, &format!("error: too many filters for {sub_id}")).await;
    }

    let mut filters = Vec::with_capacity(filter_values.len());
    for fv in filter_values {
        match serde_json::from_value::<Filter>(fv.clone()) {
            Ok(f) => filters.push(f),
            Err(e) => {
                return send_notice(out_tx, &format!("error: invalid filter: {e}")).await;
            }
        }
    }

    {
        let mut subs_guard = subs.lock().await;
        if !subs_guard.contains_key(&sub_id)
            && subs_guard.len() >= app.relay_limits.max_subscriptions_per_connection
        {
            drop(subs_guard);
            return send_notice(out_tx, &format!("error: too many subscriptions, refusing {sub_id}"))
                .await;
        }
        subs_guard.insert(
            sub_id.clone(),
            Subscription {
                filters: filters.clone(),
                staging: Some(Vec::new()),
            },
        );
    }

    let historical = app.store.lock().await.query(&filters);
    match historical {
        Ok(events) => {
            for event in events {
                let frame = json!(["EVENT", sub_id, event]).to_string();
                if out_tx.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            send_notice(out_tx, &format!("error: query failed: {e}")).await;
        }
    }
    if out_tx
        .send(Message::Text(json!(["EOSE", sub_id]).to_string()))
        .await
        .is_err()
    {
        return;
    }

    // Flush whatever arrived while the historical query was running, then
    // hand the subscription over to direct live dispatch.
    let staged = {
        let mut subs_guard = subs.lock().await;
        subs_guard.get_mut(&sub_id).and_then(|s| s.staging.take())
    };
    if let Some(staged) = staged {
        for event in staged {
            let frame = json!(["EVENT", sub_id, event]).to_string();
            if out_tx.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
    }
}

async fn handle_close(arr: &[Value], subs: &Subscriptions) {
    if let Some(sub_id) = arr.get(1).and_then(Value::as_str) {
        subs.lock().await.remove(sub_id);
    }
}

/// Writes are unconditional here — no payment is required to
/// publish over the relay's own socket, only over the BLS.
async fn handle_event<C: ConnectorAdapter + 'static>(
    arr: &[Value],
    app: &Arc<AppState<C>>,
    out_tx: &mpsc::Sender<Message>,
) {
    let Some(event_value) = arr.get(1) else {
        return send_notice(out_tx, "error: EVENT missing body").await;
    };
    let event: Event = match serde_json::from_value(event_value.clone()) {
        Ok(e) => e,
        Err(e) => return send_notice(out_tx, &format!("error: malformed event: {e}")).await,
    };
    let event_id = event.id.to_hex();

    // Ephemeral kinds are never persisted; they're forwarded to live
    // subscribers and acknowledged without ever reaching the store.
    if relay_store::is_ephemeral(event.kind.as_u16()) {
        let _ = app.event_tx.send(event);
        let frame = json!(["OK", event_id, true, ""]);
        let _ = out_tx.send(Message::Text(frame.to_string())).await;
        return;
    }

    let stored = {
        let mut store = app.store.lock().await;
        store.store(&event)
    };
    let frame = match stored {
        Ok(is_new) => {
            if is_new {
                let _ = app.event_tx.send(event);
            }
            json!(["OK", event_id, true, ""])
        }
        Err(e) => json!(["OK", event_id, false, e.to_string()]),
    };
    let _ = out_tx.send(Message::Text(frame.to_string())).await;
}

async fn send_notice(out_tx: &mpsc::Sender<Message>, reason: &str) {
    let _ = out_tx
        .send(Message::Text(json!(["NOTICE", reason]).to_string()))
        .await;
}
