//! Subscribes to a set of relays for kind-10032 peer-info events, dedupes by
//! pubkey (keeping the latest `created_at`), and broadcasts `PeerDiscovered`.
//! Sets up the notification receiver before subscribing so no event is
//! missed, runs the loop in a spawned task, and fans out via
//! `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nostr_sdk::prelude::*;
use tokio::sync::broadcast;

use crate::spsp::{IlpPeerInfo, PEER_INFO_KIND};

#[derive(Debug, Clone)]
pub struct PeerDiscovered {
    pub pubkey: PublicKey,
    pub info: IlpPeerInfo,
}

/// Watches `relays` for kind-10032 peer-info events. Restartable: calling
/// `start` again after `stop` reconnects and resubscribes. Cancellable via
/// the returned `JoinHandle`, which `stop` aborts.
pub struct RelayMonitor {
    client: Client,
    relays: Vec<String>,
    tx: broadcast::Sender<PeerDiscovered>,
    latest_seen: Arc<Mutex<HashMap<PublicKey, Timestamp>>>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RelayMonitor {
    pub fn new(keys: Keys, relays: Vec<String>) -> (Self, broadcast::Receiver<PeerDiscovered>) {
        let (tx, rx) = broadcast::channel(256);
        let client = Client::new(keys);
        (
            Self {
                client,
                relays,
                tx,
                latest_seen: Arc::new(Mutex::new(HashMap::new())),
                handle: Mutex::new(None),
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerDiscovered> {
        self.tx.subscribe()
    }

    /// Connect to all configured relays and spawn the subscription loop.
    pub async fn start(&self) -> Result<(), String> {
        for url in &self.relays {
            self.client
                .add_relay(url.as_str())
                .await
                .map_err(|e| format!("failed to add relay {url}: {e}"))?;
        }
        self.client.connect_with_timeout(Duration::from_secs(5)).await;

        let client = self.client.clone();
        let tx = self.tx.clone();
        let latest_seen = self.latest_seen.clone();

        let handle = tokio::spawn(async move {
            run_subscription_loop(client, tx, latest_seen).await;
        });
        *self.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Abort the subscription loop. `start` can be called again afterward.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

async fn run_subscription_loop(
    client: Client,
    tx: broadcast::Sender<PeerDiscovered>,
    latest_seen: Arc<Mutex<HashMap<PublicKey, Timestamp>>>,
) {
    let mut notifications = client.notifications();

    let filter = Filter::new().kind(Kind::Custom(PEER_INFO_KIND));
    if let Err(e) = client.subscribe(filter, None).await {
        log::error!("relay monitor: failed to subscribe: {e}");
        return;
    }

    while let Ok(notification) = notifications.recv().await {
        if let RelayPoolNotification::Event { event, .. } = notification {
            handle_peer_info_event(&event, &tx, &latest_seen);
        }
    }
}

fn handle_peer_info_event(
    event: &Event,
    tx: &broadcast::Sender<PeerDiscovered>,
    latest_seen: &Mutex<HashMap<PublicKey, Timestamp>>,
) {
    let info: IlpPeerInfo = match serde_json::from_str(&event.content) {
        Ok(info) => info,
        Err(e) => {
            log::warn!("relay monitor: malformed peer-info event {}: {e}", event.id);
            return;
        }
    };

    let mut seen = latest_seen.lock().unwrap();
    let is_newer = match seen.get(&event.pubkey) {
        Some(prev) => event.created_at > *prev,
        None => true,
    };
    if !is_newer {
        return;
    }
    seen.insert(event.pubkey, event.created_at);
    drop(seen);

    let _ = tx.send(PeerDiscovered {
        pubkey: event.pubkey,
        info,
    });
}
