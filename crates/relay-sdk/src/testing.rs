//! In-process test doubles, gated behind the `testing` feature so they ship
//! only to dev-dependents, never to production builds of this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::connector::{
    ChannelState, ChannelStatus, ConnectorAdapter, OpenChannelParams, OpenChannelResult, PeerInfo,
    RegisterPeerParams, SendIlpPacketParams, SendIlpPacketResult,
};
use crate::error::{Error, Result};

/// In-process [`ConnectorAdapter`] double. Channels opened through it
/// report `open` immediately — call [`MockConnectorAdapter::set_channel_status`]
/// first to exercise the Bootstrap Service's polling/timeout path.
#[derive(Default)]
pub struct MockConnectorAdapter {
    peers: Mutex<HashMap<String, RegisterPeerParams>>,
    channels: Mutex<HashMap<String, ChannelState>>,
    next_channel_id: Mutex<u64>,
    sent_packets: Mutex<Vec<SendIlpPacketParams>>,
    packet_responses: Mutex<Vec<SendIlpPacketResult>>,
}

impl MockConnectorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned response for the next `send_ilp_packet` call.
    pub fn queue_packet_response(&self, response: SendIlpPacketResult) {
        self.packet_responses.lock().unwrap().push(response);
    }

    /// Override a channel's reported status, e.g. to keep it at `opening`
    /// so a caller's `wait_for_open` times out.
    pub fn set_channel_status(&self, channel_id: &str, status: ChannelStatus) {
        if let Some(state) = self.channels.lock().unwrap().get_mut(channel_id) {
            state.status = status;
        }
    }

    pub fn sent_packets(&self) -> Vec<SendIlpPacketParams> {
        self.sent_packets.lock().unwrap().clone()
    }

    pub fn registered_peer(&self, id: &str) -> Option<RegisterPeerParams> {
        self.peers.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ConnectorAdapter for MockConnectorAdapter {
    async fn register_peer(&self, params: RegisterPeerParams) -> Result<()> {
        self.peers
            .lock()
            .unwrap()
            .insert(params.id.clone(), params);
        Ok(())
    }

    async fn remove_peer(&self, id: &str) -> Result<()> {
        self.peers.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<PeerInfo>> {
        Ok(self
            .peers
            .lock()
            .unwrap()
            .values()
            .map(|p| PeerInfo {
                id: p.id.clone(),
                url: p.url.clone(),
                routes: p.routes.clone(),
            })
            .collect())
    }

    async fn open_channel(&self, params: OpenChannelParams) -> Result<OpenChannelResult> {
        let mut next_id = self.next_channel_id.lock().unwrap();
        let channel_id = format!("channel-{}-{}", params.peer_id, *next_id);
        *next_id += 1;
        drop(next_id);

        self.channels.lock().unwrap().insert(
            channel_id.clone(),
            ChannelState {
                channel_id: channel_id.clone(),
                status: ChannelStatus::Open,
                chain: params.chain,
            },
        );
        Ok(OpenChannelResult {
            channel_id,
            status: ChannelStatus::Open,
        })
    }

    async fn get_channel_state(&self, channel_id: &str) -> Result<ChannelState> {
        self.channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| Error::UnknownChannel(channel_id.to_string()))
    }

    async fn send_ilp_packet(&self, params: SendIlpPacketParams) -> Result<SendIlpPacketResult> {
        self.sent_packets.lock().unwrap().push(params);
        let mut queued = self.packet_responses.lock().unwrap();
        Ok(if queued.is_empty() {
            SendIlpPacketResult {
                accepted: true,
                fulfillment: None,
                metadata: None,
                code: None,
                message: None,
            }
        } else {
            queued.remove(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opened_channel_is_immediately_queryable() {
        let adapter = MockConnectorAdapter::new();
        let result = adapter
            .open_channel(OpenChannelParams {
                peer_id: "peer-1".into(),
                chain: "evm:anvil:31337".into(),
                token_network: "0xabc".into(),
                peer_address: "0xdef".into(),
                initial_deposit: "1000".into(),
                settlement_timeout: 3600,
            })
            .await
            .unwrap();
        let state = adapter.get_channel_state(&result.channel_id).await.unwrap();
        assert_eq!(state.status, ChannelStatus::Open);
    }

    #[tokio::test]
    async fn overridden_channel_status_is_observed_by_wait_for_open() {
        let adapter = MockConnectorAdapter::new();
        let result = adapter
            .open_channel(OpenChannelParams {
                peer_id: "peer-2".into(),
                chain: "evm:anvil:31337".into(),
                token_network: "0xabc".into(),
                peer_address: "0xdef".into(),
                initial_deposit: "1000".into(),
                settlement_timeout: 3600,
            })
            .await
            .unwrap();
        adapter.set_channel_status(&result.channel_id, ChannelStatus::Opening);
        let err = adapter
            .wait_for_open(
                &result.channel_id,
                std::time::Duration::from_millis(10),
                std::time::Duration::from_millis(30),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelOpenTimeout));
    }
}
