//! Connector Adapter (C12): a transport-polymorphic capability set over an
//! external ILP connector. `HttpConnectorAdapter` speaks to a connector's
//! admin/ILP HTTP API the way [`crate::testing`]'s in-process double speaks
//! to a `HashMap` — both implement the same [`ConnectorAdapter`] trait, so
//! the Bootstrap Service and SPSP Handler never know which backs them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPeerParams {
    pub id: String,
    pub url: String,
    pub auth_token: String,
    pub routes: Vec<Route>,
    pub settlement: Option<SettlementBlock>,
}

/// A routing table entry: packets destined under `prefix` are sent to this
/// peer, with ties among overlapping prefixes broken by `priority`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub prefix: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementBlock {
    pub chain: String,
    pub channel_id: String,
    pub token_network_address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelParams {
    pub peer_id: String,
    pub chain: String,
    pub token_network: String,
    pub peer_address: String,
    pub initial_deposit: String,
    pub settlement_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResult {
    pub channel_id: String,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Opening,
    Open,
    Closed,
    Settled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub channel_id: String,
    pub status: ChannelStatus,
    pub chain: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendIlpPacketParams {
    pub destination: String,
    pub amount: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<ClaimEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEnvelope {
    pub channel_id: String,
    pub nonce: String,
    pub cumulative_amount: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendIlpPacketResult {
    pub accepted: bool,
    /// Unconditionally `base64(SHA-256(event.id))` for every accepted
    /// packet — never carries SPSP response data. See `metadata` for that.
    pub fulfillment: Option<String>,
    /// Out-of-band data the far BLS attached to its accept/reject, e.g.
    /// `spspResponseEvent` for a kind-23194 handshake packet.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub url: String,
    pub routes: Vec<Route>,
}

/// Polymorphic capability set over an external ILP connector.
#[async_trait]
pub trait ConnectorAdapter: Send + Sync {
    async fn register_peer(&self, params: RegisterPeerParams) -> Result<()>;
    async fn remove_peer(&self, id: &str) -> Result<()>;
    async fn list_peers(&self) -> Result<Vec<PeerInfo>>;
    async fn open_channel(&self, params: OpenChannelParams) -> Result<OpenChannelResult>;
    async fn get_channel_state(&self, channel_id: &str) -> Result<ChannelState>;
    async fn send_ilp_packet(&self, params: SendIlpPacketParams) -> Result<SendIlpPacketResult>;

    /// Poll `get_channel_state` until it reports `open` or `timeout` elapses.
    async fn wait_for_open(
        &self,
        channel_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<ChannelState> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self.get_channel_state(channel_id).await?;
            if state.status == ChannelStatus::Open {
                return Ok(state);
            }
            if state.status == ChannelStatus::Closed {
                return Err(Error::ChannelOpenFailed(format!(
                    "channel {channel_id} closed while opening"
                )));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::ChannelOpenTimeout);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// HTTP transport to a connector's admin API.
pub struct HttpConnectorAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConnectorAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Connector(format!("{status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Connector(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl ConnectorAdapter for HttpConnectorAdapter {
    async fn register_peer(&self, params: RegisterPeerParams) -> Result<()> {
        let response = self
            .client
            .post(self.url("/peers"))
            .json(&params)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Connector(format!(
                "register_peer: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn remove_peer(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/peers/{id}")))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Connector(format!(
                "remove_peer: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<PeerInfo>> {
        let response = self
            .client
            .get(self.url("/peers"))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::handle_response(response).await
    }

    async fn open_channel(&self, params: OpenChannelParams) -> Result<OpenChannelResult> {
        let response = self
            .client
            .post(self.url("/channels"))
            .json(&params)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::handle_response(response).await
    }

    async fn get_channel_state(&self, channel_id: &str) -> Result<ChannelState> {
        let response = self
            .client
            .get(self.url(&format!("/channels/{channel_id}")))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::handle_response(response).await
    }

    async fn send_ilp_packet(&self, params: SendIlpPacketParams) -> Result<SendIlpPacketResult> {
        let response = self
            .client
            .post(self.url("/ilp/send"))
            .json(&params)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::handle_response(response).await
    }
}
