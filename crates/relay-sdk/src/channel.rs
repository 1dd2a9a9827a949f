//! Channel Manager (C5), paying side: per-channel nonce and cumulative
//! amount bookkeeping, serialized per channel, signing EIP-712 balance
//! proofs over the post-increment state.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_signer::Signer;
use tokio::sync::Mutex;

use crate::balance_proof::{self, empty_locks_root, ChannelDomain, SignedBalanceProof};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    nonce: u64,
    cumulative_amount: U256,
    domain: ChannelDomain,
}

/// Tracks channels this node pays into. Each channel's state lives behind
/// its own mutex so concurrent updates to distinct channels proceed in
/// parallel; operations on the same channel serialize through that lock.
pub struct ChannelManager {
    channels: Mutex<HashMap<Address, Arc<Mutex<ChannelState>>>>,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking `channel_id`. `chain_id` and `token_network_address`
    /// must be the channel's actual settlement context — there is no
    /// default, since a proof signed under the wrong domain would verify
    /// against the wrong chain.
    pub async fn track(
        &self,
        channel_id: Address,
        chain_id: u64,
        token_network_address: Address,
    ) {
        let mut channels = self.channels.lock().await;
        channels.entry(channel_id).or_insert_with(|| {
            Arc::new(Mutex::new(ChannelState {
                nonce: 0,
                cumulative_amount: U256::ZERO,
                domain: ChannelDomain {
                    chain_id,
                    token_network_address,
                },
            }))
        });
    }

    pub async fn is_tracking(&self, channel_id: Address) -> bool {
        self.channels.lock().await.contains_key(&channel_id)
    }

    pub async fn get_nonce(&self, channel_id: Address) -> Result<u64> {
        let entry = self.channel_entry(channel_id).await?;
        Ok(entry.lock().await.nonce)
    }

    pub async fn get_cumulative_amount(&self, channel_id: Address) -> Result<U256> {
        let entry = self.channel_entry(channel_id).await?;
        Ok(entry.lock().await.cumulative_amount)
    }

    async fn channel_entry(&self, channel_id: Address) -> Result<Arc<Mutex<ChannelState>>> {
        self.channels
            .lock()
            .await
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| Error::UnknownChannel(channel_id.to_string()))
    }

    /// Atomically increment `channel_id`'s nonce by one and its cumulative
    /// amount by `additional_amount`, then sign an EIP-712 balance proof
    /// over the new state.
    pub async fn sign_balance_proof(
        &self,
        channel_id: Address,
        additional_amount: U256,
        signer: &impl Signer,
    ) -> Result<SignedBalanceProof> {
        let entry = self.channel_entry(channel_id).await?;
        let mut state = entry.lock().await;
        let new_nonce = state.nonce + 1;
        let new_cumulative = state.cumulative_amount + additional_amount;
        let proof = balance_proof::sign_claim(
            signer,
            &state.domain,
            channel_id,
            U256::from(new_nonce),
            new_cumulative,
            U256::ZERO,
            empty_locks_root(),
        )
        .await?;
        state.nonce = new_nonce;
        state.cumulative_amount = new_cumulative;
        Ok(proof)
    }
}
