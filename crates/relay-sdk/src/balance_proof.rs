//! Balance proofs (C6): EIP-712 signed claims over a payment channel's
//! monotonically increasing cumulative transferred amount.
//!
//! Grounded in the EIP-712 signing pattern used for EIP-2612 permits
//! elsewhere in the ecosystem: a `sol!`-defined typed struct, an
//! `eip712_domain!` built from the channel's own chain id and token-network
//! address, `SolStruct::eip712_signing_hash`, then `Signer::sign_hash`.

use alloy_primitives::{Address, PrimitiveSignature as Signature, B256, U256};
use alloy_signer::Signer;
use alloy_sol_types::{eip712_domain, sol, SolStruct};

use crate::error::{Error, Result};

sol! {
    #[derive(Debug)]
    struct BalanceProof {
        address channel;
        uint256 nonce;
        uint256 cumulativeAmount;
        uint256 lockedAmount;
        bytes32 locksRoot;
    }
}

/// Everything needed to build the EIP-712 domain for a specific channel.
/// Every tracked channel carries its own `chain_id` and
/// `token_network_address` — there is no default or placeholder value,
/// since a proof signed under the wrong domain verifies against the wrong
/// chain silently.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDomain {
    pub chain_id: u64,
    pub token_network_address: Address,
}

#[derive(Debug, Clone, Copy)]
pub struct SignedBalanceProof {
    pub channel: Address,
    pub nonce: U256,
    pub cumulative_amount: U256,
    /// Sum of amounts currently locked in pending transfers on this channel.
    pub locked_amount: U256,
    /// Merkle root over the pending locks; `keccak256(\"\")` when none are
    /// outstanding.
    pub locks_root: B256,
    pub signature: Signature,
}

/// The locks root of a channel carrying no pending locks.
pub fn empty_locks_root() -> B256 {
    alloy_primitives::keccak256([])
}

fn signing_hash(domain: &ChannelDomain, claim: &BalanceProof) -> alloy_primitives::B256 {
    let eip712_domain = eip712_domain! {
        name: "RelayPaymentChannel",
        version: "1",
        chain_id: domain.chain_id,
        verifying_contract: domain.token_network_address,
    };
    claim.eip712_signing_hash(&eip712_domain)
}

/// Sign a new balance-proof claim for `channel` with `signer`.
#[allow(clippy::too_many_arguments)]
pub async fn sign_claim(
    signer: &impl Signer,
    domain: &ChannelDomain,
    channel: Address,
    nonce: U256,
    cumulative_amount: U256,
    locked_amount: U256,
    locks_root: B256,
) -> Result<SignedBalanceProof> {
    let claim = BalanceProof {
        channel,
        nonce,
        cumulativeAmount: cumulative_amount,
        lockedAmount: locked_amount,
        locksRoot: locks_root,
    };
    let hash = signing_hash(domain, &claim);
    let signature = signer
        .sign_hash(&hash)
        .await
        .map_err(|e| Error::ChannelOpenFailed(format!("signing failed: {e}")))?;
    Ok(SignedBalanceProof {
        channel,
        nonce,
        cumulative_amount,
        locked_amount,
        locks_root,
        signature,
    })
}

/// Recover the signer address from `proof` and compare against `expected`.
/// Returns `Err(Error::InvalidProofSignature)` on mismatch or a malformed
/// signature — callers never see the recovered (and thus untrustworthy)
/// address on failure.
pub fn verify_claim(
    domain: &ChannelDomain,
    proof: &SignedBalanceProof,
    expected_signer: Address,
) -> Result<()> {
    let claim = BalanceProof {
        channel: proof.channel,
        nonce: proof.nonce,
        cumulativeAmount: proof.cumulative_amount,
        lockedAmount: proof.locked_amount,
        locksRoot: proof.locks_root,
    };
    let hash = signing_hash(domain, &claim);
    let recovered = proof
        .signature
        .recover_address_from_prehash(&hash)
        .map_err(|_| Error::InvalidProofSignature)?;
    if recovered != expected_signer {
        return Err(Error::InvalidProofSignature);
    }
    Ok(())
}

/// Verifier state for one counterparty channel: the highest nonce and
/// transferred amount seen so far, plus the domain and counterparty
/// address a proof must match.
#[derive(Debug, Clone, Copy)]
struct VerifierState {
    domain: ChannelDomain,
    counterparty: Address,
    last_seen_nonce: U256,
    last_seen_cumulative_amount: U256,
}

/// Receiving-side verifier (C6): tracks `lastSeenNonce` /
/// `lastSeenTransferredAmount` per channel and only accepts proofs that
/// strictly advance both. A single channel's checks serialize through its
/// own lock; distinct channels proceed independently.
pub struct BalanceProofVerifier {
    channels: tokio::sync::Mutex<std::collections::HashMap<Address, VerifierState>>,
}

impl Default for BalanceProofVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceProofVerifier {
    pub fn new() -> Self {
        Self {
            channels: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Register a channel this node expects to receive proofs for.
    pub async fn track(&self, channel_id: Address, domain: ChannelDomain, counterparty: Address) {
        let mut channels = self.channels.lock().await;
        channels.entry(channel_id).or_insert(VerifierState {
            domain,
            counterparty,
            last_seen_nonce: U256::ZERO,
            last_seen_cumulative_amount: U256::ZERO,
        });
    }

    /// Verify `proof`'s signature and monotonicity against the tracked
    /// state for its channel, updating `lastSeen*` atomically on success.
    pub async fn verify(&self, proof: &SignedBalanceProof) -> Result<()> {
        let mut channels = self.channels.lock().await;
        let state = channels
            .get_mut(&proof.channel)
            .ok_or_else(|| Error::UnknownChannel(proof.channel.to_string()))?;

        verify_claim(&state.domain, proof, state.counterparty)?;

        if proof.nonce <= state.last_seen_nonce {
            return Err(Error::StaleNonce(proof.nonce.try_into().unwrap_or(u64::MAX)));
        }
        if proof.cumulative_amount < state.last_seen_cumulative_amount {
            return Err(Error::RegressiveAmount);
        }

        state.last_seen_nonce = proof.nonce;
        state.last_seen_cumulative_amount = proof.cumulative_amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;

    fn domain() -> ChannelDomain {
        ChannelDomain {
            chain_id: 31337,
            token_network_address: Address::repeat_byte(0xAB),
        }
    }

    #[tokio::test]
    async fn signed_claim_verifies_against_signer_address() {
        let signer = PrivateKeySigner::random();
        let domain = domain();
        let channel = Address::repeat_byte(0x01);
        let proof = sign_claim(&signer, &domain, channel, U256::from(1u64), U256::from(100u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        verify_claim(&domain, &proof, signer.address()).unwrap();
    }

    #[tokio::test]
    async fn claim_signed_by_other_key_fails_verification() {
        let signer = PrivateKeySigner::random();
        let impostor = PrivateKeySigner::random();
        let domain = domain();
        let channel = Address::repeat_byte(0x01);
        let proof = sign_claim(&signer, &domain, channel, U256::from(1u64), U256::from(100u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        assert!(verify_claim(&domain, &proof, impostor.address()).is_err());
    }

    #[tokio::test]
    async fn claim_signed_under_different_chain_id_does_not_verify() {
        let signer = PrivateKeySigner::random();
        let domain_a = domain();
        let mut domain_b = domain();
        domain_b.chain_id = 1;
        let channel = Address::repeat_byte(0x01);
        let proof = sign_claim(&signer, &domain_a, channel, U256::from(1u64), U256::from(100u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        assert!(verify_claim(&domain_b, &proof, signer.address()).is_err());
    }

    #[tokio::test]
    async fn verifier_accepts_strictly_increasing_proofs() {
        let signer = PrivateKeySigner::random();
        let domain = domain();
        let channel = Address::repeat_byte(0x05);
        let verifier = BalanceProofVerifier::new();
        verifier.track(channel, domain, signer.address()).await;

        let first = sign_claim(&signer, &domain, channel, U256::from(1u64), U256::from(10u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        verifier.verify(&first).await.unwrap();

        let second = sign_claim(&signer, &domain, channel, U256::from(2u64), U256::from(20u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        verifier.verify(&second).await.unwrap();
    }

    #[tokio::test]
    async fn verifier_rejects_stale_nonce() {
        let signer = PrivateKeySigner::random();
        let domain = domain();
        let channel = Address::repeat_byte(0x06);
        let verifier = BalanceProofVerifier::new();
        verifier.track(channel, domain, signer.address()).await;

        let first = sign_claim(&signer, &domain, channel, U256::from(2u64), U256::from(20u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        verifier.verify(&first).await.unwrap();

        let replay = sign_claim(&signer, &domain, channel, U256::from(2u64), U256::from(20u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        assert!(matches!(
            verifier.verify(&replay).await.unwrap_err(),
            Error::StaleNonce(_)
        ));
    }

    #[tokio::test]
    async fn verifier_rejects_regressive_amount() {
        let signer = PrivateKeySigner::random();
        let domain = domain();
        let channel = Address::repeat_byte(0x07);
        let verifier = BalanceProofVerifier::new();
        verifier.track(channel, domain, signer.address()).await;

        let first = sign_claim(&signer, &domain, channel, U256::from(1u64), U256::from(50u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        verifier.verify(&first).await.unwrap();

        let regressive = sign_claim(&signer, &domain, channel, U256::from(2u64), U256::from(10u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        assert!(matches!(
            verifier.verify(&regressive).await.unwrap_err(),
            Error::RegressiveAmount
        ));
    }

    #[tokio::test]
    async fn verifier_rejects_untracked_channel() {
        let signer = PrivateKeySigner::random();
        let domain = domain();
        let channel = Address::repeat_byte(0x08);
        let verifier = BalanceProofVerifier::new();
        let proof = sign_claim(&signer, &domain, channel, U256::from(1u64), U256::from(10u64), U256::ZERO, empty_locks_root())
            .await
            .unwrap();
        assert!(matches!(
            verifier.verify(&proof).await.unwrap_err(),
            Error::UnknownChannel(_)
        ));
    }
}
