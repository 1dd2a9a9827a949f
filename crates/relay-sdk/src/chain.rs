//! Settlement chain identifiers, e.g. `evm:anvil:31337`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A settlement chain identifier of the form `blockchain:network:chainId`.
///
/// Used both in `IlpPeerInfo.supportedChains` and as the context a
/// [`crate::channel::ChannelManager`] balance proof is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainRef {
    pub blockchain: String,
    pub network: String,
    pub chain_id: u64,
}

#[derive(Debug, Error)]
pub enum ChainRefError {
    #[error("chain identifier must have exactly 3 ':'-separated parts, got {0:?}")]
    BadShape(String),
    #[error("invalid chain id component: {0}")]
    InvalidChainId(String),
}

impl ChainRef {
    pub fn new(blockchain: impl Into<String>, network: impl Into<String>, chain_id: u64) -> Self {
        Self {
            blockchain: blockchain.into(),
            network: network.into(),
            chain_id,
        }
    }
}

impl FromStr for ChainRef {
    type Err = ChainRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [blockchain, network, chain_id] = parts.as_slice() else {
            return Err(ChainRefError::BadShape(s.to_string()));
        };
        let chain_id = chain_id
            .parse::<u64>()
            .map_err(|_| ChainRefError::InvalidChainId(chain_id.to_string()))?;
        Ok(ChainRef {
            blockchain: blockchain.to_string(),
            network: network.to_string(),
            chain_id,
        })
    }
}

impl TryFrom<String> for ChainRef {
    type Error = ChainRefError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChainRef> for String {
    fn from(value: ChainRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.blockchain, self.network, self.chain_id)
    }
}
