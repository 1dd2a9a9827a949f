use thiserror::Error;

/// Core domain errors, conceptually grouped the way the BLS's reject codes
/// are: `BadRequest`-shaped variants map to `F00`, `InsufficientPayment` to
/// `F06`, `Transient`-shaped variants to `T00` (see `is_bad_request` /
/// `is_transient`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid event signature")]
    InvalidSignature,

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("TOON decode error: {0}")]
    ToonDecode(String),

    #[error("invalid pricing configuration: {0}")]
    Config(String),

    #[error("insufficient payment: required {required}, received {received}")]
    InsufficientPayment { required: String, received: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no common settlement chain")]
    NoCommonChain,

    #[error("channel open timed out")]
    ChannelOpenTimeout,

    #[error("channel open failed: {0}")]
    ChannelOpenFailed(String),

    #[error("NIP-44 decryption failed: {0}")]
    DecryptError(String),

    #[error("channel {0} is not tracked")]
    UnknownChannel(String),

    #[error("invalid balance-proof signature")]
    InvalidProofSignature,

    #[error("stale nonce: {0}")]
    StaleNonce(u64),

    #[error("regressive transferred amount")]
    RegressiveAmount,

    #[error("connector error: {0}")]
    Connector(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error should surface to an ILP peer as `F00`.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidSignature
                | Error::BadRequest(_)
                | Error::ToonDecode(_)
                | Error::NoCommonChain
                | Error::DecryptError(_)
                | Error::InvalidProofSignature
                | Error::StaleNonce(_)
                | Error::RegressiveAmount
                | Error::UnknownChannel(_)
        )
    }

    /// Whether this error should surface to an ILP peer as `T00` (retryable).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::ChannelOpenTimeout | Error::ChannelOpenFailed(_)
        )
    }
}
