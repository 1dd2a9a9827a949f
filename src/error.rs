//! The BLS's reject shape: every `/handle-packet` failure
//! becomes one of `F00`/`F06`/`T00` with a stable `{code, message,
//! metadata?}` body. `relay_sdk::Error::is_bad_request`/`is_transient`
//! already classify the domain error taxonomy; this module is only the
//! HTTP-facing wrapper around that classification.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectCode {
    F00,
    F06,
    T00,
}

#[derive(Debug, Serialize)]
pub struct BlsReject {
    pub code: RejectCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl BlsReject {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: RejectCode::F00,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn insufficient_payment(required: u128, received: u128) -> Self {
        Self {
            code: RejectCode::F06,
            message: "insufficient payment".into(),
            metadata: Some(serde_json::json!({
                "required": required.to_string(),
                "received": received.to_string(),
            })),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            code: RejectCode::T00,
            message: message.into(),
            metadata: None,
        }
    }
}

impl IntoResponse for BlsReject {
    fn into_response(self) -> Response {
        let status = match self.code {
            RejectCode::F00 | RejectCode::F06 => StatusCode::BAD_REQUEST,
            RejectCode::T00 => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(self)).into_response()
    }
}

/// Maps a domain error to its reject shape: `BadRequest`/`Protocol`-shaped
/// errors surface as `F00`,
/// `Transient`-shaped errors as `T00`. `InsufficientPayment` is handled
/// separately by the caller since it carries `{required, received}`.
impl From<relay_sdk::Error> for BlsReject {
    fn from(e: relay_sdk::Error) -> Self {
        if e.is_transient() {
            BlsReject::transient(e.to_string())
        } else {
            BlsReject::bad_request(e.to_string())
        }
    }
}

impl From<relay_store::StoreError> for BlsReject {
    fn from(e: relay_store::StoreError) -> Self {
        BlsReject::transient(e.to_string())
    }
}
