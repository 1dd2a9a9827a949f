//! Diesel-backed persistence: the Event Store (C1) and the persistent half
//! of payment-channel state. Pure domain logic stays in `relay-sdk`; this
//! crate only knows how to put it on disk.

mod conversions;
mod error;
mod models;
mod schema;
mod store;

pub use error::StoreError;
pub use models::{ChannelStateRow, EventRow, EventTagRow};
pub use store::{is_ephemeral, EventStore};

pub type Result<T> = std::result::Result<T, StoreError>;
