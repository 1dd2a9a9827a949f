//! Node library: wires the Business Logic Server, the NIP-01 Relay Server,
//! and the ILP peer bootstrap machinery around a shared [`state::AppState`].
//! `main.rs` is the thin binary entry point; everything wireable-without-a-
//! process lives here so it stays unit-testable.

pub mod bls;
pub mod config;
pub mod error;
pub mod relay;
mod spsp_handler;
pub mod state;

pub use spsp_handler::{SpspHandler, SpspHandlerConfig};
