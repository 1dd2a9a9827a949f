//! Relay Monitor (C10): watch a set of relays for peer-info announcements.

mod relay_monitor;

pub use relay_monitor::{PeerDiscovered, RelayMonitor};
