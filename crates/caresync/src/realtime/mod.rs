//! Real-time delivery.
//!
//! SSE push multiplexer with per-topic listener sets and a polling
//! fallback.

mod channel;
mod types;

pub use channel::{RealtimeChannel, Subscription};
pub use types::{ConnectionState, RealtimeConfig, Topic, TransportStatus};
