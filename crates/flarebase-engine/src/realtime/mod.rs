//! Realtime change notification.
//!
//! ```text
//!   RecordStore ──publish──▶ RealtimeHub ──mailbox──▶ shard task
//!                                                      │ owns
//!                                                      ▼
//!   socket ◀── Outbound queue ◀── ConnectionRegistry (sessions, subscriptions)
//! ```
//!
//! All realtime sockets share one shard. The shard task is the only owner of
//! the registry, so its maps need no locks.

mod hub;
mod protocol;
mod registry;

pub use hub::{RealtimeHub, RealtimeSession};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ConnectionRegistry, RealtimeStats};
