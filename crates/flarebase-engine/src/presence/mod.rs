//! Presence tracking.
//!
//! ```text
//!   socket(userId=alice) ─┐
//!   socket(userId=alice) ─┼─▶ shard "alice" ── PresenceTracker ──┬─▶ PresenceStore (durable)
//!   POST /status?alice  ──┘                                      └─▶ KvCache "presence:users:alice" (TTL)
//!
//!   GET /api/presence/users ──▶ KvCache "presence:users:*" (merged)
//! ```
//!
//! Each presence key gets its own shard task, spawned on first use and
//! restored from the durable store before it handles anything. Reads go
//! through the cache snapshots so they never wait on a shard.

mod hub;
mod protocol;
mod tracker;

pub use hub::{OnlineUsers, PresenceHub, PresenceSession, UserPresence, ANONYMOUS_SHARD};
pub use protocol::{PresenceClientMessage, PresenceServerMessage};
pub use tracker::{cache_key, PresenceTracker, CACHE_PREFIX};
