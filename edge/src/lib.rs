//! Client-side resilience core for the CommonTable realtime layer.
//!
//! Everything here runs on the client side of the stream: keeping the app
//! shell usable offline, queuing writes made without connectivity, shaping
//! push notifications, and rendering only what actually changed when a
//! conversation re-syncs.
//!
//! # Components
//!
//! - **Cache agent** (`agent`, `cache`): generation-keyed response cache
//!   with cache-first serving for the app shell, strict bypass for live
//!   API paths, and an offline-page fallback for failed navigations.
//! - **Network seam** (`net`): the `Network` trait the agent fetches
//!   through, with a reqwest-backed implementation for live use.
//! - **Offline action queue** (`queue`): durable FIFO of actions taken
//!   while offline, replayed with per-action attempt bookkeeping and
//!   exponential backoff once the stream reconnects.
//! - **Push dispatcher** (`push`): pure payload-to-notification shaping and
//!   click routing.
//! - **Snapshot differ** (`differ`): length-based diffing of ordered
//!   message snapshots plus the auto-clearing new-message signal.
//!
//! All of it is deliberately transport-agnostic where it can be: the cache
//! agent and queue depend on trait seams (`Network`, `ActionDispatcher`),
//! so the same logic runs against a live server or a scripted test double.

pub mod agent;
pub mod cache;
pub mod differ;
pub mod error;
pub mod net;
pub mod push;
pub mod queue;

pub use agent::CacheAgent;
pub use queue::OfflineActionQueue;
