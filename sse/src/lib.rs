//! Server-Sent Events (SSE) infrastructure for real-time marketplace updates.
//!
//! This crate provides the server half of the realtime layer: a connection
//! registry, a routing manager, and the wire-level frame model used to push
//! listing, message, and order updates to connected clients.
//!
//! # Architecture
//!
//! - **Many connections per identity**: An identity may hold any number of
//!   simultaneous connections (tabs, devices); each gets every frame its
//!   identity is scoped to.
//! - **Dual-index registry**: O(1) lookups for both connection management and
//!   identity-scoped message routing via separate DashMap indices.
//! - **Identity and Broadcast scopes**: Messages can be sent to a specific
//!   identity or broadcast to all connected clients.
//! - **Ephemeral frames**: Nothing is buffered for absent clients - a client
//!   that is offline misses the event and reconciles on its next fetch.
//! - **Sequence-stamped frames**: Every connection numbers its outgoing
//!   frames 1, 2, 3, ... across all event kinds, so clients can detect gaps.
//!
//! # Message Flow
//!
//! 1. Client establishes a stream connection via the `/sse` endpoint
//! 2. Connection registered in ConnectionRegistry with dual indices and
//!    greeted with a connect notification
//! 3. When something happens (listing created, message sent, order
//!    completed), the event pipeline hands a `DomainEvent` to
//!    `StreamDomainEventHandler`
//! 4. The handler picks the scope (broadcast for listings, the named
//!    identity for messages and orders) and routes through the Manager
//! 5. The registry stamps each connection's sequence number and pushes the
//!    frame into that connection's channel
//!
//! # Example: Sending an event
//!
//! ```rust,ignore
//! use sse::message::{DomainPayload, Event, Message, MessageScope};
//!
//! // After recording a new chat message
//! app_state.sse_manager.send_message(Message {
//!     event: Event::Domain(DomainPayload::MessageSent {
//!         conversation_id,
//!         message: message.clone(),
//!         sender,
//!     }),
//!     scope: MessageScope::Identity { identity: recipient },
//! });
//! ```
//!
//! # Delivery Guarantees
//!
//! - A send failure is the sole disconnect signal; the failed connection is
//!   unregistered and no other connection is affected
//! - Heartbeats ride the same channel as data frames and share the same
//!   sequence counter
//! - The server decides recipients (never client-controlled)
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry with dual-index architecture and type-safe ConnectionId
//! - `manager`: High-level message routing (delegates to ConnectionRegistry)
//! - `message`: Frame, event, and scope definitions
//! - `domain_event_handler`: Bridges `events::DomainEvent` into stream messages

pub mod connection;
pub mod domain_event_handler;
pub mod manager;
pub mod message;

pub use manager::Manager;
