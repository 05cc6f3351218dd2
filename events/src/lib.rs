//! Event system infrastructure for the CommonTable realtime core.
//!
//! This crate provides the event system that enables loose coupling between
//! the marketplace producers (listing CRUD, messaging, checkout) and the
//! infrastructure that pushes updates to clients (the SSE layer).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all broadcastable business events
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on the other internal crates, avoiding
//! circular dependencies. Entity data is carried as serialized JSON values:
//! the marketplace persists its records in a managed document store, so the
//! realtime core never needs the concrete shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

/// An opaque client identity token, minted upstream of this core.
/// Routing is keyed on it; nothing here inspects it.
pub type Identity = String;

/// Domain events that represent business-level changes in the marketplace.
/// These events are emitted when a producer operation completes successfully.
///
/// Events carry the identities to notify where delivery is targeted. The
/// producer decides the recipients; this crate and the SSE layer only route.
///
/// Serde tagging matches the wire payload shape pushed to clients, so a
/// producer can hand the same JSON to the publish endpoint that the frontend
/// will eventually receive.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Emitted when a new listing goes live in the marketplace.
    /// Every connected client is told, so browse views can refresh in place.
    ListingCreated {
        /// Complete serialized listing record (id, title, price, etc.).
        /// Sent as-is so the frontend can render without a follow-up fetch.
        listing: Value,
    },
    /// Emitted when a chat message is sent within a conversation.
    /// Only the recipient is notified; the sender already has the message.
    MessageSent {
        /// Conversation the message belongs to.
        conversation_id: String,
        /// Complete serialized message record (id, text, timestamp).
        message: Value,
        /// Identity token of the user who sent the message.
        sender: Identity,
        /// Identity token of the user to notify.
        recipient: Identity,
    },
    /// Emitted when checkout completes for an order (payment provider
    /// confirmed). Notifies the buyer so their orders view updates live.
    OrderCompleted {
        /// Complete serialized order record.
        order: Value,
        /// Identity token of the buyer to notify.
        buyer: Identity,
    },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like pushing stream frames,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are called sequentially in registration order.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
