use crate::connection::{ConnectionId, ConnectionRegistry, FrameSender, Identity};
use crate::message::{Event, Message, MessageScope};
use log::*;
use std::sync::Arc;

/// Facade over the connection registry. Handlers register and tear down
/// connections through it; the event pipeline pushes messages through it.
/// Serialization is deferred to the registry so every connection gets its
/// own sequence-stamped frame.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Register a new connection and return its unique ID
    pub fn register_connection(&self, identity: Identity, sender: FrameSender) -> ConnectionId {
        let connection_id = self.registry.register(identity, sender);
        info!(
            "Registered stream connection ({} active)",
            self.registry.connection_count()
        );
        connection_id
    }

    /// Unregister a connection by ID
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        info!("Unregistering stream connection");
        self.registry.unregister(connection_id);
    }

    /// Send the greeting frame a connection receives right after its
    /// registration, before any heartbeat or domain event.
    pub fn send_connect_notice(&self, connection_id: &ConnectionId) -> bool {
        self.registry
            .send_to_connection(connection_id, &Event::connect_notice())
    }

    /// Emit a heartbeat on one connection. `false` means the connection is
    /// gone and the caller should stop driving it.
    pub fn send_heartbeat(&self, connection_id: &ConnectionId) -> bool {
        self.registry.send_heartbeat(connection_id)
    }

    /// Send a message based on its scope
    pub fn send_message(&self, message: Message) {
        let scope_label = match message.scope {
            MessageScope::Identity { .. } => "identity",
            MessageScope::Broadcast => "broadcast",
        };
        debug!("Routing {} message ({scope_label})", message.event.kind());
        match message.scope {
            MessageScope::Identity { identity } => {
                self.registry.send_to_identity(&identity, &message.event);
            }
            MessageScope::Broadcast => {
                self.registry.broadcast(&message.event);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.registry.is_registered(connection_id)
    }

    /// Tear down every live connection through the ordinary unregister
    /// path. Dropping the stored senders ends each handler's receive loop,
    /// so streams close out the same way a single disconnect does.
    pub fn shutdown(&self) {
        let connection_ids = self.registry.connection_ids();
        info!("Draining {} stream connection(s)", connection_ids.len());
        for connection_id in &connection_ids {
            self.registry.unregister(connection_id);
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
