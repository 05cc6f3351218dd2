use crate::message::{DomainPayload, Event, Message, MessageScope};
use crate::Manager;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles domain events by converting them to stream messages and routing
/// them to affected connections.
///
/// This handler is responsible for:
/// 1. Converting domain events into stream event payloads
/// 2. Choosing the delivery scope for each event kind
///
/// Marketplace-wide events (new listings) fan out to everyone; conversation
/// and order events go only to the identity named in the event. Routing
/// metadata never leaks into the wire payload.
pub struct StreamDomainEventHandler {
    manager: Arc<Manager>,
}

impl StreamDomainEventHandler {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for StreamDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::ListingCreated { listing } => {
                debug!("Handling ListingCreated event");

                self.manager.send_message(Message {
                    event: Event::Domain(DomainPayload::ListingCreated {
                        listing: listing.clone(),
                    }),
                    scope: MessageScope::Broadcast,
                });
            }

            DomainEvent::MessageSent {
                conversation_id,
                message,
                sender,
                recipient,
            } => {
                debug!("Handling MessageSent event for conversation {conversation_id}");

                self.manager.send_message(Message {
                    event: Event::Domain(DomainPayload::MessageSent {
                        conversation_id: conversation_id.clone(),
                        message: message.clone(),
                        sender: sender.clone(),
                    }),
                    scope: MessageScope::Identity {
                        identity: recipient.clone(),
                    },
                });
            }

            DomainEvent::OrderCompleted { order, buyer } => {
                debug!("Handling OrderCompleted event");

                self.manager.send_message(Message {
                    event: Event::Domain(DomainPayload::OrderCompleted {
                        order: order.clone(),
                    }),
                    scope: MessageScope::Identity {
                        identity: buyer.clone(),
                    },
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn drained(rx: &mut mpsc::UnboundedReceiver<impl Sized>) -> usize {
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        received
    }

    #[tokio::test]
    async fn test_listing_created_broadcasts() {
        let manager = Arc::new(Manager::new());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        manager.register_connection("user-a".to_string(), tx_a);
        manager.register_connection("user-b".to_string(), tx_b);

        let handler = StreamDomainEventHandler::new(manager);
        handler
            .handle(&DomainEvent::ListingCreated {
                listing: json!({"id": "listing-9", "title": "Bandsaw"}),
            })
            .await;

        assert_eq!(drained(&mut rx_a), 1);
        assert_eq!(drained(&mut rx_b), 1);
    }

    #[tokio::test]
    async fn test_message_sent_reaches_only_the_recipient() {
        let manager = Arc::new(Manager::new());
        let (tx_sender, mut rx_sender) = mpsc::unbounded_channel();
        let (tx_recipient, mut rx_recipient) = mpsc::unbounded_channel();
        manager.register_connection("seller-1".to_string(), tx_sender);
        manager.register_connection("buyer-1".to_string(), tx_recipient);

        let handler = StreamDomainEventHandler::new(manager);
        handler
            .handle(&DomainEvent::MessageSent {
                conversation_id: "conv-3".to_string(),
                message: json!({"id": "m-7", "body": "still available?"}),
                sender: "seller-1".to_string(),
                recipient: "buyer-1".to_string(),
            })
            .await;

        assert_eq!(drained(&mut rx_sender), 0);
        assert_eq!(drained(&mut rx_recipient), 1);
    }

    #[tokio::test]
    async fn test_order_completed_targets_the_buyer() {
        let manager = Arc::new(Manager::new());
        let (tx_buyer, mut rx_buyer) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        manager.register_connection("buyer-2".to_string(), tx_buyer);
        manager.register_connection("user-x".to_string(), tx_other);

        let handler = StreamDomainEventHandler::new(manager);
        handler
            .handle(&DomainEvent::OrderCompleted {
                order: json!({"id": "order-4", "total_cents": 1250}),
                buyer: "buyer-2".to_string(),
            })
            .await;

        assert_eq!(drained(&mut rx_buyer), 1);
        assert_eq!(drained(&mut rx_other), 0);
    }
}
