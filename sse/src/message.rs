use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Body text used for the greeting notification pushed right after a
/// connection is registered. The id carries the connect timestamp so the
/// frontend can correlate reconnects.
const CONNECT_NOTICE_MESSAGE: &str = "Real-time updates connected";

/// Marketplace payloads pushed as `domain_event` frames.
///
/// Entity data is carried as `serde_json::Value`; the managed document store
/// owns the concrete shapes and this layer only routes them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainPayload {
    ListingCreated {
        listing: Value,
    },
    MessageSent {
        conversation_id: String,
        message: Value,
        sender: String,
    },
    OrderCompleted {
        order: Value,
    },
}

/// A single event pushed over a stream connection.
///
/// Events are immutable once constructed. Ordering is per-connection: the
/// registry stamps each outgoing copy with that connection's next sequence
/// number (see [`Frame`]); no ordering holds across connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// Periodic no-op frame that keeps intermediary proxies from closing an
    /// idle connection.
    Heartbeat,
    /// Server-originated notice addressed to a connection or identity.
    Notification { id: String, message: String },
    /// A marketplace change fanned out to interested clients.
    #[serde(rename = "domain_event")]
    Domain(DomainPayload),
}

impl Event {
    /// Wire name of this event's kind, for logging and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Heartbeat => "heartbeat",
            Event::Notification { .. } => "notification",
            Event::Domain(_) => "domain_event",
        }
    }

    /// The greeting pushed to a connection immediately after registration.
    pub fn connect_notice() -> Self {
        Event::Notification {
            id: format!("connect-{}", Utc::now().timestamp_millis()),
            message: CONNECT_NOTICE_MESSAGE.to_string(),
        }
    }
}

/// An [`Event`] stamped with its per-connection sequence number, serialized
/// as the `data:` line of one SSE frame.
///
/// Sequence numbers are monotonically increasing per connection and shared
/// across kinds, so a client can detect reordering or loss within its own
/// stream. Frames carry no `event:` field; clients switch on `kind`.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    #[serde(flatten)]
    pub event: Event,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub event: Event,
    pub scope: MessageScope,
}

#[derive(Debug, Clone)]
pub enum MessageScope {
    /// Send to all connections registered under a specific identity
    /// (multiple tabs/devices are legal and each holds its own connection).
    Identity { identity: String },
    /// Send to every connected client
    Broadcast,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_frame_shape() {
        let frame = Frame {
            event: Event::Heartbeat,
            sequence: 4,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"kind": "heartbeat", "sequence": 4}));
    }

    #[test]
    fn test_notification_frame_shape() {
        let frame = Frame {
            event: Event::Notification {
                id: "connect-1700000000000".to_string(),
                message: "Real-time updates connected".to_string(),
            },
            sequence: 1,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["kind"], "notification");
        assert_eq!(value["sequence"], 1);
        assert_eq!(value["payload"]["id"], "connect-1700000000000");
    }

    #[test]
    fn test_domain_event_frame_nests_payload_tagging() {
        let frame = Frame {
            event: Event::Domain(DomainPayload::MessageSent {
                conversation_id: "conv-2".to_string(),
                message: json!({"id": "m-7", "text": "sold!"}),
                sender: "user-a".to_string(),
            }),
            sequence: 12,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["kind"], "domain_event");
        assert_eq!(value["payload"]["type"], "message_sent");
        assert_eq!(value["payload"]["data"]["conversation_id"], "conv-2");
        assert_eq!(value["payload"]["data"]["message"]["id"], "m-7");
        assert_eq!(value["payload"]["data"]["sender"], "user-a");
    }

    #[test]
    fn test_connect_notice_id_prefix() {
        let notice = Event::connect_notice();
        match notice {
            Event::Notification { id, .. } => {
                assert!(id.starts_with("connect-"), "unexpected id: {id}");
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(Event::Heartbeat.kind(), "heartbeat");
        assert_eq!(Event::connect_notice().kind(), "notification");
        assert_eq!(
            Event::Domain(DomainPayload::ListingCreated {
                listing: json!({}),
            })
            .kind(),
            "domain_event"
        );
    }
}
