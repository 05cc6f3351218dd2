//! Push notification shaping and interaction routing.
//!
//! Pure decisions only: the platform layer shows the notification and
//! reports clicks back; this module decides what to show and where a click
//! should land.

use serde::Serialize;

/// Stable tag for message pushes. Re-using one tag makes a new push replace
/// the previous notification instead of stacking a pile of them.
pub const MESSAGE_NOTIFICATION_TAG: &str = "message-notification";

/// Where notification clicks land: the messaging view.
pub const MESSAGES_ROUTE: &str = "/messages.html";

const DEFAULT_TITLE: &str = "CommonTable";
const DEFAULT_BODY: &str = "You have a new message";

/// Buttons rendered on the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
}

/// Shape the notification for an incoming push. The push payload is plain
/// text and becomes the body; pushes without a payload fall back to a
/// generic body rather than showing nothing.
pub fn on_push(payload: Option<&str>) -> PushNotification {
    let body = match payload {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => DEFAULT_BODY.to_string(),
    };

    PushNotification {
        title: DEFAULT_TITLE.to_string(),
        body,
        tag: MESSAGE_NOTIFICATION_TAG.to_string(),
        actions: vec![NotificationAction::Open, NotificationAction::Close],
    }
}

/// Route for a notification interaction. `Close` dismisses without
/// navigation; the open button and a plain click on the notification body
/// (`None`) both deep-link into messages.
pub fn on_interaction(action: Option<NotificationAction>) -> Option<&'static str> {
    match action {
        Some(NotificationAction::Close) => None,
        Some(NotificationAction::Open) | None => Some(MESSAGES_ROUTE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_text_becomes_the_body() {
        let shaped = on_push(Some("anna: is the table still available?"));
        assert_eq!(shaped.body, "anna: is the table still available?");
        assert_eq!(shaped.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_missing_payload_falls_back_to_the_default_body() {
        assert_eq!(on_push(None).body, DEFAULT_BODY);
        assert_eq!(on_push(Some("   ")).body, DEFAULT_BODY);
    }

    #[test]
    fn test_tag_is_stable_so_pushes_replace_not_stack() {
        let first = on_push(Some("one"));
        let second = on_push(Some("two"));
        assert_eq!(first.tag, second.tag);
        assert_eq!(first.tag, MESSAGE_NOTIFICATION_TAG);
    }

    #[test]
    fn test_interactions_route_to_messages_except_close() {
        assert_eq!(
            on_interaction(Some(NotificationAction::Open)),
            Some(MESSAGES_ROUTE)
        );
        assert_eq!(on_interaction(None), Some(MESSAGES_ROUTE));
        assert_eq!(on_interaction(Some(NotificationAction::Close)), None);
    }
}
