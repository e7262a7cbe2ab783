//! Outbound notification payloads.
//!
//! Every broadcast is one JSON object per text frame. The `event` tag names
//! what happened; remaining fields describe the post.

use serde::{Deserialize, Serialize};

// ============================================
// Server → Client Messages
// ============================================

/// Post lifecycle notifications pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PostEvent {
    /// A post was inserted.
    PostCreated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// A post's content changed.
    PostUpdated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// A post was removed.
    PostDeleted {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
}

impl PostEvent {
    /// Id of the post the event is about.
    pub fn post_id(&self) -> &str {
        match self {
            Self::PostCreated { id, .. }
            | Self::PostUpdated { id, .. }
            | Self::PostDeleted { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_created_event_matches_wire_shape() {
        let event = PostEvent::PostCreated {
            id: "1".to_string(),
            user_id: None,
            content: None,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"event": "post_created", "id": "1"}));
    }

    #[test]
    fn updated_event_includes_present_fields() {
        let event = PostEvent::PostUpdated {
            id: "7".to_string(),
            user_id: Some("u-1".to_string()),
            content: Some("edited".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"post_updated""#));
        assert!(json.contains(r#""user_id":"u-1""#));
        assert!(json.contains(r#""content":"edited""#));
    }

    #[test]
    fn deleted_event_parses_from_client_side_json() {
        let event: PostEvent =
            serde_json::from_str(r#"{"event":"post_deleted","id":"9"}"#).unwrap();
        assert_eq!(event.post_id(), "9");
        assert!(matches!(event, PostEvent::PostDeleted { user_id: None, .. }));
    }
}
