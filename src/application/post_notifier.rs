//! Post notifications for connected clients.
//!
//! Maps post lifecycle writes onto [`PostEvent`] broadcasts. The connection
//! that triggered a write (if the caller knows it) is excluded so it does not
//! receive its own echo.

use std::sync::Arc;

use crate::hub::{BroadcastReport, ConnectionRef, HubError, PostEvent};
use crate::ports::Broadcaster;

/// The fields of a post that notifications carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: String,
    pub user_id: String,
    pub content: String,
}

/// Broadcasts post lifecycle events through a [`Broadcaster`].
#[derive(Clone)]
pub struct PostNotifier {
    broadcaster: Arc<dyn Broadcaster>,
}

impl PostNotifier {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    pub async fn post_created(
        &self,
        post: &PostSummary,
        origin: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError> {
        let event = PostEvent::PostCreated {
            id: post.id.clone(),
            user_id: Some(post.user_id.clone()),
            content: Some(post.content.clone()),
        };
        self.notify(event, origin).await
    }

    pub async fn post_updated(
        &self,
        post: &PostSummary,
        origin: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError> {
        let event = PostEvent::PostUpdated {
            id: post.id.clone(),
            user_id: Some(post.user_id.clone()),
            content: Some(post.content.clone()),
        };
        self.notify(event, origin).await
    }

    pub async fn post_deleted(
        &self,
        post_id: &str,
        user_id: &str,
        origin: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError> {
        let event = PostEvent::PostDeleted {
            id: post_id.to_string(),
            user_id: Some(user_id.to_string()),
        };
        self.notify(event, origin).await
    }

    async fn notify(
        &self,
        event: PostEvent,
        origin: Option<&ConnectionRef>,
    ) -> Result<BroadcastReport, HubError> {
        // Failures are logged by the broadcaster.
        let report = self.broadcaster.broadcast_event(&event, origin).await?;

        tracing::debug!(
            post_id = %event.post_id(),
            queued = report.queued,
            dropped = report.dropped,
            "Post notification broadcast"
        );
        Ok(report)
    }
}
