// InteractionApi trait: what a client session needs from the server.
//
// Implementors: HttpApi (reqwest against the REST surface) and LocalApi
// (in-process, straight into an InteractionService). The acting user is
// bound into the implementation, never passed per call.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::bus::Event;
use crate::db::models::{Comment, PostCounts, RelationKind};
use crate::error::Result;

/// A server push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushChannel {
    /// Comment and counter events for a post (resolved to its original).
    Post(i64),
    /// Notifications for the session user.
    Notifications,
}

/// Decoded push events. Ends when the server closes the channel; an `Err`
/// item means the connection failed.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// Server-confirmed state of one relation after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationState {
    /// Canonical post id.
    pub post_id: i64,
    #[serde(alias = "liked", alias = "retweeted")]
    pub active: bool,
    #[serde(alias = "likes", alias = "retweets")]
    pub count: i64,
}

/// Comments on a canonical post plus the stored counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub post_id: i64,
    pub comments: Vec<Comment>,
    pub count: i64,
}

/// A submitted comment and the post's new comment count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedComment {
    pub comment: Comment,
    pub count: i64,
}

#[async_trait]
pub trait InteractionApi: Send + Sync {
    /// Drive the relation to `active`. Idempotent on the server.
    async fn set_relation(&self, kind: RelationKind, post_id: i64, active: bool)
        -> Result<RelationState>;

    async fn post_counts(&self, post_id: i64) -> Result<PostCounts>;

    async fn submit_comment(&self, post_id: i64, content: &str) -> Result<SubmittedComment>;

    async fn delete_comment(&self, comment_id: i64) -> Result<()>;

    async fn list_comments(&self, post_id: i64) -> Result<CommentPage>;

    /// Canonical post ids the session user has an active relation with.
    async fn relations(&self, kind: RelationKind) -> Result<Vec<i64>>;

    /// Open a push channel. None when events already reach the session's
    /// bus some other way (an embedded service sharing it).
    fn push_events(&self, _channel: PushChannel) -> Option<EventStream> {
        None
    }
}
