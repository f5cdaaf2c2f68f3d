// Data models: Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so the client, the service layer and the web
// handlers can use them without depending on rusqlite or sqlx.

use serde::{Deserialize, Serialize};

use crate::error::InteractionError;

/// A post with its denormalized counters.
///
/// A repost is its own row with `original_post_id` set. Its counters are
/// never touched; every interaction counts against the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: String,
    pub like_count: i64,
    pub repost_count: i64,
    pub comment_count: i64,
    pub original_post_id: Option<i64>,
}

impl Post {
    /// The id interactions resolve to: the original for a repost, else self.
    pub fn canonical_id(&self) -> i64 {
        self.original_post_id.unwrap_or(self.id)
    }

    pub fn is_repost(&self) -> bool {
        self.original_post_id.is_some()
    }

    pub fn counts(&self) -> PostCounts {
        PostCounts {
            post_id: self.id,
            likes: self.like_count,
            retweets: self.repost_count,
            comments: self.comment_count,
        }
    }
}

/// Counter snapshot for one post, as served to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCounts {
    pub post_id: i64,
    pub likes: i64,
    pub retweets: i64,
    pub comments: i64,
}

impl PostCounts {
    pub fn get(&self, field: CounterField) -> i64 {
        match field {
            CounterField::Like => self.likes,
            CounterField::Repost => self.retweets,
            CounterField::Comment => self.comments,
        }
    }

    pub fn set(&mut self, field: CounterField, value: i64) {
        let slot = match field {
            CounterField::Like => &mut self.likes,
            CounterField::Repost => &mut self.retweets,
            CounterField::Comment => &mut self.comments,
        };
        *slot = value.max(0);
    }
}

/// The two toggleable user→post relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Like,
    Repost,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Like => "like",
            RelationKind::Repost => "repost",
        }
    }

    pub fn counter(&self) -> CounterField {
        match self {
            RelationKind::Like => CounterField::Like,
            RelationKind::Repost => CounterField::Repost,
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Denormalized counter columns on `posts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterField {
    Like,
    Repost,
    Comment,
}

impl CounterField {
    /// Column name. Only ever interpolated from this closed set.
    pub fn column(&self) -> &'static str {
        match self {
            CounterField::Like => "like_count",
            CounterField::Repost => "repost_count",
            CounterField::Comment => "comment_count",
        }
    }
}

/// A comment, joined with its author's username for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

/// Notification types. Closed set; adding one is a compile-time change
/// wherever messages or entities are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Repost,
    Transaction,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::Like,
        NotificationKind::Comment,
        NotificationKind::Follow,
        NotificationKind::Repost,
        NotificationKind::Transaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Repost => "repost",
            NotificationKind::Transaction => "transaction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a notification's `entity_id` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Post,
    Comment,
    Transaction,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Post => "post",
            EntityType::Comment => "comment",
            EntityType::Transaction => "transaction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(EntityType::Post),
            "comment" => Some(EntityType::Comment),
            "transaction" => Some(EntityType::Transaction),
            _ => None,
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub actor_id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub amount: Option<f64>,
    pub entity_id: Option<String>,
    pub entity_type: Option<EntityType>,
    pub is_read: bool,
    pub created_at: String,
}

/// A notification that has passed validation but isn't stored yet.
///
/// The only way to build one is `NewNotification::new`, which refuses
/// `user_id == actor_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    user_id: i64,
    actor_id: i64,
    pub kind: NotificationKind,
    pub message: String,
    pub amount: Option<f64>,
    pub entity_id: Option<String>,
    pub entity_type: Option<EntityType>,
}

impl NewNotification {
    pub fn new(
        user_id: i64,
        actor_id: i64,
        kind: NotificationKind,
        message: String,
    ) -> Result<Self, InteractionError> {
        if user_id == actor_id {
            return Err(InteractionError::validation(
                "a notification's recipient cannot be its actor",
            ));
        }
        Ok(Self {
            user_id,
            actor_id,
            kind,
            message,
            amount: None,
            entity_id: None,
            entity_type: None,
        })
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_entity(mut self, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn actor_id(&self) -> i64 {
        self.actor_id
    }
}

/// Filter + page for notification pulls.
#[derive(Debug, Clone, Copy)]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub limit: u32,
    pub offset: u32,
}

/// A counter the reconciliation pass found out of sync with the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub post_id: i64,
    pub field: CounterField,
    pub stored: i64,
    pub actual: i64,
}

/// Result of a relation write against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationWrite {
    /// False when the write was a duplicate (insert of an existing pair,
    /// delete of a missing one) and nothing changed.
    pub changed: bool,
    /// Counter value after the write.
    pub count: i64,
    /// Derived repost row: created by a repost insert, removed by a repost delete.
    pub repost: Option<Post>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_notification_rejects_self_target() {
        let err = NewNotification::new(7, 7, NotificationKind::Like, "x".into()).unwrap_err();
        assert!(matches!(err, InteractionError::Validation(_)));
    }

    #[test]
    fn test_new_notification_builder() {
        let n = NewNotification::new(1, 2, NotificationKind::Transaction, "m".into())
            .unwrap()
            .with_amount(3.5)
            .with_entity(EntityType::Transaction, "sig123");
        assert_eq!(n.user_id(), 1);
        assert_eq!(n.actor_id(), 2);
        assert_eq!(n.amount, Some(3.5));
        assert_eq!(n.entity_id.as_deref(), Some("sig123"));
    }

    #[test]
    fn test_canonical_id_resolves_repost() {
        let mut post = Post {
            id: 10,
            author_id: 1,
            content: "hi".into(),
            created_at: String::new(),
            like_count: 0,
            repost_count: 0,
            comment_count: 0,
            original_post_id: None,
        };
        assert_eq!(post.canonical_id(), 10);
        post.original_post_id = Some(3);
        assert_eq!(post.canonical_id(), 3);
        assert!(post.is_repost());
    }

    #[test]
    fn test_counts_set_floors_at_zero() {
        let mut counts = PostCounts::default();
        counts.set(CounterField::Comment, -4);
        assert_eq!(counts.comments, 0);
        counts.set(CounterField::Like, 9);
        assert_eq!(counts.get(CounterField::Like), 9);
    }

    #[test]
    fn test_notification_kind_parse() {
        assert_eq!(NotificationKind::parse("Repost"), Some(NotificationKind::Repost));
        assert_eq!(NotificationKind::parse("poke"), None);
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_notification_serializes_type_field() {
        let n = Notification {
            id: 1,
            user_id: 2,
            actor_id: 3,
            kind: NotificationKind::Like,
            message: "Your post was liked.".into(),
            amount: None,
            entity_id: Some("5".into()),
            entity_type: Some(EntityType::Post),
            is_read: false,
            created_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "like");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["entityType"], "post");
    }
}
