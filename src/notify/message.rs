// Notification triggers and message synthesis.
//
// Each trigger carries exactly the data its notification needs. The
// message for a trigger is a pure function of it.

use crate::db::models::{EntityType, NotificationKind};

/// The interaction that caused a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Like { post_id: i64 },
    Comment { post_id: i64, comment_id: i64 },
    Follow,
    Repost { post_id: i64 },
    Transaction { amount: f64, signature: String },
}

impl Trigger {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Trigger::Like { .. } => NotificationKind::Like,
            Trigger::Comment { .. } => NotificationKind::Comment,
            Trigger::Follow => NotificationKind::Follow,
            Trigger::Repost { .. } => NotificationKind::Repost,
            Trigger::Transaction { .. } => NotificationKind::Transaction,
        }
    }

    /// The record the notification links to, if any.
    ///
    /// A comment notification links to the comment, not the post, so the
    /// client can scroll to it.
    pub fn entity(&self) -> Option<(EntityType, String)> {
        match self {
            Trigger::Like { post_id } | Trigger::Repost { post_id } => {
                Some((EntityType::Post, post_id.to_string()))
            }
            Trigger::Comment { comment_id, .. } => Some((EntityType::Comment, comment_id.to_string())),
            Trigger::Follow => None,
            Trigger::Transaction { signature, .. } => {
                Some((EntityType::Transaction, signature.clone()))
            }
        }
    }

    pub fn amount(&self) -> Option<f64> {
        match self {
            Trigger::Transaction { amount, .. } => Some(*amount),
            _ => None,
        }
    }

    /// Whether a repeat of this trigger should collapse into an existing
    /// unread notification instead of creating a new one.
    pub fn collapses_repeats(&self) -> bool {
        match self {
            Trigger::Like { .. } | Trigger::Repost { .. } | Trigger::Follow => true,
            Trigger::Comment { .. } | Trigger::Transaction { .. } => false,
        }
    }
}

/// Default user-facing text for a trigger.
pub fn synthesize_message(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Like { .. } => "Your post was liked.".to_string(),
        Trigger::Comment { .. } => "Your post received a comment.".to_string(),
        Trigger::Follow => "You have a new follower.".to_string(),
        Trigger::Repost { .. } => "Your post was reposted.".to_string(),
        Trigger::Transaction { amount, .. } => format!("You received {amount:.2} SOL."),
    }
}

/// An explicit, non-blank message wins; otherwise synthesize one.
pub fn resolve_message(trigger: &Trigger, explicit: Option<&str>) -> String {
    match explicit.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => synthesize_message(trigger),
    }
}
