// Notification fan-out: turns a committed interaction into a stored
// notification for the affected user and pushes it on their topic.
//
// Runs after the triggering write has committed; a failure here is logged
// by the caller and never undoes the interaction. Pull (the paginated list)
// is authoritative; the push is best-effort.

pub mod message;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::bus::{Event, EventBus, Topic};
use crate::db::models::{NewNotification, Notification, NotificationFilter, NotificationKind};
use crate::db::Database;
use crate::error::{InteractionError, Result};

pub use message::{resolve_message, synthesize_message, Trigger};

/// Default and maximum page sizes for notification pulls.
pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// One page of notifications plus the recipient's total unread count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Clone)]
pub struct Notifier {
    db: Arc<dyn Database>,
    bus: EventBus,
}

impl Notifier {
    pub fn new(db: Arc<dyn Database>, bus: EventBus) -> Self {
        Self { db, bus }
    }

    /// Create a notification for `recipient` about `actor`'s interaction.
    ///
    /// Returns `Ok(None)` without touching the store when the actor is the
    /// recipient, or when the trigger collapses into an existing unread
    /// notification.
    pub async fn notify(
        &self,
        recipient: i64,
        actor: i64,
        trigger: &Trigger,
        message: Option<&str>,
    ) -> Result<Option<Notification>> {
        if recipient == actor {
            return Ok(None);
        }

        let kind = trigger.kind();
        let entity = trigger.entity();

        if trigger.collapses_repeats() {
            let entity_id = entity.as_ref().map(|(_, id)| id.as_str());
            if let Some(existing) = self
                .db
                .find_unread_notification(recipient, actor, kind, entity_id)
                .await?
            {
                debug!(
                    notification_id = existing.id,
                    recipient,
                    actor,
                    kind = %kind,
                    "Unread notification already exists, not duplicating"
                );
                return Ok(None);
            }
        }

        let mut new = NewNotification::new(recipient, actor, kind, resolve_message(trigger, message))?;
        if let Some(amount) = trigger.amount() {
            new = new.with_amount(amount);
        }
        if let Some((entity_type, entity_id)) = entity {
            new = new.with_entity(entity_type, entity_id);
        }

        let notification = self.db.insert_notification(&new).await?;
        debug!(
            notification_id = notification.id,
            recipient,
            actor,
            kind = %kind,
            "Notification created"
        );

        self.bus
            .publish(Topic::User(recipient), Event::Notification(notification.clone()));
        Ok(Some(notification))
    }

    /// Soft-delete unread notifications matching this trigger. Read ones
    /// are left in place.
    pub async fn retract(&self, recipient: i64, actor: i64, trigger: &Trigger) -> Result<u64> {
        if recipient == actor {
            return Ok(0);
        }
        let entity = trigger.entity();
        let entity_id = entity.as_ref().map(|(_, id)| id.as_str());
        let retracted = self
            .db
            .retract_unread_notifications(recipient, actor, trigger.kind(), entity_id)
            .await?;
        if retracted > 0 {
            debug!(recipient, actor, kind = %trigger.kind(), retracted, "Notification retracted");
        }
        Ok(retracted)
    }

    /// Mark one of `user_id`'s notifications read. Idempotent.
    pub async fn mark_read(&self, user_id: i64, notification_id: i64) -> Result<Notification> {
        let not_found = || InteractionError::not_found(format!("Notification {notification_id}"));

        // Someone else's notification looks exactly like a missing one.
        match self.db.get_notification(notification_id).await? {
            Some(n) if n.user_id == user_id => {}
            _ => return Err(not_found()),
        }

        self.db
            .mark_notification_read(notification_id)
            .await?
            .ok_or_else(not_found)
    }

    /// Mark every unread notification of `user_id` read. Returns how many
    /// flipped; zero on a repeat call.
    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        Ok(self.db.mark_all_notifications_read(user_id).await?)
    }

    /// Newest-first page. `page` is 1-based; `per_page` is clamped to
    /// `1..=MAX_PER_PAGE`.
    pub async fn list(
        &self,
        user_id: i64,
        kind: Option<NotificationKind>,
        page: u32,
        per_page: u32,
    ) -> Result<NotificationPage> {
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let page = page.max(1);
        let filter = NotificationFilter {
            kind,
            limit: per_page,
            offset: (page - 1).saturating_mul(per_page),
        };

        let notifications = self.db.list_notifications(user_id, &filter).await?;
        let unread_count = self.db.unread_count(user_id).await?;
        Ok(NotificationPage {
            notifications,
            unread_count,
        })
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64> {
        Ok(self.db.unread_count(user_id).await?)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDatabase;

    async fn setup() -> (Notifier, EventBus, i64, i64) {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        let bus = EventBus::new();
        (Notifier::new(db, bus.clone()), bus, alice, bob)
    }

    #[tokio::test]
    async fn test_self_notification_suppressed_for_every_kind() {
        let (notifier, _bus, alice, _) = setup().await;
        let triggers = [
            Trigger::Like { post_id: 1 },
            Trigger::Comment {
                post_id: 1,
                comment_id: 1,
            },
            Trigger::Follow,
            Trigger::Repost { post_id: 1 },
            Trigger::Transaction {
                amount: 1.0,
                signature: "sig".into(),
            },
        ];
        for t in &triggers {
            assert!(notifier.notify(alice, alice, t, None).await.unwrap().is_none());
        }
        assert_eq!(notifier.unread_count(alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_notification_message_and_amount() {
        let (notifier, _bus, alice, bob) = setup().await;
        let n = notifier
            .notify(
                alice,
                bob,
                &Trigger::Transaction {
                    amount: 10.5,
                    signature: "5sig".into(),
                },
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.message, "You received 10.50 SOL.");
        assert_eq!(n.amount, Some(10.5));
        assert_eq!(n.entity_id.as_deref(), Some("5sig"));
        assert!(!n.is_read);
    }

    #[tokio::test]
    async fn test_repeat_like_collapses_while_unread() {
        let (notifier, _bus, alice, bob) = setup().await;
        let like = Trigger::Like { post_id: 7 };
        let first = notifier.notify(alice, bob, &like, None).await.unwrap();
        assert!(first.is_some());
        assert!(notifier.notify(alice, bob, &like, None).await.unwrap().is_none());

        notifier.mark_all_read(alice).await.unwrap();
        assert!(notifier.notify(alice, bob, &like, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_comments_never_collapse() {
        let (notifier, _bus, alice, bob) = setup().await;
        for comment_id in [1, 1] {
            let t = Trigger::Comment {
                post_id: 3,
                comment_id,
            };
            assert!(notifier.notify(alice, bob, &t, None).await.unwrap().is_some());
        }
        assert_eq!(notifier.unread_count(alice).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_twice_is_idempotent() {
        let (notifier, _bus, alice, bob) = setup().await;
        let n = notifier
            .notify(alice, bob, &Trigger::Follow, None)
            .await
            .unwrap()
            .unwrap();
        assert!(notifier.mark_read(alice, n.id).await.unwrap().is_read);
        assert!(notifier.mark_read(alice, n.id).await.unwrap().is_read);
        assert_eq!(notifier.unread_count(alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_of_foreign_notification_is_not_found() {
        let (notifier, _bus, alice, bob) = setup().await;
        let n = notifier
            .notify(alice, bob, &Trigger::Follow, None)
            .await
            .unwrap()
            .unwrap();
        let err = notifier.mark_read(bob, n.id).await.unwrap_err();
        assert!(matches!(err, InteractionError::NotFound(_)));
        let err = notifier.mark_read(alice, n.id + 50).await.unwrap_err();
        assert!(matches!(err, InteractionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notify_pushes_on_user_topic() {
        let (notifier, bus, alice, bob) = setup().await;
        let (_sub, mut rx) = bus.subscribe_channel(Topic::User(alice));
        notifier
            .notify(alice, bob, &Trigger::Repost { post_id: 2 }, None)
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            Event::Notification(n) => assert_eq!(n.kind, NotificationKind::Repost),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let (notifier, _bus, alice, bob) = setup().await;
        notifier.notify(alice, bob, &Trigger::Follow, None).await.unwrap();
        for post_id in 1..=3 {
            notifier
                .notify(alice, bob, &Trigger::Like { post_id }, None)
                .await
                .unwrap();
        }

        let likes = notifier
            .list(alice, Some(NotificationKind::Like), 1, 2)
            .await
            .unwrap();
        assert_eq!(likes.notifications.len(), 2);
        assert_eq!(likes.unread_count, 4);
        assert!(likes
            .notifications
            .iter()
            .all(|n| n.kind == NotificationKind::Like));

        let page2 = notifier
            .list(alice, Some(NotificationKind::Like), 2, 2)
            .await
            .unwrap();
        assert_eq!(page2.notifications.len(), 1);

        let all = notifier.list(alice, None, 1, DEFAULT_PER_PAGE).await.unwrap();
        assert_eq!(all.notifications.len(), 4);
        // Newest first.
        assert!(all.notifications[0].id > all.notifications[3].id);
    }

    #[tokio::test]
    async fn test_retract_keeps_read_notifications() {
        let (notifier, _bus, alice, bob) = setup().await;
        let repost = Trigger::Repost { post_id: 9 };
        let n = notifier.notify(alice, bob, &repost, None).await.unwrap().unwrap();
        notifier.mark_read(alice, n.id).await.unwrap();
        assert_eq!(notifier.retract(alice, bob, &repost).await.unwrap(), 0);

        notifier.notify(alice, bob, &repost, None).await.unwrap().unwrap();
        assert_eq!(notifier.retract(alice, bob, &repost).await.unwrap(), 1);

        let page = notifier.list(alice, None, 1, 10).await.unwrap();
        assert_eq!(page.notifications.len(), 1);
        assert!(page.notifications[0].is_read);
    }
}
