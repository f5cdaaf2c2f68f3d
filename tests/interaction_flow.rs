//! End-to-end flows through the client session and the interaction service,
//! embedded in one process over an in-memory SQLite store.
//!
//! The session shares the service's bus, which is what an SSE-connected
//! client sees after `Session::ingest`.

#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use murmur::bus::{CommentEvent, Event, EventBus};
use murmur::client::api::{CommentPage, EventStream, RelationState, SubmittedComment};
use murmur::client::local::LocalApi;
use murmur::client::{InteractionApi, MembershipCache, PostView, PushChannel, Session, ToggleOutcome};
use murmur::db::models::{NotificationKind, Post, PostCounts, RelationKind};
use murmur::db::sqlite::SqliteDatabase;
use murmur::db::Database;
use murmur::error::{InteractionError, Result};
use murmur::interactions::InteractionService;

struct World {
    db: Arc<dyn Database>,
    service: InteractionService,
    alice: i64,
    bob: i64,
    post: Post,
}

async fn world() -> World {
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
    let alice = db.create_user("alice").await.unwrap();
    let bob = db.create_user("bob").await.unwrap();
    let post = db.create_post(alice, "gm everyone").await.unwrap();
    let service = InteractionService::new(db.clone(), murmur::bus::EventBus::new());
    World {
        db,
        service,
        alice,
        bob,
        post,
    }
}

fn session_for(world: &World, user_id: i64, debounce: Duration) -> Session {
    Session::new(
        Arc::new(LocalApi::new(world.service.clone(), user_id)),
        MembershipCache::in_memory(),
        world.service.bus().clone(),
        debounce,
    )
}

#[tokio::test]
async fn like_toggle_updates_every_view_of_the_post() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);

    let view = PostView::open(&bob, w.post.clone()).await.unwrap();
    let second_view = PostView::open(&bob, w.post.clone()).await.unwrap();

    let outcome = view.toggle_like().await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Applied { active: true, count: 1 });

    for v in [&view, &second_view] {
        let snap = v.snapshot();
        assert_eq!(snap.likes, 1);
        assert!(snap.liked);
    }

    view.toggle_like().await.unwrap();
    assert_eq!(second_view.snapshot().likes, 0);
    assert!(!second_view.snapshot().liked);
}

#[tokio::test]
async fn debounced_second_tap_yields_one_flip() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::from_secs(60));
    let view = PostView::open(&bob, w.post.clone()).await.unwrap();

    let first = view.toggle_like().await.unwrap();
    let second = view.toggle_like().await.unwrap();
    assert!(matches!(first, ToggleOutcome::Applied { active: true, .. }));
    assert_eq!(second, ToggleOutcome::Debounced { active: true });

    assert_eq!(w.db.post_counts(w.post.id).await.unwrap().unwrap().likes, 1);
    assert_eq!(w.service.notifier().unread_count(w.alice).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_likes_from_two_users_both_count() {
    let w = world().await;
    let carol = w.db.create_user("carol").await.unwrap();

    let (a, b) = tokio::join!(w.service.like(w.bob, w.post.id), w.service.like(carol, w.post.id));
    a.unwrap();
    b.unwrap();
    assert_eq!(w.service.counts(w.post.id).await.unwrap().likes, 2);
}

#[tokio::test]
async fn toggling_a_repost_id_twice_undoes_the_like() {
    let w = world().await;
    let repost = w.service.repost(w.alice, w.post.id).await.unwrap().repost.unwrap();
    let bob = session_for(&w, w.bob, Duration::ZERO);

    let first = bob.toggle(RelationKind::Like, repost.id).await.unwrap();
    assert_eq!(first, ToggleOutcome::Applied { active: true, count: 1 });
    assert!(bob.memberships().has(RelationKind::Like, w.post.id));

    let second = bob.toggle(RelationKind::Like, repost.id).await.unwrap();
    assert_eq!(second, ToggleOutcome::Applied { active: false, count: 0 });
    assert!(!bob.memberships().has(RelationKind::Like, w.post.id));
    assert_eq!(w.service.counts(w.post.id).await.unwrap().likes, 0);
}

#[tokio::test]
async fn comment_from_repost_view_reaches_original_view() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);

    let repost = w.service.repost(w.bob, w.post.id).await.unwrap().repost.unwrap();
    let original_view = PostView::open(&bob, w.post.clone()).await.unwrap();
    let repost_view = PostView::open(&bob, repost.clone()).await.unwrap();
    assert_eq!(repost_view.canonical_id(), w.post.id);

    let comment = repost_view.submit_comment("love this").await.unwrap();
    assert_eq!(comment.post_id, w.post.id);

    assert_eq!(original_view.snapshot().comments, 1);
    assert_eq!(repost_view.snapshot().comments, 1);
    assert_eq!(w.db.get_post(w.post.id).await.unwrap().unwrap().comment_count, 1);
    assert_eq!(w.db.get_post(repost.id).await.unwrap().unwrap().comment_count, 0);
}

#[tokio::test]
async fn duplicate_new_comment_push_is_dropped() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);
    let view = PostView::open(&bob, w.post.clone()).await.unwrap();

    let event = Event::NewComment(CommentEvent {
        post_id: w.post.id,
        id: 991,
        author: "carol".into(),
        content: "first!".into(),
        created_at: "2026-01-01T00:00:00.000Z".into(),
    });
    bob.ingest(event.clone());
    bob.ingest(event);
    assert_eq!(view.snapshot().comments, 1);
}

#[tokio::test]
async fn empty_comment_rejected_without_request() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);
    let view = PostView::open(&bob, w.post.clone()).await.unwrap();

    let err = view.submit_comment(" \n\t ").await.unwrap_err();
    assert!(matches!(err, InteractionError::Validation(_)));
    assert_eq!(view.snapshot().comments, 0);
    assert!(w.service.list_comments(w.post.id).await.unwrap().comments.is_empty());
}

#[tokio::test]
async fn repost_then_unrepost_restores_count() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);
    let view = PostView::open(&bob, w.post.clone()).await.unwrap();

    assert!(view.toggle_repost().await.unwrap().active());
    assert_eq!(view.snapshot().retweets, 1);
    let listed = w.db.list_posts(10).await.unwrap();
    assert_eq!(listed.iter().filter(|p| p.is_repost()).count(), 1);

    assert!(!view.toggle_repost().await.unwrap().active());
    assert_eq!(view.snapshot().retweets, 0);
    let listed = w.db.list_posts(10).await.unwrap();
    assert!(listed.iter().all(|p| !p.is_repost()));
}

#[tokio::test]
async fn self_interactions_never_notify() {
    let w = world().await;
    w.service.like(w.alice, w.post.id).await.unwrap();
    w.service.repost(w.alice, w.post.id).await.unwrap();
    w.service.add_comment(w.alice, w.post.id, "replying to myself").await.unwrap();
    w.service
        .record_transaction(w.alice, w.alice, 1.0, "self-sig")
        .await
        .unwrap();
    assert_eq!(w.service.notifier().unread_count(w.alice).await.unwrap(), 0);
}

#[tokio::test]
async fn notification_lifecycle() {
    let w = world().await;
    w.service.like(w.bob, w.post.id).await.unwrap();
    w.service.follow(w.bob, w.alice).await.unwrap();
    w.service
        .record_transaction(w.bob, w.alice, 10.5, "5txSig")
        .await
        .unwrap();

    let page = w.service.notifier().list(w.alice, None, 1, 20).await.unwrap();
    assert_eq!(page.unread_count, 3);
    assert_eq!(page.notifications[0].kind, NotificationKind::Transaction);
    assert_eq!(page.notifications[0].message, "You received 10.50 SOL.");

    let like = page
        .notifications
        .iter()
        .find(|n| n.kind == NotificationKind::Like)
        .unwrap();
    w.service.notifier().mark_read(w.alice, like.id).await.unwrap();
    w.service.notifier().mark_read(w.alice, like.id).await.unwrap();
    assert_eq!(w.service.notifier().unread_count(w.alice).await.unwrap(), 2);

    assert_eq!(w.service.notifier().mark_all_read(w.alice).await.unwrap(), 2);
    assert_eq!(w.service.notifier().mark_all_read(w.alice).await.unwrap(), 0);
}

#[tokio::test]
async fn membership_cache_rebuilds_from_server() {
    let w = world().await;
    w.service.like(w.bob, w.post.id).await.unwrap();

    let bob = session_for(&w, w.bob, Duration::ZERO);
    assert!(!bob.memberships().has(RelationKind::Like, w.post.id));
    bob.sync_memberships().await.unwrap();
    assert!(bob.memberships().has(RelationKind::Like, w.post.id));
}

#[tokio::test]
async fn dropped_view_stops_listening() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);
    let topic = murmur::bus::Topic::Post(w.post.id);

    let view = PostView::open(&bob, w.post.clone()).await.unwrap();
    assert!(view.is_live());
    assert_eq!(bob.bus().subscriber_count(topic), 1);
    drop(view);
    assert_eq!(bob.bus().subscriber_count(topic), 0);
}

/// LocalApi plus a push channel fed by the test, standing in for a
/// remote server's SSE stream.
struct PushedApi {
    inner: LocalApi,
    feed: Mutex<Option<mpsc::UnboundedReceiver<Result<Event>>>>,
    opened: Mutex<Vec<PushChannel>>,
}

#[async_trait]
impl InteractionApi for PushedApi {
    async fn set_relation(&self, kind: RelationKind, post_id: i64, active: bool) -> Result<RelationState> {
        self.inner.set_relation(kind, post_id, active).await
    }
    async fn post_counts(&self, post_id: i64) -> Result<PostCounts> {
        self.inner.post_counts(post_id).await
    }
    async fn submit_comment(&self, post_id: i64, content: &str) -> Result<SubmittedComment> {
        self.inner.submit_comment(post_id, content).await
    }
    async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        self.inner.delete_comment(comment_id).await
    }
    async fn list_comments(&self, post_id: i64) -> Result<CommentPage> {
        self.inner.list_comments(post_id).await
    }
    async fn relations(&self, kind: RelationKind) -> Result<Vec<i64>> {
        self.inner.relations(kind).await
    }
    fn push_events(&self, channel: PushChannel) -> Option<EventStream> {
        self.opened.lock().unwrap().push(channel);
        let rx = self.feed.lock().unwrap().take()?;
        Some(
            futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) })
                .boxed(),
        )
    }
}

fn comment_event(post_id: i64, id: i64) -> Event {
    Event::NewComment(CommentEvent {
        post_id,
        id,
        author: "carol".into(),
        content: "hi".into(),
        created_at: "2026-01-01T00:00:00.000Z".into(),
    })
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn remote_push_reaches_view_and_stops_with_it() {
    let w = world().await;
    let (tx, rx) = mpsc::unbounded_channel();
    let api = Arc::new(PushedApi {
        inner: LocalApi::new(w.service.clone(), w.bob),
        feed: Mutex::new(Some(rx)),
        opened: Mutex::new(Vec::new()),
    });
    // A bus of its own: events only arrive through the push channel.
    let bob = Session::new(api.clone(), MembershipCache::in_memory(), EventBus::new(), Duration::ZERO);

    let view = PostView::open(&bob, w.post.clone()).await.unwrap();
    assert!(view.is_live());
    assert_eq!(*api.opened.lock().unwrap(), vec![PushChannel::Post(w.post.id)]);

    tx.send(Ok(comment_event(w.post.id, 41))).unwrap();
    wait_for(|| view.snapshot().comments == 1).await;

    drop(view);
    wait_for(|| tx.is_closed()).await;
}

#[tokio::test]
async fn counter_push_ahead_of_comment_push_counts_once() {
    let w = world().await;
    let bob = session_for(&w, w.bob, Duration::ZERO);
    let view = PostView::open(&bob, w.post.clone()).await.unwrap();

    bob.ingest(comment_event(w.post.id, 1));
    bob.ingest(Event::Counters(PostCounts {
        post_id: w.post.id,
        likes: 0,
        retweets: 0,
        comments: 2,
    }));
    bob.ingest(comment_event(w.post.id, 2));
    assert_eq!(view.snapshot().comments, 2);
}
