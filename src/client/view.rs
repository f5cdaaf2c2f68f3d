// PostView: one rendered post (original or repost) on the client.
//
// A view always aggregates against the canonical post: its subscription,
// its counters and its comment submissions all target the original. Two
// views of the same original (say, the post and a repost of it in one
// feed) therefore converge on the same numbers. Dropping the view drops
// its bus subscription and closes its server push channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::api::PushChannel;
use super::comments::CommentAggregator;
use super::toggle::ToggleOutcome;
use super::{PushTask, Session};
use crate::bus::{Event, Subscription, Topic};
use crate::db::models::{Comment, Post, PostCounts, RelationKind};
use crate::error::{InteractionError, Result};

struct ViewState {
    counts: PostCounts,
    comments: CommentAggregator,
}

/// What a renderer needs, captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub post_id: i64,
    pub canonical_id: i64,
    pub likes: i64,
    pub retweets: i64,
    pub comments: i64,
    pub liked: bool,
    pub retweeted: bool,
}

pub struct PostView {
    session: Session,
    post: Post,
    state: Arc<Mutex<ViewState>>,
    subscription: Subscription,
    /// Server push for the canonical post, when the API has one.
    push: Option<PushTask>,
}

fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PostView {
    /// Fetch the canonical post's counts and comments, then subscribe.
    pub async fn open(session: &Session, post: Post) -> Result<Self> {
        let canonical = post.canonical_id();
        let page = session.api().list_comments(canonical).await?;
        let counts = session.api().post_counts(canonical).await?;
        Ok(Self::from_parts(
            session,
            post,
            counts,
            page.comments.iter().map(|c| c.id),
        ))
    }

    /// Build a view from data the caller already fetched.
    pub fn from_parts(
        session: &Session,
        post: Post,
        counts: PostCounts,
        comment_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        let canonical = post.canonical_id();
        session.remember_post(&post);
        let state = Arc::new(Mutex::new(ViewState {
            counts,
            comments: CommentAggregator::new(canonical, counts.comments, comment_ids),
        }));

        let handler_state = state.clone();
        let subscription = session
            .bus()
            .subscribe(Topic::Post(canonical), move |event| {
                let mut state = lock(&handler_state);
                match event {
                    Event::NewComment(c) => {
                        state.comments.apply_new(c.id);
                    }
                    Event::CommentDeleted(c) => {
                        state.comments.apply_deleted(c.id);
                    }
                    Event::Counters(c) => {
                        state.counts.likes = c.likes;
                        state.counts.retweets = c.retweets;
                        state.comments.apply_counter(c.comments);
                    }
                    Event::Notification(_) => {}
                }
            });

        Self {
            session: session.clone(),
            post,
            state,
            subscription,
            push: session.listen(PushChannel::Post(canonical)),
        }
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn canonical_id(&self) -> i64 {
        self.post.canonical_id()
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_active() && self.push.as_ref().map_or(true, PushTask::is_running)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let canonical = self.canonical_id();
        let state = lock(&self.state);
        let cache = self.session.memberships();
        ViewSnapshot {
            post_id: self.post.id,
            canonical_id: canonical,
            likes: state.counts.likes,
            retweets: state.counts.retweets,
            comments: state.comments.displayed(),
            liked: cache.has(RelationKind::Like, canonical),
            retweeted: cache.has(RelationKind::Repost, canonical),
        }
    }

    pub async fn toggle_like(&self) -> Result<ToggleOutcome> {
        self.toggle(RelationKind::Like).await
    }

    pub async fn toggle_repost(&self) -> Result<ToggleOutcome> {
        self.toggle(RelationKind::Repost).await
    }

    async fn toggle(&self, kind: RelationKind) -> Result<ToggleOutcome> {
        let outcome = self.session.toggle(kind, self.canonical_id()).await?;
        if let ToggleOutcome::Applied { count, .. } = outcome {
            lock(&self.state).counts.set(kind.counter(), count);
        }
        Ok(outcome)
    }

    /// Submit a comment to the canonical post. Blank content is rejected
    /// before any request is made.
    pub async fn submit_comment(&self, content: &str) -> Result<Comment> {
        if content.trim().is_empty() {
            return Err(InteractionError::validation("Comment cannot be empty"));
        }

        lock(&self.state).comments.begin_submit();
        match self
            .session
            .api()
            .submit_comment(self.canonical_id(), content)
            .await
        {
            Ok(submitted) => {
                lock(&self.state).comments.commit_submit(submitted.comment.id);
                Ok(submitted.comment)
            }
            Err(e) => {
                lock(&self.state).comments.rollback_submit();
                Err(e)
            }
        }
    }

    pub async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        self.session.api().delete_comment(comment_id).await?;
        lock(&self.state).comments.apply_deleted(comment_id);
        Ok(())
    }
}
