// Comment count aggregator: one per open view of a post.
//
// Starts from the server's stored counter plus the ids already listed, then
// folds in live push deltas. Adds and deletes are idempotent by comment id,
// so at-least-once delivery and the echo of our own submit never double
// count. A submit in flight is shown as pending until it commits or rolls
// back.
//
// Absolute `counters` values can run ahead of the id-keyed pushes: a
// counter read after comment N committed may arrive before N's own
// `new-comment`. The gap between the absolute value and what the id events
// explain is kept in `unexplained`, and later id events settle it instead
// of moving the count a second time.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct CommentAggregator {
    post_id: i64,
    count: i64,
    known: HashSet<i64>,
    deleted: HashSet<i64>,
    pending: i64,
    /// Adds (positive) or deletes (negative) already in `count` through a
    /// counter event whose id event has not arrived yet.
    unexplained: i64,
}

impl CommentAggregator {
    /// `post_id` is the canonical post; `count` is the stored counter and
    /// `ids` the comments already fetched.
    pub fn new(post_id: i64, count: i64, ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            post_id,
            count: count.max(0),
            known: ids.into_iter().collect(),
            deleted: HashSet::new(),
            pending: 0,
            unexplained: 0,
        }
    }

    pub fn post_id(&self) -> i64 {
        self.post_id
    }

    /// Count to render: confirmed plus in-flight submits.
    pub fn displayed(&self) -> i64 {
        self.count + self.pending
    }

    pub fn confirmed(&self) -> i64 {
        self.count
    }

    pub fn knows(&self, comment_id: i64) -> bool {
        self.known.contains(&comment_id) && !self.deleted.contains(&comment_id)
    }

    /// A new comment pushed (or returned by our own submit). Returns true
    /// if it changed the count.
    pub fn apply_new(&mut self, comment_id: i64) -> bool {
        if self.deleted.contains(&comment_id) || !self.known.insert(comment_id) {
            return false;
        }
        if self.unexplained > 0 {
            self.unexplained -= 1;
            return false;
        }
        self.count += 1;
        true
    }

    /// A deletion pushed. Returns true if it changed the count.
    pub fn apply_deleted(&mut self, comment_id: i64) -> bool {
        if !self.deleted.insert(comment_id) {
            return false;
        }
        self.known.remove(&comment_id);
        if self.unexplained < 0 {
            self.unexplained += 1;
            return false;
        }
        self.count = (self.count - 1).max(0);
        true
    }

    /// Authoritative counter from a `counters` event.
    pub fn apply_counter(&mut self, count: i64) {
        let count = count.max(0);
        self.unexplained += count - self.count;
        self.count = count;
    }

    pub fn begin_submit(&mut self) {
        self.pending += 1;
    }

    /// The server accepted our comment.
    pub fn commit_submit(&mut self, comment_id: i64) {
        self.pending = (self.pending - 1).max(0);
        self.apply_new(comment_id);
    }

    pub fn rollback_submit(&mut self) {
        self.pending = (self.pending - 1).max(0);
    }
}
