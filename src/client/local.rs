// LocalApi: InteractionApi straight into an in-process InteractionService.

use async_trait::async_trait;

use super::api::{CommentPage, InteractionApi, RelationState, SubmittedComment};
use crate::db::models::{PostCounts, RelationKind};
use crate::error::Result;
use crate::interactions::InteractionService;

pub struct LocalApi {
    service: InteractionService,
    user_id: i64,
}

impl LocalApi {
    pub fn new(service: InteractionService, user_id: i64) -> Self {
        Self { service, user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

#[async_trait]
impl InteractionApi for LocalApi {
    async fn set_relation(
        &self,
        kind: RelationKind,
        post_id: i64,
        active: bool,
    ) -> Result<RelationState> {
        let out = self
            .service
            .set_relation(kind, self.user_id, post_id, active)
            .await?;
        Ok(RelationState {
            post_id: out.post_id,
            active: out.active,
            count: out.count,
        })
    }

    async fn post_counts(&self, post_id: i64) -> Result<PostCounts> {
        self.service.counts(post_id).await
    }

    async fn submit_comment(&self, post_id: i64, content: &str) -> Result<SubmittedComment> {
        let out = self.service.add_comment(self.user_id, post_id, content).await?;
        Ok(SubmittedComment {
            comment: out.comment,
            count: out.count,
        })
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        self.service.delete_comment(self.user_id, comment_id).await?;
        Ok(())
    }

    async fn list_comments(&self, post_id: i64) -> Result<CommentPage> {
        let list = self.service.list_comments(post_id).await?;
        Ok(CommentPage {
            post_id: list.post_id,
            comments: list.comments,
            count: list.count,
        })
    }

    async fn relations(&self, kind: RelationKind) -> Result<Vec<i64>> {
        self.service.relations(self.user_id, kind).await
    }
}
