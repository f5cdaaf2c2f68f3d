// HttpApi: InteractionApi over the REST surface.
//
// A thin reqwest wrapper with one request helper, in the same shape as the
// server's own outbound clients. Transport failures become Transient so the
// toggle controller rolls back and offers a retry; HTTP error statuses map
// back onto the InteractionError variant the server produced.
//
// Push channels are long-lived SSE responses read with `bytes_stream`, on a
// second client without the overall request timeout.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api::{
    CommentPage, EventStream, InteractionApi, PushChannel, RelationState, SubmittedComment,
};
use super::sse::SseDecoder;
use crate::bus::Event;
use crate::db::models::{PostCounts, RelationKind};
use crate::error::{InteractionError, Result};

/// Default server address for the client.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

pub struct HttpApi {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationsBody {
    post_ids: Vec<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewCommentBody<'a> {
    post_id: i64,
    content: &'a str,
}

fn relation_path(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Like => "like",
        RelationKind::Repost => "retweet",
    }
}

impl HttpApi {
    /// `token` is a session token minted by the server (`murmur token`).
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("murmur/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        let stream_client = reqwest::Client::builder()
            .user_agent(concat!("murmur/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build streaming HTTP client")?;

        Ok(Self {
            client,
            stream_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn send<B, T>(&self, method: Method, path: &str, query: &[(&str, String)], body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, path, "API request");

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InteractionError::Transient(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(error_for_status(status, message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| InteractionError::Transient(format!("{path}: malformed response: {e}")))
    }
}

/// Decode an SSE body into bus events. Frames with unknown names are
/// skipped; a malformed payload is logged and dropped.
fn decode_events<S, B>(body: S) -> impl Stream<Item = Result<Event>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = Some((body, SseDecoder::default(), VecDeque::new()));
    stream::unfold(state, |state| async move {
        let (mut body, mut decoder, mut ready) = state?;
        loop {
            if let Some(event) = ready.pop_front() {
                return Some((Ok(event), Some((body, decoder, ready))));
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(chunk.as_ref()) {
                        match Event::decode(&frame.event, &frame.data) {
                            Ok(Some(event)) => ready.push_back(event),
                            Ok(None) => {}
                            Err(e) => debug!(event = %frame.event, error = %e, "Dropping malformed push event"),
                        }
                    }
                }
                Some(Err(e)) => {
                    let err = InteractionError::Transient(format!("push channel: {e}"));
                    return Some((Err(err), None));
                }
                None => return None,
            }
        }
    })
}

/// Map an HTTP error status back to the error the server raised.
fn error_for_status(status: StatusCode, message: String) -> InteractionError {
    match status {
        StatusCode::NOT_FOUND => InteractionError::NotFound(message),
        StatusCode::CONFLICT => InteractionError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            InteractionError::Validation(message)
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => InteractionError::Forbidden(message),
        StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::BAD_GATEWAY
        | StatusCode::GATEWAY_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => InteractionError::Transient(message),
        _ => InteractionError::Storage(anyhow::anyhow!("server returned {status}: {message}")),
    }
}

#[async_trait]
impl InteractionApi for HttpApi {
    async fn set_relation(
        &self,
        kind: RelationKind,
        post_id: i64,
        active: bool,
    ) -> Result<RelationState> {
        let method = if active { Method::POST } else { Method::DELETE };
        let path = format!("/api/posts/{post_id}/{}", relation_path(kind));
        self.send::<(), _>(method, &path, &[], None).await
    }

    async fn post_counts(&self, post_id: i64) -> Result<PostCounts> {
        self.send::<(), _>(Method::GET, &format!("/api/posts/{post_id}/counts"), &[], None)
            .await
    }

    async fn submit_comment(&self, post_id: i64, content: &str) -> Result<SubmittedComment> {
        let body = NewCommentBody { post_id, content };
        self.send(Method::POST, "/api/comments", &[], Some(&body)).await
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        let _: serde_json::Value = self
            .send::<(), _>(Method::DELETE, &format!("/api/comments/{comment_id}"), &[], None)
            .await?;
        Ok(())
    }

    async fn list_comments(&self, post_id: i64) -> Result<CommentPage> {
        self.send::<(), _>(
            Method::GET,
            "/api/comments",
            &[("postId", post_id.to_string())],
            None,
        )
        .await
    }

    async fn relations(&self, kind: RelationKind) -> Result<Vec<i64>> {
        let body: RelationsBody = self
            .send::<(), _>(
                Method::GET,
                "/api/me/relations",
                &[("kind", kind.as_str().to_string())],
                None,
            )
            .await?;
        Ok(body.post_ids)
    }

    fn push_events(&self, channel: PushChannel) -> Option<EventStream> {
        let path = match channel {
            PushChannel::Post(post_id) => format!("/api/posts/{post_id}/events"),
            PushChannel::Notifications => "/api/notifications/stream".to_string(),
        };
        let request = self
            .stream_client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "text/event-stream");

        let opened = async move {
            let response = request
                .send()
                .await
                .map_err(|e| InteractionError::Transient(format!("{path}: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                let message = response
                    .json::<ErrorBody>()
                    .await
                    .map(|b| b.error)
                    .unwrap_or_else(|_| status.to_string());
                return Err(error_for_status(status, message));
            }
            debug!(path, "Push channel open");
            Ok(decode_events(Box::pin(response.bytes_stream())))
        };
        Some(stream::once(opened).try_flatten().boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, "Post 1 not found".into()),
            InteractionError::NotFound(_)
        ));
        assert!(error_for_status(StatusCode::SERVICE_UNAVAILABLE, "down".into()).is_retryable());
        assert!(error_for_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()).is_retryable());
        assert!(!error_for_status(StatusCode::BAD_REQUEST, "empty".into()).is_retryable());
    }

    #[test]
    fn test_relation_state_accepts_both_wire_shapes() {
        let like: RelationState =
            serde_json::from_str(r#"{"likes":3,"liked":true,"postId":9}"#).unwrap();
        assert_eq!(
            like,
            RelationState {
                post_id: 9,
                active: true,
                count: 3
            }
        );

        let retweet: RelationState = serde_json::from_str(
            r#"{"retweets":0,"retweeted":false,"postId":9,"retweetData":null}"#,
        )
        .unwrap();
        assert!(!retweet.active);
        assert_eq!(retweet.count, 0);
    }

    #[tokio::test]
    async fn test_decode_events_from_chunks() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b": keep-alive\n\nevent: comment-deleted\ndata: {\"postId\":2,".to_vec()),
            Ok(b"\"id\":5}\n\nevent: typing\ndata: {}\n\n".to_vec()),
            Ok(b"event: counters\ndata: not json\n\n".to_vec()),
        ];
        let events: Vec<_> = decode_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        let event = events.into_iter().next().unwrap().unwrap();
        assert_eq!(event.name(), "comment-deleted");
        assert_eq!(event.topic(), crate::bus::Topic::Post(2));
    }

    #[tokio::test]
    async fn test_unreachable_push_channel_is_transient() {
        let api = HttpApi::new("http://127.0.0.1:9", "token").unwrap();
        let mut events = api.push_events(PushChannel::Notifications).unwrap();
        let first = events.next().await.unwrap();
        assert!(matches!(first, Err(InteractionError::Transient(_))));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) on localhost is closed in test environments.
        let api = HttpApi::new("http://127.0.0.1:9", "token").unwrap();
        let err = api.post_counts(1).await.unwrap_err();
        assert!(matches!(err, InteractionError::Transient(_)));
    }
}
