// Pulse HTTP client — bearer-authenticated JSON over reqwest.
//
// A thin wrapper with generic send helpers. Every non-success status is
// mapped onto `ApiError` so the resolver can tell a rejection from an
// unreachable server; nothing here retries.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PulseApi;
use crate::error::ApiError;
use crate::model::{BookmarkState, Comment, ContextData, LikeState, Post, TrendingTopic, UserSummary};

pub struct HttpPulseApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPulseApi {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// Without a token only the public read endpoints will succeed.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pulse/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, "Pulse API request");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Unreachable(e.to_string()))?;
        decode(status, &bytes)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.send(builder).await.map(|_| ())
    }
}

/// Decode a success body. A body we cannot read counts as a rejection: the
/// server answered, just not with what we asked for.
fn decode<T: DeserializeOwned>(status: u16, bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::Rejected {
        status,
        detail: format!("malformed response: {e}"),
    })
}

#[async_trait]
impl PulseApi for HttpPulseApi {
    async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.send_json(self.request(Method::GET, "/posts/")).await
    }

    async fn get_post(&self, post_id: &str) -> Result<Post, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/posts/{post_id}")))
            .await
    }

    async fn search(&self, query: &str) -> Result<Vec<Post>, ApiError> {
        let resp: SearchResponse = self
            .send_json(self.request(Method::GET, "/search/").query(&[("q", query)]))
            .await?;
        Ok(resp.results)
    }

    async fn list_bookmarks(&self) -> Result<Vec<Post>, ApiError> {
        let resp: BookmarksResponse = self
            .send_json(self.request(Method::GET, "/bookmarks/"))
            .await?;
        Ok(resp.bookmarks)
    }

    async fn current_user(&self) -> Result<UserSummary, ApiError> {
        self.send_json(self.request(Method::GET, "/users/me")).await
    }

    async fn get_user(&self, username: &str) -> Result<UserSummary, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/users/{username}")))
            .await
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/comments/{post_id}")))
            .await
    }

    async fn trending(&self) -> Result<Vec<TrendingTopic>, ApiError> {
        self.send_json(self.request(Method::GET, "/trending/")).await
    }

    async fn toggle_like(&self, post_id: &str) -> Result<LikeState, ApiError> {
        self.send_json(self.request(Method::POST, &format!("/likes/{post_id}")))
            .await
    }

    async fn toggle_bookmark(&self, post_id: &str) -> Result<BookmarkState, ApiError> {
        self.send_json(self.request(Method::POST, &format!("/bookmarks/{post_id}")))
            .await
    }

    async fn follow(&self, user_id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, &format!("/follow/{user_id}")))
            .await
    }

    async fn unfollow(&self, user_id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("/follow/{user_id}")))
            .await
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("/posts/{post_id}")))
            .await
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ApiError> {
        let resp: TranslateResponse = self
            .send_json(
                self.request(Method::POST, "/translate/")
                    .json(&TranslateRequest { text, target_lang }),
            )
            .await?;
        Ok(resp.translated_text)
    }

    async fn regenerate_context(&self, post_id: &str) -> Result<ContextData, ApiError> {
        let resp: RegenerateResponse = self
            .send_json(self.request(
                Method::POST,
                &format!("/posts/{post_id}/regenerate-context"),
            ))
            .await?;
        Ok(resp.context_data)
    }

    async fn create_comment(&self, post_id: &str, content: &str) -> Result<Comment, ApiError> {
        let created: Comment = self
            .send_json(
                self.request(Method::POST, &format!("/comments/{post_id}"))
                    .json(&CommentRequest { content }),
            )
            .await?;
        Ok(created)
    }
}

// --- Wire types ---

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Post>,
}

#[derive(Deserialize)]
struct BookmarksResponse {
    #[serde(default)]
    bookmarks: Vec<Post>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Deserialize)]
struct RegenerateResponse {
    #[serde(default)]
    context_data: ContextData,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let api = HttpPulseApi::new("http://localhost:8000/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url, "http://localhost:8000/api");
    }

    #[test]
    fn decodes_like_response() {
        let state: LikeState = decode(200, br#"{"liked": true, "likes": 5}"#).unwrap();
        assert_eq!(state, LikeState { liked: true, likes: 5 });
    }

    #[test]
    fn decodes_bookmarks_envelope() {
        let resp: BookmarksResponse = decode(
            200,
            br#"{"count": 1, "bookmarks": [{"_id": "p1", "content": "hi", "is_bookmarked": true}]}"#,
        )
        .unwrap();
        assert_eq!(resp.bookmarks.len(), 1);
        assert!(resp.bookmarks[0].bookmarked);
    }

    #[test]
    fn decodes_created_comment() {
        let comment: Comment = decode(
            200,
            br#"{"message": "Comment added", "_id": "c9", "username": "asha", "content": "Agreed", "created_at": "2024-05-01T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(comment.id, "c9");
        assert!(!comment.pending);
    }

    #[test]
    fn malformed_body_is_a_rejection() {
        let err = decode::<LikeState>(200, b"<html>oops</html>").unwrap_err();
        match err {
            ApiError::Rejected { status, detail } => {
                assert_eq!(status, 200);
                assert!(detail.starts_with("malformed response"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn translate_request_uses_server_field_names() {
        let body = serde_json::to_value(TranslateRequest {
            text: "hola",
            target_lang: "en",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"text": "hola", "target_lang": "en"}));
    }
}
