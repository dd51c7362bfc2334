// Pulse API seam — the remote service the engine talks to.
//
// The dispatcher and the screen loaders only ever see `PulseApi`. The HTTP
// implementation lives in `client`; tests swap in an in-memory one.

pub mod client;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::{BookmarkState, Comment, ContextData, LikeState, Post, TrendingTopic, UserSummary};

pub use client::HttpPulseApi;

/// Every remote operation the session needs.
///
/// Implementations must be async because every call is an HTTP round trip.
#[async_trait]
pub trait PulseApi: Send + Sync {
    /// Feed posts, newest first.
    async fn list_posts(&self) -> Result<Vec<Post>, ApiError>;

    async fn get_post(&self, post_id: &str) -> Result<Post, ApiError>;

    /// Full-text and entity search, in server order.
    async fn search(&self, query: &str) -> Result<Vec<Post>, ApiError>;

    /// Posts by one author.
    /// Default implementation filters the feed, since the server has no
    /// per-user post listing.
    async fn list_by_user(&self, username: &str) -> Result<Vec<Post>, ApiError> {
        let posts = self.list_posts().await?;
        Ok(posts
            .into_iter()
            .filter(|p| p.author_name == username)
            .collect())
    }

    async fn list_bookmarks(&self) -> Result<Vec<Post>, ApiError>;

    async fn current_user(&self) -> Result<UserSummary, ApiError>;

    async fn get_user(&self, username: &str) -> Result<UserSummary, ApiError>;

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError>;

    async fn trending(&self) -> Result<Vec<TrendingTopic>, ApiError>;

    async fn toggle_like(&self, post_id: &str) -> Result<LikeState, ApiError>;

    async fn toggle_bookmark(&self, post_id: &str) -> Result<BookmarkState, ApiError>;

    async fn follow(&self, user_id: &str) -> Result<(), ApiError>;

    async fn unfollow(&self, user_id: &str) -> Result<(), ApiError>;

    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError>;

    /// Translate arbitrary text. Returns the translated text.
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ApiError>;

    async fn regenerate_context(&self, post_id: &str) -> Result<ContextData, ApiError>;

    async fn create_comment(&self, post_id: &str, content: &str) -> Result<Comment, ApiError>;
}
