// Scripted in-memory Pulse API shared by the integration tests.
//
// Holds a tiny server-side copy of the feed so toggles return realistic
// authoritative values. Every call yields once before answering, so two
// dispatches joined on one task interleave the way rapid taps would. A
// test can also hold every mutation at a gate until it has inspected the
// optimistic state.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use pulse::api::PulseApi;
use pulse::error::ApiError;
use pulse::model::{
    BookmarkState, Comment, ContextData, LikeState, Post, TrendingTopic, UserSummary,
};
use pulse::mutation::DispatcherSettings;
use pulse::session::Session;

#[derive(Default)]
pub struct Calls {
    pub list_posts: AtomicUsize,
    pub search: AtomicUsize,
    pub like: AtomicUsize,
    pub bookmark: AtomicUsize,
    pub follow: AtomicUsize,
    pub unfollow: AtomicUsize,
    pub delete: AtomicUsize,
    pub translate: AtomicUsize,
    pub context: AtomicUsize,
    pub comment: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct ScriptedApi {
    pub calls: Calls,
    /// Server-side posts, newest first.
    pub feed: Mutex<Vec<Post>>,
    pub users: Mutex<Vec<UserSummary>>,
    pub me: Mutex<Option<UserSummary>>,
    pub comments: Mutex<Vec<Comment>>,
    pub trending: Mutex<Vec<TrendingTopic>>,
    /// Served by `search` instead of filtering the feed when set.
    pub search_results: Mutex<Option<Vec<Post>>>,
    /// Overrides the computed like toggle result.
    pub like_state: Mutex<Option<LikeState>>,
    /// Every mutation fails with this error when set.
    pub failure: Mutex<Option<ApiError>>,
    pub translation: Mutex<String>,
    pub context: Mutex<ContextData>,
    /// When set, mutations wait for a permit before answering.
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedApi {
    pub fn with_feed(posts: Vec<Post>) -> Arc<Self> {
        let api = Self::default();
        *api.feed.lock().unwrap() = posts;
        *api.translation.lock().unwrap() = "translated text".to_string();
        Arc::new(api)
    }

    pub fn fail_with(&self, err: ApiError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Install a gate and return it. Call `notify_one` to let one pending
    /// mutation answer.
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn mutation(&self, counter: &AtomicUsize) -> Result<(), ApiError> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn find_user(&self, username: &str) -> Option<UserSummary> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }
}

#[async_trait]
impl PulseApi for ScriptedApi {
    async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.calls.list_posts.fetch_add(1, Ordering::SeqCst);
        Ok(self.feed.lock().unwrap().clone())
    }

    async fn get_post(&self, post_id: &str) -> Result<Post, ApiError> {
        self.feed
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
            .ok_or_else(|| ApiError::Rejected {
                status: 404,
                detail: "Post not found".to_string(),
            })
    }

    async fn search(&self, query: &str) -> Result<Vec<Post>, ApiError> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        if let Some(results) = self.search_results.lock().unwrap().clone() {
            return Ok(results);
        }
        Ok(self
            .feed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.content.contains(query))
            .cloned()
            .collect())
    }

    async fn list_bookmarks(&self) -> Result<Vec<Post>, ApiError> {
        Ok(self
            .feed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.bookmarked)
            .cloned()
            .collect())
    }

    async fn current_user(&self) -> Result<UserSummary, ApiError> {
        self.me.lock().unwrap().clone().ok_or(ApiError::SessionExpired)
    }

    async fn get_user(&self, username: &str) -> Result<UserSummary, ApiError> {
        self.find_user(username).ok_or_else(|| ApiError::Rejected {
            status: 404,
            detail: "User not found".to_string(),
        })
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.post_id.as_deref() == Some(post_id))
            .cloned()
            .collect())
    }

    async fn trending(&self) -> Result<Vec<TrendingTopic>, ApiError> {
        Ok(self.trending.lock().unwrap().clone())
    }

    async fn toggle_like(&self, post_id: &str) -> Result<LikeState, ApiError> {
        self.mutation(&self.calls.like).await?;
        if let Some(state) = *self.like_state.lock().unwrap() {
            return Ok(state);
        }
        let mut feed = self.feed.lock().unwrap();
        let post = feed
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or(ApiError::Rejected {
                status: 404,
                detail: "Post not found".to_string(),
            })?;
        post.liked = !post.liked;
        post.likes += if post.liked { 1 } else { -1 };
        Ok(LikeState {
            liked: post.liked,
            likes: post.likes,
        })
    }

    async fn toggle_bookmark(&self, post_id: &str) -> Result<BookmarkState, ApiError> {
        self.mutation(&self.calls.bookmark).await?;
        let mut feed = self.feed.lock().unwrap();
        let post = feed
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or(ApiError::Rejected {
                status: 404,
                detail: "Post not found".to_string(),
            })?;
        post.bookmarked = !post.bookmarked;
        Ok(BookmarkState {
            bookmarked: post.bookmarked,
        })
    }

    async fn follow(&self, _user_id: &str) -> Result<(), ApiError> {
        self.mutation(&self.calls.follow).await
    }

    async fn unfollow(&self, _user_id: &str) -> Result<(), ApiError> {
        self.mutation(&self.calls.unfollow).await
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        self.mutation(&self.calls.delete).await?;
        self.feed.lock().unwrap().retain(|p| p.id != post_id);
        Ok(())
    }

    async fn translate(&self, _text: &str, _target_lang: &str) -> Result<String, ApiError> {
        self.mutation(&self.calls.translate).await?;
        Ok(self.translation.lock().unwrap().clone())
    }

    async fn regenerate_context(&self, _post_id: &str) -> Result<ContextData, ApiError> {
        self.mutation(&self.calls.context).await?;
        Ok(self.context.lock().unwrap().clone())
    }

    async fn create_comment(&self, post_id: &str, content: &str) -> Result<Comment, ApiError> {
        self.mutation(&self.calls.comment).await?;
        let username = self
            .me
            .lock()
            .unwrap()
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_default();
        let n = Calls::get(&self.calls.comment);
        let comment = Comment {
            id: format!("c{n}"),
            post_id: Some(post_id.to_string()),
            username,
            content: content.to_string(),
            created_at: Some("2024-05-01T10:00:00".to_string()),
            pending: false,
        };
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }
}

// ============================================================
// Fixtures
// ============================================================

pub fn post(id: &str, author: &str) -> Post {
    serde_json::from_value(serde_json::json!({
        "_id": id,
        "user_id": format!("id-{author}"),
        "username": author,
        "content": format!("post {id} by {author}"),
        "created_at": "2024-05-01T10:00:00",
        "likes": 0,
        "is_liked_by_user": false,
        "is_bookmarked": false,
        "comment_count": 0,
        "is_followed_by_user": false,
    }))
    .unwrap()
}

/// The same post as `/search/` returns it: a raw document without the
/// per-viewer flags.
pub fn search_hit(id: &str, author: &str, likes: i64) -> Post {
    serde_json::from_value(serde_json::json!({
        "_id": id,
        "user_id": format!("id-{author}"),
        "username": author,
        "content": format!("post {id} by {author}"),
        "likes": likes,
    }))
    .unwrap()
}

pub fn liked_post(id: &str, liked: bool, likes: i64) -> Post {
    let mut p = post(id, "asha");
    p.liked = liked;
    p.likes = likes;
    p
}

pub fn user(username: &str, followers: i64) -> UserSummary {
    serde_json::from_value(serde_json::json!({
        "user_id": format!("id-{username}"),
        "username": username,
        "followers_count": followers,
        "following_count": 0,
    }))
    .unwrap()
}

pub fn session(api: &Arc<ScriptedApi>) -> Session {
    Session::new(api.clone(), DispatcherSettings::default())
}
