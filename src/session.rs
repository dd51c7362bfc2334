// Session — one signed-in client: shared caches, the API and the dispatcher.
//
// The loaders fill the entity cache for each screen. They replace a
// screen's list wholesale and merge each post into the cache: a refresh
// keeps the local translation slot and any per-viewer flag its payload did
// not carry. Flags it did carry win, even over a pending optimistic patch;
// the pending record's outcome overwrites them again when it settles.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::api::{HttpPulseApi, PulseApi};
use crate::cache::{DerivedCache, Entity, EntityCache};
use crate::config::Config;
use crate::error::DispatchError;
use crate::model::{Comment, Post, Scope, TrendingTopic, UserSummary};
use crate::mutation::{Action, DispatchOutcome, Dispatcher, DispatcherSettings, MutationRecord, Notice};

pub struct Session {
    api: Arc<dyn PulseApi>,
    cache: Arc<EntityCache>,
    derived: Arc<DerivedCache>,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn new(api: Arc<dyn PulseApi>, settings: DispatcherSettings) -> Self {
        let cache = Arc::new(EntityCache::new());
        let derived = Arc::new(DerivedCache::new());
        let dispatcher = Dispatcher::new(cache.clone(), derived.clone(), api.clone(), settings);
        Self {
            api,
            cache,
            derived,
            dispatcher,
        }
    }

    /// Build a session talking to the configured Pulse API over HTTP.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = HttpPulseApi::new(&config.api_url, config.token.clone(), config.request_timeout)
            .context("Failed to create Pulse API client")?;
        Ok(Self::new(Arc::new(api), DispatcherSettings::from(config)))
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn derived(&self) -> &Arc<DerivedCache> {
        &self.derived
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn dispatch(&self, action: Action) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(action).await
    }

    pub fn pending(&self) -> Vec<MutationRecord> {
        self.dispatcher.pending()
    }

    /// Roll back and release everything pending past the timeout.
    pub fn expire_stale(&self) -> Vec<Notice> {
        self.dispatcher.expire_stale(Instant::now())
    }

    /// Home feed, newest first.
    pub async fn load_feed(&self) -> Result<Vec<Post>> {
        let posts = self.api.list_posts().await.context("Failed to load feed")?;
        Ok(self.fill(Scope::Feed, posts))
    }

    /// Search results in server order. A blank query clears the list
    /// without a request.
    pub async fn load_search(&self, query: &str) -> Result<Vec<Post>> {
        let query = query.trim();
        let scope = Scope::Search(query.to_string());
        if query.is_empty() {
            return Ok(self.fill(scope, Vec::new()));
        }
        let posts = self
            .api
            .search(query)
            .await
            .with_context(|| format!("Search for '{query}' failed"))?;
        Ok(self.fill(scope, posts))
    }

    /// Posts mentioning an entity (explore screen).
    pub async fn load_entity(&self, text: &str) -> Result<Vec<Post>> {
        let text = text.trim();
        let posts = self
            .api
            .search(text)
            .await
            .with_context(|| format!("Failed to explore '{text}'"))?;
        Ok(self.fill(Scope::Entity(text.to_string()), posts))
    }

    /// A user's summary and their posts, fetched concurrently.
    pub async fn load_profile(&self, username: &str) -> Result<(UserSummary, Vec<Post>)> {
        let (user, posts) = futures::try_join!(
            self.api.get_user(username),
            self.api.list_by_user(username)
        )
        .with_context(|| format!("Failed to load profile @{username}"))?;

        self.cache.upsert(Entity::User(user.clone()));
        let posts = self.fill(Scope::Profile(username.to_string()), posts);
        Ok((user, posts))
    }

    pub async fn load_bookmarks(&self) -> Result<Vec<Post>> {
        let posts = self
            .api
            .list_bookmarks()
            .await
            .context("Failed to load bookmarks")?;
        Ok(self.fill(Scope::Bookmarks, posts))
    }

    pub async fn load_post(&self, post_id: &str) -> Result<Post> {
        let post = self
            .api
            .get_post(post_id)
            .await
            .with_context(|| format!("Failed to load post {post_id}"))?;
        self.cache.upsert(Entity::Post(post));
        self.cache
            .post(post_id)
            .with_context(|| format!("Post {post_id} missing after load"))
    }

    /// Comment thread for a post, replacing any cached thread. Placeholders
    /// for comments still pending are kept on top.
    pub async fn load_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let fetched = self
            .api
            .list_comments(post_id)
            .await
            .with_context(|| format!("Failed to load comments for {post_id}"))?;

        let mut comments: Vec<Comment> = self
            .cache
            .comments(post_id)
            .into_iter()
            .filter(|c| c.pending)
            .collect();
        comments.extend(fetched);
        self.cache.replace_comments(post_id, comments.clone());
        Ok(comments)
    }

    pub async fn load_trending(&self) -> Result<Vec<TrendingTopic>> {
        let topics = self
            .api
            .trending()
            .await
            .context("Failed to load trending topics")?;
        self.cache.replace_trending(topics.clone());
        Ok(topics)
    }

    /// Who is signed in. Used to author comment placeholders and to refuse
    /// self-follows.
    pub async fn load_current_user(&self) -> Result<UserSummary> {
        let me = self
            .api
            .current_user()
            .await
            .context("Failed to load current user")?;
        info!(username = %me.username, "Signed in");
        self.cache.set_current_user(me.clone());
        Ok(me)
    }

    fn fill(&self, scope: Scope, posts: Vec<Post>) -> Vec<Post> {
        debug!(scope = %scope, count = posts.len(), "Loaded list");
        self.cache.replace_list(scope.clone(), posts);
        self.cache.list(&scope)
    }
}
