// Data models — the posts, users and comments the session caches hold.
//
// Field names on the wire follow the Pulse server (snake_case, `_id`);
// every field except the id defaults when absent so partial payloads from
// older endpoints still deserialize. Search and bookmark payloads leave out
// some per-viewer flags, so posts remember which ones they actually carried.

use serde::{Deserialize, Serialize};

/// Posts scoring above this are flagged as high-risk content.
pub const HIGH_RISK_THRESHOLD: f64 = 0.6;

/// A post as rendered by every feed-like screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PostWire")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "user_id", default)]
    pub author_id: String,
    #[serde(rename = "username", default)]
    pub author_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityTag>,
    #[serde(default)]
    pub likes: i64,
    #[serde(rename = "is_liked_by_user", default)]
    pub liked: bool,
    #[serde(rename = "is_bookmarked", default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub comment_count: i64,
    /// Model-assigned risk in `0.0..=1.0`.
    #[serde(default)]
    pub risk_score: f64,
    #[serde(rename = "is_followed_by_user", default)]
    pub author_followed: bool,
    #[serde(default)]
    pub context_data: Option<ContextData>,
    /// Local-only: the cached translation and whether it is on screen.
    #[serde(skip)]
    pub translation: Option<TranslationSlot>,
    /// Local-only: which per-viewer fields the source payload included.
    #[serde(skip)]
    pub carried: Carried,
}

impl Post {
    pub fn is_high_risk(&self) -> bool {
        self.risk_score > HIGH_RISK_THRESHOLD
    }

    /// The text the UI should show: the translation when toggled on,
    /// otherwise the original content.
    pub fn display_text(&self) -> &str {
        match &self.translation {
            Some(slot) if slot.visible => &slot.text,
            _ => &self.content,
        }
    }

    /// Merge a freshly fetched copy of this post into the cached one.
    ///
    /// Server-owned fields are overwritten. Per-viewer fields and optional
    /// fields missing from `incoming` keep their cached value, and the local
    /// translation slot is never dropped by a refresh.
    pub fn merge_from(&mut self, incoming: Post) {
        let carried = incoming.carried;
        self.author_id = incoming.author_id;
        self.author_name = incoming.author_name;
        self.content = incoming.content;
        self.entities = incoming.entities;
        self.risk_score = incoming.risk_score;

        if carried.likes {
            self.likes = incoming.likes.max(0);
        }
        if carried.liked {
            self.liked = incoming.liked;
        }
        if carried.bookmarked {
            self.bookmarked = incoming.bookmarked;
        }
        if carried.comment_count {
            self.comment_count = incoming.comment_count.max(0);
        }
        if carried.author_followed {
            self.author_followed = incoming.author_followed;
        }
        self.carried = self.carried.union(carried);

        if incoming.created_at.is_some() {
            self.created_at = incoming.created_at;
        }
        if incoming.media_url.is_some() {
            self.media_url = incoming.media_url;
        }
        if incoming.profile_pic_url.is_some() {
            self.profile_pic_url = incoming.profile_pic_url;
        }
        if incoming.context_data.is_some() {
            self.context_data = incoming.context_data;
        }
        if incoming.translation.is_some() {
            self.translation = incoming.translation;
        }
    }
}

/// Per-viewer fields a post payload actually included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carried {
    pub likes: bool,
    pub liked: bool,
    pub bookmarked: bool,
    pub comment_count: bool,
    pub author_followed: bool,
}

impl Carried {
    pub const ALL: Carried = Carried {
        likes: true,
        liked: true,
        bookmarked: true,
        comment_count: true,
        author_followed: true,
    };

    fn union(self, other: Carried) -> Carried {
        Carried {
            likes: self.likes || other.likes,
            liked: self.liked || other.liked,
            bookmarked: self.bookmarked || other.bookmarked,
            comment_count: self.comment_count || other.comment_count,
            author_followed: self.author_followed || other.author_followed,
        }
    }
}

impl Default for Carried {
    fn default() -> Self {
        Carried::ALL
    }
}

#[derive(Deserialize)]
struct PostWire {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    profile_pic_url: Option<String>,
    #[serde(default)]
    entities: Vec<EntityTag>,
    #[serde(default)]
    likes: Option<i64>,
    #[serde(default)]
    is_liked_by_user: Option<bool>,
    #[serde(default)]
    is_bookmarked: Option<bool>,
    #[serde(default)]
    comment_count: Option<i64>,
    #[serde(default)]
    risk_score: f64,
    #[serde(default)]
    is_followed_by_user: Option<bool>,
    #[serde(default)]
    context_data: Option<ContextData>,
}

impl From<PostWire> for Post {
    fn from(wire: PostWire) -> Self {
        let carried = Carried {
            likes: wire.likes.is_some(),
            liked: wire.is_liked_by_user.is_some(),
            bookmarked: wire.is_bookmarked.is_some(),
            comment_count: wire.comment_count.is_some(),
            author_followed: wire.is_followed_by_user.is_some(),
        };
        Self {
            id: wire.id,
            author_id: wire.user_id,
            author_name: wire.username,
            content: wire.content,
            created_at: wire.created_at,
            media_url: wire.media_url,
            profile_pic_url: wire.profile_pic_url,
            entities: wire.entities,
            likes: wire.likes.unwrap_or_default().max(0),
            liked: wire.is_liked_by_user.unwrap_or_default(),
            bookmarked: wire.is_bookmarked.unwrap_or_default(),
            comment_count: wire.comment_count.unwrap_or_default().max(0),
            risk_score: wire.risk_score,
            author_followed: wire.is_followed_by_user.unwrap_or_default(),
            context_data: wire.context_data,
            translation: None,
            carried,
        }
    }
}

/// Where an entity tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSource {
    Mention,
    Hashtag,
    Ner,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::Mention => "mention",
            TagSource::Hashtag => "hashtag",
            TagSource::Ner => "ner",
        }
    }
}

impl std::fmt::Display for TagSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named-entity tag attached to a post. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTag {
    pub text: String,
    /// NER category (PER, ORG, LOC, GPE, ...).
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl EntityTag {
    /// Resolve the tag's source, falling back to the `@`/`#` prefix when
    /// the server did not say.
    pub fn tag_source(&self) -> Option<TagSource> {
        match self.source.as_deref() {
            Some("mention") => Some(TagSource::Mention),
            Some("hashtag") => Some(TagSource::Hashtag),
            Some("ner") => Some(TagSource::Ner),
            _ if self.text.starts_with('@') => Some(TagSource::Mention),
            _ if self.text.starts_with('#') => Some(TagSource::Hashtag),
            Some(_) => None,
            None => Some(TagSource::Ner),
        }
    }

    /// Human-readable name for the NER label.
    pub fn label_name(&self) -> &'static str {
        match self.label.as_str() {
            "PER" => "Person",
            "ORG" => "Organization",
            "GPE" => "Location",
            "LOC" => "Place",
            _ => "Topic",
        }
    }
}

/// A user as shown on profile screens and denormalized onto posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserWire")]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub bio: Option<String>,
    pub profile_pic_url: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    #[serde(rename = "is_followed_by_user")]
    pub followed: bool,
}

// `/users/me` identifies the user by `_id`, profile lookups by `user_id`,
// and some responses carry both.
#[derive(Deserialize)]
struct UserWire {
    #[serde(rename = "_id", default)]
    object_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    profile_pic_url: Option<String>,
    #[serde(default)]
    followers_count: i64,
    #[serde(default)]
    following_count: i64,
    #[serde(default)]
    is_followed_by_user: bool,
}

impl From<UserWire> for UserSummary {
    fn from(wire: UserWire) -> Self {
        Self {
            id: wire.user_id.or(wire.object_id).unwrap_or_default(),
            username: wire.username,
            bio: wire.bio,
            profile_pic_url: wire.profile_pic_url,
            followers_count: wire.followers_count.max(0),
            following_count: wire.following_count.max(0),
            followed: wire.is_followed_by_user,
        }
    }
}

/// A comment (community note) on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    /// True for the optimistic placeholder until the server confirms it.
    #[serde(skip)]
    pub pending: bool,
}

/// Generated background for a post's entities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextData {
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default)]
    pub disambiguation: Vec<serde_json::Value>,
    #[serde(default)]
    pub news: Option<NewsItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A trending entity over the last 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub topic: String,
    #[serde(default)]
    pub count: u64,
}

/// Cached translation mirrored onto a post for rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranslationSlot {
    pub text: String,
    pub visible: bool,
}

/// Authoritative like state returned by the server after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i64,
}

/// Authoritative bookmark state returned by the server after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkState {
    pub bookmarked: bool,
}

/// The ordered list backing one screen.
///
/// Order inside a scope is whatever the loader inserted; the cache never
/// re-sorts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Feed,
    Search(String),
    Entity(String),
    Profile(String),
    Bookmarks,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Feed => write!(f, "feed"),
            Scope::Search(q) => write!(f, "search:{q}"),
            Scope::Entity(t) => write!(f, "entity:{t}"),
            Scope::Profile(u) => write!(f, "profile:{u}"),
            Scope::Bookmarks => write!(f, "bookmarks"),
        }
    }
}

/// Partial update to a cached post. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub liked: Option<bool>,
    pub likes: Option<i64>,
    pub bookmarked: Option<bool>,
    pub comment_count: Option<i64>,
    pub author_followed: Option<bool>,
    pub translation: Option<TranslationSlot>,
    pub context_data: Option<ContextData>,
}

impl PostPatch {
    /// Apply the patch, returning whether any field actually changed.
    pub fn apply_to(&self, post: &mut Post) -> bool {
        let before = post.clone();
        if let Some(liked) = self.liked {
            post.liked = liked;
        }
        if let Some(likes) = self.likes {
            post.likes = likes.max(0);
        }
        if let Some(bookmarked) = self.bookmarked {
            post.bookmarked = bookmarked;
        }
        if let Some(count) = self.comment_count {
            post.comment_count = count.max(0);
        }
        if let Some(followed) = self.author_followed {
            post.author_followed = followed;
        }
        if let Some(slot) = &self.translation {
            post.translation = Some(slot.clone());
        }
        if let Some(ctx) = &self.context_data {
            post.context_data = Some(ctx.clone());
        }
        *post != before
    }
}

/// Partial update to a cached user summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub followed: Option<bool>,
    pub followers_count: Option<i64>,
}

impl UserPatch {
    pub fn apply_to(&self, user: &mut UserSummary) -> bool {
        let before = user.clone();
        if let Some(followed) = self.followed {
            user.followed = followed;
        }
        if let Some(count) = self.followers_count {
            user.followers_count = count.max(0);
        }
        *user != before
    }
}

/// One entry of a cache transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Post { id: String, patch: PostPatch },
    User { id: String, patch: UserPatch },
}
