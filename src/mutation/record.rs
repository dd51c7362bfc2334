// Mutation records — one per user gesture that reached the network.
//
// A record carries the action, the per-field snapshot needed to undo the
// optimistic patch, and its lifecycle status. A snapshot holds only the
// fields its action class touches: undoing a failed like must leave an
// in-flight bookmark on the same post alone.

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::cache::{DerivedPayload, Placement};
use crate::model::{BookmarkState, Comment, ContextData, LikeState, Post};

/// A user-initiated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Like { post_id: String },
    Bookmark { post_id: String },
    Follow { user_id: String },
    Unfollow { user_id: String },
    Delete { post_id: String },
    Translate { post_id: String },
    RegenerateContext { post_id: String },
    Comment { post_id: String, content: String },
}

impl Action {
    pub fn like(post_id: impl Into<String>) -> Self {
        Action::Like {
            post_id: post_id.into(),
        }
    }

    pub fn bookmark(post_id: impl Into<String>) -> Self {
        Action::Bookmark {
            post_id: post_id.into(),
        }
    }

    pub fn follow(user_id: impl Into<String>) -> Self {
        Action::Follow {
            user_id: user_id.into(),
        }
    }

    pub fn unfollow(user_id: impl Into<String>) -> Self {
        Action::Unfollow {
            user_id: user_id.into(),
        }
    }

    pub fn delete(post_id: impl Into<String>) -> Self {
        Action::Delete {
            post_id: post_id.into(),
        }
    }

    pub fn translate(post_id: impl Into<String>) -> Self {
        Action::Translate {
            post_id: post_id.into(),
        }
    }

    pub fn regenerate_context(post_id: impl Into<String>) -> Self {
        Action::RegenerateContext {
            post_id: post_id.into(),
        }
    }

    pub fn comment(post_id: impl Into<String>, content: impl Into<String>) -> Self {
        Action::Comment {
            post_id: post_id.into(),
            content: content.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Like { .. } => ActionKind::Like,
            Action::Bookmark { .. } => ActionKind::Bookmark,
            Action::Follow { .. } => ActionKind::Follow,
            Action::Unfollow { .. } => ActionKind::Unfollow,
            Action::Delete { .. } => ActionKind::Delete,
            Action::Translate { .. } => ActionKind::Translate,
            Action::RegenerateContext { .. } => ActionKind::Context,
            Action::Comment { .. } => ActionKind::Comment,
        }
    }

    pub fn class(&self) -> ActionClass {
        self.kind().class()
    }

    /// The post or user id the action targets.
    pub fn target(&self) -> &str {
        match self {
            Action::Like { post_id }
            | Action::Bookmark { post_id }
            | Action::Delete { post_id }
            | Action::Translate { post_id }
            | Action::RegenerateContext { post_id }
            | Action::Comment { post_id, .. } => post_id,
            Action::Follow { user_id } | Action::Unfollow { user_id } => user_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Like,
    Follow,
    Unfollow,
    Bookmark,
    Delete,
    Translate,
    Context,
    Comment,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Like => "like",
            ActionKind::Follow => "follow",
            ActionKind::Unfollow => "unfollow",
            ActionKind::Bookmark => "bookmark",
            ActionKind::Delete => "delete",
            ActionKind::Translate => "translate",
            ActionKind::Context => "context",
            ActionKind::Comment => "comment",
        }
    }

    /// Follow and unfollow share a class: only one of them may be pending
    /// for a given user at a time.
    pub fn class(&self) -> ActionClass {
        match self {
            ActionKind::Like => ActionClass::Like,
            ActionKind::Follow | ActionKind::Unfollow => ActionClass::Follow,
            ActionKind::Bookmark => ActionClass::Bookmark,
            ActionKind::Delete => ActionClass::Delete,
            ActionKind::Translate => ActionClass::Translate,
            ActionKind::Context => ActionClass::Context,
            ActionKind::Comment => ActionClass::Comment,
        }
    }

    /// Phrase used in failure notices ("Couldn't {phrase}").
    pub fn phrase(&self) -> &'static str {
        match self {
            ActionKind::Like => "update your like",
            ActionKind::Follow => "follow this user",
            ActionKind::Unfollow => "unfollow this user",
            ActionKind::Bookmark => "update this bookmark",
            ActionKind::Delete => "delete this post",
            ActionKind::Translate => "translate this post",
            ActionKind::Context => "regenerate context",
            ActionKind::Comment => "add your comment",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// De-duplication class: at most one pending record per (class, target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionClass {
    Like,
    Follow,
    Bookmark,
    Delete,
    Translate,
    Context,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Confirmed,
    Failed,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::Confirmed => "confirmed",
            MutationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's follow state before a follow/unfollow was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowState {
    pub followed: bool,
    pub followers_count: i64,
}

/// Pre-patch values, enough to put every touched field back exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Like {
        liked: bool,
        likes: i64,
    },
    Bookmark {
        bookmarked: bool,
        /// Lists the post was dropped from when un-bookmarked.
        placements: Vec<Placement>,
    },
    Follow {
        /// `(post id, author_followed)` for every cached post by the user.
        posts: Vec<(String, bool)>,
        user: Option<FollowState>,
    },
    Delete {
        post: Post,
        placements: Vec<Placement>,
    },
    Comment {
        comment_count: i64,
        placeholder_id: String,
    },
    /// Translate / regenerate: nothing is patched until the server answers.
    Derived {
        source_text: String,
    },
}

impl Snapshot {
    pub fn source_text(&self) -> Option<&str> {
        match self {
            Snapshot::Derived { source_text } => Some(source_text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub id: u64,
    pub action: Action,
    pub snapshot: Snapshot,
    pub status: MutationStatus,
    pub issued_at: DateTime<Utc>,
    /// Monotonic issue time, used for the stale-pending timeout.
    pub started: Instant,
}

impl MutationRecord {
    pub fn new(id: u64, action: Action, snapshot: Snapshot) -> Self {
        Self {
            id,
            action,
            snapshot,
            status: MutationStatus::Pending,
            issued_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// Authoritative result of a successful API call.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Like(LikeState),
    Bookmark(BookmarkState),
    /// Follow and unfollow return no body.
    Follow,
    Delete,
    Translation(String),
    Context(ContextData),
    Comment(Comment),
}

impl From<DerivedPayload> for Confirmation {
    fn from(payload: DerivedPayload) -> Self {
        match payload {
            DerivedPayload::Translation(text) => Confirmation::Translation(text),
            DerivedPayload::Context(ctx) => Confirmation::Context(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_and_unfollow_share_a_class() {
        assert_eq!(Action::follow("u1").class(), Action::unfollow("u1").class());
        assert_ne!(Action::like("p1").class(), Action::bookmark("p1").class());
    }

    #[test]
    fn target_is_post_or_user() {
        assert_eq!(Action::comment("p9", "nice").target(), "p9");
        assert_eq!(Action::unfollow("u3").target(), "u3");
    }

    #[test]
    fn new_record_is_pending() {
        let record = MutationRecord::new(
            1,
            Action::like("p1"),
            Snapshot::Like {
                liked: false,
                likes: 3,
            },
        );
        assert_eq!(record.status, MutationStatus::Pending);
        assert_eq!(record.action.kind(), ActionKind::Like);
    }
}
