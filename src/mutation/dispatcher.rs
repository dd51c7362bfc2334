// Mutation dispatcher — optimistic patch, network call, reconciliation.
//
// `dispatch` runs in three steps. `begin` checks the gesture, claims the
// (class, target) slot and applies the optimistic patch in one cache
// transaction. `issue` is the only await point. The outcome then goes to
// the resolver. The cache is consistent at both ends of the round trip and
// nothing is locked while the request is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::api::PulseApi;
use crate::cache::{DerivedCache, DerivedKind, DerivedPayload, EntityCache, Txn};
use crate::config::{Config, DEFAULT_PENDING_TIMEOUT_SECS, DEFAULT_TARGET_LANG};
use crate::error::{ApiError, DispatchError};
use crate::model::{Comment, Patch, PostPatch, TranslationSlot};

use super::in_flight::InFlight;
use super::propagation;
use super::record::{Action, Confirmation, FollowState, MutationRecord, Snapshot};
use super::resolver::{Notice, Resolution, Resolver};

/// Author shown on a placeholder comment when the current user is unknown.
const ANONYMOUS_AUTHOR: &str = "you";

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub target_lang: String,
    pub pending_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            pending_timeout: Duration::from_secs(DEFAULT_PENDING_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for DispatcherSettings {
    fn from(config: &Config) -> Self {
        Self {
            target_lang: config.target_lang.clone(),
            pending_timeout: config.pending_timeout,
        }
    }
}

/// Result of the synchronous half of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Begin {
    /// Patch applied; the record must be issued and resolved.
    Pending(MutationRecord),
    /// A record for the same (class, target) is already pending.
    Ignored,
    /// Handled without the network (translation visibility flip).
    Local,
}

/// What happened to a dispatched gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored,
    Local,
    Settled(Resolution),
}

pub struct Dispatcher {
    cache: Arc<EntityCache>,
    derived: Arc<DerivedCache>,
    api: Arc<dyn PulseApi>,
    in_flight: Arc<InFlight>,
    resolver: Resolver,
    target_lang: String,
    pending_timeout: Duration,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<EntityCache>,
        derived: Arc<DerivedCache>,
        api: Arc<dyn PulseApi>,
        settings: DispatcherSettings,
    ) -> Self {
        let in_flight = Arc::new(InFlight::new());
        let resolver = Resolver::new(cache.clone(), in_flight.clone());
        Self {
            cache,
            derived,
            api,
            in_flight,
            resolver,
            target_lang: settings.target_lang,
            pending_timeout: settings.pending_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn derived(&self) -> &Arc<DerivedCache> {
        &self.derived
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Records still waiting on the network, oldest first.
    pub fn pending(&self) -> Vec<MutationRecord> {
        self.in_flight.pending()
    }

    pub fn is_pending(&self, action: &Action) -> bool {
        self.in_flight.is_pending(action.class(), action.target())
    }

    /// Dispatch a gesture end to end.
    pub async fn dispatch(&self, action: Action) -> Result<DispatchOutcome, DispatchError> {
        let record = match self.begin(action)? {
            Begin::Pending(record) => record,
            Begin::Ignored => return Ok(DispatchOutcome::Ignored),
            Begin::Local => return Ok(DispatchOutcome::Local),
        };

        let result = self.issue(&record).await;
        Ok(DispatchOutcome::Settled(self.resolver.resolve(record, result)))
    }

    /// Validate, de-duplicate and apply the optimistic patch.
    ///
    /// Never suspends. On `Err` the cache is untouched and no slot is held.
    pub fn begin(&self, action: Action) -> Result<Begin, DispatchError> {
        if let Action::Comment { content, .. } = &action {
            if content.trim().is_empty() {
                return Err(DispatchError::EmptyComment);
            }
        }

        let class = action.class();
        let target = action.target().to_string();

        if self.in_flight.is_pending(class, &target) {
            debug!(action = %action.kind(), target_id = %target, "Ignoring duplicate gesture");
            return Ok(Begin::Ignored);
        }

        if let Action::Translate { post_id } = &action {
            if let Some(visible) = self.flip_cached_translation(post_id) {
                debug!(post_id = %post_id, visible, "Toggled cached translation");
                return Ok(Begin::Local);
            }
        }

        let claimed = self.in_flight.claim(class, &target, || {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let snapshot = self
                .cache
                .transact(|txn| apply_optimistic(txn, id, &action))?;
            Ok(MutationRecord::new(id, action.clone(), snapshot))
        })?;

        match claimed {
            Some(record) => {
                debug!(
                    record_id = record.id,
                    action = %record.action.kind(),
                    target_id = %target,
                    "Optimistic patch applied"
                );
                Ok(Begin::Pending(record))
            }
            None => Ok(Begin::Ignored),
        }
    }

    /// Make the network call for a pending record.
    pub async fn issue(&self, record: &MutationRecord) -> Result<Confirmation, ApiError> {
        match &record.action {
            Action::Like { post_id } => self.api.toggle_like(post_id).await.map(Confirmation::Like),
            Action::Bookmark { post_id } => self
                .api
                .toggle_bookmark(post_id)
                .await
                .map(Confirmation::Bookmark),
            Action::Follow { user_id } => self.api.follow(user_id).await.map(|_| Confirmation::Follow),
            Action::Unfollow { user_id } => {
                self.api.unfollow(user_id).await.map(|_| Confirmation::Follow)
            }
            Action::Delete { post_id } => {
                self.api.delete_post(post_id).await.map(|_| Confirmation::Delete)
            }
            Action::Translate { post_id } => {
                let text = record.snapshot.source_text().unwrap_or_default();
                self.derived
                    .get_or_fetch(post_id, DerivedKind::Translation, || async {
                        self.api
                            .translate(text, &self.target_lang)
                            .await
                            .map(DerivedPayload::Translation)
                    })
                    .await
                    .map(Confirmation::from)
            }
            Action::RegenerateContext { post_id } => self
                .derived
                .regenerate(post_id, DerivedKind::Context, || async {
                    self.api
                        .regenerate_context(post_id)
                        .await
                        .map(DerivedPayload::Context)
                })
                .await
                .map(Confirmation::from),
            Action::Comment { post_id, content } => self
                .api
                .create_comment(post_id, content)
                .await
                .map(Confirmation::Comment),
        }
    }

    /// Give up on records pending longer than the configured timeout.
    ///
    /// Each is rolled back as if the network had failed, its slot is freed
    /// for a fresh dispatch, and a notice is returned for the retry prompt.
    /// A response that turns up later is dropped as stale.
    pub fn expire_stale(&self, now: Instant) -> Vec<Notice> {
        let mut slots = self.in_flight.slots();
        let overdue = slots.overdue(now, self.pending_timeout);
        if overdue.is_empty() {
            return Vec::new();
        }
        info!(count = overdue.len(), "Expiring stale pending mutations");

        let reason = ApiError::Unreachable(format!(
            "no response after {}s",
            self.pending_timeout.as_secs()
        ));
        let mut notices = Vec::new();
        for record in overdue {
            let Some(stored) = slots.settle(&record) else {
                continue;
            };
            if let Resolution::RolledBack(notice) =
                self.resolver.finish(&mut slots, stored, Err(reason.clone()))
            {
                notices.push(notice);
            }
        }
        notices
    }

    /// Flip a cached translation's visibility. `None` when nothing is
    /// cached yet and the network has to be asked.
    fn flip_cached_translation(&self, post_id: &str) -> Option<bool> {
        let entry = self.derived.get(post_id, DerivedKind::Translation)?;
        let DerivedPayload::Translation(text) = entry.payload else {
            return None;
        };

        // The post's slot is what's on screen, so it decides the direction.
        let visible = self
            .cache
            .post(post_id)
            .and_then(|p| p.translation.map(|slot| !slot.visible))
            .unwrap_or(!entry.visible);
        self.derived
            .set_visible(post_id, DerivedKind::Translation, visible);
        self.cache.apply(&[Patch::Post {
            id: post_id.to_string(),
            patch: PostPatch {
                translation: Some(TranslationSlot { text, visible }),
                ..Default::default()
            },
        }]);
        Some(visible)
    }
}

/// Apply the optimistic patch for `action` and return what it replaced.
fn apply_optimistic(txn: &mut Txn<'_>, id: u64, action: &Action) -> Result<Snapshot, DispatchError> {
    match action {
        Action::Like { post_id } => {
            let post = txn
                .post(post_id)
                .ok_or_else(|| DispatchError::UnknownTarget(post_id.clone()))?;
            let (liked, likes) = (post.liked, post.likes);
            let delta = if liked { -1 } else { 1 };
            txn.apply(&Patch::Post {
                id: post_id.clone(),
                patch: PostPatch {
                    liked: Some(!liked),
                    likes: Some((likes + delta).max(0)),
                    ..Default::default()
                },
            });
            Ok(Snapshot::Like { liked, likes })
        }
        Action::Bookmark { post_id } => {
            let bookmarked = txn
                .post(post_id)
                .ok_or_else(|| DispatchError::UnknownTarget(post_id.clone()))?
                .bookmarked;
            txn.apply(&Patch::Post {
                id: post_id.clone(),
                patch: PostPatch {
                    bookmarked: Some(!bookmarked),
                    ..Default::default()
                },
            });
            let placements = propagation::propagate_bookmark(txn, post_id, !bookmarked);
            Ok(Snapshot::Bookmark {
                bookmarked,
                placements,
            })
        }
        Action::Follow { user_id } | Action::Unfollow { user_id } => {
            let followed = matches!(action, Action::Follow { .. });
            if txn.current_user().is_some_and(|me| me.id == *user_id) {
                return Err(DispatchError::SelfFollow);
            }

            let posts: Vec<(String, bool)> = txn
                .posts_by_author(user_id)
                .into_iter()
                .map(|p| (p.id.clone(), p.author_followed))
                .collect();
            let user = txn.user(user_id).map(|u| FollowState {
                followed: u.followed,
                followers_count: u.followers_count,
            });
            if posts.is_empty() && user.is_none() {
                return Err(DispatchError::UnknownTarget(user_id.clone()));
            }

            for patch in propagation::propagate_follow(txn, user_id, followed) {
                txn.apply(&patch);
            }
            Ok(Snapshot::Follow { posts, user })
        }
        Action::Delete { post_id } => {
            let (post, placements) = propagation::propagate_delete(txn, post_id)
                .ok_or_else(|| DispatchError::UnknownTarget(post_id.clone()))?;
            Ok(Snapshot::Delete { post, placements })
        }
        Action::Translate { post_id } | Action::RegenerateContext { post_id } => {
            let source_text = txn
                .post(post_id)
                .ok_or_else(|| DispatchError::UnknownTarget(post_id.clone()))?
                .content
                .clone();
            Ok(Snapshot::Derived { source_text })
        }
        Action::Comment { post_id, content } => {
            let comment_count = txn
                .post(post_id)
                .ok_or_else(|| DispatchError::UnknownTarget(post_id.clone()))?
                .comment_count;
            let username = txn
                .current_user()
                .map(|me| me.username.clone())
                .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
            let placeholder_id = format!("local-{id}");

            txn.push_comment(
                post_id,
                Comment {
                    id: placeholder_id.clone(),
                    post_id: Some(post_id.clone()),
                    username,
                    content: content.trim().to_string(),
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                    pending: true,
                },
            );
            txn.apply(&Patch::Post {
                id: post_id.clone(),
                patch: PostPatch {
                    comment_count: Some(comment_count + 1),
                    ..Default::default()
                },
            });
            Ok(Snapshot::Comment {
                comment_count,
                placeholder_id,
            })
        }
    }
}
