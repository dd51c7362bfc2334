// Reconciliation resolver — settles a pending mutation against the server.
//
// Success overwrites the optimistic fields with the server's values rather
// than re-applying the local delta. Failure of any kind (rejected,
// unreachable, session expired) restores the record's snapshot field by
// field and publishes a notice. An outcome whose target has vanished from
// the cache is stale: there is nothing to confirm or undo, so it is only
// logged. A post that is off screen only because its delete is still
// pending has not vanished: the outcome lands on the copy the delete will
// restore.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{EntityCache, Placement, Txn};
use crate::error::ApiError;
use crate::model::{Patch, PostPatch, Scope, TranslationSlot, UserPatch};

use super::in_flight::{InFlight, PendingSlots};
use super::propagation;
use super::record::{Action, ActionKind, Confirmation, MutationRecord, MutationStatus, Snapshot};

/// User-visible, non-fatal failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: ActionKind,
    pub target: String,
    pub message: String,
    /// The server answered 401; the caller should send the user to sign in.
    pub session_expired: bool,
}

impl Notice {
    pub fn for_failure(kind: ActionKind, target: &str, err: &ApiError) -> Self {
        let message = match err {
            ApiError::Rejected { detail, .. } => format!("Couldn't {}: {}", kind.phrase(), detail),
            ApiError::Unreachable(_) => format!(
                "Couldn't {}. Check your connection and try again.",
                kind.phrase()
            ),
            ApiError::SessionExpired => "Your session has expired. Sign in again.".to_string(),
        };
        Self {
            kind,
            target: target.to_string(),
            message,
            session_expired: err.is_session_expired(),
        }
    }
}

/// How a pending mutation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Confirmed,
    RolledBack(Notice),
    /// The target no longer exists locally, or the record was superseded.
    Stale,
}

pub struct Resolver {
    cache: Arc<EntityCache>,
    in_flight: Arc<InFlight>,
}

impl Resolver {
    pub fn new(cache: Arc<EntityCache>, in_flight: Arc<InFlight>) -> Self {
        Self { cache, in_flight }
    }

    /// Settle `record` with the network outcome and free its slot.
    ///
    /// The registry stays locked until the cache reflects the outcome, so a
    /// sibling record on the same post never sees it half applied.
    pub fn resolve(&self, record: MutationRecord, result: Result<Confirmation, ApiError>) -> Resolution {
        let mut slots = self.in_flight.slots();
        let Some(stored) = slots.settle(&record) else {
            debug!(
                record_id = record.id,
                action = %record.action.kind(),
                target_id = record.action.target(),
                "Dropping outcome for a record that is no longer pending"
            );
            return Resolution::Stale;
        };
        self.finish(&mut slots, stored, result)
    }

    /// Settle a record that has already left the in-flight table.
    pub(crate) fn finish(
        &self,
        slots: &mut PendingSlots<'_>,
        mut record: MutationRecord,
        result: Result<Confirmation, ApiError>,
    ) -> Resolution {
        match result {
            Ok(confirmation) => {
                if !self.confirm(slots, &record, confirmation) {
                    debug!(
                        record_id = record.id,
                        target_id = record.action.target(),
                        "Target vanished before confirmation; dropping"
                    );
                    return Resolution::Stale;
                }
                record.status = MutationStatus::Confirmed;
                debug!(
                    record_id = record.id,
                    action = %record.action.kind(),
                    target_id = record.action.target(),
                    status = %record.status,
                    "Mutation confirmed"
                );
                Resolution::Confirmed
            }
            Err(err) => {
                record.status = MutationStatus::Failed;
                if !self.rollback(slots, &record) {
                    debug!(
                        record_id = record.id,
                        target_id = record.action.target(),
                        error = %err,
                        "Target vanished before rollback; nothing to undo"
                    );
                    return Resolution::Stale;
                }

                let notice = Notice::for_failure(record.action.kind(), record.action.target(), &err);
                warn!(
                    record_id = record.id,
                    action = %record.action.kind(),
                    target_id = record.action.target(),
                    status = %record.status,
                    error = %err,
                    "Mutation rolled back"
                );
                self.cache.notify(notice.clone());
                Resolution::RolledBack(notice)
            }
        }
    }

    /// Write the server's authoritative values. Returns false if the target
    /// is gone.
    fn confirm(
        &self,
        slots: &mut PendingSlots<'_>,
        record: &MutationRecord,
        confirmation: Confirmation,
    ) -> bool {
        self.cache.transact(|txn| match (&record.action, confirmation) {
            (Action::Like { post_id }, Confirmation::Like(state)) => patch_post(
                txn,
                slots,
                post_id,
                PostPatch {
                    liked: Some(state.liked),
                    likes: Some(state.likes),
                    ..Default::default()
                },
            ),
            (Action::Bookmark { post_id }, Confirmation::Bookmark(state)) => {
                let patch = PostPatch {
                    bookmarked: Some(state.bookmarked),
                    ..Default::default()
                };
                if !patch_post(txn, slots, post_id, patch) {
                    return false;
                }
                // The server may disagree with the optimistic direction: put
                // the Bookmarks list back in line with what it said.
                let restore = match &record.snapshot {
                    Snapshot::Bookmark { placements, .. } => placements.as_slice(),
                    _ => &[][..],
                };
                place_bookmark(txn, slots, post_id, state.bookmarked, restore);
                true
            }
            (Action::Follow { user_id } | Action::Unfollow { user_id }, Confirmation::Follow) => {
                // No body to write; the optimistic flags already match.
                let held = match &record.snapshot {
                    Snapshot::Follow { posts, .. } => posts
                        .iter()
                        .any(|(post_id, _)| slots.held_by_delete(post_id).is_some()),
                    _ => false,
                };
                txn.user(user_id).is_some() || !txn.posts_by_author(user_id).is_empty() || held
            }
            (Action::Delete { post_id }, Confirmation::Delete) => {
                txn.drop_comments(post_id);
                true
            }
            (Action::Translate { post_id }, Confirmation::Translation(text)) => patch_post(
                txn,
                slots,
                post_id,
                PostPatch {
                    translation: Some(TranslationSlot {
                        text,
                        visible: true,
                    }),
                    ..Default::default()
                },
            ),
            (Action::RegenerateContext { post_id }, Confirmation::Context(ctx)) => patch_post(
                txn,
                slots,
                post_id,
                PostPatch {
                    context_data: Some(ctx),
                    ..Default::default()
                },
            ),
            (Action::Comment { post_id, .. }, Confirmation::Comment(mut comment)) => {
                if txn.post(post_id).is_none() && slots.held_by_delete(post_id).is_none() {
                    return false;
                }
                comment.pending = false;
                if comment.post_id.is_none() {
                    comment.post_id = Some(post_id.clone());
                }
                let placeholder = match &record.snapshot {
                    Snapshot::Comment { placeholder_id, .. } => placeholder_id.as_str(),
                    _ => "",
                };
                if !txn.replace_comment(post_id, placeholder, comment.clone()) {
                    txn.push_comment(post_id, comment);
                }
                true
            }
            (action, other) => {
                warn!(action = %action.kind(), confirmation = ?other, "Confirmation does not match action");
                false
            }
        })
    }

    /// Restore the snapshot. Returns false when nothing was left to restore.
    fn rollback(&self, slots: &mut PendingSlots<'_>, record: &MutationRecord) -> bool {
        self.cache.transact(|txn| match (&record.action, &record.snapshot) {
            (Action::Like { post_id }, Snapshot::Like { liked, likes }) => patch_post(
                txn,
                slots,
                post_id,
                PostPatch {
                    liked: Some(*liked),
                    likes: Some(*likes),
                    ..Default::default()
                },
            ),
            (Action::Bookmark { post_id }, Snapshot::Bookmark { bookmarked, placements }) => {
                let patch = PostPatch {
                    bookmarked: Some(*bookmarked),
                    ..Default::default()
                };
                if !patch_post(txn, slots, post_id, patch) {
                    return false;
                }
                place_bookmark(txn, slots, post_id, *bookmarked, placements);
                true
            }
            (
                Action::Follow { user_id } | Action::Unfollow { user_id },
                Snapshot::Follow { posts, user },
            ) => {
                let mut restored = false;
                for (post_id, followed) in posts {
                    let patch = PostPatch {
                        author_followed: Some(*followed),
                        ..Default::default()
                    };
                    restored |= patch_post(txn, slots, post_id, patch);
                }
                if let Some(state) = user {
                    if txn.user(user_id).is_some() {
                        txn.apply(&Patch::User {
                            id: user_id.clone(),
                            patch: UserPatch {
                                followed: Some(state.followed),
                                followers_count: Some(state.followers_count),
                            },
                        });
                        restored = true;
                    }
                }
                restored
            }
            (Action::Delete { .. }, Snapshot::Delete { post, placements }) => {
                txn.restore_post(post.clone(), placements);
                true
            }
            (Action::Comment { post_id, .. }, Snapshot::Comment { comment_count, placeholder_id }) => {
                let removed = txn.remove_comment(post_id, placeholder_id);
                let patch = PostPatch {
                    comment_count: Some(*comment_count),
                    ..Default::default()
                };
                let present = patch_post(txn, slots, post_id, patch);
                removed || present
            }
            (action, Snapshot::Derived { .. }) => {
                let post_id = action.target();
                txn.post(post_id).is_some() || slots.held_by_delete(post_id).is_some()
            }
            (action, snapshot) => {
                warn!(action = %action.kind(), snapshot = ?snapshot, "Snapshot does not match action");
                false
            }
        })
    }
}

/// Patch the cached post, or the copy a pending delete holds while the post
/// is off screen. False when neither exists.
fn patch_post(txn: &mut Txn<'_>, slots: &mut PendingSlots<'_>, post_id: &str, patch: PostPatch) -> bool {
    if txn.post(post_id).is_some() {
        txn.apply(&Patch::Post {
            id: post_id.to_string(),
            patch,
        });
        return true;
    }
    match slots.held_by_delete(post_id) {
        Some((post, _)) => {
            patch.apply_to(post);
            true
        }
        None => false,
    }
}

/// Put the post in or out of the Bookmarks list, or in or out of the list
/// positions a pending delete will restore.
fn place_bookmark(
    txn: &mut Txn<'_>,
    slots: &mut PendingSlots<'_>,
    post_id: &str,
    bookmarked: bool,
    restore: &[Placement],
) {
    if txn.post(post_id).is_some() {
        if bookmarked {
            for placement in restore {
                txn.insert_into_list(placement, post_id);
            }
        } else {
            propagation::propagate_bookmark(txn, post_id, false);
        }
        return;
    }
    if let Some((_, placements)) = slots.held_by_delete(post_id) {
        if bookmarked {
            for placement in restore {
                if !placements.contains(placement) {
                    placements.push(placement.clone());
                }
            }
        } else {
            placements.retain(|p| p.scope != Scope::Bookmarks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Placement;
    use crate::model::{LikeState, Post, Scope};

    fn post(id: &str, liked: bool, likes: i64) -> Post {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "user_id": "u1",
            "username": "asha",
            "content": "text",
            "likes": likes,
            "is_liked_by_user": liked,
        }))
        .unwrap()
    }

    fn setup() -> (Arc<EntityCache>, Arc<InFlight>, Resolver) {
        let cache = Arc::new(EntityCache::new());
        let in_flight = Arc::new(InFlight::new());
        let resolver = Resolver::new(cache.clone(), in_flight.clone());
        (cache, in_flight, resolver)
    }

    fn claim(in_flight: &InFlight, record: MutationRecord) -> MutationRecord {
        let class = record.action.class();
        let target = record.action.target().to_string();
        in_flight
            .claim(class, &target, || Ok(record))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn server_count_wins_over_local_arithmetic() {
        let (cache, in_flight, resolver) = setup();
        cache.replace_list(Scope::Feed, vec![post("p1", true, 4)]);
        let record = claim(
            &in_flight,
            MutationRecord::new(1, Action::like("p1"), Snapshot::Like { liked: false, likes: 3 }),
        );

        let resolution = resolver.resolve(
            record,
            Ok(Confirmation::Like(LikeState { liked: true, likes: 5 })),
        );

        assert_eq!(resolution, Resolution::Confirmed);
        let p1 = cache.post("p1").unwrap();
        assert!(p1.liked);
        assert_eq!(p1.likes, 5);
        assert!(in_flight.is_empty());
    }

    #[test]
    fn rejected_like_restores_snapshot_and_notifies() {
        let (cache, in_flight, resolver) = setup();
        cache.replace_list(Scope::Feed, vec![post("p1", true, 4)]);
        let mut events = cache.subscribe();
        let record = claim(
            &in_flight,
            MutationRecord::new(1, Action::like("p1"), Snapshot::Like { liked: false, likes: 3 }),
        );

        let err = ApiError::Rejected {
            status: 400,
            detail: "Already liked".to_string(),
        };
        let resolution = resolver.resolve(record, Err(err));

        let Resolution::RolledBack(notice) = resolution else {
            panic!("expected rollback, got {resolution:?}");
        };
        assert_eq!(notice.message, "Couldn't update your like: Already liked");
        assert!(!notice.session_expired);

        let p1 = cache.post("p1").unwrap();
        assert!(!p1.liked);
        assert_eq!(p1.likes, 3);

        // One change event for the rollback, then the notice.
        assert!(matches!(events.try_recv(), Ok(crate::cache::CacheEvent::Changed(_))));
        assert!(matches!(events.try_recv(), Ok(crate::cache::CacheEvent::Notice(_))));
    }

    #[test]
    fn outcome_for_vanished_post_is_stale() {
        let (_cache, in_flight, resolver) = setup();
        let record = claim(
            &in_flight,
            MutationRecord::new(1, Action::like("gone"), Snapshot::Like { liked: false, likes: 0 }),
        );
        let resolution = resolver.resolve(record, Err(ApiError::Unreachable("timeout".to_string())));
        assert_eq!(resolution, Resolution::Stale);
        assert!(in_flight.is_empty());
    }

    #[test]
    fn superseded_record_is_stale() {
        let (cache, _in_flight, resolver) = setup();
        cache.replace_list(Scope::Feed, vec![post("p1", true, 4)]);
        // Never claimed, as after an expiry.
        let record =
            MutationRecord::new(7, Action::like("p1"), Snapshot::Like { liked: false, likes: 3 });
        let resolution = resolver.resolve(record, Err(ApiError::SessionExpired));
        assert_eq!(resolution, Resolution::Stale);
        assert_eq!(cache.post("p1").unwrap().likes, 4);
    }

    #[test]
    fn failed_unbookmark_reinserts_into_bookmarks() {
        let (cache, in_flight, resolver) = setup();
        cache.replace_list(Scope::Bookmarks, vec![post("a", false, 0), post("c", false, 0)]);
        cache.replace_list(Scope::Feed, vec![post("b", false, 0)]);
        let record = claim(
            &in_flight,
            MutationRecord::new(
                1,
                Action::bookmark("b"),
                Snapshot::Bookmark {
                    bookmarked: true,
                    placements: vec![Placement {
                        scope: Scope::Bookmarks,
                        index: 1,
                    }],
                },
            ),
        );

        resolver.resolve(record, Err(ApiError::Unreachable("offline".to_string())));

        assert_eq!(cache.list_ids(&Scope::Bookmarks), vec!["a", "b", "c"]);
        assert!(cache.post("b").unwrap().bookmarked);
    }

    #[test]
    fn session_expired_notice_is_flagged() {
        let notice = Notice::for_failure(ActionKind::Follow, "u1", &ApiError::SessionExpired);
        assert!(notice.session_expired);
        assert_eq!(notice.message, "Your session has expired. Sign in again.");
    }
}
