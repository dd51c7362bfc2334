// Propagation router — fans one mutation out to every entity it implies.
//
// These functions only compute or apply changes inside an open cache
// transaction; they never suspend, so the caller's transaction commits all
// of a mutation's consequences together.

use crate::cache::{Placement, Txn};
use crate::model::{Patch, Post, PostPatch, Scope, UserPatch};

/// Patches for following (`followed = true`) or unfollowing a user.
///
/// Every cached post authored by `user_id` gets its followed flag set, and
/// the user's own summary (if cached) gets the flag plus a ±1 follower
/// count adjustment when the flag actually changes.
pub fn propagate_follow(txn: &Txn<'_>, user_id: &str, followed: bool) -> Vec<Patch> {
    let mut patches: Vec<Patch> = txn
        .posts_by_author(user_id)
        .into_iter()
        .map(|post| Patch::Post {
            id: post.id.clone(),
            patch: PostPatch {
                author_followed: Some(followed),
                ..Default::default()
            },
        })
        .collect();

    if let Some(user) = txn.user(user_id) {
        let followers_count = match (user.followed, followed) {
            (false, true) => user.followers_count + 1,
            (true, false) => (user.followers_count - 1).max(0),
            _ => user.followers_count,
        };
        patches.push(Patch::User {
            id: user_id.to_string(),
            patch: UserPatch {
                followed: Some(followed),
                followers_count: Some(followers_count),
            },
        });
    }

    patches
}

/// Remove a post from the cache and from every loaded list, not just the
/// screen the gesture came from.
pub fn propagate_delete(txn: &mut Txn<'_>, post_id: &str) -> Option<(Post, Vec<Placement>)> {
    txn.remove_post(post_id)
}

/// Keep the Bookmarks list in step with a post's bookmark flag.
///
/// Un-bookmarking drops the post from a loaded Bookmarks list and returns
/// where it was. Bookmarking never inserts: that list is server-ordered
/// and refreshed on load.
pub fn propagate_bookmark(txn: &mut Txn<'_>, post_id: &str, bookmarked: bool) -> Vec<Placement> {
    if bookmarked {
        return Vec::new();
    }
    txn.remove_from_list(&Scope::Bookmarks, post_id)
        .into_iter()
        .collect()
}
