// Entity cache — canonical in-memory posts and users for one session.
//
// All writes go through `transact`, which runs a closure against the
// locked state and then emits exactly one `CacheEvent::Changed` describing
// everything the closure touched. Subscribers therefore never see a
// half-applied transaction. The lock is a plain std Mutex and is never held
// across an await point.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use crate::model::{Comment, Patch, Post, Scope, TrendingTopic, UserSummary};
use crate::mutation::Notice;

/// Capacity of the subscriber channel. Slow subscribers see `Lagged` and
/// should re-read the cache.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Anything the cache can hand out by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Post(Post),
    User(UserSummary),
}

/// Position a post occupied in one screen list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub scope: Scope,
    pub index: usize,
}

/// What a single transaction changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Post and user ids whose fields changed (or that were added/removed).
    pub entities: BTreeSet<String>,
    /// Screen lists whose membership or order changed.
    pub scopes: BTreeSet<Scope>,
    /// Post ids whose comment list changed.
    pub comments: BTreeSet<String>,
    pub trending: bool,
    pub current_user: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.scopes.is_empty()
            && self.comments.is_empty()
            && !self.trending
            && !self.current_user
    }
}

/// Update broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A transaction committed; re-render whatever it names.
    Changed(ChangeSet),
    /// A mutation failed and was rolled back; show the user a notice.
    Notice(Notice),
}

/// Counts for the status screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub posts: usize,
    pub users: usize,
    pub lists: usize,
    pub comments: usize,
    pub trending: usize,
}

#[derive(Default)]
struct CacheState {
    posts: HashMap<String, Post>,
    users: HashMap<String, UserSummary>,
    lists: HashMap<Scope, Vec<String>>,
    comments: HashMap<String, Vec<Comment>>,
    trending: Vec<TrendingTopic>,
    current_user: Option<UserSummary>,
}

/// Shared session cache. Wrap in `Arc` and hand the same instance to the
/// dispatcher, resolver and every screen.
pub struct EntityCache {
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(CacheState::default()),
            events,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Run `f` against the cache as one atomic unit.
    ///
    /// Nothing else can read or write the cache while `f` runs, and the
    /// combined change set is published once `f` returns.
    pub fn transact<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Txn<'_>) -> R,
    {
        let (result, changes) = {
            let mut guard = self.lock();
            let mut txn = Txn {
                state: &mut *guard,
                changes: ChangeSet::default(),
            };
            let result = f(&mut txn);
            (result, txn.changes)
        };

        if !changes.is_empty() {
            self.emit(CacheEvent::Changed(changes));
        }
        result
    }

    /// Publish a failure notice to subscribers.
    pub fn notify(&self, notice: Notice) {
        self.emit(CacheEvent::Notice(notice));
    }

    /// Look up a post or user. Unknown ids are `None`, never an error.
    pub fn get(&self, id: &str) -> Option<Entity> {
        let state = self.lock();
        if let Some(post) = state.posts.get(id) {
            return Some(Entity::Post(post.clone()));
        }
        state.users.get(id).cloned().map(Entity::User)
    }

    pub fn post(&self, id: &str) -> Option<Post> {
        self.lock().posts.get(id).cloned()
    }

    pub fn user(&self, id: &str) -> Option<UserSummary> {
        self.lock().users.get(id).cloned()
    }

    pub fn find_user_by_name(&self, username: &str) -> Option<UserSummary> {
        self.lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    /// Merge a full entity into the cache.
    pub fn upsert(&self, entity: Entity) {
        self.transact(|txn| txn.upsert(entity));
    }

    /// Apply a batch of partial patches in one transaction.
    pub fn apply(&self, patches: &[Patch]) {
        self.transact(|txn| {
            for patch in patches {
                txn.apply(patch);
            }
        });
    }

    /// The posts backing a screen, in insertion order.
    pub fn list(&self, scope: &Scope) -> Vec<Post> {
        let state = self.lock();
        state
            .lists
            .get(scope)
            .map(|ids| ids.iter().filter_map(|id| state.posts.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn list_ids(&self, scope: &Scope) -> Vec<String> {
        self.lock().lists.get(scope).cloned().unwrap_or_default()
    }

    /// Replace a screen's list with freshly loaded posts, merging each
    /// post into the cache.
    pub fn replace_list(&self, scope: Scope, posts: Vec<Post>) {
        self.transact(|txn| txn.set_list(scope, posts));
    }

    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.lock().lists.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    pub fn comments(&self, post_id: &str) -> Vec<Comment> {
        self.lock().comments.get(post_id).cloned().unwrap_or_default()
    }

    pub fn replace_comments(&self, post_id: &str, comments: Vec<Comment>) {
        self.transact(|txn| txn.set_comments(post_id, comments));
    }

    pub fn trending(&self) -> Vec<TrendingTopic> {
        self.lock().trending.clone()
    }

    pub fn replace_trending(&self, topics: Vec<TrendingTopic>) {
        self.transact(|txn| txn.set_trending(topics));
    }

    pub fn current_user(&self) -> Option<UserSummary> {
        self.lock().current_user.clone()
    }

    pub fn set_current_user(&self, user: UserSummary) {
        self.transact(|txn| txn.set_current_user(user));
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            posts: state.posts.len(),
            users: state.users.len(),
            lists: state.lists.len(),
            comments: state.comments.values().map(Vec::len).sum(),
            trending: state.trending.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent) {
        if self.events.send(event).is_err() {
            trace!("No cache subscribers");
        }
    }
}

/// Mutable view of the cache inside a transaction.
pub struct Txn<'a> {
    state: &'a mut CacheState,
    changes: ChangeSet,
}

impl Txn<'_> {
    pub fn post(&self, id: &str) -> Option<&Post> {
        self.state.posts.get(id)
    }

    pub fn user(&self, id: &str) -> Option<&UserSummary> {
        self.state.users.get(id)
    }

    pub fn current_user(&self) -> Option<&UserSummary> {
        self.state.current_user.as_ref()
    }

    /// Every cached post by `author_id`, ordered by post id.
    pub fn posts_by_author(&self, author_id: &str) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self
            .state
            .posts
            .values()
            .filter(|p| p.author_id == author_id)
            .collect();
        posts.sort_by(|a, b| a.id.cmp(&b.id));
        posts
    }

    pub fn list_ids(&self, scope: &Scope) -> &[String] {
        self.state.lists.get(scope).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Merge a full entity. Fields absent from a partial payload are kept.
    pub fn upsert(&mut self, entity: Entity) {
        match entity {
            Entity::Post(post) => self.upsert_post(post),
            Entity::User(user) => {
                let id = user.id.clone();
                let changed = self.state.users.get(&id) != Some(&user);
                if changed {
                    if self.state.current_user.as_ref().is_some_and(|me| me.id == id) {
                        self.state.current_user = Some(user.clone());
                        self.changes.current_user = true;
                    }
                    self.state.users.insert(id.clone(), user);
                    self.changes.entities.insert(id);
                }
            }
        }
    }

    fn upsert_post(&mut self, post: Post) {
        let id = post.id.clone();
        match self.state.posts.get_mut(&id) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge_from(post);
                if *existing != before {
                    self.changes.entities.insert(id);
                }
            }
            None => {
                self.state.posts.insert(id.clone(), post);
                self.changes.entities.insert(id);
            }
        }
    }

    /// Apply one patch. Returns false when the target is not cached or the
    /// patch changed nothing.
    pub fn apply(&mut self, patch: &Patch) -> bool {
        let (id, changed) = match patch {
            Patch::Post { id, patch } => {
                let changed = self
                    .state
                    .posts
                    .get_mut(id)
                    .is_some_and(|post| patch.apply_to(post));
                (id, changed)
            }
            Patch::User { id, patch } => {
                let changed = self
                    .state
                    .users
                    .get_mut(id)
                    .is_some_and(|user| patch.apply_to(user));
                if changed {
                    if let Some(me) = self.state.current_user.as_mut().filter(|me| &me.id == id) {
                        patch.apply_to(me);
                        self.changes.current_user = true;
                    }
                }
                (id, changed)
            }
        };
        if changed {
            self.changes.entities.insert(id.clone());
        }
        changed
    }

    /// Remove a post from the cache and from every list that holds it,
    /// returning the post and where it sat.
    pub fn remove_post(&mut self, id: &str) -> Option<(Post, Vec<Placement>)> {
        let post = self.state.posts.remove(id)?;
        self.changes.entities.insert(id.to_string());

        let mut placements = Vec::new();
        for (scope, ids) in self.state.lists.iter_mut() {
            if let Some(index) = ids.iter().position(|x| x == id) {
                ids.remove(index);
                placements.push(Placement {
                    scope: scope.clone(),
                    index,
                });
                self.changes.scopes.insert(scope.clone());
            }
        }
        placements.sort_by(|a, b| a.scope.cmp(&b.scope));
        Some((post, placements))
    }

    /// Put a removed post back, at its recorded index in each list.
    ///
    /// A post that was re-fetched in the meantime keeps the fresher copy.
    /// Lists that no longer exist are skipped.
    pub fn restore_post(&mut self, post: Post, placements: &[Placement]) {
        let id = post.id.clone();
        if !self.state.posts.contains_key(&id) {
            self.state.posts.insert(id.clone(), post);
            self.changes.entities.insert(id.clone());
        }
        for placement in placements {
            self.insert_into_list(placement, &id);
        }
    }

    /// Drop `id` from one list, returning where it was.
    pub fn remove_from_list(&mut self, scope: &Scope, id: &str) -> Option<Placement> {
        let ids = self.state.lists.get_mut(scope)?;
        let index = ids.iter().position(|x| x == id)?;
        ids.remove(index);
        self.changes.scopes.insert(scope.clone());
        Some(Placement {
            scope: scope.clone(),
            index,
        })
    }

    /// Insert `id` into a list at the placement's index (clamped to the
    /// current length). No-op if the list is gone or already holds it.
    pub fn insert_into_list(&mut self, placement: &Placement, id: &str) {
        let Some(ids) = self.state.lists.get_mut(&placement.scope) else {
            return;
        };
        if ids.iter().any(|x| x == id) {
            return;
        }
        let index = placement.index.min(ids.len());
        ids.insert(index, id.to_string());
        self.changes.scopes.insert(placement.scope.clone());
    }

    /// Replace a list wholesale. Duplicate ids keep their first position.
    pub fn set_list(&mut self, scope: Scope, posts: Vec<Post>) {
        let mut ids: Vec<String> = Vec::with_capacity(posts.len());
        for post in posts {
            if !ids.contains(&post.id) {
                ids.push(post.id.clone());
            }
            self.upsert_post(post);
        }
        if self.state.lists.get(&scope) != Some(&ids) {
            self.changes.scopes.insert(scope.clone());
        }
        self.state.lists.insert(scope, ids);
    }

    pub fn comments(&self, post_id: &str) -> &[Comment] {
        self.state.comments.get(post_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_comments(&mut self, post_id: &str, comments: Vec<Comment>) {
        self.state.comments.insert(post_id.to_string(), comments);
        self.changes.comments.insert(post_id.to_string());
    }

    /// Forget a post's comment thread entirely.
    pub fn drop_comments(&mut self, post_id: &str) {
        if self.state.comments.remove(post_id).is_some() {
            self.changes.comments.insert(post_id.to_string());
        }
    }

    /// Insert a comment at the top of the post's list (newest first).
    pub fn push_comment(&mut self, post_id: &str, comment: Comment) {
        self.state
            .comments
            .entry(post_id.to_string())
            .or_default()
            .insert(0, comment);
        self.changes.comments.insert(post_id.to_string());
    }

    /// Swap the comment with id `comment_id` for `replacement`, in place.
    pub fn replace_comment(&mut self, post_id: &str, comment_id: &str, replacement: Comment) -> bool {
        let Some(slot) = self
            .state
            .comments
            .get_mut(post_id)
            .and_then(|list| list.iter_mut().find(|c| c.id == comment_id))
        else {
            return false;
        };
        *slot = replacement;
        self.changes.comments.insert(post_id.to_string());
        true
    }

    pub fn remove_comment(&mut self, post_id: &str, comment_id: &str) -> bool {
        let Some(list) = self.state.comments.get_mut(post_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|c| c.id != comment_id);
        let removed = list.len() != before;
        if removed {
            self.changes.comments.insert(post_id.to_string());
        }
        removed
    }

    pub fn set_trending(&mut self, topics: Vec<TrendingTopic>) {
        if self.state.trending != topics {
            self.state.trending = topics;
            self.changes.trending = true;
        }
    }

    pub fn set_current_user(&mut self, user: UserSummary) {
        self.state.current_user = Some(user.clone());
        self.changes.current_user = true;
        self.upsert(Entity::User(user));
    }
}
