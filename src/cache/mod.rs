// Session caches — the single owner of everything the screens render.
//
// `entity` holds posts, users, screen lists, comments and trending topics;
// `derived` memoizes translations and generated context per post.

pub mod derived;
pub mod entity;

pub use derived::{DerivedCache, DerivedEntry, DerivedKind, DerivedPayload};
pub use entity::{CacheEvent, CacheStats, ChangeSet, Entity, EntityCache, Placement, Txn};
