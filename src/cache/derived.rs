// Derived-data cache — translations and generated context, per post.
//
// Entries are created lazily on the first successful fetch and live for
// the rest of the session. Toggling between a translation and the original
// is a local flag flip; the fetcher is only ever called on a miss or an
// explicit regenerate. A failed fetch leaves no entry behind, so the next
// attempt retries from scratch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::model::ContextData;

/// Which artifact an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKind {
    Translation,
    Context,
}

impl DerivedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedKind::Translation => "translation",
            DerivedKind::Context => "context",
        }
    }
}

impl std::fmt::Display for DerivedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DerivedPayload {
    Translation(String),
    Context(ContextData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEntry {
    pub payload: DerivedPayload,
    /// Whether the UI shows this artifact instead of the original.
    pub visible: bool,
}

#[derive(Default)]
pub struct DerivedCache {
    entries: Mutex<HashMap<(String, DerivedKind), DerivedEntry>>,
}

impl DerivedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, post_id: &str, kind: DerivedKind) -> Option<DerivedEntry> {
        self.lock().get(&key(post_id, kind)).cloned()
    }

    pub fn contains(&self, post_id: &str, kind: DerivedKind) -> bool {
        self.lock().contains_key(&key(post_id, kind))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Return the cached payload, or call `fetcher` once and cache its result.
    ///
    /// A freshly fetched entry starts visible.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        post_id: &str,
        kind: DerivedKind,
        fetcher: F,
    ) -> Result<DerivedPayload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DerivedPayload, E>>,
    {
        if let Some(entry) = self.get(post_id, kind) {
            debug!(post_id, kind = %kind, "Derived cache hit");
            return Ok(entry.payload);
        }
        self.fetch_and_store(post_id, kind, fetcher).await
    }

    /// Bypass the cache: fetch again and replace the entry wholesale.
    ///
    /// On failure the previous entry is left as it was.
    pub async fn regenerate<F, Fut, E>(
        &self,
        post_id: &str,
        kind: DerivedKind,
        fetcher: F,
    ) -> Result<DerivedPayload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DerivedPayload, E>>,
    {
        debug!(post_id, kind = %kind, "Regenerating derived entry");
        self.fetch_and_store(post_id, kind, fetcher).await
    }

    /// Flip the entry's visibility. Returns the new value, or `None` if
    /// nothing is cached for this pair. Never touches the network.
    pub fn toggle_visibility(&self, post_id: &str, kind: DerivedKind) -> Option<bool> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&key(post_id, kind))?;
        entry.visible = !entry.visible;
        Some(entry.visible)
    }

    /// Force the entry's visibility. Returns false if nothing is cached.
    pub fn set_visible(&self, post_id: &str, kind: DerivedKind, visible: bool) -> bool {
        match self.lock().get_mut(&key(post_id, kind)) {
            Some(entry) => {
                entry.visible = visible;
                true
            }
            None => false,
        }
    }

    async fn fetch_and_store<F, Fut, E>(
        &self,
        post_id: &str,
        kind: DerivedKind,
        fetcher: F,
    ) -> Result<DerivedPayload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DerivedPayload, E>>,
    {
        // The lock is not held while the fetch is in flight.
        let payload = fetcher().await?;
        self.lock().insert(
            key(post_id, kind),
            DerivedEntry {
                payload: payload.clone(),
                visible: true,
            },
        );
        Ok(payload)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, DerivedKind), DerivedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(post_id: &str, kind: DerivedKind) -> (String, DerivedKind) {
    (post_id.to_string(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn translated(text: &str) -> Result<DerivedPayload, String> {
        Ok(DerivedPayload::Translation(text.to_string()))
    }

    #[tokio::test]
    async fn repeat_fetch_hits_cache() {
        let cache = DerivedCache::new();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let payload = cache
                .get_or_fetch("p1", DerivedKind::Translation, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    translated("hello")
                })
                .await
                .unwrap();
            assert_eq!(payload, DerivedPayload::Translation("hello".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn toggling_visibility_never_fetches() {
        let cache = DerivedCache::new();
        let calls = AtomicU32::new(0);

        cache
            .get_or_fetch("p1", DerivedKind::Translation, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                translated("hello")
            })
            .await
            .unwrap();

        assert_eq!(cache.toggle_visibility("p1", DerivedKind::Translation), Some(false));
        assert_eq!(cache.toggle_visibility("p1", DerivedKind::Translation), Some(true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn toggle_on_missing_entry_is_none() {
        let cache = DerivedCache::new();
        assert_eq!(cache.toggle_visibility("p1", DerivedKind::Translation), None);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_no_tombstone() {
        let cache = DerivedCache::new();

        let err = cache
            .get_or_fetch("p1", DerivedKind::Translation, || async {
                Err::<DerivedPayload, _>("boom".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(!cache.contains("p1", DerivedKind::Translation));

        let payload = cache
            .get_or_fetch("p1", DerivedKind::Translation, || async { translated("second try") })
            .await
            .unwrap();
        assert_eq!(payload, DerivedPayload::Translation("second try".to_string()));
    }

    #[tokio::test]
    async fn regenerate_replaces_entry() {
        let cache = DerivedCache::new();
        let first = ContextData {
            is_generated: true,
            ..Default::default()
        };
        let second = ContextData {
            is_generated: true,
            disambiguation: vec![serde_json::json!({"entity": "Mercury"})],
            news: None,
        };

        let first_clone = first.clone();
        cache
            .get_or_fetch("p1", DerivedKind::Context, || async move {
                Ok::<_, String>(DerivedPayload::Context(first_clone))
            })
            .await
            .unwrap();
        cache.toggle_visibility("p1", DerivedKind::Context);

        let second_clone = second.clone();
        cache
            .regenerate("p1", DerivedKind::Context, || async move {
                Ok::<_, String>(DerivedPayload::Context(second_clone))
            })
            .await
            .unwrap();

        let entry = cache.get("p1", DerivedKind::Context).unwrap();
        assert_eq!(entry.payload, DerivedPayload::Context(second));
        assert!(entry.visible);
    }

    #[tokio::test]
    async fn failed_regenerate_keeps_previous_entry() {
        let cache = DerivedCache::new();
        cache
            .get_or_fetch("p1", DerivedKind::Translation, || async { translated("kept") })
            .await
            .unwrap();

        let result = cache
            .regenerate("p1", DerivedKind::Translation, || async {
                Err::<DerivedPayload, _>("offline".to_string())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(
            cache.get("p1", DerivedKind::Translation).unwrap().payload,
            DerivedPayload::Translation("kept".to_string())
        );
    }
}
