//! Identifier to window-state mapping.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::entry::RateLimitEntry;

/// In-memory store of rate limit entries keyed by identifier.
///
/// The store holds no policy knowledge; [`super::RateLimiter`] owns every
/// decision. It is backed by a sharded map, so operations on different
/// identifiers proceed in parallel and [`RateLimitStore::update`] runs under
/// the write lock of the identifier's shard.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an identifier without mutating anything.
    pub fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|e| *e.value())
    }

    /// Overwrite the entry for an identifier.
    pub fn set(&self, identifier: &str, entry: RateLimitEntry) {
        self.entries.insert(identifier.to_string(), entry);
    }

    /// Remove the entry for an identifier, if any.
    pub fn delete(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.remove(identifier).map(|(_, entry)| entry)
    }

    /// Visit every `(identifier, entry)` pair.
    ///
    /// Must not be called from inside [`RateLimitStore::update`].
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &RateLimitEntry),
    {
        for item in self.entries.iter() {
            f(item.key(), item.value());
        }
    }

    /// Keep only the entries for which `keep` returns `true`.
    ///
    /// Returns the number of entries removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str, &RateLimitEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|k, v| keep(k.as_str(), &*v));
        before.saturating_sub(self.entries.len())
    }

    /// Read-modify-write a single identifier atomically.
    ///
    /// `f` receives the current entry (if any) and returns the entry to store
    /// (`None` leaves the slot as it was) together with a result for the caller.
    pub fn update<F, R>(&self, identifier: &str, f: F) -> R
    where
        F: FnOnce(Option<&RateLimitEntry>) -> (Option<RateLimitEntry>, R),
    {
        match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (next, result) = f(Some(occupied.get()));
                if let Some(next) = next {
                    occupied.insert(next);
                }
                result
            }
            Entry::Vacant(vacant) => {
                let (next, result) = f(None);
                if let Some(next) = next {
                    vacant.insert(next);
                }
                result
            }
        }
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(count: u32, window_end: u64) -> RateLimitEntry {
        RateLimitEntry { count, window_end }
    }

    #[test]
    fn test_get_set_delete() {
        let store = RateLimitStore::new();
        assert!(store.get("a").is_none());

        store.set("a", entry(1, 100));
        assert_eq!(store.get("a"), Some(entry(1, 100)));

        store.set("a", entry(2, 200));
        assert_eq!(store.get("a"), Some(entry(2, 200)));
        assert_eq!(store.len(), 1);

        assert_eq!(store.delete("a"), Some(entry(2, 200)));
        assert!(store.delete("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_for_each_visits_all() {
        let store = RateLimitStore::new();
        store.set("a", entry(1, 100));
        store.set("b", entry(3, 300));

        let mut seen = Vec::new();
        store.for_each(|id, e| seen.push((id.to_string(), e.count)));
        seen.sort();

        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 3)]);
    }

    #[test]
    fn test_retain_reports_removed() {
        let store = RateLimitStore::new();
        store.set("a", entry(1, 100));
        store.set("b", entry(1, 200));
        store.set("c", entry(1, 300));

        let removed = store.retain(|_, e| e.window_end >= 200);
        assert_eq!(removed, 1);
        assert!(store.get("a").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_vacant_and_occupied() {
        let store = RateLimitStore::new();

        let seen = store.update("a", |current| (Some(entry(1, 100)), current.is_some()));
        assert!(!seen);
        assert_eq!(store.get("a"), Some(entry(1, 100)));

        let count = store.update("a", |current| {
            let mut next = *current.unwrap();
            next.count += 1;
            (Some(next), next.count)
        });
        assert_eq!(count, 2);
        assert_eq!(store.get("a"), Some(entry(2, 100)));
    }

    #[test]
    fn test_update_without_write_leaves_slot_untouched() {
        let store = RateLimitStore::new();
        store.update("a", |_| (None, ()));
        assert!(store.get("a").is_none());

        store.set("b", entry(4, 100));
        store.update("b", |_| (None, ()));
        assert_eq!(store.get("b"), Some(entry(4, 100)));
    }
}
