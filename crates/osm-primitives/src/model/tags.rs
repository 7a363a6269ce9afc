//! Copy-on-write tag storage with lock-free reads.
//!
//! The tag list is a logically immutable snapshot: a flat vector of key/value
//! pairs behind an atomically swappable `Arc`. Every mutation builds a whole
//! new vector from the previous one and publishes it with a single atomic
//! reference store, so a concurrent reader observes either the complete old
//! snapshot or the complete new one, never a mixture, and never takes a lock.
//!
//! Writers are **not** serialized by the store. Mutating from two threads at
//! once may lose one of the updates; callers that mutate concurrently must
//! synchronize externally. This is a documented limitation, not a bug: the
//! hot path is the lock-free read, and the single-logical-writer model of the
//! editing layer makes internal write locking pure overhead.
//!
//! "No tags" is represented by an absent snapshot rather than an empty
//! vector, which keeps untagged primitives (the common case) small.
//!
//! Lookup is a linear scan. Tag counts are tens, not thousands; the dominant
//! cost is snapshot construction on writes, so a hash index would buy nothing.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use rustc_hash::{FxHashMap, FxHashSet};

/// Owned key/value map of a primitive's tags.
pub type TagMap = FxHashMap<String, String>;

/// Copy-on-write tag store.
#[derive(Debug, Default)]
pub struct TagStore {
    /// Flat key/value pairs: `[k0, v0, k1, v1, ...]`, keys unique, length
    /// even. `None` when there are no tags.
    keys: ArcSwapOption<Vec<String>>,
}

/// Scans a flat pair list for a key. Returns the key's index (even) if found.
fn index_of_key(pairs: &[String], key: &str) -> Option<usize> {
    (0..pairs.len()).step_by(2).find(|&i| pairs[i] == key)
}

fn map_of(pairs: &[String]) -> TagMap {
    let mut map = TagMap::default();
    for pair in pairs.chunks_exact(2) {
        map.insert(pair[0].clone(), pair[1].clone());
    }
    map
}

impl TagStore {
    /// Creates an empty store (absent snapshot).
    pub fn new() -> Self {
        TagStore { keys: ArcSwapOption::empty() }
    }

    /// Value for `key`, or `None` if the key is not present.
    pub fn get(&self, key: &str) -> Option<String> {
        let snapshot = self.keys.load();
        let pairs = snapshot.as_deref()?;
        index_of_key(pairs, key).map(|i| pairs[i + 1].clone())
    }

    /// Value for `key`, matching the key case-insensitively.
    pub fn get_ignore_case(&self, key: &str) -> Option<String> {
        let snapshot = self.keys.load();
        let pairs = snapshot.as_deref()?;
        pairs
            .chunks_exact(2)
            .find(|pair| pair[0].eq_ignore_ascii_case(key))
            .map(|pair| pair[1].clone())
    }

    /// Owned copy of the current snapshot as a map.
    pub fn get_keys(&self) -> TagMap {
        match self.keys.load().as_deref() {
            Some(pairs) => map_of(pairs),
            None => TagMap::default(),
        }
    }

    pub fn num_keys(&self) -> usize {
        self.keys.load().as_deref().map_or(0, |pairs| pairs.len() / 2)
    }

    /// Whether the store holds at least one tag.
    pub fn has_keys(&self) -> bool {
        self.keys.load().is_some()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.keys
            .load()
            .as_deref()
            .is_some_and(|pairs| index_of_key(pairs, key).is_some())
    }

    /// Whether any of `keys` is present.
    pub fn has_any_key(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has_key(key))
    }

    /// The set of keys in the current snapshot.
    pub fn key_set(&self) -> FxHashSet<String> {
        let mut set = FxHashSet::default();
        if let Some(pairs) = self.keys.load().as_deref() {
            for pair in pairs.chunks_exact(2) {
                set.insert(pair[0].clone());
            }
        }
        set
    }

    /// Lazy iterator over the keys of one consistent snapshot.
    pub fn keys(&self) -> Keys {
        Keys { snapshot: self.keys.load_full(), index: 0 }
    }

    /// Calls `visitor` with every key/value pair of one consistent snapshot.
    pub fn visit_keys<F: FnMut(&str, &str)>(&self, mut visitor: F) {
        if let Some(pairs) = self.keys.load().as_deref() {
            for pair in pairs.chunks_exact(2) {
                visitor(&pair[0], &pair[1]);
            }
        }
    }

    /// Sets `key` to `value`; `None` removes the key.
    ///
    /// Empty and whitespace-only keys are ignored. Returns the pre-mutation
    /// tag map when a new snapshot was published, `None` when nothing
    /// happened.
    pub fn put(&self, key: &str, value: Option<&str>) -> Option<TagMap> {
        if key.trim().is_empty() {
            return None;
        }
        let Some(value) = value else {
            return self.remove(key);
        };
        let original = self.get_keys();
        let next = match self.keys.load_full() {
            None => vec![key.to_string(), value.to_string()],
            Some(pairs) => {
                let mut next = (*pairs).clone();
                match index_of_key(&next, key) {
                    Some(i) => next[i + 1] = value.to_string(),
                    None => {
                        next.push(key.to_string());
                        next.push(value.to_string());
                    }
                }
                next
            }
        };
        self.keys.store(Some(Arc::new(next)));
        Some(original)
    }

    /// Applies every entry of `tags`, last write per key winning.
    ///
    /// Returns the pre-mutation tag map, or `None` for an empty input.
    pub fn put_all(&self, tags: &TagMap) -> Option<TagMap> {
        if tags.is_empty() {
            return None;
        }
        let original = self.get_keys();
        let mut next = self
            .keys
            .load_full()
            .map(|pairs| (*pairs).clone())
            .unwrap_or_default();
        for (key, value) in tags {
            if key.trim().is_empty() {
                continue;
            }
            match index_of_key(&next, key) {
                Some(i) => next[i + 1] = value.clone(),
                None => {
                    next.push(key.clone());
                    next.push(value.clone());
                }
            }
        }
        if next.is_empty() {
            self.keys.store(None);
        } else {
            self.keys.store(Some(Arc::new(next)));
        }
        Some(original)
    }

    /// Removes `key`.
    ///
    /// Returns the pre-mutation tag map, or `None` if the key was absent.
    /// Removing the last tag publishes the absent snapshot.
    pub fn remove(&self, key: &str) -> Option<TagMap> {
        let pairs = self.keys.load_full()?;
        index_of_key(&pairs, key)?;
        let original = map_of(&pairs);
        if pairs.len() == 2 {
            self.keys.store(None);
            return Some(original);
        }
        let mut next = Vec::with_capacity(pairs.len() - 2);
        for pair in pairs.chunks_exact(2) {
            if pair[0] != key {
                next.push(pair[0].clone());
                next.push(pair[1].clone());
            }
        }
        self.keys.store(Some(Arc::new(next)));
        Some(original)
    }

    /// Removes all tags.
    ///
    /// Returns the pre-mutation tag map, or `None` if there were no tags.
    pub fn remove_all(&self) -> Option<TagMap> {
        let pairs = self.keys.load_full()?;
        self.keys.store(None);
        Some(map_of(&pairs))
    }

    /// Replaces the whole tag set. An empty map clears to absent.
    ///
    /// Always returns the pre-mutation tag map.
    pub fn set_keys(&self, tags: &TagMap) -> TagMap {
        let original = self.get_keys();
        let mut next = Vec::with_capacity(tags.len() * 2);
        for (key, value) in tags {
            if key.trim().is_empty() {
                continue;
            }
            next.push(key.clone());
            next.push(value.clone());
        }
        if next.is_empty() {
            self.keys.store(None);
        } else {
            self.keys.store(Some(Arc::new(next)));
        }
        original
    }

    /// Current flat snapshot, for encoding. `None` means no tags.
    pub(crate) fn pairs(&self) -> Option<Arc<Vec<String>>> {
        self.keys.load_full()
    }

    /// Installs a decoded flat snapshot without notification semantics.
    /// The caller guarantees unique, non-empty keys and even length.
    pub(crate) fn set_raw(&self, pairs: Option<Vec<String>>) {
        match pairs {
            Some(pairs) if !pairs.is_empty() => self.keys.store(Some(Arc::new(pairs))),
            _ => self.keys.store(None),
        }
    }
}

/// Iterator over the keys of one tag snapshot.
///
/// Holds the snapshot alive; concurrent mutation does not affect it.
pub struct Keys {
    snapshot: Option<Arc<Vec<String>>>,
    index: usize,
}

impl Iterator for Keys {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let pairs = self.snapshot.as_deref()?;
        if self.index >= pairs.len() {
            return None;
        }
        let key = pairs[self.index].clone();
        self.index += 2;
        Some(key)
    }
}
