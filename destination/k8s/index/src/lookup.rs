//! A generic keyed table of `watch` channels, shared between the index
//! (writer) and the gRPC service (reader). Subscribing always observes the
//! sender's current value before any delta, which is what gives the
//! "snapshot before any delta" guarantee for free.

use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, hash::Hash, sync::Arc};
use tokio::sync::watch;

#[derive(Debug)]
pub(crate) struct Lookup<K, V> {
    by_key: Arc<RwLock<HashMap<K, watch::Sender<V>>>>,
}

impl<K, V> Clone for Lookup<K, V> {
    fn clone(&self) -> Self {
        Self {
            by_key: self.by_key.clone(),
        }
    }
}

impl<K, V> Default for Lookup<K, V> {
    fn default() -> Self {
        Self {
            by_key: Arc::new(RwLock::new(HashMap::default())),
        }
    }
}

impl<K, V> Lookup<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    /// Looks up an existing subscription, if any.
    pub(crate) fn subscribe(&self, key: &K) -> Option<watch::Receiver<V>> {
        self.by_key.read().get(key).map(watch::Sender::subscribe)
    }

    /// Looks up an existing subscription, creating one published with
    /// `default` if it doesn't exist yet.
    pub(crate) fn subscribe_or_default(
        &self,
        key: K,
        default: impl FnOnce() -> V,
    ) -> watch::Receiver<V> {
        self.by_key
            .write()
            .entry(key)
            .or_insert_with(|| watch::channel(default()).0)
            .subscribe()
    }

    /// Publishes `value` for `key`, creating the channel if necessary.
    /// Returns `true` if the value changed.
    pub(crate) fn publish(&self, key: K, value: V) -> bool {
        let mut by_key = self.by_key.write();
        match by_key.entry(key) {
            Entry::Occupied(entry) => {
                let mut changed = false;
                entry.get().send_if_modified(|current| {
                    if *current == value {
                        return false;
                    }
                    *current = value.clone();
                    changed = true;
                    true
                });
                changed
            }
            Entry::Vacant(entry) => {
                entry.insert(watch::channel(value).0);
                true
            }
        }
    }

    /// Removes `key` entirely; any outstanding receivers observe no further
    /// updates and complete once they notice the sender dropped.
    pub(crate) fn remove(&self, key: &K) {
        self.by_key.write().remove(key);
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.read().len()
    }
}
