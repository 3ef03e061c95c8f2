use std::collections::HashMap;
use std::hash::Hash;

use fluxlink_protocol::ChannelId;

/// What happened to a `Source → [channelId...]` entry after removing one
/// id from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// The id wasn't in the list (already removed, or never subscribed).
    NotFound,
    /// The id was removed and the list still has at least one subscriber.
    StillSubscribed,
    /// The id was removed and the list is now empty; the entry itself was
    /// deleted. Callers must detach whatever per-key listeners they
    /// attached when the entry was first created (§3, §4.4).
    EntryEmptied,
}

/// Per-link `Source → [channelId...]` bookkeeping (§3 "Subscriber Map").
///
/// An entry exists iff its key has at least one live subscriber on this
/// link; `subscribe` reports whether it just created the entry (the
/// signal to attach a Source's inner listeners exactly once) and
/// `unsubscribe`/`take` report when an entry empties (the signal to
/// detach them).
pub struct SubscriberMap<K: Eq + Hash + Clone> {
    subscribers: HashMap<K, Vec<ChannelId>>,
}

impl<K: Eq + Hash + Clone> SubscriberMap<K> {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    /// Appends `id` to the list for `key`. Returns `true` if this created
    /// a brand new entry (the caller should attach its per-key listeners).
    pub fn subscribe(&mut self, key: K, id: ChannelId) -> bool {
        match self.subscribers.get_mut(&key) {
            Some(list) => {
                list.push(id);
                false
            }
            None => {
                self.subscribers.insert(key, vec![id]);
                true
            }
        }
    }

    /// Removes `id` from the list for `key`.
    pub fn unsubscribe(&mut self, key: &K, id: &ChannelId) -> UnsubscribeOutcome {
        let Some(list) = self.subscribers.get_mut(key) else {
            return UnsubscribeOutcome::NotFound;
        };
        let Some(pos) = list.iter().position(|existing| existing == id) else {
            return UnsubscribeOutcome::NotFound;
        };
        list.remove(pos);
        if list.is_empty() {
            self.subscribers.remove(key);
            UnsubscribeOutcome::EntryEmptied
        } else {
            UnsubscribeOutcome::StillSubscribed
        }
    }

    pub fn get(&self, key: &K) -> Option<&[ChannelId]> {
        self.subscribers.get(key).map(Vec::as_slice)
    }

    /// Removes the entire entry for `key`, returning its subscriber list.
    /// Used when a Source disposes and every subscriber must be notified
    /// and the entry torn down in one step (§4.4).
    pub fn take(&mut self, key: &K) -> Option<Vec<ChannelId>> {
        self.subscribers.remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.subscribers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.subscribers.keys()
    }
}

impl<K: Eq + Hash + Clone> Default for SubscriberMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_subscribe_creates_entry() {
        let mut map: SubscriberMap<&'static str> = SubscriberMap::new();
        assert!(map.subscribe("src", ChannelId::from("a")));
        assert!(!map.subscribe("src", ChannelId::from("b")));
        assert_eq!(
            map.get(&"src"),
            Some([ChannelId::from("a"), ChannelId::from("b")].as_slice())
        );
    }

    #[test]
    fn unsubscribe_last_id_empties_entry() {
        let mut map: SubscriberMap<&'static str> = SubscriberMap::new();
        map.subscribe("src", ChannelId::from("a"));
        assert_eq!(
            map.unsubscribe(&"src", &ChannelId::from("a")),
            UnsubscribeOutcome::EntryEmptied
        );
        assert!(!map.contains_key(&"src"));
    }

    #[test]
    fn unsubscribe_keeps_entry_while_others_remain() {
        let mut map: SubscriberMap<&'static str> = SubscriberMap::new();
        map.subscribe("src", ChannelId::from("a"));
        map.subscribe("src", ChannelId::from("b"));
        assert_eq!(
            map.unsubscribe(&"src", &ChannelId::from("a")),
            UnsubscribeOutcome::StillSubscribed
        );
        assert!(map.contains_key(&"src"));
    }

    #[test]
    fn unsubscribe_unknown_id_is_not_found() {
        let mut map: SubscriberMap<&'static str> = SubscriberMap::new();
        map.subscribe("src", ChannelId::from("a"));
        assert_eq!(
            map.unsubscribe(&"src", &ChannelId::from("z")),
            UnsubscribeOutcome::NotFound
        );
    }

    #[test]
    fn take_removes_whole_entry() {
        let mut map: SubscriberMap<&'static str> = SubscriberMap::new();
        map.subscribe("src", ChannelId::from("a"));
        map.subscribe("src", ChannelId::from("b"));
        let taken = map.take(&"src").unwrap();
        assert_eq!(taken, vec![ChannelId::from("a"), ChannelId::from("b")]);
        assert!(!map.contains_key(&"src"));
    }
}
