use std::collections::HashMap;

use fluxlink_protocol::ChannelId;

/// Per-link `channelId → T` lookup table.
///
/// At most one entry is ever live under a given id (§3 invariant): callers
/// that need the "reuse while live forces the prior to close" behavior
/// described in §4.4 step 3 should `get` before `insert` and close
/// whatever they find.
pub struct ChannelRegistry<T> {
    channels: HashMap<ChannelId, T>,
}

impl<T> ChannelRegistry<T> {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, id: &ChannelId) -> Option<&T> {
        self.channels.get(id)
    }

    pub fn get_mut(&mut self, id: &ChannelId) -> Option<&mut T> {
        self.channels.get_mut(id)
    }

    pub fn contains(&self, id: &ChannelId) -> bool {
        self.channels.contains_key(id)
    }

    /// Inserts `value` under `id`, returning whatever was previously
    /// registered there (the caller is responsible for closing it — see
    /// the channel-id-conflict handling in §4.4).
    pub fn insert(&mut self, id: ChannelId, value: T) -> Option<T> {
        self.channels.insert(id, value)
    }

    pub fn remove(&mut self, id: &ChannelId) -> Option<T> {
        self.channels.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.channels.values()
    }

    /// Removes and returns every entry, in unspecified order. Used when a
    /// link closes and every channel on it must be torn down.
    pub fn drain(&mut self) -> impl Iterator<Item = (ChannelId, T)> + '_ {
        self.channels.drain()
    }
}

impl<T> Default for ChannelRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut reg = ChannelRegistry::new();
        let id = ChannelId::from("7");
        assert!(reg.insert(id.clone(), 1u32).is_none());
        assert_eq!(reg.get(&id), Some(&1));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.remove(&id), Some(1));
        assert!(reg.get(&id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn insert_over_existing_returns_prior_value() {
        let mut reg = ChannelRegistry::new();
        let id = ChannelId::from("7");
        reg.insert(id.clone(), 1u32);
        let prior = reg.insert(id.clone(), 2u32);
        assert_eq!(prior, Some(1));
        assert_eq!(reg.get(&id), Some(&2));
    }

    #[test]
    fn drain_empties_the_registry() {
        let mut reg = ChannelRegistry::new();
        reg.insert(ChannelId::from("a"), 1u32);
        reg.insert(ChannelId::from("b"), 2u32);
        let drained: Vec<_> = reg.drain().collect();
        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty());
    }
}
