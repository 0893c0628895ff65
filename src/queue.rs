//! The pending-key queue for one open batch cycle.

use std::hash::Hash;

use indexmap::IndexMap;

/// Unique keys awaiting the next flush, in first-request order, each with a
/// count of the live futures requesting it.
///
/// A second request for a key already in the queue does not add an entry; it
/// bumps the count and shares the key's eventual outcome. The count exists so
/// that a key whose every requester is dropped before the window closes can
/// be removed and never fetched.
#[derive(Debug)]
pub(crate) struct KeyQueue<K> {
    waiting: IndexMap<K, usize>,
}

impl<K> Default for KeyQueue<K> {
    fn default() -> Self {
        Self {
            waiting: IndexMap::new(),
        }
    }
}

impl<K: Eq + Hash> KeyQueue<K> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register one requester for `key`, appending the key if it is new.
    pub(crate) fn enlist(&mut self, key: &K)
    where
        K: Clone,
    {
        match self.waiting.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.waiting.insert(key.clone(), 1);
            }
        }
    }

    /// Withdraw one requester. The last requester leaving takes the key with
    /// it: nobody is left to claim the value, so fetching it would be wasted
    /// work. `shift_remove` keeps the remaining keys in request order.
    pub(crate) fn abandon(&mut self, key: &K) {
        if let Some(count) = self.waiting.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.waiting.shift_remove(key);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiting.len()
    }

    /// The keys to flush, in first-request order.
    pub(crate) fn into_keys(self) -> Vec<K> {
        self.waiting.into_iter().map(|(key, _count)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_come_out_unique_and_in_request_order() {
        let mut queue = KeyQueue::new();
        queue.enlist(&30);
        queue.enlist(&10);
        queue.enlist(&30);
        queue.enlist(&20);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.into_keys(), vec![30, 10, 20]);
    }

    #[test]
    fn abandon_removes_a_key_only_with_its_last_requester() {
        let mut queue = KeyQueue::new();
        queue.enlist(&1);
        queue.enlist(&1);
        queue.enlist(&2);

        queue.abandon(&1);
        assert_eq!(queue.len(), 2);

        queue.abandon(&1);
        assert_eq!(queue.into_keys(), vec![2]);
    }
}
