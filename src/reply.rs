//! Bulk-reply shapes and their resolution against a requested chunk.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::CoalesceError;

/// What one bulk fetch call returned, tagged by how its contents line up
/// with the chunk of keys that was requested.
///
/// The tag is chosen by the fetcher when it builds the reply; nothing here
/// inspects the data's shape at runtime to guess.
#[derive(Debug, Clone)]
pub enum Reply<K, V> {
    /// One value per requested key: `values[i]` answers `chunk[i]`. The
    /// lengths must match exactly, or the cycle fails with
    /// [`CoalesceError::Shape`].
    Ordered(Vec<V>),

    /// Composite records, each paired with every key it answers. A record
    /// may answer many keys (one market listing covering several token ids,
    /// say), and keys answered by no record resolve to an explicit miss
    /// rather than an error. When two records claim the same key, the first
    /// wins.
    Keyed(Vec<(Vec<K>, V)>),
}

/// A composite record that can name the keys it answers, for
/// [`Reply::keyed`]. Implemented on the fetcher's record type; the
/// extraction of keys from the record's innards lives here rather than in
/// the flush path.
pub trait KeyedRecord<K> {
    /// Every key this record answers.
    fn keys(&self) -> Vec<K>;
}

impl<K, V> Reply<K, V> {
    /// A positional reply: one value per requested key, in chunk order.
    pub fn ordered(values: Vec<V>) -> Self {
        Reply::Ordered(values)
    }

    /// A content-addressed reply built from records that know their own
    /// keys.
    pub fn keyed(records: Vec<V>) -> Self
    where
        V: KeyedRecord<K>,
    {
        Reply::Keyed(
            records
                .into_iter()
                .map(|record| (record.keys(), record))
                .collect(),
        )
    }
}

impl<K: Clone + Eq + Hash, V: Clone> Reply<K, V> {
    /// Match this reply against the chunk that requested it, writing exactly
    /// one outcome per chunk key into `outcomes`: `Some(value)` when the
    /// reply answers the key, `None` when a keyed reply does not. Keys named
    /// by a record but absent from the chunk are ignored; they belong to
    /// other chunks or to nobody.
    ///
    /// The error type parameter is the fetcher's; only the
    /// [`Shape`](CoalesceError::Shape) variant is produced here.
    pub(crate) fn resolve_into<E>(
        self,
        chunk: &[K],
        outcomes: &mut HashMap<K, Option<V>>,
    ) -> Result<(), CoalesceError<E>> {
        match self {
            Reply::Ordered(values) => {
                if values.len() != chunk.len() {
                    return Err(CoalesceError::Shape {
                        expected: chunk.len(),
                        got: values.len(),
                    });
                }
                for (key, value) in chunk.iter().zip(values) {
                    outcomes.insert(key.clone(), Some(value));
                }
            }
            Reply::Keyed(records) => {
                let mut by_key: HashMap<&K, &V> = HashMap::new();
                for (keys, record) in &records {
                    for key in keys {
                        by_key.entry(key).or_insert(record);
                    }
                }
                for key in chunk {
                    let hit = by_key.get(key).copied().cloned();
                    outcomes.insert(key.clone(), hit);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Outcomes = HashMap<u32, Option<&'static str>>;

    #[test]
    fn ordered_reply_pairs_values_with_chunk_order() {
        let mut outcomes = Outcomes::new();
        let reply = Reply::ordered(vec!["a", "b", "c"]);
        reply
            .resolve_into::<()>(&[3, 1, 2], &mut outcomes)
            .unwrap();

        assert_eq!(outcomes[&3], Some("a"));
        assert_eq!(outcomes[&1], Some("b"));
        assert_eq!(outcomes[&2], Some("c"));
    }

    #[test]
    fn ordered_reply_with_wrong_length_is_a_shape_error() {
        let mut outcomes = Outcomes::new();
        let reply = Reply::ordered(vec!["a"]);
        let err = reply
            .resolve_into::<()>(&[1, 2], &mut outcomes)
            .unwrap_err();

        assert_eq!(err, CoalesceError::Shape { expected: 2, got: 1 });
        assert!(outcomes.is_empty());
    }

    #[test]
    fn keyed_reply_covers_its_keys_and_misses_the_rest() {
        let mut outcomes = Outcomes::new();
        let reply: Reply<u32, &str> =
            Reply::Keyed(vec![(vec![3, 7], "pair"), (vec![9], "single")]);
        reply
            .resolve_into::<()>(&[3, 5, 7, 9], &mut outcomes)
            .unwrap();

        assert_eq!(outcomes[&3], Some("pair"));
        assert_eq!(outcomes[&7], Some("pair"));
        assert_eq!(outcomes[&9], Some("single"));
        assert_eq!(outcomes[&5], None);
    }

    #[test]
    fn first_record_wins_when_two_claim_one_key() {
        let mut outcomes = Outcomes::new();
        let reply: Reply<u32, &str> =
            Reply::Keyed(vec![(vec![1], "first"), (vec![1, 2], "second")]);
        reply.resolve_into::<()>(&[1, 2], &mut outcomes).unwrap();

        assert_eq!(outcomes[&1], Some("first"));
        assert_eq!(outcomes[&2], Some("second"));
    }
}
