//! Shared per-group cycle state, driven cooperatively by caller futures.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::num::NonZeroUsize;

use crate::error::CoalesceError;
use crate::queue::KeyQueue;
use crate::waiters::WaiterSet;

/// One group's batch cycle, from the first request to the flushed result.
///
/// Lives behind `Arc<Mutex<..>>`, shared by every caller future of the
/// cycle. The registry holds only a `Weak` to it: once the cycle leaves
/// `Open`, a registry lookup treats the group as idle and starts a fresh
/// cycle, so a flush in progress never absorbs new keys.
pub(crate) enum Cycle<'a, G, K: Eq + Hash, V, E, F, Fut, D> {
    /// Requests gather while the window delay runs.
    Open(OpenCycle<'a, G, K, F, D>),
    /// The window elapsed; chunks are fetched one at a time, in key order.
    Draining(DrainCycle<'a, G, K, V, F, Fut>),
    /// Terminal. Either every key has its outcome, or the cycle's shared
    /// error. Dropped when the last caller future lets go of the `Arc`.
    Settled(Result<HashMap<K, Option<V>>, CoalesceError<E>>),
}

pub(crate) struct OpenCycle<'a, G, K: Eq + Hash, F, D> {
    pub(crate) group: G,
    pub(crate) fetcher: &'a F,
    pub(crate) chunk: NonZeroUsize,
    pub(crate) pending: KeyQueue<K>,
    pub(crate) window: D,
    pub(crate) waiters: WaiterSet,
}

pub(crate) struct DrainCycle<'a, G, K: Eq + Hash, V, F, Fut> {
    pub(crate) group: G,
    pub(crate) fetcher: &'a F,
    pub(crate) chunk: usize,
    /// Every key of the cycle, frozen in first-request order.
    pub(crate) keys: Vec<K>,
    /// Start of the chunk currently in flight.
    pub(crate) cursor: usize,
    /// The fetch future for the current chunk. Exactly one is in flight at
    /// a time; the next chunk's future replaces it in place only after this
    /// one completes.
    pub(crate) inflight: Fut,
    /// Outcomes accumulated from completed chunks.
    pub(crate) outcomes: HashMap<K, Option<V>>,
    pub(crate) waiters: WaiterSet,
}

impl<'a, G, K: Eq + Hash, V, F, Fut> DrainCycle<'a, G, K, V, F, Fut> {
    /// The keys of the chunk currently in flight.
    pub(crate) fn current_chunk(&self) -> &[K] {
        let end = (self.cursor + self.chunk).min(self.keys.len());
        &self.keys[self.cursor..end]
    }

    /// True once `cursor` has moved past the final chunk.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.cursor >= self.keys.len()
    }
}

impl<'a, G, K, F, D> Debug for OpenCycle<'a, G, K, F, D>
where
    K: Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenCycle")
            .field("chunk", &self.chunk)
            .field("pending", &self.pending)
            .field("waiters", &self.waiters)
            .finish_non_exhaustive()
    }
}

impl<'a, G, K, V, F, Fut> Debug for DrainCycle<'a, G, K, V, F, Fut>
where
    K: Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainCycle")
            .field("keys", &self.keys)
            .field("cursor", &self.cursor)
            .field("chunk", &self.chunk)
            .field("waiters", &self.waiters)
            .finish_non_exhaustive()
    }
}
