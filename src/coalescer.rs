use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::cycle::{Cycle, OpenCycle};
use crate::future::LoadFuture;
use crate::queue::KeyQueue;
use crate::reply::Reply;
use crate::waiters::WaiterSet;

/// The batch window observed in production callers: long enough for one
/// burst of lookups to land together, short enough to be invisible next to
/// the remote round-trip.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(10);

/// The bulk-request size observed in production callers.
pub const DEFAULT_CHUNK: NonZeroUsize = match NonZeroUsize::new(25) {
    Some(chunk) => chunk,
    None => unreachable!(),
};

/// The behavior of a [`Coalescer`], fixed at construction time.
///
/// Passed by reference so the fetcher can be invoked by reference from every
/// cycle. Binding the fetcher here, rather than accepting one per `load`
/// call, means callers within one window cannot silently disagree about how
/// their group is fetched.
#[derive(Debug, Clone)]
pub struct CoalesceRules<F, W> {
    /// The bulk fetch: called once per chunk with the group key and the
    /// owned chunk of item keys. Must tolerate repeated calls with disjoint
    /// or overlapping chunks.
    pub fetcher: F,
    /// Constructs the debounce delay for each new cycle. For production use
    /// this is typically an async sleep of [`DEFAULT_WINDOW`]; tests pass
    /// `|| future::ready(())` to flush on first poll.
    pub window: W,
    /// How many keys go into one bulk call. [`DEFAULT_CHUNK`] matches the
    /// remote page size production callers batch against.
    pub chunk: NonZeroUsize,
}

/// Merges single-key lookups into chunked bulk fetches, one batch window per
/// group.
///
/// The coalescer is an explicit value: construct one per remote endpoint and
/// hand it by reference to everything that loads through it. It spawns
/// nothing; the futures returned by [`load`](Self::load) cooperatively drive
/// the window timer and the chunked fetches of their shared cycle.
pub struct Coalescer<'a, G, K: Eq + Hash, V, E, F, Fut, W, D> {
    rules: &'a CoalesceRules<F, W>,

    // One slot per group ever seen. A slot holds the group's cycle only
    // while it is accumulating; the Weak goes dead (or points at a draining
    // cycle, which lookups treat the same way) as soon as the flush begins.
    #[allow(clippy::type_complexity)]
    groups: Mutex<HashMap<G, Weak<Mutex<Cycle<'a, G, K, V, E, F, Fut, D>>>>>,
}

impl<'a, G, K, V, E, F, Fut, W, D> Coalescer<'a, G, K, V, E, F, Fut, W, D>
where
    G: Clone + Eq + Hash,
    K: Clone + Eq + Hash,
    V: Clone,
    E: Clone,
    F: Fn(G, Vec<K>) -> Fut,
    Fut: Future<Output = Result<Reply<K, V>, E>>,
    W: Fn() -> D,
    D: Future<Output = ()>,
{
    pub fn new(rules: &'a CoalesceRules<F, W>) -> Self {
        Self {
            rules,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Request one item from one group.
    ///
    /// The key lands in the group's open cycle, starting one (and its batch
    /// window) if the group is idle. Requests for a key already pending in
    /// the cycle share its outcome instead of queueing a duplicate. The
    /// window is fixed when the cycle opens; later joiners never extend it.
    ///
    /// The returned future resolves once the cycle flushes: `Ok(Some(v))`
    /// when the bulk reply answered the key, `Ok(None)` when a keyed reply
    /// explicitly did not, or the cycle's shared error.
    pub fn load(&self, group: G, key: K) -> LoadFuture<'a, G, K, V, E, F, Fut, D> {
        let mut groups = self.groups.lock().unwrap();

        // Join the group's cycle if one is still accumulating. A cycle that
        // has begun draining is invisible here; so is one whose mutex was
        // poisoned by a panicking poll. Either way the group starts fresh
        // below. Timing is never checked: if the window has elapsed but no
        // future has polled yet, the joined key still makes the batch.
        if let Some(cycle) = groups.get(&group).and_then(Weak::upgrade) {
            let joined = {
                if let Ok(mut guard) = cycle.lock() {
                    if let Cycle::Open(ref mut open) = *guard {
                        open.pending.enlist(&key);
                        tracing::trace!(pending = open.pending.len(), "joined open batch window");
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            };
            if joined {
                return LoadFuture::new(key, cycle);
            }
        }

        let mut pending = KeyQueue::new();
        pending.enlist(&key);

        let cycle = Arc::new(Mutex::new(Cycle::Open(OpenCycle {
            group: group.clone(),
            fetcher: &self.rules.fetcher,
            chunk: self.rules.chunk,
            pending,
            window: (self.rules.window)(),
            waiters: WaiterSet::default(),
        })));
        groups.insert(group, Arc::downgrade(&cycle));
        tracing::trace!("opened new batch window");

        LoadFuture::new(key, cycle)
    }
}
