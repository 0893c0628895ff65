use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::cycle::{Cycle, DrainCycle};
use crate::error::CoalesceError;
use crate::reply::Reply;
use crate::waiters::{SlotId, WaiterSet};

/// One caller's pending lookup, returned by
/// [`Coalescer::load`](crate::Coalescer::load).
///
/// All the futures of one cycle share the cycle state and drive it
/// cooperatively: whichever future polls drives the window delay, then the
/// chunked fetches, for everyone. Futures that poll while another is driving
/// park their waker and are woken when the cycle settles (or when a dropped
/// driver hands them the role).
pub struct LoadFuture<'a, G, K: Eq + Hash, V, E, F, Fut, D> {
    key: K,
    slot: Option<SlotId>,

    // None once the future has produced its output.
    #[allow(clippy::type_complexity)]
    cycle: Option<Arc<Mutex<Cycle<'a, G, K, V, E, F, Fut, D>>>>,
}

// The future's own fields are never pinned; everything self-referential
// lives behind the Arc, where the window and fetch futures are pinned in
// place by the polling code below.
impl<'a, G, K: Eq + Hash, V, E, F, Fut, D> Unpin for LoadFuture<'a, G, K, V, E, F, Fut, D> {}

impl<'a, G, K: Eq + Hash, V, E, F, Fut, D> LoadFuture<'a, G, K, V, E, F, Fut, D> {
    pub(crate) fn new(key: K, cycle: Arc<Mutex<Cycle<'a, G, K, V, E, F, Fut, D>>>) -> Self {
        Self {
            key,
            slot: None,
            cycle: Some(cycle),
        }
    }
}

/// Upsert this future's waker and mark it the driver: a parked waker is
/// always upserted immediately before polling the cycle's inner future, so
/// the most recent upsert is the task that must be woken to poll again.
fn park(slot: &mut Option<SlotId>, waiters: &mut WaiterSet, waker: &Waker) {
    match slot {
        Some(slot) => waiters.update(slot, waker),
        None => *slot = Some(waiters.join(waker.clone())),
    }
}

impl<'a, G, K, V, E, F, Fut, D> Future for LoadFuture<'a, G, K, V, E, F, Fut, D>
where
    G: Clone + Eq + Hash,
    K: Clone + Eq + Hash,
    V: Clone,
    E: Clone,
    F: Fn(G, Vec<K>) -> Fut,
    Fut: Future<Output = Result<Reply<K, V>, E>>,
    D: Future<Output = ()>,
{
    type Output = Result<Option<V>, CoalesceError<E>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = Pin::into_inner(self);

        // The lock is released whenever this poll returns; it is never held
        // across an await. If a different future's poll panicked (in the
        // window, the fetcher, or a fetch future), the poisoned lock panics
        // every remaining caller of the cycle too.
        let mut guard = this
            .cycle
            .as_ref()
            .expect("polled a completed LoadFuture")
            .lock()
            .unwrap();

        if let Cycle::Open(ref mut open) = *guard {
            // Safety: the window lives inside the Arc and is never moved;
            // it is destructed in place by the state replacement below.
            let window = unsafe { Pin::new_unchecked(&mut open.window) };
            if window.poll(ctx).is_pending() {
                park(&mut this.slot, &mut open.waiters, ctx.waker());
                return Poll::Pending;
            }

            // Window elapsed: freeze the key list and start the first
            // chunk. From here on a registry lookup no longer finds this
            // cycle, so late requests open the next one.
            let group = open.group.clone();
            let fetcher = open.fetcher;
            let chunk = open.chunk.get();
            let waiters = mem::take(&mut open.waiters);
            let keys = mem::take(&mut open.pending).into_keys();
            tracing::debug!(
                keys = keys.len(),
                chunk,
                "batch window closed, fetching in chunks"
            );

            let first = keys[..chunk.min(keys.len())].to_vec();
            let inflight = fetcher(group.clone(), first);

            // Safety note: this is where the window future is destructed in
            // place, upholding the pin contract.
            *guard = Cycle::Draining(DrainCycle {
                group,
                fetcher,
                chunk,
                keys,
                cursor: 0,
                inflight,
                outcomes: HashMap::new(),
                waiters,
            });
        }

        if let Cycle::Draining(ref mut drain) = *guard {
            loop {
                // Safety: the in-flight fetch future is never moved; it is
                // either replaced in place after completing or destructed in
                // place by the settling state replacement.
                let inflight = unsafe { Pin::new_unchecked(&mut drain.inflight) };
                let reply = match inflight.poll(ctx) {
                    Poll::Pending => {
                        park(&mut this.slot, &mut drain.waiters, ctx.waker());
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(reply)) => reply,
                    Poll::Ready(Err(err)) => {
                        // One chunk failing fails the whole cycle; callers
                        // whose chunk already succeeded reject with the same
                        // error. No further chunks are fetched.
                        tracing::debug!("bulk fetch failed, rejecting the whole cycle");
                        let waiters = mem::take(&mut drain.waiters);
                        *guard = Cycle::Settled(Err(CoalesceError::Fetch(err)));
                        waiters.complete(this.slot.take());
                        break;
                    }
                };

                let span = drain.current_chunk().to_vec();
                match reply.resolve_into(&span, &mut drain.outcomes) {
                    Ok(()) => {}
                    Err(err) => {
                        tracing::debug!("misshapen bulk reply, rejecting the whole cycle");
                        let waiters = mem::take(&mut drain.waiters);
                        *guard = Cycle::Settled(Err(err));
                        waiters.complete(this.slot.take());
                        break;
                    }
                }

                drain.cursor += span.len();
                if drain.is_exhausted() {
                    let outcomes = mem::take(&mut drain.outcomes);
                    let waiters = mem::take(&mut drain.waiters);
                    *guard = Cycle::Settled(Ok(outcomes));
                    waiters.complete(this.slot.take());
                    break;
                }

                // More keys remain: launch the next chunk and poll it in
                // this same pass, so its waker is registered before we
                // yield.
                let next = drain.current_chunk().to_vec();
                drain.inflight = (drain.fetcher)(drain.group.clone(), next);
            }
        }

        match *guard {
            Cycle::Settled(Ok(ref outcomes)) => {
                let claimed = outcomes.get(&this.key).cloned();
                // Dropping the guard before any panic below keeps a logic
                // error in one future from poisoning its siblings.
                drop(guard);
                this.cycle = None;
                this.slot = None;
                match claimed {
                    Some(outcome) => Poll::Ready(Ok(outcome)),
                    None => panic!("drained cycle has no outcome for a pending key"),
                }
            }
            Cycle::Settled(Err(ref err)) => {
                let err = err.clone();
                drop(guard);
                this.cycle = None;
                this.slot = None;
                Poll::Ready(Err(err))
            }
            _ => unreachable!("LoadFuture polled a cycle in an impossible state"),
        }
    }
}

impl<'a, G, K: Eq + Hash, V, E, F, Fut, D> Drop for LoadFuture<'a, G, K, V, E, F, Fut, D> {
    fn drop(&mut self) {
        // A dropped future may have been the one driving the cycle, so the
        // waiter set must get the chance to wake a replacement. If the lock
        // is poisoned no cleanup happens; the remaining futures will panic
        // on their next poll anyway.
        let Some(cycle) = self.cycle.as_ref() else {
            return;
        };
        let Ok(mut guard) = cycle.lock() else {
            return;
        };

        match *guard {
            Cycle::Open(ref mut open) => {
                if let Some(slot) = self.slot.take() {
                    open.waiters.leave(slot);
                }
                // Before the flush, interest is still per-key: the last
                // requester leaving takes its key out of the batch.
                open.pending.abandon(&self.key);
            }
            Cycle::Draining(ref mut drain) => {
                if let Some(slot) = self.slot.take() {
                    drain.waiters.leave(slot);
                }
                // The key list is frozen once draining starts; the
                // unclaimed outcome is dropped with the cycle.
            }
            Cycle::Settled(..) => {}
        }
    }
}
