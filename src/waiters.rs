use std::task::Waker;

/// Handle to one waiter's slot in a [`WaiterSet`]. Deliberately not `Clone`
/// or `Copy`: a slot belongs to exactly one future, and consuming the handle
/// on leave/complete keeps it from being reused after the set has moved on.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SlotId(usize);

/// The wakers of every future parked on one shared cycle.
///
/// Only a single task actually needs to drive the cycle's window and fetch
/// futures forward; waking everyone on every timer tick would stampede the
/// cycle mutex for nothing. The set therefore tracks a *driver*: the waiter
/// that most recently polled, on the assumption that an upsert is immediately
/// followed by a poll of the underlying future. Two rules keep the cycle
/// from stalling:
///
/// - if the driver's future is dropped, another waiter is promoted to driver
///   and woken so the chain of polls stays unbroken ([`leave`](Self::leave));
/// - when the cycle settles, every remaining waiter is woken at once
///   ([`complete`](Self::complete)).
///
/// Slots are append-only for the life of the set. Cycles are short-lived and
/// hold one slot per caller future, so vacated slots are not reused.
#[derive(Debug, Default)]
pub(crate) struct WaiterSet {
    slots: Vec<Option<Waker>>,
    driver: Option<usize>,
}

impl WaiterSet {
    /// Park a new waiter, making it the driver. Returns the handle the
    /// owning future must keep for later upserts and for its drop path.
    #[must_use]
    pub(crate) fn join(&mut self, waker: Waker) -> SlotId {
        let id = self.slots.len();
        self.slots.push(Some(waker));
        self.driver = Some(id);
        SlotId(id)
    }

    /// Refresh an existing waiter's waker, making it the driver. The waker
    /// comes straight out of a `Context`, so it is cloned from a reference.
    ///
    /// Panics if the slot was vacated: a live future's slot can only be
    /// vacated by its own drop, so this is unreachable short of a logic
    /// error.
    pub(crate) fn update(&mut self, slot: &SlotId, waker: &Waker) {
        match self.slots.get_mut(slot.0) {
            Some(Some(stored)) => stored.clone_from(waker),
            _ => panic!("refreshed a vacated waiter slot"),
        }
        self.driver = Some(slot.0);
    }

    /// Vacate a waiter's slot because its future is going away unfinished.
    ///
    /// If that waiter was the driver (or no driver was on record), an
    /// arbitrary remaining waiter is promoted and woken immediately, so that
    /// a burst of drops still leaves one live future aware that it must
    /// poll.
    pub(crate) fn leave(&mut self, slot: SlotId) {
        self.slots[slot.0] = None;
        if self.driver == Some(slot.0) || self.driver.is_none() {
            self.driver = None;
            let next = self
                .slots
                .iter()
                .enumerate()
                .find_map(|(id, waker)| waker.as_ref().map(|waker| (id, waker)));
            if let Some((id, waker)) = next {
                self.driver = Some(id);
                waker.wake_by_ref();
            }
        }
    }

    /// The cycle settled: wake every remaining waiter so it can claim its
    /// outcome. The waiter that performed the settling poll passes its own
    /// slot as `except`, since it is about to return `Ready` and needs no
    /// wake.
    pub(crate) fn complete(self, except: Option<SlotId>) {
        let skip = except.map(|slot| slot.0);
        for (id, waker) in self.slots.into_iter().enumerate() {
            if Some(id) == skip {
                continue;
            }
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use cooked_waker::{IntoWaker, Wake, WakeRef};

    /// Counts how many times it has been woken.
    #[derive(Debug, Clone, Default)]
    struct CountingWaker {
        wakes: Arc<AtomicUsize>,
    }

    impl CountingWaker {
        fn count(&self) -> usize {
            self.wakes.load(Ordering::SeqCst)
        }
    }

    impl WakeRef for CountingWaker {
        fn wake_by_ref(&self) {
            self.wakes.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Wake for CountingWaker {}

    #[test]
    fn leaving_driver_promotes_and_wakes_one_other() {
        let first = CountingWaker::default();
        let second = CountingWaker::default();

        let mut set = WaiterSet::default();
        let slot1 = set.join(Arc::new(first.clone()).into_waker());
        let slot2 = set.join(Arc::new(second.clone()).into_waker());

        // slot2 joined last, so it is the driver; removing it must wake
        // exactly the one remaining waiter.
        set.leave(slot2);
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 0);

        set.leave(slot1);
        assert_eq!(first.count(), 1);
    }

    #[test]
    fn leaving_non_driver_wakes_nobody() {
        let first = CountingWaker::default();
        let second = CountingWaker::default();

        let mut set = WaiterSet::default();
        let slot1 = set.join(Arc::new(first.clone()).into_waker());
        let _slot2 = set.join(Arc::new(second.clone()).into_waker());

        set.leave(slot1);
        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 0);
    }

    #[test]
    fn complete_wakes_everyone_except_the_completer() {
        let wakers: Vec<CountingWaker> =
            (0..3).map(|_| CountingWaker::default()).collect();

        let mut set = WaiterSet::default();
        let mut slots: Vec<SlotId> = wakers
            .iter()
            .map(|w| set.join(Arc::new(w.clone()).into_waker()))
            .collect();

        let completer = slots.remove(1);
        set.complete(Some(completer));

        assert_eq!(wakers[0].count(), 1);
        assert_eq!(wakers[1].count(), 0);
        assert_eq!(wakers[2].count(), 1);
    }
}
