//! Bulkloader merges many independent single-key lookups into a small number
//! of bulk remote calls, then routes each bulk reply back to the callers
//! that asked. Callers stay oblivious: each one requests exactly the item it
//! wants and awaits exactly that item's result. The common use case is a UI
//! or service layer where dozens of components each look up one record
//! (token metadata, an ownership row, a market listing) against an endpoint
//! that is far cheaper to query in pages.
//!
//! Three things distinguish this from a plain request batcher:
//!
//! - **Grouping.** Requests are partitioned by a group key (say, the remote
//!   collection they belong to). Each group batches independently, with its
//!   own debounce window and its own bulk calls.
//! - **Chunking.** When a window closes, the accumulated keys are fetched in
//!   fixed-size chunks, one bulk call after another, so a burst of hundreds
//!   of lookups cannot produce an oversized remote request.
//! - **Two reply shapes.** A bulk endpoint either answers positionally (one
//!   value per requested key, in order) or content-addressed (a few
//!   composite records, each naming the keys it answers). The fetcher tags
//!   its [`Reply`] accordingly; nothing guesses from the data's shape.
//!
//! ## Overview
//!
//! Configure a [`Coalescer`] once with [`CoalesceRules`]: the bulk fetch
//! function, the debounce-window constructor, and the chunk size. The rules
//! are passed by reference so the fetcher can be shared by every cycle.
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use bulkloader::{CoalesceRules, Coalescer, Reply};
//! use futures::{executor, future};
//!
//! // One bulk call answers a whole chunk of ids for one collection.
//! async fn fetch_labels(
//!     collection: u32,
//!     ids: Vec<u64>,
//! ) -> Result<Reply<u64, String>, String> {
//!     Ok(Reply::ordered(
//!         ids.iter().map(|id| format!("{collection}/{id}")).collect(),
//!     ))
//! }
//!
//! let rules = CoalesceRules {
//!     fetcher: fetch_labels,
//!     window: || future::ready(()),
//!     chunk: NonZeroUsize::new(25).unwrap(),
//! };
//! let coalescer = Coalescer::new(&rules);
//!
//! // Independent callers each load one item. Both keys land in the same
//! // batch window, so the fetcher runs once for both.
//! let first = coalescer.load(7, 1);
//! let second = coalescer.load(7, 2);
//!
//! assert_eq!(executor::block_on(first), Ok(Some("7/1".to_string())));
//! assert_eq!(executor::block_on(second), Ok(Some("7/2".to_string())));
//! ```
//!
//! In production the window is an async sleep, typically
//! `|| Delay::new(DEFAULT_WINDOW)` with `futures-timer` or the equivalent
//! from your runtime, and the chunk size is [`DEFAULT_CHUNK`]. Because the
//! window is just a
//! `Fn() -> impl Future`, tests substitute `future::ready(())` to flush on
//! the first poll, with no real clock involved.
//!
//! ## Content-addressed replies
//!
//! Some bulk endpoints do not return one value per key. A market-listing
//! endpoint, for instance, returns listing records, each covering several
//! token ids. Such a fetcher returns [`Reply::keyed`], built from records
//! that implement [`KeyedRecord`]: the trait names the keys a record
//! answers, so the demultiplexing never has to parse record internals.
//! Requested keys that no record names resolve to `Ok(None)`: an explicit
//! miss, not an error.
//!
//! ```
//! use std::num::NonZeroUsize;
//!
//! use bulkloader::{CoalesceRules, Coalescer, KeyedRecord, Reply};
//! use futures::{executor, future};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Listing {
//!     token_ids: Vec<u64>,
//!     price: u64,
//! }
//!
//! impl KeyedRecord<u64> for Listing {
//!     fn keys(&self) -> Vec<u64> {
//!         self.token_ids.clone()
//!     }
//! }
//!
//! async fn fetch_listings(
//!     _collection: &'static str,
//!     _ids: Vec<u64>,
//! ) -> Result<Reply<u64, Listing>, String> {
//!     Ok(Reply::keyed(vec![
//!         Listing { token_ids: vec![3, 7], price: 40 },
//!         Listing { token_ids: vec![9], price: 75 },
//!     ]))
//! }
//!
//! let rules = CoalesceRules {
//!     fetcher: fetch_listings,
//!     window: || future::ready(()),
//!     chunk: NonZeroUsize::new(25).unwrap(),
//! };
//! let coalescer = Coalescer::new(&rules);
//!
//! let listed = coalescer.load("gallery", 3);
//! let unlisted = coalescer.load("gallery", 5);
//!
//! let listing = executor::block_on(listed).unwrap();
//! assert_eq!(listing.map(|listing| listing.price), Some(40));
//!
//! assert_eq!(executor::block_on(unlisted), Ok(None));
//! ```
//!
//! ## Failure semantics
//!
//! A cycle fails as a unit. If the fetcher errors on any chunk, every caller
//! of that cycle (including those whose chunk had already been fetched)
//! rejects with that same error, and no further chunks are requested. The
//! coalescer never retries; the next `load` simply opens a fresh window, so
//! retry policy belongs entirely to the callers.
//!
//! ## Design notes
//!
//! ### Poll-driven, runtime-agnostic
//!
//! The coalescer spawns no tasks and assumes no executor. The futures
//! returned by [`Coalescer::load`] cooperatively drive their cycle's shared
//! state: the window delay, then each chunk's fetch future, run inside
//! whichever caller happens to poll. Only one caller (the most recent
//! poller) needs to do the driving, so the others park their wakers and
//! sleep until the cycle settles. If the driving future is dropped
//! mid-cycle, one parked waiter is woken to take over, keeping the chain of
//! polls unbroken.
//!
//! ### Windows are fixed, not rolling
//!
//! The debounce window is created when a group's cycle opens and is never
//! extended: a steady trickle of requests cannot keep a batch open forever.
//! Requests that arrive after the window has closed open the group's next
//! cycle and fetch in the following batch.
//!
//! ### Duplicate keys share one outcome
//!
//! Concurrent loads of the same key in the same window share a single queue
//! slot and resolve from a single stored value (cloned once per caller),
//! rather than fetching the key twice.

mod coalescer;
mod cycle;
mod error;
mod future;
mod queue;
mod reply;
mod waiters;

pub use coalescer::{CoalesceRules, Coalescer, DEFAULT_CHUNK, DEFAULT_WINDOW};
pub use error::CoalesceError;
pub use future::LoadFuture;
pub use reply::{KeyedRecord, Reply};
