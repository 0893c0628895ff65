use thiserror::Error;

/// Why a batch cycle failed.
///
/// A cycle fails as a unit: every caller that loaded a key into the window
/// observes the same error, including callers whose chunk had already been
/// fetched successfully. The error is cloned out to each caller, so the
/// fetcher's error type must be `Clone`. The next `load` against the group
/// starts a fresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalesceError<E> {
    /// The bulk fetch for one of the cycle's chunks failed.
    #[error("bulk fetch failed: {0}")]
    Fetch(E),

    /// An ordered reply did not line up one-to-one with the chunk that
    /// requested it. This is a fetcher bug; it fails the cycle rather than
    /// mis-assigning values.
    #[error("fetch returned {got} values for a chunk of {expected} keys")]
    Shape { expected: usize, got: usize },
}
