use crate::abstraction::BuildState;
use thiserror::Error;

/// Validation failures on the query path. All of these leave the
/// abstraction exactly as it was before the call.
///
/// A missing path-cache entry during stitching is deliberately *not* here:
/// it can only mean the abstraction's invariants were broken, so it aborts
/// with a panic instead of surfacing as a recoverable error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("start or goal tile reference is missing or outside the map")]
    NullEndpoint,
    #[error("endpoint node has abstraction level {0}, expected a level-0 tile")]
    NonZeroAbstractionLevel(u8),
    #[error("endpoint tile is an obstacle or has zero clearance for its own terrain")]
    NonTraversableEndpoint,
    #[error("operation is not valid in build state {0:?}")]
    InvalidState(BuildState),
}
