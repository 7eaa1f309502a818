//! Error types for gradtape.

use crate::autodiff::TapeId;
use thiserror::Error;

/// Errors that can occur while recording or querying a gradient tape.
///
/// "No gradient" (an unwatched or disconnected input) is not an error;
/// gradient queries report it as `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TapeError {
    /// Shape mismatch between data length and expected size.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Operand shapes cannot be combined elementwise.
    #[error("incompatible shapes {lhs:?} and {rhs:?}")]
    IncompatibleShapes { lhs: Vec<usize>, rhs: Vec<usize> },

    /// A non-persistent tape was queried after its first gradient call.
    #[error("{tape} has already been used; open it as persistent to query it more than once")]
    TapeExhausted { tape: TapeId },

    /// The tape id does not name a tape that is currently recording.
    #[error("{tape} is not open")]
    TapeNotOpen { tape: TapeId },

    /// Tapes must be closed innermost first.
    #[error("cannot close {tape} while {innermost} is still recording")]
    TapeNotInnermost { tape: TapeId, innermost: TapeId },
}
