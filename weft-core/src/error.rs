//! Error types.
//!
//! Slot errors are usage errors: they mean a component declared its local
//! state conditionally or in a loop. The render context aborts the pass with
//! the error's message rather than returning it, because continuing would
//! hand the wrong state to the wrong declaration.
//!
//! Errors raised by a component's own render body are not wrapped here. They
//! come back from `Mounted::mount` and `Mounted::rebuild` as the component's
//! own error type.

use thiserror::Error;

use crate::component::{InstanceId, SlotKind};

/// Misuse of positional slot declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// More declarations of a kind than on the first pass.
    #[error(
        "{kind} slot #{index} requested on a later pass of {owner}, but only {recorded} \
         were declared on the first pass; local state must not be declared conditionally \
         or in a loop"
    )]
    Overflow {
        owner: InstanceId,
        kind: SlotKind,
        index: usize,
        recorded: usize,
    },

    /// Fewer declarations of a kind than on the first pass.
    #[error(
        "{owner} declared {declared} {kind} slots on this pass but {recorded} on the first pass"
    )]
    CountMismatch {
        owner: InstanceId,
        kind: SlotKind,
        declared: usize,
        recorded: usize,
    },

    /// The slot at this position holds a different type than requested.
    #[error("{kind} slot #{index} of {owner} does not hold a {expected}")]
    TypeMismatch {
        owner: InstanceId,
        kind: SlotKind,
        index: usize,
        expected: &'static str,
    },
}

/// Errors from the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rebuilds kept requesting further rebuilds past the configured bound.
    #[error("rebuilds did not settle after {rounds} flush rounds")]
    RebuildLoop { rounds: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors loading an `EngineConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid engine config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Convenience alias for engine results.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
