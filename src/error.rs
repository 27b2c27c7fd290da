//! Error types returned at the public boundary of the physics core.
//!
//! Numerical degradation (iteration caps in GJK, TOI or the constraint
//! solver) is never an error. It shows up in [`StepStats`](crate::physics::StepStats)
//! and in the `state` field of distance and TOI outputs instead.

use crate::physics::joint::JointKind;

/// Errors reported by the physics core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    /// Malformed input rejected at the boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A structural mutation was attempted while the world is locked.
    #[error("wrong state: cannot {operation} while the world is locked")]
    WrongState { operation: &'static str },

    /// A joint accessor was called on a kind that does not define it.
    #[error("{operation} is not supported by {kind} joints")]
    UnsupportedOperation {
        operation: &'static str,
        kind: JointKind,
    },

    /// A handle that does not name a live entity, either never issued or
    /// kept past its entity's destruction.
    #[error("invalid {entity} id {index} (generation {generation})")]
    InvalidId {
        entity: &'static str,
        index: u32,
        generation: u32,
    },
}

impl PhysicsError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PhysicsError>;
