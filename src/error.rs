//! Error types for claros.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.
//! Note that problem-solver failures are deliberately NOT part of this
//! taxonomy: they are contained at the invocation boundary and logged, never
//! surfaced to the caller (see [`crate::solver::SolverError`]).

use thiserror::Error;
use uuid::Uuid;

use crate::rule::ConditionError;
use crate::session::SessionId;
use crate::solver::SolverClass;

/// API misuse that fails fast at the call site.
///
/// These are programming errors in the embedding application, never
/// recoverable conditions of a running session.
#[derive(Debug, Error)]
pub enum MisuseError {
    #[error("commit_frame called without an open frame")]
    CommitWithoutOpenFrame,

    #[error("solver class '{class}' is already active in this session")]
    DuplicateSolver {
        class: SolverClass,
    },

    #[error("a session requires a value store")]
    MissingValueStore,

    #[error("session state for source {source_id} was created with a different type")]
    StateTypeMismatch {
        source_id: Uuid,
    },
}

/// Top-level error type for claros.
///
/// This enum encompasses all possible errors that can surface
/// from a propagation session.
#[derive(Debug, Error)]
pub enum ClarosError {
    /// The session was cooperatively cancelled and is poisoned. Its state is
    /// undefined; replay the recorded inputs into a fresh session instead of
    /// attempting repair.
    #[error("diagnosis session {session} aborted, state undefined")]
    Terminated {
        session: SessionId,
    },

    #[error("misuse: {0}")]
    Misuse(#[from] MisuseError),

    #[error("condition evaluation failed: {0}")]
    Condition(#[from] ConditionError),

    #[error("internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ClarosError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a terminated-session error.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }

    /// Returns true if this is a misuse error.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse(_))
    }

    /// Returns true if this is a condition evaluation error.
    #[must_use]
    pub const fn is_condition(&self) -> bool {
        matches!(self, Self::Condition(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for claros operations.
pub type ClarosResult<T> = Result<T, ClarosError>;
