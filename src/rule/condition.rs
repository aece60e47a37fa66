//! The condition contract rules are built on.
//!
//! The condition-expression language itself lives outside this crate; the
//! engine only needs to evaluate a condition against a session and to learn
//! which objects it reads (for forward indexing).

use thiserror::Error;

use crate::object::ObjectId;
use crate::session::Session;

/// Why a condition could not be evaluated.
///
/// The rule-firing state machine distinguishes the two failure kinds: a
/// missing answer is swallowed inside `can_fire`, while an explicit
/// "unknown" answer propagates one level further before being treated the
/// same way. See [`Rule::can_fire`](crate::rule::Rule::can_fire).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The condition reads an object with no recorded answer at all.
    #[error("no answer recorded for object {object}")]
    MissingAnswer {
        object: ObjectId,
    },

    /// The condition reads an object explicitly answered "unknown".
    #[error("object {object} was answered \"unknown\"")]
    UnknownAnswer {
        object: ObjectId,
    },
}

/// A boolean expression over session values.
pub trait Condition: Send + Sync {
    /// Evaluates the condition against the session's current values.
    fn eval(&self, session: &Session) -> Result<bool, ConditionError>;

    /// The objects whose values this condition reads.
    ///
    /// Used to build forward knowledge-index entries when the owning rule
    /// is indexed under a solver class.
    fn terminal_objects(&self) -> Vec<ObjectId>;
}
