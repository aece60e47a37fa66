//! The problem-solver contract.
//!
//! Problem solvers are the pluggable computation units of a session:
//! heuristic scorers, abstraction formulas, interview agendas. The engine
//! knows nothing about what they compute; it only schedules them by priority
//! and hands them coalesced change batches. A solver reacts by writing new
//! values back through the session, which re-enters the engine.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::error::ClarosError;
use crate::fact::{self, Fact};
use crate::propagation::PropagationEntry;
use crate::session::Session;

/// Identifies a problem-solver class.
///
/// Exactly one solver per class may be active in a session. The class name
/// doubles as the stable tie-breaker when two solvers share a priority, and
/// as the key under which rules are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SolverClass(&'static str);

impl SolverClass {
    /// Creates a solver class from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the class name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SolverClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability tags a solver declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Contributes original facts (e.g. user input, imports).
    Source,
    /// Steers the interview agenda; receives strategic entries.
    Strategic,
    /// Derives problem-level facts (diagnoses, scores).
    Problem,
    /// Consumes derived facts without producing new ones.
    Consumer,
    /// Wants `post_propagate` invoked after each drain of the solver queues.
    PostHook,
}

/// Failure raised by a solver's own computation.
///
/// This type deliberately lives outside the engine's error taxonomy: the
/// engine contains solver failures at the invocation boundary (logged, the
/// solver is treated as having produced no output this round) and never
/// converts them into session errors.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The solver's computation failed.
    #[error("solver failure: {message}")]
    Failure {
        message: String,
    },

    /// A session operation invoked by the solver failed.
    #[error(transparent)]
    Session(#[from] ClarosError),
}

impl SolverError {
    /// Creates a failure with the given message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// A pluggable computation unit reacting to propagated changes.
///
/// # Contract
///
/// - `propagate` may write values back through the session; the resulting
///   re-entrant reports feed the already-running fixpoint loop.
/// - `merge_facts` must be pure: same input, same output, no side effects.
/// - Lower priority runs earlier; ties are broken by class-name ordering.
///
/// # Object safety
///
/// This trait is object-safe; sessions store solvers as
/// `Arc<dyn ProblemSolver>`.
pub trait ProblemSolver: Send + Sync {
    /// The class identifying this solver. Unique per session.
    fn class(&self) -> SolverClass;

    /// Scheduling priority. Lower runs earlier.
    fn priority(&self) -> f64;

    /// Capability tags. Consulted once per invocation, not cached.
    fn capabilities(&self) -> &[Capability];

    /// React to a batch of coalesced changes.
    ///
    /// Called at least once per outermost frame, possibly with an empty
    /// batch (supports one-shot initialization logic). Errors are contained
    /// by the engine: logged with this solver's identity, never fatal to the
    /// session.
    fn propagate(&self, session: &Session, entries: &[PropagationEntry]) -> Result<(), SolverError>;

    /// Resolve several of this solver's own facts for one object into one.
    ///
    /// Must be pure. The default keeps the newest fact.
    fn merge_facts(&self, facts: &[Fact]) -> Option<Fact> {
        fact::merge_last_wins(facts)
    }

    /// Hook invoked after each full drain of the solver queues.
    ///
    /// Only called when [`Capability::PostHook`] is declared. Receives the
    /// post-propagation batch accumulated since the previous pass.
    fn post_propagate(
        &self,
        session: &Session,
        entries: &[PropagationEntry],
    ) -> Result<(), SolverError> {
        let _ = (session, entries);
        Ok(())
    }

    /// Returns true if this solver declares the given capability.
    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_solver_object_safe(_: &dyn ProblemSolver) {}

    struct NoopSolver;

    impl ProblemSolver for NoopSolver {
        fn class(&self) -> SolverClass {
            SolverClass::new("noop")
        }

        fn priority(&self) -> f64 {
            5.0
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::Consumer]
        }

        fn propagate(
            &self,
            _session: &Session,
            _entries: &[PropagationEntry],
        ) -> Result<(), SolverError> {
            Ok(())
        }
    }

    #[test]
    fn test_solver_class_display_and_name() {
        let class = SolverClass::new("heuristic");
        assert_eq!(class.name(), "heuristic");
        assert_eq!(format!("{class}"), "heuristic");
    }

    #[test]
    fn test_solver_class_ordering() {
        assert!(SolverClass::new("a") < SolverClass::new("b"));
        assert_eq!(SolverClass::new("x"), SolverClass::new("x"));
    }

    #[test]
    fn test_has_capability() {
        let solver = NoopSolver;
        assert!(solver.has_capability(Capability::Consumer));
        assert!(!solver.has_capability(Capability::PostHook));
    }

    #[test]
    fn test_default_merge_facts_last_wins() {
        let solver = NoopSolver;
        let object = crate::object::ObjectId::new();
        let facts = vec![
            Fact::new(object, crate::value::Value::Int(1)),
            Fact::new(object, crate::value::Value::Int(2)),
        ];
        assert_eq!(
            solver.merge_facts(&facts),
            Some(Fact::new(object, crate::value::Value::Int(2)))
        );
    }

    #[test]
    fn test_solver_error_failure_display() {
        let err = SolverError::failure("division by zero");
        assert!(format!("{err}").contains("division by zero"));
    }
}
