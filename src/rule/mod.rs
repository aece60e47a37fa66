//! Rules and the firing state machine.
//!
//! A rule couples a condition (plus optional exception) to an action, under
//! an owning solver class. Rules are knowledge-base level objects shared
//! across sessions; the per-session fired-flag therefore lives in the
//! session's side-table, keyed by rule identity.

mod action;
mod condition;
mod knowledge;
mod solver;

pub use action::RuleAction;
pub use condition::{Condition, ConditionError};
pub use knowledge::{Direction, KnowledgeBase, KnowledgeIndex, RuleSet};
pub use solver::RuleBasedSolver;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClarosResult;
use crate::object::ObjectId;
use crate::session::Session;
use crate::solver::SolverClass;

/// Stable identifier of a rule: the synthetic identity the engine uses
/// everywhere two value-equal but distinct rule instances must stay apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    /// Creates a new random rule ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session state of one rule.
#[derive(Debug, Default)]
struct RuleState {
    fired: bool,
}

/// A condition/exception/action triple under an owning solver class.
pub struct Rule {
    id: RuleId,
    condition: Arc<dyn Condition>,
    exception: Option<Arc<dyn Condition>>,
    action: Arc<dyn RuleAction>,
    solver_context: Option<SolverClass>,
}

impl Rule {
    /// Creates a rule with no exception and no solver context.
    ///
    /// A rule without a solver context contributes no knowledge-index
    /// entries; assign one here or via
    /// [`KnowledgeBase::set_solver_context`].
    #[must_use]
    pub fn new(condition: Arc<dyn Condition>, action: Arc<dyn RuleAction>) -> Self {
        Self {
            id: RuleId::new(),
            condition,
            exception: None,
            action,
            solver_context: None,
        }
    }

    /// Adds an exception condition.
    #[must_use]
    pub fn with_exception(mut self, exception: Arc<dyn Condition>) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Assigns the owning solver class.
    #[must_use]
    pub fn with_solver_context(mut self, class: SolverClass) -> Self {
        self.solver_context = Some(class);
        self
    }

    /// The rule's identity.
    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    /// The primary condition.
    #[must_use]
    pub fn condition(&self) -> &Arc<dyn Condition> {
        &self.condition
    }

    /// The exception condition, if any.
    #[must_use]
    pub fn exception(&self) -> Option<&Arc<dyn Condition>> {
        self.exception.as_ref()
    }

    /// The action.
    #[must_use]
    pub fn action(&self) -> &Arc<dyn RuleAction> {
        &self.action
    }

    /// The owning solver class, if any.
    #[must_use]
    pub const fn solver_context(&self) -> Option<SolverClass> {
        self.solver_context
    }

    pub(crate) fn set_solver_context_raw(&mut self, context: Option<SolverClass>) {
        self.solver_context = context;
    }

    pub(crate) fn set_action_raw(&mut self, action: Arc<dyn RuleAction>) {
        self.action = action;
    }

    /// The objects this rule reads: condition terminals plus exception
    /// terminals.
    #[must_use]
    pub fn forward_objects(&self) -> Vec<ObjectId> {
        let mut objects = self.condition.terminal_objects();
        if let Some(exception) = &self.exception {
            objects.extend(exception.terminal_objects());
        }
        objects
    }

    /// The objects this rule's action may write.
    #[must_use]
    pub fn backward_objects(&self) -> Vec<ObjectId> {
        self.action.backward_objects()
    }

    /// Whether this rule has fired in the given session.
    pub fn has_fired(&self, session: &Session) -> ClarosResult<bool> {
        session
            .objects()
            .with_state::<RuleState, bool>(*self.id.as_uuid(), |state| state.fired)
    }

    fn set_fired(&self, session: &Session, fired: bool) -> ClarosResult<()> {
        session
            .objects()
            .with_state::<RuleState, ()>(*self.id.as_uuid(), |state| state.fired = fired)
    }

    /// Whether the rule may fire right now.
    ///
    /// The exception is evaluated first; any evaluation failure of the
    /// exception is swallowed: an unanswerable exception is no exception.
    /// A missing-answer failure of the primary condition is swallowed here
    /// as `Ok(false)`; an unknown-answer failure is NOT caught at this
    /// level and propagates to the caller, which reads it as "cannot fire"
    /// as well.
    pub fn can_fire(&self, session: &Session) -> Result<bool, ConditionError> {
        if let Some(exception) = &self.exception {
            if exception.eval(session).unwrap_or(false) {
                return Ok(false);
            }
        }
        match self.condition.eval(session) {
            Ok(fulfilled) => Ok(fulfilled),
            Err(ConditionError::MissingAnswer { .. }) => Ok(false),
            Err(err @ ConditionError::UnknownAnswer { .. }) => Err(err),
        }
    }

    /// Re-checks the rule against the session and drives the firing state
    /// machine.
    ///
    /// Transitions:
    /// - not fired, can fire → mark fired, execute the action (`do_it`)
    /// - fired, can fire → re-run the action's incremental `update`
    /// - fired, cannot fire → backtrack (`undo`), mark not fired
    /// - not fired, cannot fire → no-op
    pub fn check(&self, session: &Session) -> ClarosResult<()> {
        let can_fire = self.can_fire(session).unwrap_or(false);
        let fired = self.has_fired(session)?;
        match (fired, can_fire) {
            (false, true) => {
                self.set_fired(session, true)?;
                self.action.do_it(session)
            }
            (true, true) => self.action.update(session),
            (true, false) => {
                self.action.undo(session)?;
                self.set_fired(session, false)
            }
            (false, false) => Ok(()),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("has_exception", &self.exception.is_some())
            .field("solver_context", &self.solver_context)
            .finish_non_exhaustive()
    }
}
