//! The action contract rules are built on.

use crate::error::ClarosResult;
use crate::object::ObjectId;
use crate::session::Session;

/// What a rule does when it fires, and how it backtracks.
///
/// Actions typically write values through the session, which re-enters the
/// propagation engine; the frame-nesting discipline makes that safe.
pub trait RuleAction: Send + Sync {
    /// The objects this action may write.
    ///
    /// Used to build backward knowledge-index entries when the owning rule
    /// is indexed under a solver class.
    fn backward_objects(&self) -> Vec<ObjectId>;

    /// Executes the action.
    fn do_it(&self, session: &Session) -> ClarosResult<()>;

    /// Backtracks the action when the rule's condition no longer holds.
    fn undo(&self, session: &Session) -> ClarosResult<()>;

    /// Re-runs the action while the condition stays satisfied but a forward
    /// object it depends on changed. Defaults to undo followed by do_it.
    fn update(&self, session: &Session) -> ClarosResult<()> {
        self.undo(session)?;
        self.do_it(session)
    }
}
