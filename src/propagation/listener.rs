//! Propagation lifecycle listeners.

use crate::session::Session;
use crate::solver::SolverClass;

use super::entry::PropagationEntry;

/// Observer of a session's propagation lifecycle.
///
/// Listeners are invoked synchronously on the propagating thread, outside
/// the controller's internal locks; they may read session state but should
/// return quickly. All methods default to no-ops so implementors override
/// only what they care about.
#[allow(unused_variables)]
pub trait PropagationListener: Send + Sync {
    /// An outermost frame started distributing; `entries` is the global
    /// batch accumulated so far (not cleared by this event).
    fn frame_started(&self, session: &Session, entries: &[PropagationEntry]) {}

    /// The solver queues drained and a post-propagation pass is about to
    /// run; `entries` is the post batch accumulated since the previous pass.
    fn post_propagation_started(&self, session: &Session, entries: &[PropagationEntry]) {}

    /// A solver is about to receive `entries`.
    fn propagating(&self, session: &Session, solver: SolverClass, entries: &[PropagationEntry]) {}

    /// The outermost frame finished (normally or not); `entries` is the full
    /// global batch of the frame.
    fn frame_finished(&self, session: &Session, entries: &[PropagationEntry]) {}
}
