//! Sessions: the unit of a diagnostic interaction.
//!
//! A session owns exactly one propagation controller, one value store
//! handle, a priority-ordered set of active problem solvers, and a
//! side-table for per-session state of shared knowledge objects (a rule's
//! fired-flag lives there, never on the rule itself, since rules are
//! shared across sessions).

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClarosResult, MisuseError};
use crate::object::ObjectId;
use crate::propagation::{PropagationController, PropagationListener};
use crate::solver::{ProblemSolver, SolverClass};
use crate::store::ValueStore;
use crate::value::Value;

/// Globally unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a session ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session state for shared knowledge-base objects.
///
/// Knowledge objects (rules, agenda items) are shared across sessions, so
/// their mutable per-session state cannot live on the objects themselves.
/// This side-table maps a source's stable identity to owned state, created
/// lazily from `Default`.
#[derive(Default)]
pub struct SessionObjects {
    map: Mutex<HashMap<Uuid, Box<dyn Any + Send>>>,
}

impl SessionObjects {
    /// Runs `f` against the state stored for `source`, creating it from
    /// `Default` on first access.
    ///
    /// # Errors
    ///
    /// `MisuseError::StateTypeMismatch` if the state under `source` was
    /// created with a different type.
    pub fn with_state<S, R>(&self, source: Uuid, f: impl FnOnce(&mut S) -> R) -> ClarosResult<R>
    where
        S: Default + Send + 'static,
    {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = map.entry(source).or_insert_with(|| Box::new(S::default()));
        let state = slot
            .downcast_mut::<S>()
            .ok_or(MisuseError::StateTypeMismatch { source_id: source })?;
        Ok(f(state))
    }
}

impl fmt::Debug for SessionObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("SessionObjects").field("len", &len).finish()
    }
}

/// Builder for [`Session`].
///
/// All configuration is explicit. There is no process-global solver list
/// or listener registry.
#[derive(Default)]
pub struct SessionBuilder {
    store: Option<Arc<dyn ValueStore>>,
    solvers: Vec<Arc<dyn ProblemSolver>>,
    listeners: Vec<Arc<dyn PropagationListener>>,
    created: Option<DateTime<Utc>>,
}

impl SessionBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value store (required).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds an active problem solver.
    #[must_use]
    pub fn solver(mut self, solver: Arc<dyn ProblemSolver>) -> Self {
        self.solvers.push(solver);
        self
    }

    /// Registers a propagation listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn PropagationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Overrides the creation timestamp (defaults to now).
    #[must_use]
    pub fn created(mut self, time: DateTime<Utc>) -> Self {
        self.created = Some(time);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// - `MisuseError::MissingValueStore` when no store was set.
    /// - `MisuseError::DuplicateSolver` when two solvers share a class.
    pub fn build(self) -> ClarosResult<Session> {
        let store = self.store.ok_or(MisuseError::MissingValueStore)?;

        let mut classes = HashSet::new();
        for solver in &self.solvers {
            if !classes.insert(solver.class()) {
                return Err(MisuseError::DuplicateSolver {
                    class: solver.class(),
                }
                .into());
            }
        }

        let mut solvers = self.solvers;
        solvers.sort_by(solver_order);

        let session = Session {
            id: SessionId::new(),
            created: self.created.unwrap_or_else(Utc::now),
            store,
            solvers: Mutex::new(solvers),
            controller: PropagationController::new(),
            objects: SessionObjects::default(),
        };
        for listener in self.listeners {
            session.controller.add_listener(listener);
        }
        Ok(session)
    }
}

/// Priority ascending, ties broken by class name: the stable solver
/// invocation order of a session.
fn solver_order(a: &Arc<dyn ProblemSolver>, b: &Arc<dyn ProblemSolver>) -> std::cmp::Ordering {
    a.priority()
        .total_cmp(&b.priority())
        .then_with(|| a.class().name().cmp(b.class().name()))
}

/// One diagnostic interaction: facts come in, derivations come out.
///
/// A session is single-threaded by contract; [`terminate`](Self::terminate)
/// is the sole operation designed to be called from another thread.
pub struct Session {
    id: SessionId,
    created: DateTime<Utc>,
    store: Arc<dyn ValueStore>,
    solvers: Mutex<Vec<Arc<dyn ProblemSolver>>>,
    controller: PropagationController,
    objects: SessionObjects,
}

impl Session {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The session's identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// When the session was created.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// The value store this session consults.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ValueStore> {
        &self.store
    }

    /// The propagation controller.
    #[must_use]
    pub const fn controller(&self) -> &PropagationController {
        &self.controller
    }

    /// The per-session state side-table.
    #[must_use]
    pub const fn objects(&self) -> &SessionObjects {
        &self.objects
    }

    /// The active solvers, in invocation order.
    #[must_use]
    pub fn solvers(&self) -> Vec<Arc<dyn ProblemSolver>> {
        self.solvers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Adds a solver to the active set.
    ///
    /// A solver added while a frame is open gets no queue until the next
    /// outer frame; re-activate it against already-known facts with
    /// `report(object, old, Some(class))` calls after the current frame
    /// commits.
    ///
    /// # Errors
    ///
    /// `MisuseError::DuplicateSolver` when a solver of the same class is
    /// already active.
    pub fn add_solver(&self, solver: Arc<dyn ProblemSolver>) -> ClarosResult<()> {
        let mut solvers = self.solvers.lock().unwrap_or_else(PoisonError::into_inner);
        if solvers.iter().any(|s| s.class() == solver.class()) {
            return Err(MisuseError::DuplicateSolver {
                class: solver.class(),
            }
            .into());
        }
        solvers.push(solver);
        solvers.sort_by(solver_order);
        Ok(())
    }

    /// Opens a (possibly nested) propagation frame.
    pub fn open_frame(&self, time: Option<DateTime<Utc>>) {
        self.controller.open_frame(self, time);
    }

    /// Commits a propagation frame; the outermost commit runs the fixpoint
    /// loop.
    pub fn commit_frame(&self) -> ClarosResult<()> {
        self.controller.commit_frame(self)
    }

    /// Reports a value change that was already written to the store.
    pub fn report(
        &self,
        object: ObjectId,
        old_value: Value,
        solver: Option<SolverClass>,
    ) -> ClarosResult<()> {
        self.controller.report(self, object, old_value, solver)
    }

    /// Reports an indication change; delivered as a strategic entry.
    pub fn report_indication(
        &self,
        object: ObjectId,
        old_indication: Value,
        solver: Option<SolverClass>,
    ) -> ClarosResult<()> {
        self.controller
            .report_indication(self, object, old_indication, solver)
    }

    /// Marks `object` forced for the rest of the outer frame, then reports.
    pub fn force_report(&self, object: ObjectId, old_value: Value) -> ClarosResult<()> {
        self.controller.force_report(self, object, old_value)
    }

    /// Writes a value to the store and reports the change.
    pub fn write_value(&self, object: ObjectId, value: Value) -> ClarosResult<()> {
        let old = self.store.write_value(object, value);
        self.report(object, old, None)
    }

    /// Writes an indication to the store and reports it strategically.
    pub fn write_indication(&self, object: ObjectId, value: Value) -> ClarosResult<()> {
        let old = self.store.write_indication(object, value);
        self.report_indication(object, old, None)
    }

    /// Cooperatively cancels the session. See
    /// [`PropagationController::terminate`].
    pub fn terminate(&self) {
        self.controller.terminate();
    }

    /// Returns true once the session has been terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.controller.is_terminated()
    }

    /// Returns true while a propagation frame is open.
    #[must_use]
    pub fn in_propagation(&self) -> bool {
        self.controller.in_propagation()
    }

    /// Logical timestamp of the current outer frame, if one is open.
    #[must_use]
    pub fn current_frame_time(&self) -> Option<DateTime<Utc>> {
        self.controller.current_frame_time()
    }

    /// Returns true if `object` is marked forced in the current frame.
    #[must_use]
    pub fn is_forced(&self, object: ObjectId) -> bool {
        self.controller.is_forced(object)
    }

    /// Advisory watermark: changes at or before this time are not
    /// guaranteed to re-derive identically.
    #[must_use]
    pub fn time_of_no_return(&self) -> Option<DateTime<Utc>> {
        self.controller.time_of_no_return()
    }

    /// Sets the time-of-no-return watermark.
    pub fn set_time_of_no_return(&self, time: Option<DateTime<Utc>>) {
        self.controller.set_time_of_no_return(time);
    }

    /// Registers a propagation listener.
    pub fn add_listener(&self, listener: Arc<dyn PropagationListener>) {
        self.controller.add_listener(listener);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}
