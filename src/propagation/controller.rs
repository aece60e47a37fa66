//! The frame controller and fixpoint loop.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, error};

use crate::error::{ClarosError, ClarosResult, MisuseError};
use crate::object::ObjectId;
use crate::session::Session;
use crate::solver::{Capability, ProblemSolver, SolverClass};
use crate::value::Value;

use super::entry::PropagationEntry;
use super::listener::PropagationListener;
use super::queue::SolverQueue;

/// One record of the global/post batches: the earliest reported old value
/// and whether the report was strategic (indication) or ordinary.
#[derive(Debug, Clone)]
struct BatchRecord {
    old_value: Value,
    strategic: bool,
}

/// Mutable frame state. Exists behind a mutex that is never held across a
/// solver or listener invocation; re-entrancy is handled by the frame
/// nesting discipline, not by the lock.
#[derive(Debug, Default)]
struct FrameState {
    /// Frame nesting counter. Solver queues exist iff `depth > 0`.
    depth: u32,

    /// Logical timestamp of the current outer frame.
    frame_time: Option<DateTime<Utc>>,

    /// One queue per solver active when the outer frame opened. Solvers
    /// added mid-frame get no queue until the next frame.
    queues: HashMap<SolverClass, SolverQueue>,

    /// Objects marked forced; persists for the remainder of the outer frame.
    forced: HashSet<ObjectId>,

    /// Everything reported this outer frame, for frame lifecycle events.
    /// Cleared when the outer frame finishes.
    global_batch: IndexMap<ObjectId, BatchRecord>,

    /// Everything reported since the last post-propagation pass. Cleared
    /// when a pass actually runs.
    post_batch: IndexMap<ObjectId, BatchRecord>,
}

/// The reentrant open/commit transaction over a session's solver queues,
/// and the fixpoint loop that drains them.
///
/// Exactly one controller exists per [`Session`]. All methods expect the
/// owning session as an argument; the session's public surface delegates
/// here.
pub struct PropagationController {
    state: Mutex<FrameState>,
    listeners: Mutex<Vec<Arc<dyn PropagationListener>>>,
    terminated: AtomicBool,
    time_of_no_return: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for PropagationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationController")
            .field("terminated", &self.terminated.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PropagationController {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FrameState::default()),
            listeners: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            time_of_no_return: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a (possibly nested) frame.
    ///
    /// On the 0→1 transition the frame's logical timestamp is recorded
    /// (explicit `time`, else wall clock) and one fresh queue is created per
    /// currently active solver.
    pub fn open_frame(&self, session: &Session, time: Option<DateTime<Utc>>) {
        let solvers = session.solvers();
        let mut st = self.state();
        st.depth += 1;
        if st.depth == 1 {
            st.frame_time = Some(time.unwrap_or_else(Utc::now));
            for solver in &solvers {
                st.queues.insert(solver.class(), SolverQueue::new());
            }
            debug!(session = %session.id(), "outermost frame opened");
        }
    }

    /// Commits a frame.
    ///
    /// When the nesting counter was 1 at entry this runs the fixpoint loop,
    /// emits the frame-finished event, then tears down every solver queue
    /// and clears the forced set and global batch; the counter is
    /// decremented after that work on every path. Nested commits merely
    /// decrement; changes they reported feed the already-running loop.
    pub fn commit_frame(&self, session: &Session) -> ClarosResult<()> {
        {
            let mut st = self.state();
            match st.depth {
                0 => return Err(MisuseError::CommitWithoutOpenFrame.into()),
                1 => {}
                _ => {
                    st.depth -= 1;
                    return Ok(());
                }
            }
        }

        let result = self.distribute(session);

        let finished = self.global_batch_entries(session);
        self.emit(|l| l.frame_finished(session, &finished));

        {
            let mut st = self.state();
            st.queues.clear();
            st.forced.clear();
            st.global_batch.clear();
            st.post_batch.clear();
            st.frame_time = None;
            st.depth -= 1;
        }
        debug!(session = %session.id(), "outermost frame committed");

        if self.terminated.load(Ordering::SeqCst) {
            return Err(ClarosError::Terminated { session: session.id() });
        }
        result
    }

    /// Reports a value change: open, enqueue, commit.
    ///
    /// With `solver == None` the change is enqueued into every solver's
    /// queue; with `Some(class)` only into that solver's queue (used to
    /// re-activate a newly added solver against already-known facts).
    pub fn report(
        &self,
        session: &Session,
        object: ObjectId,
        old_value: Value,
        solver: Option<SolverClass>,
    ) -> ClarosResult<()> {
        self.open_frame(session, None);
        self.enqueue_value(session, object, old_value, solver);
        self.commit_frame(session)
    }

    /// Reports an indication change; delivered as a strategic entry.
    pub fn report_indication(
        &self,
        session: &Session,
        object: ObjectId,
        old_indication: Value,
        solver: Option<SolverClass>,
    ) -> ClarosResult<()> {
        self.open_frame(session, None);
        {
            let mut st = self.state();
            for (class, queue) in &mut st.queues {
                if solver.map_or(true, |target| target == *class) {
                    queue.push_indication(object, old_indication.clone());
                }
            }
            let record = BatchRecord {
                old_value: old_indication,
                strategic: true,
            };
            st.global_batch.entry(object).or_insert_with(|| record.clone());
            st.post_batch.entry(object).or_insert(record);
        }
        self.commit_frame(session)
    }

    /// Marks `object` forced for the remainder of the outer frame, then
    /// behaves as [`report`](Self::report).
    pub fn force_report(
        &self,
        session: &Session,
        object: ObjectId,
        old_value: Value,
    ) -> ClarosResult<()> {
        self.open_frame(session, None);
        self.state().forced.insert(object);
        self.enqueue_value(session, object, old_value, None);
        self.commit_frame(session)
    }

    /// One-way cooperative cancellation, callable from any thread.
    ///
    /// Checked before each solver invocation and before each
    /// post-propagation pass. Once tripped, every completion of the
    /// outermost commit fails with a terminated-session error and the
    /// session must not be propagated on again.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`terminate`](Self::terminate) has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Returns true while a frame is open.
    #[must_use]
    pub fn in_propagation(&self) -> bool {
        self.state().depth > 0
    }

    /// Logical timestamp of the current outer frame, if one is open.
    #[must_use]
    pub fn current_frame_time(&self) -> Option<DateTime<Utc>> {
        self.state().frame_time
    }

    /// Returns true if `object` is marked forced in the current frame.
    #[must_use]
    pub fn is_forced(&self, object: ObjectId) -> bool {
        self.state().forced.contains(&object)
    }

    /// Advisory watermark: changes at or before this time are not
    /// guaranteed to re-derive identically. Solvers may consult it to
    /// decide between replaying and patching.
    #[must_use]
    pub fn time_of_no_return(&self) -> Option<DateTime<Utc>> {
        *self
            .time_of_no_return
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the time-of-no-return watermark.
    pub fn set_time_of_no_return(&self, time: Option<DateTime<Utc>>) {
        *self
            .time_of_no_return
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = time;
    }

    /// Registers a propagation listener.
    pub fn add_listener(&self, listener: Arc<dyn PropagationListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn enqueue_value(
        &self,
        session: &Session,
        object: ObjectId,
        old_value: Value,
        solver: Option<SolverClass>,
    ) {
        // Read the store before taking the state lock; hazard bookkeeping
        // needs the value as of report time.
        let current = session.store().current_value(object);
        let mut st = self.state();
        for (class, queue) in &mut st.queues {
            if solver.map_or(true, |target| target == *class) {
                queue.push(object, old_value.clone(), &current);
            }
        }
        let record = BatchRecord {
            old_value,
            strategic: false,
        };
        st.global_batch.entry(object).or_insert_with(|| record.clone());
        st.post_batch.entry(object).or_insert(record);
    }

    /// The fixpoint loop. Runs exactly once per outermost frame.
    fn distribute(&self, session: &Session) -> ClarosResult<()> {
        let started = self.global_batch_entries(session);
        self.emit(|l| l.frame_started(session, &started));

        loop {
            if let Some(solver) = self.next_pending_solver(session) {
                self.check_termination(session)?;
                let entries = self.build_delivery(session, solver.class());
                self.emit(|l| l.propagating(session, solver.class(), &entries));
                invoke_guarded(session, &*solver, &entries, false);
            } else {
                let post = self.take_post_batch(session);
                self.emit(|l| l.post_propagation_started(session, &post));
                self.check_termination(session)?;
                for solver in session.solvers() {
                    if solver.has_capability(Capability::PostHook) {
                        invoke_guarded(session, &*solver, &post, true);
                    }
                }
                // Hooks may have reported new changes; fixpoint is reached
                // only when a full re-scan still finds nothing pending.
                if self.next_pending_solver(session).is_none() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Picks the first solver, in priority order, whose queue has pending
    /// entries or has not yet run this frame.
    fn next_pending_solver(&self, session: &Session) -> Option<Arc<dyn ProblemSolver>> {
        let solvers = session.solvers();
        let st = self.state();
        for solver in solvers {
            if let Some(queue) = st.queues.get(&solver.class()) {
                if !queue.has_propagated || queue.has_pending() {
                    return Some(solver);
                }
            }
        }
        None
    }

    /// Builds one solver's delivery and consumes its queue.
    ///
    /// New values are read from the store at build time, not at enqueue
    /// time; this is what coalesces intra-frame write bursts into a single
    /// before/after pair.
    fn build_delivery(&self, session: &Session, class: SolverClass) -> Vec<PropagationEntry> {
        let (entries, hazards, indications, forced) = {
            let mut st = self.state();
            let forced = st.forced.clone();
            match st.queues.get_mut(&class) {
                Some(queue) => {
                    queue.has_propagated = true;
                    let (entries, hazards, indications) = queue.drain();
                    (entries, hazards, indications, forced)
                }
                None => return Vec::new(),
            }
        };

        let store = session.store();
        let mut out = Vec::with_capacity(entries.len() + indications.len());
        for (object, old_value) in entries {
            let mut entry = PropagationEntry::new(object, old_value, store.current_value(object));
            entry.forced = forced.contains(&object);
            entry.hazard = hazards.contains(&object);
            out.push(entry);
        }
        for (object, old_value) in indications {
            let mut entry =
                PropagationEntry::new(object, old_value, store.current_indication(object));
            entry.forced = forced.contains(&object);
            entry.hazard = hazards.contains(&object);
            entry.strategic = true;
            out.push(entry);
        }
        out
    }

    /// Builds entries for the frame-started/-finished events. Does not
    /// clear the batch.
    fn global_batch_entries(&self, session: &Session) -> Vec<PropagationEntry> {
        let (records, forced) = {
            let st = self.state();
            (st.global_batch.clone(), st.forced.clone())
        };
        build_batch(session, &records, &forced)
    }

    /// Consumes the post batch for a post-propagation pass.
    fn take_post_batch(&self, session: &Session) -> Vec<PropagationEntry> {
        let (records, forced) = {
            let mut st = self.state();
            (std::mem::take(&mut st.post_batch), st.forced.clone())
        };
        build_batch(session, &records, &forced)
    }

    fn check_termination(&self, session: &Session) -> ClarosResult<()> {
        if self.terminated.load(Ordering::SeqCst) {
            Err(ClarosError::Terminated {
                session: session.id(),
            })
        } else {
            Ok(())
        }
    }

    fn emit<F: FnMut(&dyn PropagationListener)>(&self, mut f: F) {
        let listeners: Vec<Arc<dyn PropagationListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            f(&**listener);
        }
    }
}

fn build_batch(
    session: &Session,
    records: &IndexMap<ObjectId, BatchRecord>,
    forced: &HashSet<ObjectId>,
) -> Vec<PropagationEntry> {
    let store = session.store();
    records
        .iter()
        .map(|(object, record)| {
            let new_value = if record.strategic {
                store.current_indication(*object)
            } else {
                store.current_value(*object)
            };
            let mut entry = PropagationEntry::new(*object, record.old_value.clone(), new_value);
            entry.forced = forced.contains(object);
            entry.strategic = record.strategic;
            entry
        })
        .collect()
}

/// The catch-everything boundary around a solver invocation.
///
/// One misbehaving solver must not abort the session: failures and panics
/// are logged with the solver's identity and the solver is treated as
/// having produced no further output this round.
fn invoke_guarded(
    session: &Session,
    solver: &dyn ProblemSolver,
    entries: &[PropagationEntry],
    post: bool,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if post {
            solver.post_propagate(session, entries)
        } else {
            solver.propagate(session, entries)
        }
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(
                solver = solver.class().name(),
                error = %err,
                "problem solver failed; continuing without its output"
            );
        }
        Err(_) => {
            error!(
                solver = solver.class().name(),
                "problem solver panicked; continuing without its output"
            );
        }
    }
}
