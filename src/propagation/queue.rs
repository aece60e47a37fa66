//! Per-solver change accumulators.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::object::ObjectId;
use crate::value::Value;

/// Accumulates pending changes for one solver within one outer frame.
///
/// Queues exist only while a frame is open: the controller creates one per
/// active solver when the outermost frame opens and destroys them all when
/// it commits. The oldest old-value recorded for an object wins; the current
/// store value is read later, at delivery-build time.
#[derive(Debug, Default)]
pub(crate) struct SolverQueue {
    /// Set once this solver has been invoked in the current frame.
    pub has_propagated: bool,

    /// Pending value changes, keyed by object. Oldest old-value wins.
    entries: HashMap<ObjectId, Value>,

    /// Objects whose value oscillated back to the frame-start state.
    hazards: HashSet<ObjectId>,

    /// Pending indication changes, in insertion order.
    indication_entries: IndexMap<ObjectId, Value>,
}

impl SolverQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a value change.
    ///
    /// `current` is the value-store value at report time. Hazard bookkeeping:
    /// if the store value has returned to the earliest recorded old-value but
    /// arrived there through a different reported old-value, the net effect
    /// looks like "no change" while an intermediate state was visible: mark
    /// the object hazardous. A genuine net change clears the mark.
    pub(crate) fn push(&mut self, object: ObjectId, old_value: Value, current: &Value) {
        match self.entries.get(&object) {
            None => {
                self.entries.insert(object, old_value);
            }
            Some(first_old) => {
                if current == first_old {
                    if old_value != *first_old {
                        self.hazards.insert(object);
                    }
                } else {
                    self.hazards.remove(&object);
                }
            }
        }
    }

    /// Records an indication change. First old-value wins; insertion order
    /// is preserved for delivery.
    pub(crate) fn push_indication(&mut self, object: ObjectId, old_value: Value) {
        self.indication_entries.entry(object).or_insert(old_value);
    }

    /// Returns true if any change is waiting for delivery.
    pub(crate) fn has_pending(&self) -> bool {
        !self.entries.is_empty() || !self.indication_entries.is_empty()
    }

    /// Consumes all pending changes for delivery construction.
    ///
    /// Returns `(value_entries, hazards, indication_entries)` and leaves the
    /// queue empty; a delivery is consumed exactly once.
    pub(crate) fn drain(
        &mut self,
    ) -> (
        HashMap<ObjectId, Value>,
        HashSet<ObjectId>,
        IndexMap<ObjectId, Value>,
    ) {
        (
            std::mem::take(&mut self.entries),
            std::mem::take(&mut self.hazards),
            std::mem::take(&mut self.indication_entries),
        )
    }
}
