//! Per-round change snapshots delivered to solvers.

use serde::Serialize;

use crate::object::ObjectId;
use crate::value::Value;

/// Immutable snapshot of one object's change within a frame.
///
/// Entries are ephemeral: each delivery constructs them fresh from the
/// oldest old-value recorded for the object this frame and the value-store
/// value read at build time. Intra-frame write bursts therefore coalesce
/// into a single before/after pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationEntry {
    /// The changed object.
    pub object: ObjectId,

    /// The value before the first reported change this frame.
    pub old_value: Value,

    /// The current value-store value at delivery-build time.
    pub new_value: Value,

    /// Delivery was forced: solvers must process the entry even if they
    /// would treat it as unchanged.
    pub forced: bool,

    /// The value returned to its pre-frame state via an intermediate detour;
    /// delta-based solvers cannot trust a naive before/after comparison.
    pub hazard: bool,

    /// This is an indication (interview-relevance) change.
    pub strategic: bool,
}

impl PropagationEntry {
    /// Creates an ordinary (non-forced, non-hazard, non-strategic) entry.
    #[must_use]
    pub const fn new(object: ObjectId, old_value: Value, new_value: Value) -> Self {
        Self {
            object,
            old_value,
            new_value,
            forced: false,
            hazard: false,
            strategic: false,
        }
    }

    /// Returns true if the entry carries an actual value difference or was
    /// forced.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.forced || self.old_value != self.new_value
    }
}

impl std::fmt::Display for PropagationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {}{}{}{}",
            self.object,
            self.old_value,
            self.new_value,
            if self.forced { " [forced]" } else { "" },
            if self.hazard { " [hazard]" } else { "" },
            if self.strategic { " [strategic]" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_has_changed() {
        let object = ObjectId::new();
        let changed = PropagationEntry::new(object, Value::Int(1), Value::Int(2));
        assert!(changed.has_changed());

        let unchanged = PropagationEntry::new(object, Value::Int(1), Value::Int(1));
        assert!(!unchanged.has_changed());
    }

    #[test]
    fn test_forced_entry_counts_as_changed() {
        let object = ObjectId::new();
        let mut entry = PropagationEntry::new(object, Value::Int(1), Value::Int(1));
        entry.forced = true;
        assert!(entry.has_changed());
    }

    #[test]
    fn test_entry_display_flags() {
        let object = ObjectId::new();
        let mut entry = PropagationEntry::new(object, Value::Unknown, Value::Int(5));
        entry.hazard = true;
        let text = format!("{entry}");
        assert!(text.contains("unknown -> 5"));
        assert!(text.contains("[hazard]"));
        assert!(!text.contains("[forced]"));
    }
}
