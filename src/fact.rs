//! Facts and fact merging.
//!
//! A fact is one solver's claim about the value of one object. When a
//! solver's own actions produce several facts for the same object (two rules
//! deriving the same solution, say), the value store asks the solver to
//! merge them into a single winning fact via
//! [`ProblemSolver::merge_facts`](crate::solver::ProblemSolver::merge_facts).
//! Merging must be pure: no session access, no side effects.

use serde::{Deserialize, Serialize};

use crate::object::ObjectId;
use crate::value::Value;

/// A single (object, value) claim produced by a solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// The object the claim is about.
    pub object: ObjectId,

    /// The claimed value.
    pub value: Value,
}

impl Fact {
    /// Creates a new fact.
    #[must_use]
    pub const fn new(object: ObjectId, value: Value) -> Self {
        Self { object, value }
    }
}

/// Default merge strategy: the most recently produced fact wins.
///
/// Facts are expected to arrive in production order, so the last element is
/// the newest claim. Returns `None` for an empty slice.
#[must_use]
pub fn merge_last_wins(facts: &[Fact]) -> Option<Fact> {
    facts.last().cloned()
}

/// Merge strategy preferring answered values.
///
/// Picks the newest fact whose value is an actual answer; falls back to the
/// newest fact overall when every claim is `Unknown`/`Undefined`.
#[must_use]
pub fn merge_prefer_answered(facts: &[Fact]) -> Option<Fact> {
    facts
        .iter()
        .rev()
        .find(|f| f.value.is_answered())
        .or_else(|| facts.last())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_last_wins_picks_newest() {
        let object = ObjectId::new();
        let facts = vec![
            Fact::new(object, Value::Int(1)),
            Fact::new(object, Value::Int(2)),
            Fact::new(object, Value::Int(3)),
        ];
        assert_eq!(merge_last_wins(&facts), Some(Fact::new(object, Value::Int(3))));
    }

    #[test]
    fn merge_last_wins_empty() {
        assert_eq!(merge_last_wins(&[]), None);
    }

    #[test]
    fn merge_prefer_answered_skips_unknown() {
        let object = ObjectId::new();
        let facts = vec![
            Fact::new(object, Value::Int(1)),
            Fact::new(object, Value::Unknown),
        ];
        assert_eq!(
            merge_prefer_answered(&facts),
            Some(Fact::new(object, Value::Int(1)))
        );
    }

    #[test]
    fn merge_prefer_answered_falls_back() {
        let object = ObjectId::new();
        let facts = vec![
            Fact::new(object, Value::Undefined),
            Fact::new(object, Value::Unknown),
        ];
        assert_eq!(
            merge_prefer_answered(&facts),
            Some(Fact::new(object, Value::Unknown))
        );
    }
}
