//! The knowledge index: from objects to the rules referencing them.
//!
//! Solvers use the index to answer "which rules might need re-checking
//! given this object changed" (forward) and "which rules might have
//! produced this object's value" (backward). The propagation engine itself
//! never queries it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::object::ObjectId;
use crate::solver::SolverClass;

use super::{Rule, RuleAction, RuleId};

/// Index direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Object is read by the rule's condition or exception.
    Forward,
    /// Object may be written by the rule's action.
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IndexKey {
    object: ObjectId,
    class: SolverClass,
    direction: Direction,
}

/// An identity-set of rules attached to one (object, class, direction) key.
///
/// Keyed by [`RuleId`]: inserting the same identity twice is a no-op, while
/// two value-equal but distinct rule instances both remain. Iteration is in
/// insertion order.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: IndexSet<RuleId>,
}

impl RuleSet {
    /// Iterates the contained rule ids in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.rules.iter().copied()
    }

    /// Number of rules in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if the set contains `rule`.
    #[must_use]
    pub fn contains(&self, rule: RuleId) -> bool {
        self.rules.contains(&rule)
    }

    fn insert(&mut self, rule: RuleId) {
        self.rules.insert(rule);
    }

    fn remove(&mut self, rule: RuleId) {
        self.rules.shift_remove(&rule);
    }
}

/// Reverse index from objects to rules, per solver class and direction.
///
/// Buckets are created lazily on first insert and removed entirely once
/// emptied.
#[derive(Debug, Default)]
pub struct KnowledgeIndex {
    buckets: HashMap<IndexKey, RuleSet>,
}

impl KnowledgeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule under the given key. Idempotent by rule identity.
    pub fn insert(
        &mut self,
        object: ObjectId,
        class: SolverClass,
        direction: Direction,
        rule: RuleId,
    ) {
        self.buckets
            .entry(IndexKey {
                object,
                class,
                direction,
            })
            .or_default()
            .insert(rule);
    }

    /// Removes a rule from the given key; drops the bucket once empty.
    pub fn remove(
        &mut self,
        object: ObjectId,
        class: SolverClass,
        direction: Direction,
        rule: RuleId,
    ) {
        let key = IndexKey {
            object,
            class,
            direction,
        };
        if let Some(set) = self.buckets.get_mut(&key) {
            set.remove(rule);
            if set.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    /// The rule set under a key, if any rules are indexed there.
    #[must_use]
    pub fn get(
        &self,
        object: ObjectId,
        class: SolverClass,
        direction: Direction,
    ) -> Option<&RuleSet> {
        self.buckets.get(&IndexKey {
            object,
            class,
            direction,
        })
    }

    /// Rules whose condition or exception reads `object`, under `class`.
    #[must_use]
    pub fn forward(&self, object: ObjectId, class: SolverClass) -> Option<&RuleSet> {
        self.get(object, class, Direction::Forward)
    }

    /// Rules whose action may write `object`, under `class`.
    #[must_use]
    pub fn backward(&self, object: ObjectId, class: SolverClass) -> Option<&RuleSet> {
        self.get(object, class, Direction::Backward)
    }

    /// Number of non-empty buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns true if no rules are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// A registry of rules plus their knowledge index.
///
/// Build the knowledge base up front, then share it immutably
/// (`Arc<KnowledgeBase>`) across the sessions that reason with it.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    rules: HashMap<RuleId, Rule>,
    index: KnowledgeIndex,
}

impl KnowledgeBase {
    /// Creates an empty knowledge base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, indexing it under its solver context (if any).
    ///
    /// Inserting a rule whose identity is already present is a no-op.
    pub fn insert_rule(&mut self, rule: Rule) -> RuleId {
        let id = rule.id();
        if self.rules.contains_key(&id) {
            return id;
        }
        self.rules.insert(id, rule);
        self.index_rule(id);
        id
    }

    /// Removes a rule and all its index entries.
    pub fn remove_rule(&mut self, id: RuleId) -> Option<Rule> {
        self.unindex_rule(id);
        self.rules.remove(&id)
    }

    /// Looks up a rule by identity.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(&id)
    }

    /// Iterates all rules.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The knowledge index.
    #[must_use]
    pub const fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    /// Re-assigns a rule's solver context, moving every index entry to the
    /// new class key. Returns false if the rule is unknown.
    pub fn set_solver_context(&mut self, id: RuleId, context: Option<SolverClass>) -> bool {
        if !self.rules.contains_key(&id) {
            return false;
        }
        self.unindex_rule(id);
        if let Some(rule) = self.rules.get_mut(&id) {
            rule.set_solver_context_raw(context);
        }
        self.index_rule(id);
        true
    }

    /// Re-assigns a rule's action, rebuilding its backward index entries.
    /// Returns false if the rule is unknown.
    pub fn set_action(&mut self, id: RuleId, action: Arc<dyn RuleAction>) -> bool {
        if !self.rules.contains_key(&id) {
            return false;
        }
        self.unindex_rule(id);
        if let Some(rule) = self.rules.get_mut(&id) {
            rule.set_action_raw(action);
        }
        self.index_rule(id);
        true
    }

    fn index_rule(&mut self, id: RuleId) {
        let Some(rule) = self.rules.get(&id) else {
            return;
        };
        // No solver context, no index entries.
        let Some(class) = rule.solver_context() else {
            return;
        };
        let forward = rule.forward_objects();
        let backward = rule.backward_objects();
        for object in forward {
            self.index.insert(object, class, Direction::Forward, id);
        }
        for object in backward {
            self.index.insert(object, class, Direction::Backward, id);
        }
    }

    fn unindex_rule(&mut self, id: RuleId) {
        let Some(rule) = self.rules.get(&id) else {
            return;
        };
        let Some(class) = rule.solver_context() else {
            return;
        };
        let forward = rule.forward_objects();
        let backward = rule.backward_objects();
        for object in forward {
            self.index.remove(object, class, Direction::Forward, id);
        }
        for object in backward {
            self.index.remove(object, class, Direction::Backward, id);
        }
    }
}
