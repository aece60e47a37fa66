//! A generic rule-driven problem solver.

use std::sync::Arc;

use crate::propagation::PropagationEntry;
use crate::session::Session;
use crate::solver::{Capability, ProblemSolver, SolverClass, SolverError};

use super::KnowledgeBase;

/// A problem solver that reacts to changes by re-checking the rules indexed
/// under its own class.
///
/// Every rule-driven solver of a diagnostic shell (scoring, abstraction,
/// indication) is this loop with a different rule population: look up the
/// forward rules of each delivered object, drive each rule's firing state
/// machine, and let the actions' writes re-enter the engine.
pub struct RuleBasedSolver {
    class: SolverClass,
    priority: f64,
    capabilities: Vec<Capability>,
    knowledge: Arc<KnowledgeBase>,
}

impl RuleBasedSolver {
    /// Creates a solver re-checking `knowledge`'s rules under `class`.
    #[must_use]
    pub fn new(class: SolverClass, priority: f64, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            class,
            priority,
            capabilities: vec![Capability::Problem],
            knowledge,
        }
    }

    /// Overrides the declared capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The knowledge base this solver reasons over.
    #[must_use]
    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }
}

impl ProblemSolver for RuleBasedSolver {
    fn class(&self) -> SolverClass {
        self.class
    }

    fn priority(&self) -> f64 {
        self.priority
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn propagate(&self, session: &Session, entries: &[PropagationEntry]) -> Result<(), SolverError> {
        for entry in entries {
            let Some(rules) = self.knowledge.index().forward(entry.object, self.class) else {
                continue;
            };
            // The rule set is insertion-ordered, so re-checks are
            // deterministic across runs.
            let ids: Vec<_> = rules.iter().collect();
            for id in ids {
                if let Some(rule) = self.knowledge.rule(id) {
                    rule.check(session)?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RuleBasedSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedSolver")
            .field("class", &self.class)
            .field("priority", &self.priority)
            .field("rules", &self.knowledge.len())
            .finish()
    }
}
