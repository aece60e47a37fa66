//! # Claros - An incremental propagation engine for diagnostic reasoning
//!
//! Claros is the scheduling core of a rule-based expert-system shell: given
//! a knowledge base of declarative rules and a live session of observed
//! facts, it incrementally derives further facts by running a set of
//! pluggable problem solvers to a fixpoint every time an input changes.
//!
//! ## Core Concepts
//!
//! - **Session**: One diagnostic interaction: a value store, a set of
//!   solvers, and one propagation controller
//! - **Frame**: A reentrant open/commit transaction over the engine; the
//!   outermost commit runs the fixpoint loop
//! - **ProblemSolver**: A computation unit reacting to coalesced change
//!   batches, possibly writing values that re-enter the engine
//! - **Rule**: A condition/exception/action triple with a per-session
//!   fired-flag and a doIt/undo/update firing state machine
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use claros::{InMemoryValueStore, ObjectId, Session, Value};
//!
//! let store = Arc::new(InMemoryValueStore::new());
//! let session = Session::builder().store(store).build().unwrap();
//!
//! // Write a fact; solvers react inside the same call, to a fixpoint.
//! let question = ObjectId::new();
//! session.write_value(question, Value::Choice("fever".to_string())).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod fact;
pub mod object;
pub mod value;

// Scheduling: sessions, solvers, the propagation engine
pub mod propagation;
pub mod session;
pub mod solver;
pub mod store;

// Rules and the knowledge index
pub mod rule;

// Re-export primary types at crate root for convenience
pub use error::{ClarosError, ClarosResult, MisuseError};
pub use fact::Fact;
pub use object::ObjectId;
pub use propagation::{
    PropagationController, PropagationEntry, PropagationEvent, PropagationListener,
    PropagationStream, StreamConfig, StreamListener,
};
pub use rule::{
    Condition, ConditionError, Direction, KnowledgeBase, KnowledgeIndex, Rule, RuleAction,
    RuleBasedSolver, RuleId, RuleSet,
};
pub use session::{Session, SessionBuilder, SessionId, SessionObjects};
pub use solver::{Capability, ProblemSolver, SolverClass, SolverError};
pub use store::{InMemoryValueStore, ValueStore};
pub use value::Value;
