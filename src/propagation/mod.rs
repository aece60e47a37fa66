//! The incremental propagation engine.
//!
//! Every change to a session object is reported here. The
//! [`PropagationController`] batches changes per solver, runs the active
//! solvers to a fixpoint in priority order, and survives solvers that react
//! to each other's output by re-entering the engine mid-run. See the crate
//! docs for the frame/fixpoint lifecycle.

mod controller;
mod entry;
mod listener;
mod queue;
mod stream;

pub use controller::PropagationController;
pub use entry::PropagationEntry;
pub use listener::PropagationListener;
pub use stream::{PropagationEvent, PropagationStream, StreamConfig, StreamListener};
