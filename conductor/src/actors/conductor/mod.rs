//! Conductor: orchestrates one distributed graph computation
//!
//! The conductor is the actor coordinating a Pregel-style bulk computation
//! across a set of worker actors:
//! - Drives the closed execution state machine
//!   (Loading → Computing → Storing → Done → CleanedUp, with Canceled and
//!   FatalError branches)
//! - Emits each state's instruction set to the workers exactly once, at
//!   state entry
//! - Classifies every inbound message; anything unexpected becomes a
//!   `FatalError` diagnostic, never a silent drop
//! - Folds worker progress snapshots into one cluster-wide view for
//!   external reporting
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (progress_tx, progress_rx) = watch::channel(ConductorProgress::launching(execution_id));
//! let conductor = system.spawn(|id| {
//!     Conductor::new(id, execution_id, workers, config, dispatcher, progress_tx)
//! });
//! let done = progress_rx.wait_for(ConductorProgress::is_terminal).await?;
//! ```

pub mod actor;
pub mod execution;
pub mod state;

pub use actor::{Conductor, ConductorProgress};
pub use execution::{ExecutionState, FatalError, StateChange};
pub use state::ConductorState;
