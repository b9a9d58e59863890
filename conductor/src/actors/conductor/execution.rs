//! Conductor execution states and their transition rules
//!
//! One cluster-wide computation moves through a closed set of states:
//!
//! ```text
//! Loading → Computing → Storing → Done → CleanedUp (terminal success)
//!    |          |          |
//!    +----------+----------+--(Cancel)--> Canceled → CleanedUp
//!
//! any state → FatalError (terminal failure)
//! ```
//!
//! Every state declares what it emits on entry ([`ExecutionState::messages`],
//! computed once, at the moment of entry) and how it reacts to inbound
//! messages ([`ExecutionState::receive`]). Transitions are total: every
//! `(state, message)` pair either remains (`None`) or moves to exactly one
//! next state, and there is no silent drop. All anomalies (unknown sender,
//! wrong message type, out-of-order round) funnel through the same
//! unexpected-message rule and become a [`FatalError`] carrying a
//! diagnostic, never a thrown fault.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use shared_types::{ActorId, ComputationConfig, ConductorMessage, WorkerMessage};

use crate::actors::DeliveryError;

/// Move to exactly one next state. `None` from [`ExecutionState::receive`]
/// means "remain".
#[derive(Debug)]
pub struct StateChange {
    pub next: ExecutionState,
}

fn change(next: ExecutionState) -> Option<StateChange> {
    Some(StateChange { next })
}

fn unexpected(state: &'static str, sender: &ActorId, message: &ConductorMessage) -> Option<StateChange> {
    change(ExecutionState::FatalError(FatalError::unexpected_message(
        state, sender, message,
    )))
}

/// The conductor's current phase in its finite-state machine.
#[derive(Debug, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ExecutionState {
    Loading(Loading),
    Computing(Computing),
    Storing(Storing),
    Done(Done),
    Canceled(Canceled),
    CleanedUp,
    FatalError(FatalError),
}

impl ExecutionState {
    /// Initial state of a freshly launched computation.
    pub fn initial(workers: BTreeSet<ActorId>, config: ComputationConfig) -> Self {
        ExecutionState::Loading(Loading::new(workers, config))
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Full set of `(target, message)` pairs this state emits to its
    /// currently tracked workers. Callers compute this once on entry, not
    /// per tick.
    pub fn messages(&self) -> BTreeMap<ActorId, WorkerMessage> {
        match self {
            ExecutionState::Loading(state) => {
                instruction_set(&state.workers, || WorkerMessage::LoadGraph)
            }
            ExecutionState::Computing(state) => instruction_set(&state.workers, || {
                WorkerMessage::RunSuperstep {
                    superstep: state.superstep,
                }
            }),
            ExecutionState::Storing(state) => {
                instruction_set(&state.workers, || WorkerMessage::StoreResults)
            }
            ExecutionState::Done(state) => {
                instruction_set(&state.remaining, || WorkerMessage::Cleanup)
            }
            ExecutionState::Canceled(state) => {
                instruction_set(&state.remaining, || WorkerMessage::Cleanup)
            }
            ExecutionState::CleanedUp | ExecutionState::FatalError(_) => BTreeMap::new(),
        }
    }

    /// React to one inbound message from `sender`.
    pub fn receive(&mut self, sender: &ActorId, message: &ConductorMessage) -> Option<StateChange> {
        let name = self.name();
        match self {
            ExecutionState::Loading(state) => state.receive(name, sender, message),
            ExecutionState::Computing(state) => state.receive(name, sender, message),
            ExecutionState::Storing(state) => state.receive(name, sender, message),
            ExecutionState::Done(state) => state.receive(name, sender, message),
            ExecutionState::Canceled(state) => state.receive(name, sender, message),
            // Terminal success: nothing is ever expected here.
            ExecutionState::CleanedUp => unexpected(name, sender, message),
            // Already the error sink; keep the original diagnostic.
            ExecutionState::FatalError(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::CleanedUp | ExecutionState::FatalError(_)
        )
    }

    /// Workers still tracked by the active state, if it tracks any.
    pub fn participants(&self) -> Option<&BTreeSet<ActorId>> {
        match self {
            ExecutionState::Loading(state) => Some(&state.workers),
            ExecutionState::Computing(state) => Some(&state.workers),
            ExecutionState::Storing(state) => Some(&state.workers),
            ExecutionState::Done(state) => Some(&state.remaining),
            ExecutionState::Canceled(state) => Some(&state.remaining),
            ExecutionState::CleanedUp | ExecutionState::FatalError(_) => None,
        }
    }

    pub fn is_participant(&self, id: &ActorId) -> bool {
        self.participants().is_some_and(|workers| workers.contains(id))
    }

    pub fn fatal_diagnostic(&self) -> Option<&str> {
        match self {
            ExecutionState::FatalError(state) => Some(state.diagnostic()),
            _ => None,
        }
    }
}

fn instruction_set(
    workers: &BTreeSet<ActorId>,
    message: impl Fn() -> WorkerMessage,
) -> BTreeMap<ActorId, WorkerMessage> {
    workers
        .iter()
        .map(|worker| (worker.clone(), message()))
        .collect()
}

// ============================================================================
// Loading
// ============================================================================

/// Waiting for every worker to load its shard of the graph.
#[derive(Debug)]
pub struct Loading {
    workers: BTreeSet<ActorId>,
    pending: BTreeSet<ActorId>,
    config: ComputationConfig,
}

impl Loading {
    pub fn new(workers: BTreeSet<ActorId>, config: ComputationConfig) -> Self {
        let pending = workers.clone();
        Self {
            workers,
            pending,
            config,
        }
    }

    fn receive(
        &mut self,
        name: &'static str,
        sender: &ActorId,
        message: &ConductorMessage,
    ) -> Option<StateChange> {
        match message {
            ConductorMessage::GraphLoaded { .. } => {
                if !self.pending.remove(sender) {
                    return unexpected(name, sender, message);
                }
                if self.pending.is_empty() {
                    change(ExecutionState::Computing(Computing::new(
                        mem::take(&mut self.workers),
                        self.config.clone(),
                        0,
                    )))
                } else {
                    None
                }
            }
            ConductorMessage::Cancel => change(ExecutionState::Canceled(Canceled::new(mem::take(
                &mut self.workers,
            )))),
            _ => unexpected(name, sender, message),
        }
    }
}

// ============================================================================
// Computing
// ============================================================================

/// One superstep round in flight. A completed round with remaining vertex
/// activity re-enters `Computing` as a fresh state value, so the next
/// round's instructions are computed at entry like any other emission.
#[derive(Debug)]
pub struct Computing {
    workers: BTreeSet<ActorId>,
    pending: BTreeSet<ActorId>,
    config: ComputationConfig,
    superstep: u64,
    active_vertices: u64,
}

impl Computing {
    pub fn new(workers: BTreeSet<ActorId>, config: ComputationConfig, superstep: u64) -> Self {
        let pending = workers.clone();
        Self {
            workers,
            pending,
            config,
            superstep,
            active_vertices: 0,
        }
    }

    pub fn superstep(&self) -> u64 {
        self.superstep
    }

    fn receive(
        &mut self,
        name: &'static str,
        sender: &ActorId,
        message: &ConductorMessage,
    ) -> Option<StateChange> {
        match message {
            ConductorMessage::SuperstepFinished {
                superstep,
                active_vertices,
                ..
            } => {
                // An ack for a different round is out of order, and out of
                // order is classified, not assumed impossible.
                if *superstep != self.superstep || !self.pending.remove(sender) {
                    return unexpected(name, sender, message);
                }
                self.active_vertices += active_vertices;
                if !self.pending.is_empty() {
                    return None;
                }
                let workers = mem::take(&mut self.workers);
                if self.active_vertices > 0 && self.superstep + 1 < self.config.max_supersteps {
                    change(ExecutionState::Computing(Computing::new(
                        workers,
                        self.config.clone(),
                        self.superstep + 1,
                    )))
                } else {
                    change(ExecutionState::Storing(Storing::new(workers)))
                }
            }
            ConductorMessage::Cancel => change(ExecutionState::Canceled(Canceled::new(mem::take(
                &mut self.workers,
            )))),
            _ => unexpected(name, sender, message),
        }
    }
}

// ============================================================================
// Storing
// ============================================================================

/// Waiting for every worker to write its results back to the store.
#[derive(Debug)]
pub struct Storing {
    workers: BTreeSet<ActorId>,
    pending: BTreeSet<ActorId>,
}

impl Storing {
    pub fn new(workers: BTreeSet<ActorId>) -> Self {
        let pending = workers.clone();
        Self { workers, pending }
    }

    fn receive(
        &mut self,
        name: &'static str,
        sender: &ActorId,
        message: &ConductorMessage,
    ) -> Option<StateChange> {
        match message {
            ConductorMessage::ResultsStored { .. } => {
                if !self.pending.remove(sender) {
                    return unexpected(name, sender, message);
                }
                if self.pending.is_empty() {
                    change(ExecutionState::Done(Done::new(mem::take(&mut self.workers))))
                } else {
                    None
                }
            }
            ConductorMessage::Cancel => change(ExecutionState::Canceled(Canceled::new(mem::take(
                &mut self.workers,
            )))),
            _ => unexpected(name, sender, message),
        }
    }
}

// ============================================================================
// Done
// ============================================================================

/// Results are stored; tearing down. The worker set shrinks here and only
/// here (or in [`Canceled`]): each `CleanupFinished` removes its sender,
/// and an empty set completes the computation.
///
/// Teardown is at-least-once, exactly-once-effective: a duplicate
/// `CleanupFinished` from an already-removed sender is an unexpected
/// message and therefore fatal, deliberately not ignored.
#[derive(Debug)]
pub struct Done {
    remaining: BTreeSet<ActorId>,
}

impl Done {
    pub fn new(remaining: BTreeSet<ActorId>) -> Self {
        Self { remaining }
    }

    fn receive(
        &mut self,
        name: &'static str,
        sender: &ActorId,
        message: &ConductorMessage,
    ) -> Option<StateChange> {
        match message {
            ConductorMessage::CleanupFinished => {
                if !self.remaining.remove(sender) {
                    return unexpected(name, sender, message);
                }
                if self.remaining.is_empty() {
                    change(ExecutionState::CleanedUp)
                } else {
                    None
                }
            }
            _ => unexpected(name, sender, message),
        }
    }
}

// ============================================================================
// Canceled
// ============================================================================

/// Computation aborted; tearing down like [`Done`], except that in-flight
/// phase replies from still-tracked workers are expected stragglers (the
/// cancellation raced their acks) and the state remains until their
/// `CleanupFinished` arrives.
#[derive(Debug)]
pub struct Canceled {
    remaining: BTreeSet<ActorId>,
}

impl Canceled {
    pub fn new(remaining: BTreeSet<ActorId>) -> Self {
        Self { remaining }
    }

    fn receive(
        &mut self,
        name: &'static str,
        sender: &ActorId,
        message: &ConductorMessage,
    ) -> Option<StateChange> {
        match message {
            ConductorMessage::CleanupFinished => {
                if !self.remaining.remove(sender) {
                    return unexpected(name, sender, message);
                }
                if self.remaining.is_empty() {
                    change(ExecutionState::CleanedUp)
                } else {
                    None
                }
            }
            ConductorMessage::GraphLoaded { .. }
            | ConductorMessage::SuperstepFinished { .. }
            | ConductorMessage::ResultsStored { .. }
                if self.remaining.contains(sender) =>
            {
                None
            }
            _ => unexpected(name, sender, message),
        }
    }
}

// ============================================================================
// FatalError
// ============================================================================

/// Terminal failure. The diagnostic is the only way a user learns why a
/// computation stopped early, so it always embeds the state name, the
/// offending message, and the sender identity.
#[derive(Debug)]
pub struct FatalError {
    diagnostic: String,
}

impl FatalError {
    pub fn unexpected_message(
        state: &'static str,
        sender: &ActorId,
        message: &ConductorMessage,
    ) -> Self {
        let rendered = serde_json::to_string(message).unwrap_or_else(|_| format!("{message:?}"));
        Self {
            diagnostic: format!("in state {state}: unexpected message {rendered} from {sender}"),
        }
    }

    pub fn delivery_failure(state: &'static str, target: &ActorId, error: &DeliveryError) -> Self {
        Self {
            diagnostic: format!("in state {state}: could not instruct worker {target}: {error}"),
        }
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}

// ============================================================================
// Tests
// ============================================================================
