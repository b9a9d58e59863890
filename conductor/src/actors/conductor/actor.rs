//! The conductor actor
//!
//! Wires the execution state machine to the dispatch layer: every inbound
//! worker reply is fed into the active state, transitions emit the new
//! state's instruction set exactly once, and each processed message
//! publishes a fresh progress snapshot on the watch channel.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use shared_types::{
    AccumulatedConductorStatus, ActorId, ComputationConfig, ConductorMessage, ExecutionId,
};
use tokio::sync::watch;

use crate::actors::conductor::execution::{ExecutionState, FatalError, StateChange};
use crate::actors::conductor::state::ConductorState;
use crate::actors::{Actor, Dispatcher};

/// Snapshot published after every processed message: the cluster summary
/// served to whatever layer reports operational status, plus enough context
/// to see where the computation stands and why it stopped, if it did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorProgress {
    pub execution: ExecutionId,
    pub state: String,
    pub status: AccumulatedConductorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ConductorProgress {
    /// Value a progress channel holds before the conductor has started.
    pub fn launching(execution: ExecutionId) -> Self {
        Self {
            execution,
            state: "loading".to_string(),
            status: AccumulatedConductorStatus {
                status: Default::default(),
                workers: Default::default(),
            },
            diagnostic: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "cleaned-up" | "fatal-error")
    }
}

/// Orchestrates one distributed graph computation across a set of workers.
pub struct Conductor {
    id: ActorId,
    dispatcher: Arc<Dispatcher>,
    state: ConductorState,
    progress: watch::Sender<ConductorProgress>,
}

impl Conductor {
    pub fn new(
        id: ActorId,
        execution_id: ExecutionId,
        workers: BTreeSet<ActorId>,
        config: ComputationConfig,
        dispatcher: Arc<Dispatcher>,
        progress: watch::Sender<ConductorProgress>,
    ) -> Self {
        Self {
            id,
            dispatcher,
            state: ConductorState::new(execution_id, workers, config),
            progress,
        }
    }

    pub fn state(&self) -> &ConductorState {
        &self.state
    }

    /// Emit the active state's instruction set, computed once at entry.
    ///
    /// An undeliverable worker means the computation cannot make progress;
    /// the delivery-failure signal is classified as a protocol violation
    /// and folded into `FatalError`.
    fn emit(&mut self) -> Option<StateChange> {
        let outbound = self.state.execution().messages();
        for (target, message) in outbound {
            tracing::trace!(
                execution = %self.state.execution_id(),
                worker = %target,
                message = ?message,
                "instructing worker"
            );
            if let Err(error) = self.dispatcher.send(&target, self.id.clone(), message) {
                return Some(StateChange {
                    next: ExecutionState::FatalError(FatalError::delivery_failure(
                        self.state.execution().name(),
                        &target,
                        &error,
                    )),
                });
            }
        }
        None
    }

    /// Install a transition, emit the new state's messages, and follow any
    /// further transition an emission failure produces. `FatalError` emits
    /// nothing, so the chain always terminates.
    fn apply(&mut self, transition: StateChange) {
        let mut next = Some(transition);
        while let Some(StateChange { next: state }) = next {
            let from = self.state.execution().name();
            self.state.set_execution(state);

            match self.state.execution().fatal_diagnostic() {
                Some(diagnostic) => tracing::error!(
                    execution = %self.state.execution_id(),
                    from,
                    diagnostic,
                    "computation failed"
                ),
                None => tracing::info!(
                    execution = %self.state.execution_id(),
                    from,
                    to = self.state.execution().name(),
                    "state transition"
                ),
            }

            next = self.emit();
        }
    }

    fn publish(&self) {
        self.progress.send_replace(ConductorProgress {
            execution: self.state.execution_id(),
            state: self.state.execution().name().to_string(),
            status: self.state.accumulated(),
            diagnostic: self
                .state
                .execution()
                .fatal_diagnostic()
                .map(str::to_string),
        });
    }
}

impl Actor for Conductor {
    type Message = ConductorMessage;

    fn started(&mut self) {
        tracing::info!(
            execution = %self.state.execution_id(),
            conductor = %self.id,
            workers = self
                .state
                .execution()
                .participants()
                .map_or(0, BTreeSet::len),
            "starting computation"
        );
        if let Some(transition) = self.emit() {
            self.apply(transition);
        }
        self.publish();
    }

    fn receive(&mut self, sender: ActorId, message: ConductorMessage) {
        self.state.record_status(&sender, &message);
        if let Some(transition) = self.state.execution_mut().receive(&sender, &message) {
            self.apply(transition);
        }
        self.publish();
    }
}
