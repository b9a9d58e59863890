//! Per-computation aggregate state
//!
//! One [`ConductorState`] exists per launched computation. It is created
//! when the computation starts, mutated only by the conductor actor's
//! single consumer task as messages are processed, and discarded once the
//! execution reaches a terminal state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use shared_types::{
    AccumulatedConductorStatus, ActorId, ComputationConfig, ConductorMessage, ConductorStatus,
    ExecutionId,
};

use super::execution::ExecutionState;

/// The computation's invariant configuration, its active execution state,
/// and the progress telemetry collected from its workers.
pub struct ConductorState {
    execution_id: ExecutionId,
    config: ComputationConfig,
    execution: ExecutionState,
    status: ConductorStatus,
    created_at: DateTime<Utc>,
}

impl ConductorState {
    pub fn new(
        execution_id: ExecutionId,
        workers: BTreeSet<ActorId>,
        config: ComputationConfig,
    ) -> Self {
        let execution = ExecutionState::initial(workers, config.clone());
        Self {
            execution_id,
            config,
            execution,
            status: ConductorStatus::new(),
            created_at: Utc::now(),
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn config(&self) -> &ComputationConfig {
        &self.config
    }

    pub fn execution(&self) -> &ExecutionState {
        &self.execution
    }

    pub fn execution_mut(&mut self) -> &mut ExecutionState {
        &mut self.execution
    }

    pub fn set_execution(&mut self, next: ExecutionState) {
        self.execution = next;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record the progress snapshot a message carries, if its sender is a
    /// tracked worker. Slots are replaced in place; the newest snapshot
    /// wins.
    pub fn record_status(&mut self, sender: &ActorId, message: &ConductorMessage) {
        if let Some(status) = message.status() {
            if self.execution.is_participant(sender) {
                self.status.update(sender.clone(), status.clone());
            }
        }
    }

    /// Cluster summary plus per-worker breakdown for external reporting.
    pub fn accumulated(&self) -> AccumulatedConductorStatus {
        self.status.accumulate()
    }
}
