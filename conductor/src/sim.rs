//! Deterministic in-process worker for demos and integration tests
//!
//! Answers every conductor instruction immediately with synthetic
//! telemetry: a fixed shard size, and vertex activity that dies out after a
//! configurable number of superstep rounds. Real workers live in other
//! processes and are outside this crate; the simulation exists so the full
//! orchestration path can be driven locally.

use std::sync::Arc;

use shared_types::{ActorId, ConductorMessage, Status, WorkerMessage};

use crate::actors::{Actor, Dispatcher};

/// Rough per-vertex memory footprint reported in snapshots.
const BYTES_PER_VERTEX: u64 = 64;

pub struct SimWorker {
    id: ActorId,
    dispatcher: Arc<Dispatcher>,
    vertices: u64,
    edges: u64,
    /// Rounds during which this worker still reports active vertices.
    active_rounds: u64,
    stored: bool,
}

impl SimWorker {
    pub fn new(
        id: ActorId,
        dispatcher: Arc<Dispatcher>,
        vertices: u64,
        edges: u64,
        active_rounds: u64,
    ) -> Self {
        Self {
            id,
            dispatcher,
            vertices,
            edges,
            active_rounds,
            stored: false,
        }
    }

    fn snapshot(&self) -> Status {
        Status {
            vertices_loaded: Some(self.vertices),
            edges_loaded: Some(self.edges),
            vertices_stored: self.stored.then_some(self.vertices),
            memory_bytes_used: Some(self.vertices * BYTES_PER_VERTEX),
            ..Status::now()
        }
    }
}

impl Actor for SimWorker {
    type Message = WorkerMessage;

    fn receive(&mut self, sender: ActorId, message: WorkerMessage) {
        let reply = match message {
            WorkerMessage::LoadGraph => ConductorMessage::GraphLoaded {
                status: self.snapshot(),
            },
            WorkerMessage::RunSuperstep { superstep } => ConductorMessage::SuperstepFinished {
                superstep,
                active_vertices: if superstep < self.active_rounds {
                    self.vertices
                } else {
                    0
                },
                status: self.snapshot(),
            },
            WorkerMessage::StoreResults => {
                self.stored = true;
                ConductorMessage::ResultsStored {
                    status: self.snapshot(),
                }
            }
            WorkerMessage::Cleanup => ConductorMessage::CleanupFinished,
        };

        if let Err(error) = self.dispatcher.send(&sender, self.id.clone(), reply) {
            tracing::warn!(worker = %self.id, conductor = %sender, %error, "reply undeliverable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::ActorSystem;
    use shared_types::ServerId;

    /// Collects conductor-bound replies for inspection.
    struct Collect {
        replies: Vec<ConductorMessage>,
    }

    impl Actor for Collect {
        type Message = ConductorMessage;

        fn receive(&mut self, _sender: ActorId, message: ConductorMessage) {
            self.replies.push(message);
        }
    }

    #[test]
    fn test_worker_answers_each_instruction() {
        let system = ActorSystem::new(ServerId::new("PRMR-0001"));
        let dispatcher = system.dispatcher();
        let (collect_ref, mut collect_runner) = system.register(|_| Collect {
            replies: Vec::new(),
        });
        let (worker_ref, mut worker_runner) =
            system.register(|id| SimWorker::new(id, dispatcher, 100, 300, 1));

        let conductor_id = collect_ref.id().clone();
        for instruction in [
            WorkerMessage::LoadGraph,
            WorkerMessage::RunSuperstep { superstep: 0 },
            WorkerMessage::RunSuperstep { superstep: 1 },
            WorkerMessage::StoreResults,
            WorkerMessage::Cleanup,
        ] {
            worker_ref.send(conductor_id.clone(), instruction).unwrap();
        }
        worker_runner.drain();
        collect_runner.drain();

        let replies = &collect_runner.actor().replies;
        assert_eq!(replies.len(), 5);
        assert!(matches!(
            replies[1],
            ConductorMessage::SuperstepFinished {
                superstep: 0,
                active_vertices: 100,
                ..
            }
        ));
        // Activity dies out after the configured number of rounds.
        assert!(matches!(
            replies[2],
            ConductorMessage::SuperstepFinished {
                superstep: 1,
                active_vertices: 0,
                ..
            }
        ));
        match &replies[3] {
            ConductorMessage::ResultsStored { status } => {
                assert_eq!(status.vertices_stored, Some(100));
            }
            other => panic!("expected ResultsStored, got {other:?}"),
        }
        assert!(matches!(replies[4], ConductorMessage::CleanupFinished));
    }
}
