//! Actor runtime: spawning, routing, and consumer scheduling
//!
//! Each spawned actor gets a mailbox and exactly one consumer: either a
//! dedicated tokio task ([`ActorSystem::spawn`]) or a caller-owned
//! [`ActorRunner`] for deterministic stepping ([`ActorSystem::register`]).
//! Producers never block; idle consumers park on a [`Notify`] until the
//! next push wakes them.
//!
//! The [`Dispatcher`] routes `(sender, message)` pairs to the addressed
//! actor's mailbox by [`ActorId`], type-erased so heterogeneous actors can
//! share one registry. Sends fail only with a [`DeliveryError`] signal.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use shared_types::{ActorId, ExecutionId, ServerId};
use tokio::sync::Notify;

use crate::actors::{Actor, ActorMessage, DeliveryError, Envelope};
use crate::mailbox::Mailbox;

/// Process-wide id counter feeding actor and execution identities.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_raw_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocate a cluster-unique identity for a new computation.
pub fn next_execution_id() -> ExecutionId {
    ExecutionId(next_raw_id())
}

/// Mailbox plus wakeup state shared between an actor's handle and its
/// consumer.
struct ActorCell<M> {
    mailbox: Mailbox<Envelope<M>>,
    notify: Notify,
    alive: AtomicBool,
}

impl<M> ActorCell<M> {
    fn new() -> Self {
        Self {
            mailbox: Mailbox::new(),
            notify: Notify::new(),
            alive: AtomicBool::new(true),
        }
    }
}

/// Cloneable handle for sending to one actor.
pub struct ActorRef<M> {
    id: ActorId,
    cell: Arc<ActorCell<M>>,
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<M: ActorMessage> ActorRef<M> {
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Enqueue a message onto this actor's mailbox and wake its consumer.
    /// Never blocks; fails only if the actor is permanently gone.
    pub fn send(&self, sender: ActorId, message: M) -> Result<(), DeliveryError> {
        if !self.cell.alive.load(Ordering::Acquire) {
            return Err(DeliveryError::Stopped(self.id.clone()));
        }
        self.cell.mailbox.push(Envelope { sender, message });
        self.cell.notify.notify_one();
        Ok(())
    }

    /// Mark the actor gone. Its consumer drains what already raced in,
    /// deregisters the route, and exits.
    pub fn stop(&self) {
        self.cell.alive.store(false, Ordering::Release);
        self.cell.notify.notify_one();
    }
}

type Deliver = dyn Fn(ActorId, Box<dyn Any + Send>) -> Result<(), DeliveryError> + Send + Sync;

/// Routes typed messages to registered actors by [`ActorId`].
#[derive(Default)]
pub struct Dispatcher {
    routes: DashMap<ActorId, Box<Deliver>>,
}

impl Dispatcher {
    /// Enqueue `message` onto `target`'s mailbox on behalf of `sender`.
    ///
    /// Never blocks. Returns a delivery-failure signal if the target is
    /// unknown, has stopped, or does not accept the message type.
    pub fn send<M: ActorMessage>(
        &self,
        target: &ActorId,
        sender: ActorId,
        message: M,
    ) -> Result<(), DeliveryError> {
        match self.routes.get(target) {
            Some(route) => (route.value())(sender, Box::new(message)),
            None => Err(DeliveryError::Unknown(target.clone())),
        }
    }

    fn register<M: ActorMessage>(&self, actor: &ActorRef<M>) {
        let handle = actor.clone();
        self.routes.insert(
            actor.id.clone(),
            Box::new(move |sender, any| {
                let message = any
                    .downcast::<M>()
                    .map_err(|_| DeliveryError::UnexpectedType(handle.id.clone()))?;
                handle.send(sender, *message)
            }),
        );
    }

    fn deregister(&self, id: &ActorId) {
        self.routes.remove(id);
    }
}

/// Caller-owned consumer side of one actor.
///
/// Holding the runner *is* holding the single-consumer role: it is the only
/// place that pops the actor's mailbox.
pub struct ActorRunner<A: Actor> {
    id: ActorId,
    cell: Arc<ActorCell<A::Message>>,
    actor: A,
}

impl<A: Actor> ActorRunner<A> {
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn actor(&self) -> &A {
        &self.actor
    }

    /// Run the actor's startup hook.
    pub fn start(&mut self) {
        self.actor.started();
    }

    /// Pop at most one message and invoke the handler. Returns whether a
    /// message was processed.
    pub fn run_once(&mut self) -> bool {
        // SAFETY: this runner is the mailbox's unique consumer; it is not
        // Clone and the spawn path moves it into exactly one task.
        match unsafe { self.cell.mailbox.pop() } {
            Some(envelope) => {
                self.actor.receive(envelope.sender, envelope.message);
                true
            }
            None => false,
        }
    }

    /// Drain everything currently visible in the mailbox.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while self.run_once() {
            processed += 1;
        }
        processed
    }

    fn stopped(&self) -> bool {
        !self.cell.alive.load(Ordering::Acquire)
    }

    async fn parked(&self) {
        self.cell.notify.notified().await;
    }
}

/// Spawns actors on one server and owns their shared dispatcher.
pub struct ActorSystem {
    server: ServerId,
    dispatcher: Arc<Dispatcher>,
}

impl ActorSystem {
    pub fn new(server: ServerId) -> Self {
        Self {
            server,
            dispatcher: Arc::new(Dispatcher::default()),
        }
    }

    pub fn server(&self) -> &ServerId {
        &self.server
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Register an actor without starting a consumer task.
    ///
    /// The caller receives the runner and with it the single-consumer role;
    /// used for deterministic stepping in tests.
    pub fn register<A: Actor>(
        &self,
        make: impl FnOnce(ActorId) -> A,
    ) -> (ActorRef<A::Message>, ActorRunner<A>) {
        let id = ActorId::new(self.server.clone(), next_raw_id());
        let cell = Arc::new(ActorCell::new());
        let actor_ref = ActorRef {
            id: id.clone(),
            cell: Arc::clone(&cell),
        };
        self.dispatcher.register(&actor_ref);
        let runner = ActorRunner {
            id: id.clone(),
            cell,
            actor: make(id),
        };
        (actor_ref, runner)
    }

    /// Spawn an actor with a dedicated consumer task.
    ///
    /// The task runs the startup hook, then alternates between draining the
    /// mailbox and parking on the wakeup notifier until the actor is
    /// stopped.
    pub fn spawn<A: Actor + Sync>(&self, make: impl FnOnce(ActorId) -> A) -> ActorRef<A::Message> {
        let (actor_ref, mut runner) = self.register(make);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            runner.start();
            loop {
                runner.drain();
                if runner.stopped() {
                    // Drain anything that raced in before the stop flag.
                    runner.drain();
                    break;
                }
                runner.parked().await;
            }
            dispatcher.deregister(&runner.id);
            tracing::debug!(actor = %runner.id, "actor stopped");
        });
        actor_ref
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Echoes every payload back to its sender with one added.
    struct AddOne {
        id: ActorId,
        dispatcher: Arc<Dispatcher>,
    }

    impl Actor for AddOne {
        type Message = u64;

        fn receive(&mut self, sender: ActorId, message: u64) {
            let _ = self.dispatcher.send(&sender, self.id.clone(), message + 1);
        }
    }

    /// Collects every payload it receives.
    struct Sink {
        seen: Vec<u64>,
    }

    impl Actor for Sink {
        type Message = u64;

        fn receive(&mut self, _sender: ActorId, message: u64) {
            self.seen.push(message);
        }
    }

    fn test_system() -> ActorSystem {
        ActorSystem::new(ServerId::new("TEST-0001"))
    }

    #[test]
    fn test_send_to_unknown_actor_is_a_signal() {
        let system = test_system();
        let nowhere = ActorId::new(ServerId::new("TEST-0001"), 9999);
        let sender = ActorId::new(ServerId::new("TEST-0001"), 1);

        let err = system.dispatcher().send(&nowhere, sender, 1u64).unwrap_err();
        assert_eq!(err, DeliveryError::Unknown(nowhere));
    }

    #[test]
    fn test_send_wrong_message_type_is_a_signal() {
        let system = test_system();
        let (sink_ref, _runner) = system.register(|_| Sink { seen: Vec::new() });
        let sender = ActorId::new(ServerId::new("TEST-0001"), 1);

        let err = system
            .dispatcher()
            .send(sink_ref.id(), sender, "not a u64")
            .unwrap_err();
        assert_eq!(err, DeliveryError::UnexpectedType(sink_ref.id().clone()));
    }

    #[test]
    fn test_manual_stepping_processes_one_message_per_run_once() {
        let system = test_system();
        let (sink_ref, mut runner) = system.register(|_| Sink { seen: Vec::new() });
        let sender = ActorId::new(ServerId::new("TEST-0001"), 1);

        sink_ref.send(sender.clone(), 10).unwrap();
        sink_ref.send(sender, 20).unwrap();

        assert!(runner.run_once());
        assert_eq!(runner.actor().seen, vec![10]);
        assert!(runner.run_once());
        assert!(!runner.run_once());
        assert_eq!(runner.actor().seen, vec![10, 20]);
    }

    #[test]
    fn test_handler_emissions_happen_within_the_invocation() {
        let system = test_system();
        let (sink_ref, mut sink_runner) = system.register(|_| Sink { seen: Vec::new() });
        let dispatcher = system.dispatcher();
        let (adder_ref, mut adder_runner) = system.register(|id| AddOne { id, dispatcher });

        adder_ref.send(sink_ref.id().clone(), 41).unwrap();
        assert!(adder_runner.run_once());

        // The reply was enqueued synchronously during the adder's handler.
        assert!(sink_runner.run_once());
        assert_eq!(sink_runner.actor().seen, vec![42]);
    }

    #[tokio::test]
    async fn test_spawned_actor_consumes_and_stops() {
        let system = test_system();
        let dispatcher = system.dispatcher();
        let adder_ref = system.spawn(|id| AddOne {
            id,
            dispatcher: Arc::clone(&dispatcher),
        });
        let (sink_ref, mut sink_runner) = system.register(|_| Sink { seen: Vec::new() });

        adder_ref.send(sink_ref.id().clone(), 1).unwrap();

        let mut waited = Duration::ZERO;
        while sink_runner.drain() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
            assert!(waited < Duration::from_secs(5), "reply never arrived");
        }
        assert_eq!(sink_runner.actor().seen, vec![2]);

        adder_ref.stop();
        let sender = sink_ref.id().clone();
        let mut waited = Duration::ZERO;
        loop {
            if adder_ref.send(sender.clone(), 1).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
            assert!(waited < Duration::from_secs(5), "actor never stopped");
        }
    }
}
