//! Actor substrate: addressing, dispatch, and the receive contract
//!
//! Actors are isolated units of state reachable only through messages
//! delivered to their mailbox (a lock-free MPSC queue, [`crate::mailbox`]).
//! All concurrency is pushed down into the mailbox: a handler runs on its
//! actor's single consumer task and owns no synchronization of its own.

pub mod conductor;
pub mod runtime;

use std::fmt;

use shared_types::ActorId;

pub use runtime::{next_execution_id, ActorRef, ActorRunner, ActorSystem, Dispatcher};

/// Marker for messages routable through the dispatch layer.
pub trait ActorMessage: fmt::Debug + Send + 'static {}

impl<T: fmt::Debug + Send + 'static> ActorMessage for T {}

/// An isolated unit of state driven by its mailbox.
pub trait Actor: Send + 'static {
    type Message: ActorMessage;

    /// Called once on the consumer task, before any message is delivered.
    /// States that emit on entry (the conductor's `Loading`) do so here.
    fn started(&mut self) {}

    /// Handle one inbound message.
    ///
    /// Runs on the actor's single consumer task; any outbound messages a
    /// handler produces are sent synchronously within this invocation, not
    /// deferred.
    fn receive(&mut self, sender: ActorId, message: Self::Message);
}

/// Sender identity plus payload, as queued in a mailbox.
#[derive(Debug)]
pub struct Envelope<M> {
    pub sender: ActorId,
    pub message: M,
}

/// Delivery-failure signal returned to senders.
///
/// Reported, never escalated: callers decide whether an undeliverable
/// target constitutes a protocol violation in their current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// No route registered for the target.
    #[error("no actor registered for {0}")]
    Unknown(ActorId),
    /// The target is permanently gone.
    #[error("actor {0} has stopped")]
    Stopped(ActorId),
    /// The target does not accept this message type.
    #[error("actor {0} does not accept this message type")]
    UnexpectedType(ActorId),
}
