//! Lock-free multi-producer single-consumer mailbox
//!
//! Intrusive singly-linked queue with a permanently-resident stub node.
//! Any number of producer threads hand off messages without ever blocking
//! on the consumer, and the single consumer drains without blocking on any
//! producer.
//!
//! Two atomic slots drive the structure:
//!
//! - `head`: the last node ever linked; producers install new nodes with a
//!   single atomic exchange.
//! - `tail`: the consumer's cursor; only the consumer writes it.
//!
//! Push order is fill-payload-then-link, so a pop never observes a node a
//! producer has not finished writing. Ordering across *different* producers
//! is unspecified; only per-producer FIFO is preserved, because concurrent
//! exchanges on `head` can interleave two producers' install steps.
//!
//! The queue has no failure mode of its own. The single-consumer rule is
//! the caller's obligation; see [`Mailbox::pop`].

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Intrusively-linked envelope holding one message.
///
/// Owned exclusively by the mailbox once pushed; reclaimed into a `Box` by
/// the popping consumer. The stub node is the only node with no message.
struct Node<M> {
    next: AtomicPtr<Node<M>>,
    message: Option<M>,
}

impl<M> Node<M> {
    fn boxed(message: Option<M>) -> *mut Node<M> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            message,
        }))
    }
}

/// Lock-free MPSC queue backing one actor's inbound messages.
pub struct Mailbox<M> {
    /// Last node linked into the queue. Producers exchange this.
    head: AtomicPtr<Node<M>>,
    /// Next node the consumer has not yet consumed. Written only by the
    /// consumer; atomic so [`Mailbox::empty`] can snapshot it from anywhere.
    tail: AtomicPtr<Node<M>>,
    /// Resident sentinel, allocated once with the queue and deallocated
    /// only on drop. Re-linked onto `head` by the consumer when it catches
    /// up, so producers always have a valid predecessor to link behind.
    stub: *mut Node<M>,
}

// SAFETY: all cross-thread access goes through the atomic head/tail links;
// messages themselves move between threads, hence M: Send.
unsafe impl<M: Send> Send for Mailbox<M> {}
unsafe impl<M: Send> Sync for Mailbox<M> {}

impl<M> Mailbox<M> {
    pub fn new() -> Self {
        let stub = Node::boxed(None);
        Self {
            head: AtomicPtr::new(stub),
            tail: AtomicPtr::new(stub),
            stub,
        }
    }

    /// Enqueue a message. Never blocks; safe from any number of threads.
    ///
    /// One atomic exchange plus one atomic store; producers coordinate
    /// with each other only through the exchange on `head`.
    pub fn push(&self, message: M) {
        let node = Node::boxed(Some(message));
        // SAFETY: `node` was just allocated and is fully written; ownership
        // is released into the queue here.
        unsafe { self.link(node) };
    }

    /// Install `node` as the new head and link the previous head to it.
    ///
    /// # Safety
    ///
    /// `node` must be valid, not currently linked into the queue, and owned
    /// by the caller until the exchange completes.
    unsafe fn link(&self, node: *mut Node<M>) {
        (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
        let prev = self.head.swap(node, Ordering::AcqRel);
        // The release store publishes the fully written node; a consumer
        // that acquires this link sees the message payload.
        (*prev).next.store(node, Ordering::Release);
    }

    /// Dequeue one message, or `None` if the queue is observably empty or a
    /// racing push has not yet become visible (it will on a later call).
    ///
    /// Skips the stub transparently and re-links it onto `head` when the
    /// consumer has caught up, guaranteeing forward progress for any
    /// producer mid-push. No locking, no CAS loop.
    ///
    /// # Safety
    ///
    /// Exactly one thread may pop at a time. The structure does not protect
    /// against concurrent consumers; a second popper is a logic error that
    /// the caller must rule out (the actor runtime does so by giving each
    /// mailbox a single owning consumer task).
    pub unsafe fn pop(&self) -> Option<M> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        let mut next = (*tail).next.load(Ordering::Acquire);

        if tail == self.stub {
            if next.is_null() {
                // Stub with no successor: observably empty.
                return None;
            }
            // Step over the stub; it stays resident for later re-linking.
            self.tail.store(next, Ordering::Relaxed);
            tail = next;
            next = (*tail).next.load(Ordering::Acquire);
        }

        if !next.is_null() {
            self.tail.store(next, Ordering::Relaxed);
            // SAFETY (single consumer): `tail` is fully linked, detached
            // from the producer side, and no other thread references it.
            let mut node = Box::from_raw(tail);
            return node.message.take();
        }

        let head = self.head.load(Ordering::Acquire);
        if tail != head {
            // A producer has exchanged head but not yet installed its link;
            // the push is guaranteed to become visible on a later call.
            return None;
        }

        // Consumer caught up with the last linked node. Re-link the stub
        // behind it so producers keep a valid predecessor, then re-check
        // whether that made the final node consumable.
        self.link(self.stub);
        next = (*tail).next.load(Ordering::Acquire);
        if !next.is_null() {
            self.tail.store(next, Ordering::Relaxed);
            let mut node = Box::from_raw(tail);
            return node.message.take();
        }
        None
    }

    /// Best-effort emptiness snapshot: `tail == head`.
    ///
    /// May be stale under concurrent pushes. Consumer loops must rely on
    /// [`Mailbox::pop`] returning `None`, not on this.
    pub fn empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Drop for Mailbox<M> {
    fn drop(&mut self) {
        // `&mut self` gives exclusive access: no producer or consumer is
        // live. Free the chain from the consumer cursor; the stub may sit
        // inside it, ahead of it, or already be detached.
        let mut node = *self.tail.get_mut();
        let mut freed_stub = false;
        while !node.is_null() {
            // SAFETY: every node in the chain is owned by the queue.
            let next = unsafe { (*node).next.load(Ordering::Relaxed) };
            if node == self.stub {
                freed_stub = true;
            }
            drop(unsafe { Box::from_raw(node) });
            node = next;
        }
        if !freed_stub {
            // SAFETY: the stub was detached by a past pop and is still owned
            // by the queue.
            drop(unsafe { Box::from_raw(self.stub) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fresh_mailbox_pops_none() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        assert_eq!(unsafe { mailbox.pop() }, None);
        assert!(mailbox.empty());
    }

    #[test]
    fn test_single_producer_fifo() {
        let mailbox = Mailbox::new();
        for i in 0..100u32 {
            mailbox.push(i);
        }
        for i in 0..100u32 {
            assert_eq!(unsafe { mailbox.pop() }, Some(i));
        }
        assert_eq!(unsafe { mailbox.pop() }, None);
    }

    #[test]
    fn test_interleaved_push_pop() {
        let mailbox = Mailbox::new();
        mailbox.push("a");
        assert_eq!(unsafe { mailbox.pop() }, Some("a"));
        assert_eq!(unsafe { mailbox.pop() }, None);

        mailbox.push("b");
        mailbox.push("c");
        assert_eq!(unsafe { mailbox.pop() }, Some("b"));
        mailbox.push("d");
        assert_eq!(unsafe { mailbox.pop() }, Some("c"));
        assert_eq!(unsafe { mailbox.pop() }, Some("d"));
        assert_eq!(unsafe { mailbox.pop() }, None);
    }

    #[test]
    fn test_empty_is_best_effort_not_authoritative() {
        let mailbox = Mailbox::new();
        assert!(mailbox.empty());
        mailbox.push(1u8);
        assert!(!mailbox.empty());
        unsafe { mailbox.pop() };
        // The consumer may sit on the last linked node with tail == head;
        // pop, not empty, is the authoritative check.
        assert_eq!(unsafe { mailbox.pop() }, None);
    }

    #[test]
    fn test_concurrent_producers_no_loss_no_duplication() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: u64 = 5_000;

        let mailbox: Arc<Mailbox<(usize, u64)>> = Arc::new(Mailbox::new());

        std::thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let mailbox = Arc::clone(&mailbox);
                scope.spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        mailbox.push((producer, seq));
                    }
                });
            }

            // Single consumer drains everything; per-producer order must be
            // the push order even though cross-producer interleaving is
            // unspecified.
            let mut expected_next = [0u64; PRODUCERS];
            let mut received = 0u64;
            while received < PRODUCERS as u64 * PER_PRODUCER {
                match unsafe { mailbox.pop() } {
                    Some((producer, seq)) => {
                        assert_eq!(
                            seq, expected_next[producer],
                            "per-producer FIFO violated for producer {producer}"
                        );
                        expected_next[producer] += 1;
                        received += 1;
                    }
                    None => std::thread::yield_now(),
                }
            }
        });

        assert_eq!(unsafe { mailbox.pop() }, None);
    }

    #[test]
    fn test_drop_releases_undelivered_messages() {
        let payload = Arc::new(());
        {
            let mailbox = Mailbox::new();
            for _ in 0..10 {
                mailbox.push(Arc::clone(&payload));
            }
            // Consume a few so the stub has been stepped over at least once.
            unsafe {
                mailbox.pop();
                mailbox.pop();
            }
        }
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
