//! Quiver conductor: distributed graph-computation orchestration
//!
//! This crate provides the in-process actor substrate (a lock-free MPSC
//! mailbox plus addressing and dispatch) and, built on it, the conductor
//! state machine that coordinates a Pregel-style bulk graph computation
//! across worker processes, together with status aggregation over their
//! progress telemetry.
//!
//! Concurrency discipline: any number of threads produce into a mailbox;
//! exactly one consumer per actor drains it and advances its state. That
//! single rule lets the state machine itself be ordinary sequential logic
//! with zero internal synchronization.

pub mod actors;
pub mod mailbox;
pub mod sim;
