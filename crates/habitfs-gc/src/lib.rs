//! Garbage collection for habitfs.
//!
//! [`GarbageCollector`] reclaims objects whose reference count reached
//! zero. It runs out-of-band on a schedule, never in the request path:
//! the hot path only decrements counts, and a decrement-to-zero merely
//! marks an object eligible.
//!
//! Deleting a tree may orphan its children; the collector decrements them
//! and recurses only over children that drop to zero, so a cycle's work
//! is bounded by reachability from the deleted objects. An object with
//! `count > 0` is never deleted, across any interleaving with foreground
//! operations.
//!
//! Per-object failures are logged and left for the next cycle — GC
//! problems never become request failures.

pub mod collector;

pub use collector::{GarbageCollector, GcReport};
