//! Content hashing for the habitfs object store.
//!
//! Every object digest in habitfs is a domain-separated BLAKE3 hash of the
//! object's canonical byte representation. Canonicalization rules:
//!
//! 1. Composite fields (tree entry lists) are sorted by entry name before
//!    serialization, so logically-equal trees hash identically.
//! 2. Text is UTF-8 (`String` enforces this); names are compared and
//!    hashed byte-wise.
//! 3. Volatile fields (timestamps, access counters) are never part of the
//!    hashed representation — they live outside the stored payload.
//!
//! The domain tag prevents cross-kind collisions: a blob and a tree with
//! identical bytes produce different digests.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
