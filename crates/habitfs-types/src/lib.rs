//! Foundation types for the habitfs object store.
//!
//! This crate provides the identity and temporal types shared by every
//! other habitfs crate.
//!
//! # Key Types
//!
//! - [`Digest`] — Content-addressed identifier (BLAKE3 hash)
//! - [`DeviceId`] — Identity of a writer/reader session (UUIDv7)
//! - [`Timestamp`] — Wall-clock milliseconds, excluded from all hashing

pub mod device;
pub mod digest;
pub mod error;
pub mod temporal;

pub use device::DeviceId;
pub use digest::Digest;
pub use error::TypeError;
pub use temporal::Timestamp;
