//! Named mutable references for habitfs.
//!
//! A [`Reference`] is the only mutable pointer in the system: a named,
//! versioned pointer from a container (e.g. `folder/2`) to the digest of
//! its current tree. Every update goes through compare-and-swap on the
//! version, which makes a single reference the sole serialization point
//! per container — optimistic concurrency, no locks held across reads.

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use memory::InMemoryRefStore;
pub use names::validate_ref_name;
pub use traits::RefStore;
pub use types::Reference;
