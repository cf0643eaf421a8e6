use habitfs_types::Digest;
use thiserror::Error;

/// What a transform produced for one source item: the entry name it should
/// appear under in the target tree, and the payload bytes to store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformOutput {
    /// Derived entry name in the target container.
    pub entry_name: String,
    /// Transformed payload. Ignored by link copy modes, which share the
    /// source object unchanged.
    pub payload: Vec<u8>,
}

/// Errors a transform can report for a single item.
///
/// A failed transform never aborts the batch: the item is recorded in the
/// outcome's failure list and the rest proceed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("transform rejected item: {0}")]
    Rejected(String),

    #[error("source payload is malformed: {0}")]
    MalformedSource(String),
}

/// Caller-owned content transform.
///
/// The store owns content addressing, sharing, and atomicity; the caller
/// owns all business semantics — what a "linked copy" is named, which
/// fields change. The transform is the boundary between the two.
pub trait ContentTransform: Send + Sync {
    /// Transform one source item into its target name and payload.
    fn apply(&self, source: &Digest, payload: &[u8]) -> Result<TransformOutput, TransformError>;
}

impl<F> ContentTransform for F
where
    F: Fn(&Digest, &[u8]) -> Result<TransformOutput, TransformError> + Send + Sync,
{
    fn apply(&self, source: &Digest, payload: &[u8]) -> Result<TransformOutput, TransformError> {
        self(source, payload)
    }
}
