use thiserror::Error;

use crate::id::DatasetId;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cycle detected in lineage graph at {0}")]
    Cycle(DatasetId),

    #[error("Unknown dataset {0}: not present in the lineage graph")]
    UnknownDataset(DatasetId),

    #[error("No partition count resolvable for wide dependency: {0}")]
    UnresolvedPartitionCount(String),

    #[error("Invalid transformation: {0}")]
    Transform(String),

    // Raised when the analyzer and the recorded node metadata disagree, or
    // when a produced stage graph fails verification.
    #[error("Inconsistent partitioning: {0}")]
    Inconsistent(String),

    /// A node breaks the lineage shape: a source with parents, or a derived
    /// node without any.
    #[error("Malformed lineage: {0}")]
    MalformedLineage(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// Structural errors reflect a malformed lineage graph rather than a bad config.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Cycle(_)
                | Error::UnknownDataset(_)
                | Error::UnresolvedPartitionCount(_)
                | Error::Transform(_)
                | Error::MalformedLineage(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
