//! Error type for dataset materialization, caching, batching, and loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph;
use crate::model::graph::BatchError;

/// Errors that can occur while building, caching, or iterating a graph dataset.
#[derive(Debug, Error)]
pub enum Error {
    /// Dataset access past the last graph.
    #[error("index {index} is out of range for a dataset of {len} graphs")]
    IndexOutOfRange { index: usize, len: usize },

    /// Structures and label rows disagree in number.
    #[error("{labels} label rows were given for {structures} structures")]
    LengthMismatch { structures: usize, labels: usize },

    /// A structure's graph conversion or featurization failed.
    #[error("failed to build a graph for structure {position}: {source}")]
    Conversion {
        /// Index of the offending structure.
        position: usize,
        #[source]
        source: graph::Error,
    },

    /// Invalid graph construction settings (e.g. bond expansion parameters).
    #[error(transparent)]
    Graph(#[from] graph::Error),

    /// The converter returned state vectors of different lengths.
    #[error("structure {position} produced a state vector of length {found}, expected {expected}")]
    StateDimension {
        position: usize,
        expected: usize,
        found: usize,
    },

    /// No cache file exists at the requested path.
    #[error("no dataset cache found at '{}'", path.display())]
    CacheNotFound { path: PathBuf },

    /// The cache's label dictionary lacks the dataset's label name.
    #[error("dataset cache has no labels named '{0}'")]
    MissingLabel(String),

    /// The cache was written by an incompatible format version.
    #[error("dataset cache format version {found} is not supported (expected {expected})")]
    CacheVersion { expected: u32, found: u32 },

    /// The cache files disagree with each other.
    #[error("dataset cache is inconsistent: {0}")]
    CorruptCache(String),

    /// Collation was asked to merge zero samples.
    #[error("cannot collate an empty batch")]
    EmptyBatch,

    /// Samples in one batch carry labels of different lengths.
    #[error("sample {position} has {found} label values, expected {expected}")]
    LabelArity {
        position: usize,
        expected: usize,
        found: usize,
    },

    /// Samples in one batch carry state vectors of different lengths.
    #[error("sample {position} has a {found}-dimensional state vector, expected {expected}")]
    AttrDimension {
        position: usize,
        expected: usize,
        found: usize,
    },

    /// Graphs in one batch cannot be merged.
    #[error("failed to batch graphs: {0}")]
    Batch(#[from] BatchError),

    /// Split fractions or subset indices are invalid.
    #[error("invalid dataset split: {0}")]
    InvalidSplit(String),

    /// Loader settings are out of range.
    #[error("invalid loader configuration: {0}")]
    InvalidLoaderConfig(String),

    /// Binary (de)serialization of a cache file failed.
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    pub fn corrupt_cache(details: impl Into<String>) -> Self {
        Self::CorruptCache(details.into())
    }
}
