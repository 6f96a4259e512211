//! Error type for graph construction and bond featurization.

use thiserror::Error;

use crate::model::types::Element;

/// Errors raised while turning structures into featurized graphs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A site's element has no column in the one-hot encoding.
    #[error("element {0} is not part of the converter's element list")]
    UnknownElement(Element),

    /// The structure has no sites to build nodes from.
    #[error("structure contains no sites")]
    EmptyStructure,

    /// The neighbor cutoff is zero, negative, or not finite.
    #[error("cutoff radius must be positive and finite (got {0})")]
    InvalidCutoff(f64),

    /// The lattice vectors span no volume.
    #[error("lattice is degenerate (cell volume {volume:.3e} Å³)")]
    DegenerateLattice { volume: f64 },

    /// Bond expansion parameters are out of range.
    #[error("invalid bond expansion parameters: {0}")]
    InvalidExpansion(String),

    /// The featurizer produced a different number of rows than there are edges.
    #[error("bond expansion produced {rows} rows for {edges} edges")]
    EdgeFeatureRows { rows: usize, edges: usize },
}
