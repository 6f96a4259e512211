//! Error type for elemental reference fitting and evaluation.

use thiserror::Error;

use crate::model::types::Element;

/// Errors raised by [`ElementalReference`](super::ElementalReference) and
/// reference table I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// A site's element is not in the element list.
    #[error("element {0} is not in the element list")]
    UnknownElement(Element),

    /// An element maps to a column the reference does not have.
    #[error("element {element} maps to column {index}, but the reference has only {max_z} columns")]
    ElementIndex {
        element: Element,
        index: usize,
        max_z: usize,
    },

    /// A graph's one-hot width differs from the reference width.
    #[error("one-hot node width {found} does not match the reference width {expected}")]
    OneHotWidth { expected: usize, found: usize },

    /// A one-hot node row does not hold exactly one `1`.
    #[error("node {node} of item {item} is not a valid one-hot row")]
    MalformedOneHot { item: usize, node: usize },

    /// The property matrix has the wrong number of rows or columns.
    #[error("property matrix is {}x{}, expected {}x{}", found.0, found.1, expected.0, expected.1)]
    PropertyShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// `fit` was called without any structures.
    #[error("cannot fit an elemental reference without structures")]
    EmptyFit,

    /// A state-indexed reference was evaluated without a state index.
    #[error("state-indexed reference requires a state index per graph")]
    MissingStateIndex,

    /// A scalar reference was given a state index.
    #[error("scalar reference does not take a state index")]
    UnexpectedStateIndex,

    /// The state index does not have one entry per graph.
    #[error("state index has {found} entries for {expected} graphs")]
    StateIndexLength { expected: usize, found: usize },

    /// A state index entry is out of range.
    #[error("graph {graph} selects state {index}, but the reference has {num_states} states")]
    StateIndexRange {
        graph: usize,
        index: usize,
        num_states: usize,
    },

    /// The SVD pseudo-inverse could not be formed.
    #[error("pseudo-inverse failed: {0}")]
    PseudoInverse(String),

    /// A reference table does not describe a usable offset.
    #[error("invalid reference table: {0}")]
    Table(String),

    #[error("failed to parse reference table: {0}")]
    TableParse(#[from] toml::de::Error),

    #[error("failed to serialize reference table: {0}")]
    TableSerialize(#[from] toml::ser::Error),

    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
