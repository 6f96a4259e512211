//! Graph construction collaborators: structure-to-graph conversion, pair
//! geometry, and radial bond featurization.
//!
//! - [`GraphConverter`] / [`CutoffConverter`]: structure or molecule → one-hot graph + state vector
//! - [`compute_pair_vector_and_distance`]: per-edge bond vectors and lengths
//! - [`BondExpansion`]: bond lengths → edge feature matrix

mod converter;
mod error;
mod expansion;
mod geometry;
mod spatial;

pub use converter::{CutoffConverter, DEFAULT_STATE, GraphConverter};
pub use error::Error;
pub use expansion::{BondExpansion, BondExpansionConfig, RbfType};
pub use geometry::compute_pair_vector_and_distance;
