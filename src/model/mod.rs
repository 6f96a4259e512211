//! Core data structures flowing through the pipeline.
//!
//! - [`types`]: Periodic table elements.
//! - [`site`]: A single element at a Cartesian position.
//! - [`structure`]: Periodic crystals, finite molecules, and the [`Material`] variant over both.
//! - [`graph`]: Node/edge graphs derived from materials and their batched form.
//! - [`vec3`]: Small fixed-size vector helpers shared by geometry code.
//!
//! Raw chemistry ([`Material`]) and its learned representation ([`Graph`]) are
//! kept apart, so the [`crate::graph`] converters transform one into the other
//! without either type knowing about the other.
//!
//! [`Material`]: structure::Material
//! [`Graph`]: graph::Graph

pub mod graph;
pub mod site;
pub mod structure;
pub mod types;
pub mod vec3;
