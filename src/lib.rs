//! Graph dataset materialization and elemental reference fitting for
//! materials property models.
//!
//! The crate turns raw chemical structures (periodic crystals and finite
//! molecules) into featurized graphs, caches them, and serves them as
//! collated mini-batches for training. Alongside the data pipeline it fits a
//! per-element additive reference that makes extensive targets such as total
//! energies size-independent.
//!
//! # Features
//!
//! - **Graph construction**: Radius-cutoff neighbor graphs with periodic
//!   images, one-hot element nodes, and Gaussian bond-length expansion
//! - **Dataset caching**: Binary graph/label/state caches restored without
//!   re-running conversion
//! - **Batched loading**: Train/val/test loaders with seeded shuffling and
//!   optional worker threads
//! - **Elemental reference**: Least-squares per-element offsets (scalar or
//!   state-indexed) evaluated over batched graphs
//! - **Structure I/O**: Multi-frame extended XYZ with per-frame properties
//!
//! # Quick Start
//!
//! Build a small dataset and iterate it in batches:
//!
//! ```
//! use std::sync::Arc;
//! use matgraph_forge::dataset::{GraphDataset, LoaderConfig, collate, create_loaders};
//! use matgraph_forge::graph::{BondExpansionConfig, CutoffConverter};
//! use matgraph_forge::{Element, Material, Molecule, Site};
//!
//! let dimer = |d: f64| -> Material {
//!     Molecule::with_sites(vec![
//!         Site::new(Element::H, [0.0, 0.0, 0.0]),
//!         Site::new(Element::H, [d, 0.0, 0.0]),
//!     ])
//!     .into()
//! };
//! let materials = vec![dimer(0.74), dimer(0.80), dimer(0.90)];
//!
//! let mut dataset = GraphDataset::with_scalar_labels(materials, &[-1.17, -1.16, -1.13], "energy")?;
//! let converter = CutoffConverter::new(vec![Element::H], 2.0)?;
//! dataset.process(&converter, &BondExpansionConfig::default())?;
//!
//! let dataset = Arc::new(dataset);
//! let config = LoaderConfig { batch_size: 2, seed: Some(0), ..Default::default() };
//! let mut loaders = create_loaders(
//!     Arc::clone(&dataset),
//!     Arc::clone(&dataset),
//!     dataset,
//!     collate,
//!     &config,
//! )?;
//!
//! let sizes: Vec<usize> = loaders.val.iter().map(|b| b.map(|b| b.len())).collect::<Result<_, _>>()?;
//! assert_eq!(sizes, vec![2, 1]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Fit an elemental reference and evaluate it on a batch:
//!
//! ```
//! use matgraph_forge::{BatchedGraph, Element, ElementalReference, Material, Molecule, Site};
//! use matgraph_forge::ReferenceItem;
//! use matgraph_forge::graph::{CutoffConverter, GraphConverter};
//! use nalgebra::DMatrix;
//!
//! let molecule = |n_h: usize, n_o: usize| -> Material {
//!     let sites = (0..n_h + n_o)
//!         .map(|i| {
//!             let element = if i < n_h { Element::H } else { Element::O };
//!             Site::new(element, [i as f64 * 3.0, 0.0, 0.0])
//!         })
//!         .collect();
//!     Molecule::with_sites(sites).into()
//! };
//! let materials = [molecule(2, 1), molecule(4, 2), molecule(1, 1)];
//! let items: Vec<ReferenceItem> = materials.iter().map(ReferenceItem::from).collect();
//! let elements = [Element::H, Element::O];
//!
//! let mut reference = ElementalReference::scalar(elements.len());
//! reference.fit(&items, &elements, &DMatrix::from_column_slice(3, 1, &[10.0, 20.0, 5.0]))?;
//!
//! let converter = CutoffConverter::new(elements.to_vec(), 1.0)?;
//! let (graph, _) = converter.convert(&materials[1])?;
//! let offset = reference.forward(&BatchedGraph::single(graph), None)?;
//! assert!((offset[0] - 20.0).abs() < 1e-9);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Module Organization
//!
//! - [`graph`]: Structure-to-graph conversion, pair geometry, bond expansion
//! - [`dataset`]: Dataset building, caching, collation, splitting, and loaders
//! - [`reference`]: Elemental reference fit/forward and its TOML table
//! - [`segment`]: Segment index and segmented-sum helpers for batches
//! - [`io`]: Extended XYZ reading and writing
//! - [`config`]: TOML pipeline configuration
//!
//! # Data Types
//!
//! - [`Element`]: Chemical element (H through Og)
//! - [`Site`]: Element at a Cartesian position
//! - [`Structure`] / [`Molecule`] / [`Material`]: Periodic, finite, and either
//! - [`Graph`]: Node/edge graph with one-hot nodes and edge features
//! - [`BatchedGraph`] / [`BatchPartition`]: Merged graphs and their boundaries

mod model;

pub mod config;
pub mod dataset;
pub mod graph;
pub mod io;
pub mod reference;
pub mod segment;

pub use model::graph::{BatchError, BatchPartition, BatchedGraph, Graph, ShapeError};
pub use model::site::Site;
pub use model::structure::{Lattice, Material, Molecule, Structure};
pub use model::types::{Element, ParseElementError};
pub use model::vec3::Vec3;

pub use config::PipelineConfig;
pub use dataset::{GraphDataset, Sample};
pub use reference::{ElementalReference, PropertyOffset, ReferenceItem};

pub use dataset::Error as DatasetError;
pub use graph::Error as GraphError;
pub use reference::Error as ReferenceError;
