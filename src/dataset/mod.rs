//! Graph dataset materialization, caching, batching, and loading.
//!
//! The flow through this module is:
//!
//! 1. [`GraphDataset::new`] pairs raw [`Material`]s with a label matrix.
//! 2. [`GraphDataset::process`] runs the [`GraphBuilder`] over every material,
//!    or [`GraphDataset::load`] restores a previous run from a [`DatasetCache`].
//! 3. [`random_split`] (or whole-dataset [`Subset`]s) feed [`create_loaders`],
//!    whose loaders hand index chunks to [`collate`] and yield [`Batch`]es.

mod builder;
mod cache;
mod collate;
mod error;
mod loader;
mod split;

pub use builder::GraphBuilder;
pub use cache::{CachedData, DEFAULT_ATTR_FILE, DEFAULT_GRAPH_FILE, DatasetCache, has_cache};
pub use collate::{Batch, collate};
pub use error::Error;
pub use loader::{Batches, Collate, DataLoaders, GraphLoader, LoaderConfig, create_loaders};
pub use split::{Subset, random_split};

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use tracing::info;

use crate::graph::{BondExpansionConfig, GraphConverter};
use crate::model::graph::Graph;
use crate::model::structure::Material;

/// One dataset element: a graph with its label row and state vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    pub graph: &'a Graph,
    pub label: DVector<f64>,
    pub state_attr: DVector<f64>,
}

/// Materials with labels and, once processed or loaded, their graphs.
///
/// `len()` counts graphs, so a dataset is empty until [`process`](Self::process)
/// or [`load`](Self::load) has run.
#[derive(Debug, Clone)]
pub struct GraphDataset {
    materials: Vec<Material>,
    label_name: String,
    labels: DMatrix<f64>,
    graphs: Vec<Graph>,
    graph_attr: DMatrix<f64>,
}

impl GraphDataset {
    /// Pairs `materials` with one label row each.
    pub fn new(
        materials: Vec<Material>,
        labels: DMatrix<f64>,
        label_name: impl Into<String>,
    ) -> Result<Self, Error> {
        if labels.nrows() != materials.len() {
            return Err(Error::LengthMismatch {
                structures: materials.len(),
                labels: labels.nrows(),
            });
        }
        Ok(Self {
            materials,
            label_name: label_name.into(),
            labels,
            graphs: Vec::new(),
            graph_attr: DMatrix::zeros(0, 0),
        })
    }

    /// Convenience constructor for one scalar label per material.
    pub fn with_scalar_labels(
        materials: Vec<Material>,
        labels: &[f64],
        label_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let labels = DMatrix::from_column_slice(labels.len(), 1, labels);
        Self::new(materials, labels, label_name)
    }

    /// Restores a dataset purely from a cache, without the source materials.
    pub fn from_cache(label_name: impl Into<String>, cache: &DatasetCache) -> Result<Self, Error> {
        let mut dataset = Self {
            materials: Vec::new(),
            label_name: label_name.into(),
            labels: DMatrix::zeros(0, 0),
            graphs: Vec::new(),
            graph_attr: DMatrix::zeros(0, 0),
        };
        dataset.load(cache)?;
        Ok(dataset)
    }

    /// Builds a graph for every material, replacing any previous graphs.
    ///
    /// # Arguments
    ///
    /// * `converter` - Turns each material into a graph and a state vector.
    /// * `expansion` - Gaussian settings for the per-edge bond features.
    ///
    /// # Returns
    ///
    /// The graphs, in material order, and the state attribute matrix with
    /// one row per graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Graph`] for invalid expansion settings,
    /// [`Error::Conversion`] naming the first material that fails to convert,
    /// and [`Error::StateDimension`] when the converter returns state vectors
    /// of different lengths. On error the previous graphs are kept.
    pub fn process<C>(
        &mut self,
        converter: &C,
        expansion: &BondExpansionConfig,
    ) -> Result<(&[Graph], &DMatrix<f64>), Error>
    where
        C: GraphConverter + ?Sized,
    {
        self.process_with(converter, expansion, |_, _| {})
    }

    /// Like [`process`](Self::process), calling `progress(done, total)` after
    /// each material.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process).
    pub fn process_with<C, F>(
        &mut self,
        converter: &C,
        expansion: &BondExpansionConfig,
        progress: F,
    ) -> Result<(&[Graph], &DMatrix<f64>), Error>
    where
        C: GraphConverter + ?Sized,
        F: FnMut(usize, usize),
    {
        let builder = GraphBuilder::new(converter, expansion)?;
        let (graphs, graph_attr) = builder.build_all(&self.materials, progress)?;
        self.graphs = graphs;
        self.graph_attr = graph_attr;

        info!(
            label = %self.label_name,
            graphs = self.graphs.len(),
            state_dim = self.graph_attr.ncols(),
            "processed dataset"
        );
        Ok((&self.graphs, &self.graph_attr))
    }

    /// Persists graphs, labels (keyed by label name), and state attributes.
    pub fn save(&self, cache: &DatasetCache) -> Result<(), Error> {
        let labels = BTreeMap::from([(self.label_name.as_str(), &self.labels)]);
        cache.write(&self.graphs, labels, &self.graph_attr)?;
        info!(
            graphs = self.graphs.len(),
            path = %cache.graph_path.display(),
            "saved dataset cache"
        );
        Ok(())
    }

    /// Restores the state written by [`save`](Self::save).
    ///
    /// # Arguments
    ///
    /// * `cache` - Paths of the graph and state attribute files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheNotFound`] when either file is missing,
    /// [`Error::CacheVersion`] for an incompatible format, and
    /// [`Error::MissingLabel`] when the cache has no labels under this
    /// dataset's label name. A cache whose collections disagree in length, or
    /// that holds a graph with inconsistent node and edge arrays, yields
    /// [`Error::CorruptCache`]. Decoding and I/O failures surface as
    /// [`Error::Serialization`] and [`Error::Io`].
    pub fn load(&mut self, cache: &DatasetCache) -> Result<(), Error> {
        let CachedData {
            graphs,
            mut labels,
            graph_attr,
        } = cache.read()?;

        let labels = labels
            .remove(&self.label_name)
            .ok_or_else(|| Error::MissingLabel(self.label_name.clone()))?;
        if labels.nrows() != graphs.len() {
            return Err(Error::corrupt_cache(format!(
                "{} graphs but {} label rows",
                graphs.len(),
                labels.nrows()
            )));
        }
        if graph_attr.nrows() != graphs.len() {
            return Err(Error::corrupt_cache(format!(
                "{} graphs but {} state attribute rows",
                graphs.len(),
                graph_attr.nrows()
            )));
        }

        for (i, graph) in graphs.iter().enumerate() {
            graph
                .check_shape()
                .map_err(|e| Error::corrupt_cache(format!("graph {i}: {e}")))?;
        }

        self.graphs = graphs;
        self.labels = labels;
        self.graph_attr = graph_attr;
        info!(
            graphs = self.graphs.len(),
            path = %cache.graph_path.display(),
            "loaded dataset cache"
        );
        Ok(())
    }

    /// Graph, label row, and state vector at `index`.
    pub fn get(&self, index: usize) -> Result<Sample<'_>, Error> {
        let graph = self.graphs.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.graphs.len(),
        })?;
        Ok(Sample {
            graph,
            label: self.labels.row(index).transpose(),
            state_attr: self.graph_attr.row(index).transpose(),
        })
    }

    /// Number of graphs.
    #[inline]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    pub fn labels(&self) -> &DMatrix<f64> {
        &self.labels
    }

    pub fn graph_attr(&self) -> &DMatrix<f64> {
        &self.graph_attr
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    /// Width of each label row.
    pub fn label_dim(&self) -> usize {
        self.labels.ncols()
    }

    /// Width of each state vector (zero before processing).
    pub fn state_dim(&self) -> usize {
        self.graph_attr.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CutoffConverter;
    use crate::model::site::Site;
    use crate::model::structure::{Molecule, Structure};
    use crate::model::types::Element;
    use tempfile::TempDir;

    fn materials() -> Vec<Material> {
        vec![
            Molecule::with_sites(vec![
                Site::new(Element::O, [0.0, 0.0, 0.0]),
                Site::new(Element::H, [0.96, 0.0, 0.0]),
                Site::new(Element::H, [-0.24, 0.93, 0.0]),
            ])
            .into(),
            Structure::with_sites(
                [[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 3.0]],
                vec![
                    Site::new(Element::Li, [0.0, 0.0, 0.0]),
                    Site::new(Element::H, [1.5, 1.5, 1.5]),
                ],
            )
            .into(),
        ]
    }

    fn converter() -> CutoffConverter {
        CutoffConverter::new(vec![Element::H, Element::Li, Element::O], 3.0)
            .unwrap()
            .with_state(vec![0.5, 1.5])
    }

    fn expansion() -> BondExpansionConfig {
        BondExpansionConfig {
            num_centers: 10,
            ..Default::default()
        }
    }

    fn processed() -> GraphDataset {
        let labels = DMatrix::from_row_slice(2, 2, &[-14.2, 1.0, -7.9, 2.0]);
        let mut ds = GraphDataset::new(materials(), labels, "energy").unwrap();
        ds.process(&converter(), &expansion()).unwrap();
        ds
    }

    #[test]
    fn new_rejects_label_count_mismatch() {
        assert!(matches!(
            GraphDataset::with_scalar_labels(materials(), &[1.0], "energy"),
            Err(Error::LengthMismatch {
                structures: 2,
                labels: 1
            })
        ));
    }

    #[test]
    fn empty_until_processed() {
        let ds = GraphDataset::with_scalar_labels(materials(), &[1.0, 2.0], "energy").unwrap();
        assert!(ds.is_empty());
        assert!(matches!(
            ds.get(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn process_aligns_graphs_labels_and_attrs() {
        let ds = processed();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.labels().nrows(), ds.len());
        assert_eq!(ds.graph_attr().shape(), (2, 2));

        let sample = ds.get(1).unwrap();
        assert_eq!(sample.graph.num_nodes(), 2);
        assert_eq!(sample.label.as_slice(), &[-7.9, 2.0]);
        assert_eq!(sample.state_attr.as_slice(), &[0.5, 1.5]);
        assert!(sample.graph.edge_attr.is_some());

        assert!(matches!(
            ds.get(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = DatasetCache::in_dir(dir.path());
        let ds = processed();
        ds.save(&cache).unwrap();
        // Saving again overwrites in place.
        ds.save(&cache).unwrap();

        let restored = GraphDataset::from_cache("energy", &cache).unwrap();
        assert_eq!(restored.graphs(), ds.graphs());
        assert_eq!(restored.labels(), ds.labels());
        assert_eq!(restored.graph_attr(), ds.graph_attr());
        assert_eq!(restored.get(0).unwrap(), ds.get(0).unwrap());
    }

    #[test]
    fn load_requires_matching_label_name() {
        let dir = TempDir::new().unwrap();
        let cache = DatasetCache::in_dir(dir.path());
        processed().save(&cache).unwrap();

        match GraphDataset::from_cache("band_gap", &cache) {
            Err(Error::MissingLabel(name)) => assert_eq!(name, "band_gap"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn inconsistent_cache_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = DatasetCache::in_dir(dir.path());
        let ds = processed();
        let short = DMatrix::from_element(1, 1, 0.0);
        cache
            .write(
                ds.graphs(),
                BTreeMap::from([("energy", &short)]),
                ds.graph_attr(),
            )
            .unwrap();

        assert!(matches!(
            GraphDataset::from_cache("energy", &cache),
            Err(Error::CorruptCache(_))
        ));
    }

    #[test]
    fn cache_with_malformed_graph_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = DatasetCache::in_dir(dir.path());
        let mut ds = processed();
        let graph = &mut ds.graphs[1];
        graph.src.truncate(1);
        graph.dst.truncate(1);
        graph.edge_shift.truncate(1);
        graph.edge_attr = Some(DMatrix::zeros(5, 3));
        ds.save(&cache).unwrap();

        match GraphDataset::from_cache("energy", &cache) {
            Err(Error::CorruptCache(details)) => assert!(details.starts_with("graph 1:")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn reprocessing_rebuilds() {
        let mut ds = processed();
        let before = ds.graphs().to_vec();
        let (graphs, attrs) = ds.process(&converter(), &expansion()).unwrap();
        assert_eq!(graphs, before.as_slice());
        assert_eq!(attrs.nrows(), 2);
    }
}
