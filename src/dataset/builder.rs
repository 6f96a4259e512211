//! Materialization of raw materials into featurized graphs.

use nalgebra::DMatrix;
use tracing::debug;

use super::error::Error;
use crate::graph::{
    self, BondExpansion, BondExpansionConfig, GraphConverter, compute_pair_vector_and_distance,
};
use crate::model::graph::Graph;
use crate::model::structure::Material;

/// Converts materials into graphs with bond-expanded edge features.
///
/// The builder borrows its converter, so the same converter can be shared by
/// several datasets (train/val/test) without cloning.
pub struct GraphBuilder<'a, C: ?Sized> {
    converter: &'a C,
    expansion: BondExpansion,
}

impl<'a, C: GraphConverter + ?Sized> GraphBuilder<'a, C> {
    pub fn new(converter: &'a C, expansion: &BondExpansionConfig) -> Result<Self, graph::Error> {
        Ok(Self {
            converter,
            expansion: BondExpansion::new(expansion)?,
        })
    }

    pub fn expansion(&self) -> &BondExpansion {
        &self.expansion
    }

    /// Builds one graph and its state vector.
    pub fn build(&self, material: &Material) -> Result<(Graph, Vec<f64>), graph::Error> {
        let (mut graph, state) = self.converter.convert(material)?;

        let (_, distances) = compute_pair_vector_and_distance(&graph);
        let edge_attr = self.expansion.expand(&distances);
        if edge_attr.nrows() != graph.num_edges() {
            return Err(graph::Error::EdgeFeatureRows {
                rows: edge_attr.nrows(),
                edges: graph.num_edges(),
            });
        }
        graph.edge_attr = Some(edge_attr);

        Ok((graph, state))
    }

    /// Builds every material in order and stacks the state vectors into an
    /// `(n × state_dim)` matrix.
    ///
    /// `progress(done, total)` is called after each material.
    pub fn build_all<F>(
        &self,
        materials: &[Material],
        mut progress: F,
    ) -> Result<(Vec<Graph>, DMatrix<f64>), Error>
    where
        F: FnMut(usize, usize),
    {
        let total = materials.len();
        let mut graphs = Vec::with_capacity(total);
        let mut states: Vec<Vec<f64>> = Vec::with_capacity(total);

        for (position, material) in materials.iter().enumerate() {
            let (graph, state) = self
                .build(material)
                .map_err(|source| Error::Conversion { position, source })?;

            if let Some(first) = states.first() {
                if state.len() != first.len() {
                    return Err(Error::StateDimension {
                        position,
                        expected: first.len(),
                        found: state.len(),
                    });
                }
            }

            debug!(
                position,
                formula = %material.formula(),
                nodes = graph.num_nodes(),
                edges = graph.num_edges(),
                "built graph"
            );
            graphs.push(graph);
            states.push(state);
            progress(position + 1, total);
        }

        Ok((graphs, stack_rows(&states)))
    }
}

/// Stacks equal-length rows into a matrix; no rows give a `0 × 0` matrix.
pub(crate) fn stack_rows(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let width = rows.first().map_or(0, Vec::len);
    DMatrix::from_fn(rows.len(), width, |i, j| rows[i][j])
}
