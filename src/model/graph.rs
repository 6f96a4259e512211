use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vec3::Vec3;
use crate::segment::segment_indices;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("cannot batch an empty list of graphs")]
    Empty,

    #[error("graph {position} has node feature width {found}, expected {expected}")]
    NodeWidth {
        position: usize,
        expected: usize,
        found: usize,
    },

    #[error("graph {position} has edge feature width {found:?}, expected {expected:?}")]
    EdgeFeatures {
        position: usize,
        expected: Option<usize>,
        found: Option<usize>,
    },

    #[error("graph {position} is malformed: {source}")]
    Malformed {
        position: usize,
        #[source]
        source: ShapeError,
    },
}

/// Internal disagreement between a graph's node and edge arrays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{rows} node attribute rows for {positions} positions")]
    NodeRows { rows: usize, positions: usize },

    #[error("edge arrays differ in length (src {src}, dst {dst}, shift {shift})")]
    EdgeArrays { src: usize, dst: usize, shift: usize },

    #[error("edge {edge} points at node {node}, but the graph has {nodes} nodes")]
    Endpoint { edge: usize, node: usize, nodes: usize },

    #[error("{rows} edge feature rows for {edges} edges")]
    EdgeRows { rows: usize, edges: usize },
}

/// Node/edge graph derived from one structure.
///
/// `node_attr` is the one-hot element encoding (one row per node). Edges are
/// directed `src[e] -> dst[e]`; `edge_shift[e]` is the Cartesian translation
/// of the periodic image that `dst[e]` belongs to (zero for molecules).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub node_attr: DMatrix<f64>,
    pub positions: Vec<Vec3>,
    pub src: Vec<usize>,
    pub dst: Vec<usize>,
    pub edge_shift: Vec<Vec3>,
    pub edge_attr: Option<DMatrix<f64>>,
}

impl Graph {
    /// Creates an edgeless graph.
    ///
    /// # Panics
    ///
    /// Panics if `positions.len()` differs from the number of rows of `node_attr`.
    pub fn new(node_attr: DMatrix<f64>, positions: Vec<Vec3>) -> Self {
        assert_eq!(
            node_attr.nrows(),
            positions.len(),
            "one node attribute row is required per position"
        );
        Self {
            node_attr,
            positions,
            src: Vec::new(),
            dst: Vec::new(),
            edge_shift: Vec::new(),
            edge_attr: None,
        }
    }

    pub fn add_edge(&mut self, src: usize, dst: usize, shift: Vec3) {
        self.src.push(src);
        self.dst.push(dst);
        self.edge_shift.push(shift);
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.node_attr.nrows()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    /// Width of the one-hot node encoding.
    #[inline]
    pub fn node_width(&self) -> usize {
        self.node_attr.ncols()
    }

    pub fn edge_feature_width(&self) -> Option<usize> {
        self.edge_attr.as_ref().map(|m| m.ncols())
    }

    /// Checks that node rows, positions, edge arrays, and edge features agree.
    ///
    /// Graphs built through [`new`](Self::new) and [`add_edge`](Self::add_edge)
    /// pass as long as edge endpoints are in range; deserialized graphs may not.
    pub fn check_shape(&self) -> Result<(), ShapeError> {
        let nodes = self.num_nodes();
        if self.positions.len() != nodes {
            return Err(ShapeError::NodeRows {
                rows: nodes,
                positions: self.positions.len(),
            });
        }
        let edges = self.src.len();
        if self.dst.len() != edges || self.edge_shift.len() != edges {
            return Err(ShapeError::EdgeArrays {
                src: edges,
                dst: self.dst.len(),
                shift: self.edge_shift.len(),
            });
        }
        for (edge, (&s, &d)) in self.src.iter().zip(&self.dst).enumerate() {
            if let Some(node) = [s, d].into_iter().find(|&n| n >= nodes) {
                return Err(ShapeError::Endpoint { edge, node, nodes });
            }
        }
        if let Some(attr) = &self.edge_attr {
            if attr.nrows() != edges {
                return Err(ShapeError::EdgeRows {
                    rows: attr.nrows(),
                    edges,
                });
            }
        }
        Ok(())
    }

    /// Column holding the `1` of each node's one-hot row, or `None` when the
    /// row is not a valid one-hot vector.
    pub fn one_hot_indices(&self) -> Vec<Option<usize>> {
        self.node_attr
            .row_iter()
            .map(|row| {
                let mut hit = None;
                for (col, &value) in row.iter().enumerate() {
                    if value == 1.0 {
                        if hit.is_some() {
                            return None;
                        }
                        hit = Some(col);
                    } else if value != 0.0 {
                        return None;
                    }
                }
                hit
            })
            .collect()
    }
}

/// Graph boundaries inside a [`BatchedGraph`], fixed when the batch is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPartition {
    node_counts: Vec<usize>,
    edge_counts: Vec<usize>,
}

impl BatchPartition {
    pub fn node_counts(&self) -> &[usize] {
        &self.node_counts
    }

    pub fn edge_counts(&self) -> &[usize] {
        &self.edge_counts
    }

    #[inline]
    pub fn num_graphs(&self) -> usize {
        self.node_counts.len()
    }

    /// Owning graph index for every node of the batch.
    pub fn node_segments(&self) -> Vec<usize> {
        segment_indices(&self.node_counts)
    }

    /// Owning graph index for every edge of the batch.
    pub fn edge_segments(&self) -> Vec<usize> {
        segment_indices(&self.edge_counts)
    }
}

/// Several graphs merged into one disjoint graph.
///
/// Node and edge rows keep the order of the input graphs, and edge endpoints
/// are offset into the merged node numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedGraph {
    graph: Graph,
    partition: BatchPartition,
}

impl BatchedGraph {
    pub fn batch<'a, I>(graphs: I) -> Result<Self, BatchError>
    where
        I: IntoIterator<Item = &'a Graph>,
    {
        let graphs: Vec<&Graph> = graphs.into_iter().collect();
        let first = graphs.first().ok_or(BatchError::Empty)?;

        let node_width = first.node_width();
        let edge_width = first.edge_feature_width();

        for (position, g) in graphs.iter().enumerate() {
            g.check_shape()
                .map_err(|source| BatchError::Malformed { position, source })?;
            if g.node_width() != node_width {
                return Err(BatchError::NodeWidth {
                    position,
                    expected: node_width,
                    found: g.node_width(),
                });
            }
            if g.edge_feature_width() != edge_width {
                return Err(BatchError::EdgeFeatures {
                    position,
                    expected: edge_width,
                    found: g.edge_feature_width(),
                });
            }
        }

        let node_counts: Vec<usize> = graphs.iter().map(|g| g.num_nodes()).collect();
        let edge_counts: Vec<usize> = graphs.iter().map(|g| g.num_edges()).collect();
        let total_nodes: usize = node_counts.iter().sum();
        let total_edges: usize = edge_counts.iter().sum();

        let mut node_attr = DMatrix::zeros(total_nodes, node_width);
        let mut edge_attr = edge_width.map(|w| DMatrix::zeros(total_edges, w));
        let mut positions = Vec::with_capacity(total_nodes);
        let mut src = Vec::with_capacity(total_edges);
        let mut dst = Vec::with_capacity(total_edges);
        let mut edge_shift = Vec::with_capacity(total_edges);

        let mut node_offset = 0;
        let mut edge_offset = 0;
        for g in &graphs {
            let (n, e) = (g.num_nodes(), g.num_edges());

            node_attr.rows_mut(node_offset, n).copy_from(&g.node_attr);
            if let (Some(out), Some(attr)) = (edge_attr.as_mut(), g.edge_attr.as_ref()) {
                out.rows_mut(edge_offset, e).copy_from(attr);
            }

            positions.extend_from_slice(&g.positions);
            src.extend(g.src.iter().map(|&i| i + node_offset));
            dst.extend(g.dst.iter().map(|&j| j + node_offset));
            edge_shift.extend_from_slice(&g.edge_shift);

            node_offset += n;
            edge_offset += e;
        }

        Ok(Self {
            graph: Graph {
                node_attr,
                positions,
                src,
                dst,
                edge_shift,
                edge_attr,
            },
            partition: BatchPartition {
                node_counts,
                edge_counts,
            },
        })
    }

    /// Wraps a single graph as a batch of one.
    pub fn single(graph: Graph) -> Self {
        let partition = BatchPartition {
            node_counts: vec![graph.num_nodes()],
            edge_counts: vec![graph.num_edges()],
        };
        Self { graph, partition }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn partition(&self) -> &BatchPartition {
        &self.partition
    }

    #[inline]
    pub fn num_graphs(&self) -> usize {
        self.partition.num_graphs()
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.graph.num_edges()
    }

    pub fn into_parts(self) -> (Graph, BatchPartition) {
        (self.graph, self.partition)
    }
}
