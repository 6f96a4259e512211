//! Merging samples into training batches.

use nalgebra::DMatrix;

use super::Sample;
use super::error::Error;
use crate::model::graph::BatchedGraph;

/// A collated batch: sample `i` is segment `i` of `graph` and row `i` of
/// `labels` and `state_attr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub graph: BatchedGraph,
    pub labels: DMatrix<f64>,
    pub state_attr: DMatrix<f64>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.graph.num_graphs()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Merges an ordered, non-empty list of samples.
///
/// Fails fast on heterogeneous label arity, state dimensionality, one-hot
/// width, or edge feature width.
pub fn collate(samples: Vec<Sample<'_>>) -> Result<Batch, Error> {
    let first = samples.first().ok_or(Error::EmptyBatch)?;
    let label_dim = first.label.len();
    let attr_dim = first.state_attr.len();

    for (position, sample) in samples.iter().enumerate() {
        if sample.label.len() != label_dim {
            return Err(Error::LabelArity {
                position,
                expected: label_dim,
                found: sample.label.len(),
            });
        }
        if sample.state_attr.len() != attr_dim {
            return Err(Error::AttrDimension {
                position,
                expected: attr_dim,
                found: sample.state_attr.len(),
            });
        }
    }

    let graph = BatchedGraph::batch(samples.iter().map(|s| s.graph))?;
    let labels = DMatrix::from_fn(samples.len(), label_dim, |i, j| samples[i].label[j]);
    let state_attr = DMatrix::from_fn(samples.len(), attr_dim, |i, j| samples[i].state_attr[j]);

    Ok(Batch {
        graph,
        labels,
        state_attr,
    })
}
