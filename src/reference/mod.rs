//! Per-element additive reference for extensive properties.
//!
//! An extensive property (a total energy, say) is modelled as the sum of one
//! offset per atom, looked up by element:
//!
//! ```text
//! total ≈ Σ_atoms offset[element]
//! ```
//!
//! [`ElementalReference::fit`] solves for the offsets by least squares over
//! per-structure element counts, and [`ElementalReference::forward`] evaluates
//! the sum for every graph of a [`BatchedGraph`], so a model can be trained on
//! `property - reference` instead of the raw, size-dependent property.
//!
//! The offset is either a single vector ([`PropertyOffset::Scalar`]) or one row
//! per discrete state ([`PropertyOffset::StateIndexed`]), for datasets where
//! the same structure carries properties under several conditions.

mod error;
mod table;

pub use error::Error;
pub use table::ReferenceTable;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::model::graph::{BatchedGraph, Graph};
use crate::model::structure::Material;
use crate::model::types::Element;
use crate::segment::segment_sum;

/// Relative singular-value cutoff of the pseudo-inverse.
const PINV_RCOND: f64 = 1e-15;

/// Offsets indexed by element column.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyOffset {
    /// One offset per element column (`max_z` entries).
    Scalar(DVector<f64>),
    /// One row of `max_z` offsets per state (`n_states × max_z`).
    StateIndexed(DMatrix<f64>),
}

impl PropertyOffset {
    pub fn max_z(&self) -> usize {
        match self {
            PropertyOffset::Scalar(v) => v.len(),
            PropertyOffset::StateIndexed(m) => m.ncols(),
        }
    }

    /// Number of states; a scalar offset counts as one.
    pub fn num_states(&self) -> usize {
        match self {
            PropertyOffset::Scalar(_) => 1,
            PropertyOffset::StateIndexed(m) => m.nrows(),
        }
    }

    /// The offset as an `n_states × max_z` matrix.
    pub fn as_matrix(&self) -> DMatrix<f64> {
        match self {
            PropertyOffset::Scalar(v) => DMatrix::from_row_slice(1, v.len(), v.as_slice()),
            PropertyOffset::StateIndexed(m) => m.clone(),
        }
    }
}

/// Input accepted by [`ElementalReference::get_feature_matrix`].
#[derive(Debug, Clone, Copy)]
pub enum ReferenceItem<'a> {
    /// Counted through the element list.
    Material(&'a Material),
    /// Counted through the one-hot node attributes.
    Graph(&'a Graph),
}

impl<'a> From<&'a Material> for ReferenceItem<'a> {
    fn from(material: &'a Material) -> Self {
        ReferenceItem::Material(material)
    }
}

impl<'a> From<&'a Graph> for ReferenceItem<'a> {
    fn from(graph: &'a Graph) -> Self {
        ReferenceItem::Graph(graph)
    }
}

/// Linear per-element reference model.
///
/// `max_z` (the number of element columns) is fixed at construction; every
/// graph evaluated must have a one-hot width of exactly `max_z`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementalReference {
    offset: PropertyOffset,
}

impl ElementalReference {
    pub fn new(offset: PropertyOffset) -> Self {
        Self { offset }
    }

    /// Zero scalar offset over `max_z` element columns.
    pub fn scalar(max_z: usize) -> Self {
        Self::new(PropertyOffset::Scalar(DVector::zeros(max_z)))
    }

    /// Zero offset with `num_states` rows over `max_z` element columns.
    pub fn state_indexed(num_states: usize, max_z: usize) -> Self {
        Self::new(PropertyOffset::StateIndexed(DMatrix::zeros(num_states, max_z)))
    }

    #[inline]
    pub fn max_z(&self) -> usize {
        self.offset.max_z()
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.offset.num_states()
    }

    pub fn is_state_indexed(&self) -> bool {
        matches!(self.offset, PropertyOffset::StateIndexed(_))
    }

    pub fn offset(&self) -> &PropertyOffset {
        &self.offset
    }

    /// Per-item element counts as an `n_items × max_z` matrix.
    ///
    /// A material's site `s` lands in column `element_list.position(s.element)`;
    /// a graph's node lands in the column holding the `1` of its one-hot row.
    /// Fails without partial output on the first unusable item.
    ///
    /// # Arguments
    ///
    /// * `items` - Materials or already-built graphs, one row each.
    /// * `element_list` - Column order for materials; ignored for graphs.
    ///
    /// # Errors
    ///
    /// For materials, returns [`Error::UnknownElement`] when a site's element
    /// is not in `element_list` and [`Error::ElementIndex`] when its column
    /// falls outside `max_z`. For graphs, returns [`Error::OneHotWidth`] when
    /// the node encoding width differs from `max_z` and
    /// [`Error::MalformedOneHot`] for a row that is not one-hot.
    pub fn get_feature_matrix(
        &self,
        items: &[ReferenceItem<'_>],
        element_list: &[Element],
    ) -> Result<DMatrix<u32>, Error> {
        let max_z = self.max_z();
        let mut features = DMatrix::zeros(items.len(), max_z);

        for (row, item) in items.iter().enumerate() {
            match *item {
                ReferenceItem::Material(material) => {
                    for site in material.sites() {
                        let index = element_list
                            .iter()
                            .position(|&e| e == site.element)
                            .ok_or(Error::UnknownElement(site.element))?;
                        if index >= max_z {
                            return Err(Error::ElementIndex {
                                element: site.element,
                                index,
                                max_z,
                            });
                        }
                        features[(row, index)] += 1;
                    }
                }
                ReferenceItem::Graph(graph) => {
                    if graph.node_width() != max_z {
                        return Err(Error::OneHotWidth {
                            expected: max_z,
                            found: graph.node_width(),
                        });
                    }
                    for (node, index) in graph.one_hot_indices().into_iter().enumerate() {
                        let index = index.ok_or(Error::MalformedOneHot { item: row, node })?;
                        features[(row, index)] += 1;
                    }
                }
            }
        }

        Ok(features)
    }

    /// Least-squares fit of the offsets, replacing any previous offset.
    ///
    /// Solves `offset = pinv(FᵀF) · Fᵀ · P` where `F` is the feature matrix
    /// and `P` the `n_items × n_states` property matrix (one column for a
    /// scalar reference). Rank-deficient systems yield the least-norm
    /// solution. The offset variant chosen at construction is kept.
    ///
    /// # Arguments
    ///
    /// * `items` - Training materials or graphs.
    /// * `element_list` - Column order used to count material sites.
    /// * `properties` - Target values, `n_items × n_states`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyFit`] for no items, [`Error::PropertyShape`] when
    /// `properties` does not match the item and state counts, any error of
    /// [`get_feature_matrix`](Self::get_feature_matrix), and
    /// [`Error::PseudoInverse`] when the normal matrix cannot be decomposed.
    /// The previous offset is kept on error.
    pub fn fit(
        &mut self,
        items: &[ReferenceItem<'_>],
        element_list: &[Element],
        properties: &DMatrix<f64>,
    ) -> Result<(), Error> {
        if items.is_empty() {
            return Err(Error::EmptyFit);
        }
        let expected = (items.len(), self.num_states());
        if properties.shape() != expected {
            return Err(Error::PropertyShape {
                expected,
                found: properties.shape(),
            });
        }

        let features = self.get_feature_matrix(items, element_list)?.map(f64::from);
        let ftf = features.transpose() * &features;
        let ftp = features.transpose() * properties;
        let solution = pseudo_inverse(ftf)? * ftp;

        self.offset = match self.offset {
            PropertyOffset::Scalar(_) => {
                PropertyOffset::Scalar(solution.column(0).into_owned())
            }
            PropertyOffset::StateIndexed(_) => PropertyOffset::StateIndexed(solution.transpose()),
        };

        info!(
            structures = items.len(),
            max_z = self.max_z(),
            states = self.num_states(),
            "fitted elemental reference"
        );
        Ok(())
    }

    /// Offset of every graph in the batch under every state, as an
    /// `n_states × n_graphs` matrix (a single row for a scalar reference).
    pub fn forward_all_states(&self, batch: &BatchedGraph) -> Result<DMatrix<f64>, Error> {
        let graph = batch.graph();
        if graph.node_width() != self.max_z() {
            return Err(Error::OneHotWidth {
                expected: self.max_z(),
                found: graph.node_width(),
            });
        }

        let n_graphs = batch.num_graphs();
        let segments = batch.partition().node_segments();
        let per_node = &graph.node_attr * self.offset.as_matrix().transpose();

        let mut out = DMatrix::zeros(self.num_states(), n_graphs);
        for state in 0..self.num_states() {
            let sums = segment_sum(&per_node.column(state).into_owned(), &segments, n_graphs);
            out.row_mut(state).copy_from(&sums.transpose());
        }

        debug!(graphs = n_graphs, nodes = graph.num_nodes(), "evaluated reference");
        Ok(out)
    }

    /// Offset of every graph in the batch.
    ///
    /// A state-indexed reference needs `state_index` with one entry per graph,
    /// naming the state row to use for that graph; a scalar reference must
    /// not be given one.
    ///
    /// # Arguments
    ///
    /// * `batch` - Graphs whose node encoding width equals `max_z`.
    /// * `state_index` - Per-graph state row, for state-indexed references only.
    ///
    /// # Returns
    ///
    /// One offset per graph, in batch order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedStateIndex`] or [`Error::MissingStateIndex`]
    /// when `state_index` does not suit the offset variant,
    /// [`Error::StateIndexLength`] when it has the wrong length,
    /// [`Error::StateIndexRange`] for an entry past the last state, and
    /// [`Error::OneHotWidth`] when the batch encoding width differs from `max_z`.
    pub fn forward(
        &self,
        batch: &BatchedGraph,
        state_index: Option<&[usize]>,
    ) -> Result<DVector<f64>, Error> {
        let n_graphs = batch.num_graphs();
        match (&self.offset, state_index) {
            (PropertyOffset::Scalar(_), Some(_)) => Err(Error::UnexpectedStateIndex),
            (PropertyOffset::Scalar(_), None) => {
                Ok(self.forward_all_states(batch)?.row(0).transpose())
            }
            (PropertyOffset::StateIndexed(_), None) => Err(Error::MissingStateIndex),
            (PropertyOffset::StateIndexed(_), Some(index)) => {
                if index.len() != n_graphs {
                    return Err(Error::StateIndexLength {
                        expected: n_graphs,
                        found: index.len(),
                    });
                }
                let num_states = self.num_states();
                if let Some((graph, &state)) =
                    index.iter().enumerate().find(|&(_, &s)| s >= num_states)
                {
                    return Err(Error::StateIndexRange {
                        graph,
                        index: state,
                        num_states,
                    });
                }
                let all = self.forward_all_states(batch)?;
                Ok(DVector::from_fn(n_graphs, |g, _| all[(index[g], g)]))
            }
        }
    }
}

/// Moore–Penrose pseudo-inverse of a symmetric positive semi-definite matrix.
///
/// Singular values at or below `PINV_RCOND` times the largest are dropped.
fn pseudo_inverse(matrix: DMatrix<f64>) -> Result<DMatrix<f64>, Error> {
    if matrix.is_empty() {
        return Err(Error::PseudoInverse("matrix has no element columns".into()));
    }
    let svd = matrix.svd(true, true);
    let tolerance = svd.singular_values.max() * PINV_RCOND;
    svd.pseudo_inverse(tolerance)
        .map_err(|e| Error::PseudoInverse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::site::Site;
    use crate::model::structure::Molecule;

    const ELEMENTS: [Element; 2] = [Element::H, Element::O];

    fn molecule(n_h: usize, n_o: usize) -> Material {
        let sites = std::iter::repeat_n(Element::H, n_h)
            .chain(std::iter::repeat_n(Element::O, n_o))
            .enumerate()
            .map(|(i, e)| Site::new(e, [i as f64, 0.0, 0.0]))
            .collect();
        Molecule::with_sites(sites).into()
    }

    /// One-hot graph without edges; `columns[i]` is node `i`'s element column.
    fn graph(columns: &[usize], width: usize) -> Graph {
        let mut attr = DMatrix::zeros(columns.len(), width);
        for (row, &col) in columns.iter().enumerate() {
            attr[(row, col)] = 1.0;
        }
        Graph::new(attr, vec![[0.0; 3]; columns.len()])
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn feature_rows_count_atoms_per_element() {
        let reference = ElementalReference::scalar(2);
        let materials = [molecule(2, 1), molecule(0, 3)];
        let g = graph(&[1, 0, 0, 0], 2);
        let items: Vec<ReferenceItem> = vec![
            (&materials[0]).into(),
            (&materials[1]).into(),
            (&g).into(),
        ];

        let f = reference.get_feature_matrix(&items, &ELEMENTS).unwrap();
        assert_eq!(f, DMatrix::from_row_slice(3, 2, &[2, 1, 0, 3, 3, 1]));
        assert_eq!(f.row(0).sum(), materials[0].site_count() as u32);
        assert_eq!(f.row(2).sum(), g.num_nodes() as u32);
    }

    #[test]
    fn feature_matrix_rejects_unusable_items() {
        let reference = ElementalReference::scalar(2);

        let carbon: Material = Molecule::with_sites(vec![Site::new(Element::C, [0.0; 3])]).into();
        assert!(matches!(
            reference.get_feature_matrix(&[(&carbon).into()], &ELEMENTS),
            Err(Error::UnknownElement(Element::C))
        ));

        let oxygen = molecule(0, 1);
        assert!(matches!(
            reference
                .get_feature_matrix(&[(&oxygen).into()], &[Element::H, Element::C, Element::O]),
            Err(Error::ElementIndex { index: 2, max_z: 2, .. })
        ));

        let wide = graph(&[0], 3);
        assert!(matches!(
            reference.get_feature_matrix(&[(&wide).into()], &ELEMENTS),
            Err(Error::OneHotWidth { expected: 2, found: 3 })
        ));

        let mut smeared = graph(&[0, 1], 2);
        smeared.node_attr[(1, 0)] = 0.5;
        assert!(matches!(
            reference.get_feature_matrix(&[(&smeared).into()], &ELEMENTS),
            Err(Error::MalformedOneHot { item: 0, node: 1 })
        ));
    }

    #[test]
    fn fit_recovers_the_least_squares_optimum() {
        // Counts [[2,1],[4,2],[1,1]] with totals [10,20,5] are solved exactly
        // by H = 5, O = 0.
        let materials = [molecule(2, 1), molecule(4, 2), molecule(1, 1)];
        let items: Vec<ReferenceItem> = materials.iter().map(ReferenceItem::from).collect();
        let properties = DMatrix::from_column_slice(3, 1, &[10.0, 20.0, 5.0]);

        let mut reference = ElementalReference::scalar(2);
        reference.fit(&items, &ELEMENTS, &properties).unwrap();
        let PropertyOffset::Scalar(offset) = reference.offset() else {
            panic!("fit changed the offset variant");
        };
        assert_close(offset.as_slice(), &[5.0, 0.0]);

        let f = reference.get_feature_matrix(&items, &ELEMENTS).unwrap().map(f64::from);
        let residual = |o: &DVector<f64>| (&f * o - properties.column(0)).norm_squared();
        let best = residual(offset);
        for delta in [[0.1, 0.0], [0.0, 0.1], [-0.05, 0.05]] {
            let perturbed = offset + DVector::from_column_slice(&delta);
            assert!(residual(&perturbed) >= best);
        }
    }

    #[test]
    fn fit_is_exact_on_separable_full_rank_data() {
        let materials = [molecule(1, 0), molecule(0, 1), molecule(3, 2), molecule(2, 5)];
        let true_offset = [-13.6, -432.1];
        let totals: Vec<f64> = materials
            .iter()
            .map(|m| {
                let c = m.composition();
                c.get(&Element::H).copied().unwrap_or(0) as f64 * true_offset[0]
                    + c.get(&Element::O).copied().unwrap_or(0) as f64 * true_offset[1]
            })
            .collect();
        let items: Vec<ReferenceItem> = materials.iter().map(ReferenceItem::from).collect();

        let mut reference = ElementalReference::scalar(2);
        reference
            .fit(&items, &ELEMENTS, &DMatrix::from_column_slice(4, 1, &totals))
            .unwrap();
        assert_close(reference.offset().as_matrix().as_slice(), &true_offset);
    }

    #[test]
    fn rank_deficient_fit_returns_least_norm_solution() {
        // Only the combination H + O is determined; the least-norm split is even.
        let g1 = graph(&[0, 1], 2);
        let g2 = graph(&[0, 1, 0, 1], 2);
        let items = [ReferenceItem::from(&g1), ReferenceItem::from(&g2)];

        let mut reference = ElementalReference::scalar(2);
        reference
            .fit(&items, &ELEMENTS, &DMatrix::from_column_slice(2, 1, &[3.0, 6.0]))
            .unwrap();
        assert_close(reference.offset().as_matrix().as_slice(), &[1.5, 1.5]);
    }

    #[test]
    fn fit_validates_inputs() {
        let mut reference = ElementalReference::scalar(2);
        assert!(matches!(
            reference.fit(&[], &ELEMENTS, &DMatrix::zeros(0, 1)),
            Err(Error::EmptyFit)
        ));

        let m = molecule(1, 1);
        assert!(matches!(
            reference.fit(&[(&m).into()], &ELEMENTS, &DMatrix::zeros(1, 2)),
            Err(Error::PropertyShape {
                expected: (1, 1),
                found: (1, 2)
            })
        ));
    }

    #[test]
    fn forward_matches_fit_on_single_graph_batches() {
        let graphs = [graph(&[0, 0, 1], 2), graph(&[1, 1], 2), graph(&[0], 2)];
        let items: Vec<ReferenceItem> = graphs.iter().map(ReferenceItem::from).collect();
        let totals = [-3.0, -4.0, -0.5];

        let mut reference = ElementalReference::scalar(2);
        reference
            .fit(&items, &ELEMENTS, &DMatrix::from_column_slice(3, 1, &totals))
            .unwrap();

        for (g, &total) in graphs.iter().zip(&totals) {
            let out = reference.forward(&BatchedGraph::single(g.clone()), None).unwrap();
            assert_eq!(out.len(), 1);
            assert!((out[0] - total).abs() < 1e-9);
        }
    }

    #[test]
    fn forward_sums_per_graph_including_empty_ones() {
        let reference = ElementalReference::new(PropertyOffset::Scalar(DVector::from_vec(vec![
            1.0, 10.0,
        ])));
        let (a, empty, b) = (graph(&[0, 1, 1], 2), graph(&[], 2), graph(&[0], 2));
        let batch = BatchedGraph::batch([&a, &empty, &b]).unwrap();

        let out = reference.forward(&batch, None).unwrap();
        assert_close(out.as_slice(), &[21.0, 0.0, 1.0]);
        assert!(matches!(
            reference.forward(&batch, Some(&[0, 0, 0])),
            Err(Error::UnexpectedStateIndex)
        ));
    }

    #[test]
    fn state_indexed_forward_selects_rows_per_graph() {
        let offsets = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 100.0, 200.0]);
        let reference = ElementalReference::new(PropertyOffset::StateIndexed(offsets));
        let (a, b) = (graph(&[0, 1], 2), graph(&[1, 1], 2));
        let batch = BatchedGraph::batch([&a, &b]).unwrap();

        let all = reference.forward_all_states(&batch).unwrap();
        assert_eq!(all, DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 300.0, 400.0]));

        let out = reference.forward(&batch, Some(&[1, 0])).unwrap();
        assert_close(out.as_slice(), &[300.0, 4.0]);

        assert!(matches!(reference.forward(&batch, None), Err(Error::MissingStateIndex)));
        assert!(matches!(
            reference.forward(&batch, Some(&[0])),
            Err(Error::StateIndexLength { expected: 2, found: 1 })
        ));
        assert!(matches!(
            reference.forward(&batch, Some(&[0, 2])),
            Err(Error::StateIndexRange {
                graph: 1,
                index: 2,
                num_states: 2
            })
        ));
    }

    #[test]
    fn state_indexed_fit_solves_each_state_column() {
        let materials = [molecule(1, 0), molecule(0, 1), molecule(2, 1)];
        let items: Vec<ReferenceItem> = materials.iter().map(ReferenceItem::from).collect();
        // State 0: H = 1, O = 2. State 1: H = -1, O = 4.
        let properties = DMatrix::from_row_slice(3, 2, &[1.0, -1.0, 2.0, 4.0, 4.0, 2.0]);

        let mut reference = ElementalReference::state_indexed(2, 2);
        reference.fit(&items, &ELEMENTS, &properties).unwrap();
        let PropertyOffset::StateIndexed(offset) = reference.offset() else {
            panic!("fit changed the offset variant");
        };
        assert_eq!(offset.shape(), (2, 2));
        assert_close(offset.row(0).transpose().as_slice(), &[1.0, 2.0]);
        assert_close(offset.row(1).transpose().as_slice(), &[-1.0, 4.0]);
    }

    #[test]
    fn forward_rejects_width_mismatch() {
        let reference = ElementalReference::scalar(3);
        let batch = BatchedGraph::single(graph(&[0], 2));
        assert!(matches!(
            reference.forward(&batch, None),
            Err(Error::OneHotWidth { expected: 3, found: 2 })
        ));
    }
}
