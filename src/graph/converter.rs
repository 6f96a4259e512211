//! Structure-to-graph conversion.
//!
//! [`GraphConverter`] is the seam the dataset builder talks to. The crate
//! ships [`CutoffConverter`], which connects every ordered pair of sites
//! closer than a radius cutoff, including pairs across periodic boundaries.

use nalgebra::DMatrix;
use tracing::trace;

use super::error::Error;
use super::spatial::SpatialGrid;
use crate::model::graph::Graph;
use crate::model::site::Site;
use crate::model::structure::{Material, Molecule, Structure};
use crate::model::types::Element;
use crate::model::vec3::{self, Vec3};

/// Pairs closer than this are treated as the same site.
const SELF_PAIR_TOLERANCE: f64 = 1e-8;

/// State vector attached to every graph unless the converter is told otherwise.
pub const DEFAULT_STATE: [f64; 2] = [0.0, 0.0];

/// Turns structures into graphs plus a graph-level state vector.
pub trait GraphConverter {
    fn graph_from_structure(&self, structure: &Structure) -> Result<(Graph, Vec<f64>), Error>;

    fn graph_from_molecule(&self, molecule: &Molecule) -> Result<(Graph, Vec<f64>), Error>;

    /// Dispatches on the material variant.
    fn convert(&self, material: &Material) -> Result<(Graph, Vec<f64>), Error> {
        match material {
            Material::Crystal(s) => self.graph_from_structure(s),
            Material::Molecule(m) => self.graph_from_molecule(m),
        }
    }
}

/// Radius-cutoff converter with a one-hot element encoding.
///
/// Node `i` is encoded by the position of its element in `element_types`,
/// so the one-hot width equals `element_types.len()`.
#[derive(Debug, Clone)]
pub struct CutoffConverter {
    element_types: Vec<Element>,
    cutoff: f64,
    state: Vec<f64>,
}

impl CutoffConverter {
    pub fn new(element_types: Vec<Element>, cutoff: f64) -> Result<Self, Error> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(Error::InvalidCutoff(cutoff));
        }
        Ok(Self {
            element_types,
            cutoff,
            state: DEFAULT_STATE.to_vec(),
        })
    }

    /// Replaces the state vector attached to every converted graph.
    pub fn with_state(mut self, state: Vec<f64>) -> Self {
        self.state = state;
        self
    }

    pub fn element_types(&self) -> &[Element] {
        &self.element_types
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn encode(&self, sites: &[Site]) -> Result<Graph, Error> {
        if sites.is_empty() {
            return Err(Error::EmptyStructure);
        }
        let mut node_attr = DMatrix::zeros(sites.len(), self.element_types.len());
        for (row, site) in sites.iter().enumerate() {
            let col = self
                .element_types
                .iter()
                .position(|&e| e == site.element)
                .ok_or(Error::UnknownElement(site.element))?;
            node_attr[(row, col)] = 1.0;
        }
        let positions = sites.iter().map(|s| s.position).collect();
        Ok(Graph::new(node_attr, positions))
    }
}

impl GraphConverter for CutoffConverter {
    fn graph_from_structure(&self, structure: &Structure) -> Result<(Graph, Vec<f64>), Error> {
        let volume = structure.volume();
        if volume.abs() < 1e-10 {
            return Err(Error::DegenerateLattice { volume });
        }

        // Image reach below assumes every site sits inside the cell.
        let sites = structure.wrapped_sites();
        let mut graph = self.encode(&sites)?;

        let reach = structure
            .face_spacings()
            .map(|h| (self.cutoff / h).ceil() as i32);

        let mut images: Vec<(usize, Vec3)> = Vec::new();
        let mut points: Vec<Vec3> = Vec::new();
        for i in -reach[0]..=reach[0] {
            for j in -reach[1]..=reach[1] {
                for k in -reach[2]..=reach[2] {
                    let shift = structure.image_shift([i, j, k]);
                    for (site_idx, site) in sites.iter().enumerate() {
                        images.push((site_idx, shift));
                        points.push(vec3::add(site.position, shift));
                    }
                }
            }
        }

        let grid = SpatialGrid::new(&points, self.cutoff);
        for (src, site) in sites.iter().enumerate() {
            for hit in grid.within(site.position, self.cutoff) {
                let (dst, shift) = images[hit];
                let d = vec3::sub(points[hit], site.position);
                if vec3::norm(d) < SELF_PAIR_TOLERANCE {
                    continue;
                }
                graph.add_edge(src, dst, shift);
            }
        }

        trace!(
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            images = images.len(),
            "converted periodic structure"
        );
        Ok((graph, self.state.clone()))
    }

    fn graph_from_molecule(&self, molecule: &Molecule) -> Result<(Graph, Vec<f64>), Error> {
        let mut graph = self.encode(&molecule.sites)?;

        let points: Vec<Vec3> = molecule.sites.iter().map(|s| s.position).collect();
        let grid = SpatialGrid::new(&points, self.cutoff);
        for (src, &p) in points.iter().enumerate() {
            for dst in grid.within(p, self.cutoff) {
                if dst == src {
                    continue;
                }
                graph.add_edge(src, dst, [0.0; 3]);
            }
        }

        trace!(
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            "converted molecule"
        );
        Ok((graph, self.state.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Molecule {
        Molecule::with_sites(vec![
            Site::new(Element::O, [0.0, 0.0, 0.0]),
            Site::new(Element::H, [0.96, 0.0, 0.0]),
            Site::new(Element::H, [-0.24, 0.93, 0.0]),
        ])
    }

    #[test]
    fn rejects_bad_cutoff() {
        assert_eq!(
            CutoffConverter::new(vec![Element::H], 0.0).unwrap_err(),
            Error::InvalidCutoff(0.0)
        );
        assert!(CutoffConverter::new(vec![Element::H], f64::NAN).is_err());
    }

    #[test]
    fn molecule_graph_is_symmetric_and_one_hot() {
        let conv = CutoffConverter::new(vec![Element::H, Element::O], 1.2).unwrap();
        let (g, state) = conv.graph_from_molecule(&water()).unwrap();

        assert_eq!(state, DEFAULT_STATE.to_vec());
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.node_width(), 2);
        assert_eq!(g.one_hot_indices(), vec![Some(1), Some(0), Some(0)]);

        // O-H pairs are within 1.2 Å, the H-H pair (≈1.52 Å) is not.
        assert_eq!(g.num_edges(), 4);
        let mut pairs: Vec<_> = g.src.iter().zip(&g.dst).map(|(&s, &d)| (s, d)).collect();
        pairs.sort();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 0), (2, 0)]);
        assert!(g.edge_shift.iter().all(|s| *s == [0.0; 3]));
    }

    #[test]
    fn unknown_element_is_rejected() {
        let conv = CutoffConverter::new(vec![Element::H], 1.2).unwrap();
        assert_eq!(
            conv.graph_from_molecule(&water()).unwrap_err(),
            Error::UnknownElement(Element::O)
        );
    }

    #[test]
    fn simple_cubic_crystal_has_six_periodic_neighbors() {
        let lattice = [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]];
        let structure =
            Structure::with_sites(lattice, vec![Site::new(Element::Po, [0.0, 0.0, 0.0])]);
        let conv = CutoffConverter::new(vec![Element::Po], 2.1)
            .unwrap()
            .with_state(vec![300.0]);

        let (g, state) = conv.graph_from_structure(&structure).unwrap();
        assert_eq!(state, vec![300.0]);
        assert_eq!(g.num_nodes(), 1);
        assert_eq!(g.num_edges(), 6);
        assert!(g.src.iter().chain(&g.dst).all(|&i| i == 0));
        for shift in &g.edge_shift {
            assert!((vec3::norm(*shift) - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn sites_outside_the_cell_give_the_same_edges() {
        let lattice = [[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 3.0]];
        let inside = Structure::with_sites(
            lattice,
            vec![
                Site::new(Element::H, [0.0, 0.0, 0.0]),
                Site::new(Element::H, [1.5, 0.0, 0.0]),
            ],
        );
        let outside = Structure::with_sites(
            lattice,
            vec![
                Site::new(Element::H, [0.0, 0.0, 0.0]),
                Site::new(Element::H, [7.5, 0.0, 0.0]),
            ],
        );
        let conv = CutoffConverter::new(vec![Element::H], 2.0).unwrap();

        let (a, _) = conv.graph_from_structure(&inside).unwrap();
        let (b, _) = conv.graph_from_structure(&outside).unwrap();
        assert_eq!(a.num_edges(), 4);
        assert_eq!(b.num_edges(), a.num_edges());
        assert!((b.positions[1][0] - 1.5).abs() < 1e-12);
        for (shift, (&s, &d)) in b.edge_shift.iter().zip(b.src.iter().zip(&b.dst)) {
            let r = vec3::sub(vec3::add(b.positions[d], *shift), b.positions[s]);
            assert!((vec3::norm(r) - 1.5).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_lattice_is_rejected() {
        let lattice = [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let structure = Structure::with_sites(lattice, vec![Site::new(Element::H, [0.0; 3])]);
        let conv = CutoffConverter::new(vec![Element::H], 1.0).unwrap();
        assert!(matches!(
            conv.graph_from_structure(&structure),
            Err(Error::DegenerateLattice { .. })
        ));
    }

    #[test]
    fn empty_molecule_is_rejected() {
        let conv = CutoffConverter::new(vec![Element::H], 1.2).unwrap();
        assert_eq!(
            conv.graph_from_molecule(&Molecule::new()).unwrap_err(),
            Error::EmptyStructure
        );
    }

    #[test]
    fn convert_dispatches_on_variant() {
        let conv = CutoffConverter::new(vec![Element::H, Element::O], 1.2).unwrap();
        let (g, _) = conv.convert(&Material::from(water())).unwrap();
        assert_eq!(g.num_edges(), 4);
    }
}
