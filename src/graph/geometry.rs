//! Bond vectors and lengths from graph coordinates.

use crate::model::graph::Graph;
use crate::model::vec3::{self, Vec3};

/// Returns the bond vector and bond length of every edge, in edge order.
///
/// The vector of edge `e` points from `src[e]` to the periodic image of
/// `dst[e]`: `pos[dst] + shift - pos[src]`.
pub fn compute_pair_vector_and_distance(graph: &Graph) -> (Vec<Vec3>, Vec<f64>) {
    let vectors: Vec<Vec3> = graph
        .src
        .iter()
        .zip(&graph.dst)
        .zip(&graph.edge_shift)
        .map(|((&s, &d), &shift)| {
            vec3::sub(vec3::add(graph.positions[d], shift), graph.positions[s])
        })
        .collect();
    let distances = vectors.iter().map(|&v| vec3::norm(v)).collect();
    (vectors, distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn vectors_include_image_shift() {
        let mut g = Graph::new(
            DMatrix::from_element(2, 1, 1.0),
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
        );
        g.add_edge(0, 1, [0.0, 0.0, 0.0]);
        g.add_edge(1, 0, [3.0, 0.0, 0.0]);
        g.add_edge(0, 0, [0.0, 4.0, 0.0]);

        let (vectors, distances) = compute_pair_vector_and_distance(&g);
        assert_eq!(vectors, vec![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 4.0, 0.0]]);
        assert_eq!(distances, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn edgeless_graph_yields_nothing() {
        let g = Graph::new(DMatrix::from_element(1, 1, 1.0), vec![[0.0; 3]]);
        let (vectors, distances) = compute_pair_vector_and_distance(&g);
        assert!(vectors.is_empty() && distances.is_empty());
    }
}
