//! Segment bookkeeping for batched graphs.
//!
//! A batch stores per-node (or per-edge) rows back to back. These helpers map
//! every row to the graph that owns it and fold per-row values back into
//! per-graph totals.

use nalgebra::DVector;

/// Expands per-graph counts into a flat owner index per row.
///
/// `[3, 0, 2]` becomes `[0, 0, 0, 2, 2]`. Empty segments contribute nothing,
/// so the largest index present says nothing about the number of segments.
pub fn segment_indices(counts: &[usize]) -> Vec<usize> {
    let total = counts.iter().sum();
    let mut indices = Vec::with_capacity(total);
    for (segment, &count) in counts.iter().enumerate() {
        indices.extend(std::iter::repeat_n(segment, count));
    }
    indices
}

/// Sums `values` into `num_segments` buckets according to `indices`.
///
/// Buckets with no rows stay at zero.
///
/// # Panics
///
/// Panics if `values` and `indices` differ in length, or if an index is not
/// below `num_segments`.
pub fn segment_sum(values: &DVector<f64>, indices: &[usize], num_segments: usize) -> DVector<f64> {
    assert_eq!(
        values.len(),
        indices.len(),
        "one segment index is required per value"
    );
    let mut out = DVector::zeros(num_segments);
    for (&value, &segment) in values.iter().zip(indices) {
        assert!(
            segment < num_segments,
            "segment index {segment} out of range for {num_segments} segments"
        );
        out[segment] += value;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_skip_empty_segments() {
        assert_eq!(segment_indices(&[3, 0, 2]), vec![0, 0, 0, 2, 2]);
    }

    #[test]
    fn indices_of_all_empty_segments_are_empty() {
        assert!(segment_indices(&[0, 0, 0]).is_empty());
        assert!(segment_indices(&[]).is_empty());
    }

    #[test]
    fn indices_length_matches_total_count() {
        let counts = [1, 4, 0, 7, 2];
        let indices = segment_indices(&counts);
        assert_eq!(indices.len(), counts.iter().sum::<usize>());
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sum_keeps_trailing_empty_segments() {
        let values = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let indices = segment_indices(&[3, 0, 2, 0]);
        let sums = segment_sum(&values, &indices, 4);
        assert_eq!(sums.as_slice(), &[6.0, 0.0, 9.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn sum_rejects_index_beyond_segment_count() {
        let values = DVector::from_vec(vec![1.0]);
        segment_sum(&values, &[2], 2);
    }
}
