//! Index views over a shared dataset and seeded random splitting.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::error::Error;
use super::{GraphDataset, Sample};

/// An ordered selection of a dataset's graphs.
///
/// Cloning a subset clones its index list, never the dataset.
#[derive(Debug, Clone)]
pub struct Subset {
    dataset: Arc<GraphDataset>,
    indices: Vec<usize>,
}

impl Subset {
    /// View of `indices`, each of which must address a graph of `dataset`.
    pub fn new(dataset: Arc<GraphDataset>, indices: Vec<usize>) -> Result<Self, Error> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= dataset.len()) {
            return Err(Error::IndexOutOfRange {
                index: bad,
                len: dataset.len(),
            });
        }
        Ok(Self { dataset, indices })
    }

    /// View of the whole dataset, in order.
    pub fn full(dataset: Arc<GraphDataset>) -> Self {
        let indices = (0..dataset.len()).collect();
        Self { dataset, indices }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sample at position `index` of this view.
    pub fn get(&self, index: usize) -> Result<Sample<'_>, Error> {
        let &target = self.indices.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.indices.len(),
        })?;
        self.dataset.get(target)
    }

    /// Dataset indices, in view order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn dataset(&self) -> &Arc<GraphDataset> {
        &self.dataset
    }
}

impl From<Arc<GraphDataset>> for Subset {
    fn from(dataset: Arc<GraphDataset>) -> Self {
        Self::full(dataset)
    }
}

impl From<GraphDataset> for Subset {
    fn from(dataset: GraphDataset) -> Self {
        Self::full(Arc::new(dataset))
    }
}

/// Shuffles the dataset once and cuts it into train/val/test views.
///
/// The first two parts get `floor(n · fraction)` graphs and the last part
/// takes the remainder, so every graph lands in exactly one view. Fractions
/// must be non-negative and sum to one. With `seed = None` the permutation is
/// drawn from OS entropy.
pub fn random_split(
    dataset: Arc<GraphDataset>,
    fractions: [f64; 3],
    seed: Option<u64>,
) -> Result<[Subset; 3], Error> {
    if fractions.iter().any(|f| !f.is_finite() || *f < 0.0) {
        return Err(Error::InvalidSplit(format!(
            "fractions must be non-negative and finite (got {fractions:?})"
        )));
    }
    let total: f64 = fractions.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(Error::InvalidSplit(format!(
            "fractions must sum to 1 (got {total})"
        )));
    }

    let n = dataset.len();
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    order.shuffle(&mut rng);

    let n_train = ((n as f64 * fractions[0]).floor() as usize).min(n);
    let n_val = ((n as f64 * fractions[1]).floor() as usize).min(n - n_train);
    let test = order.split_off(n_train + n_val);
    let val = order.split_off(n_train);
    let train = order;

    debug!(
        train = train.len(),
        val = val.len(),
        test = test.len(),
        "split dataset"
    );
    Ok([
        Subset {
            dataset: Arc::clone(&dataset),
            indices: train,
        },
        Subset {
            dataset: Arc::clone(&dataset),
            indices: val,
        },
        Subset {
            dataset,
            indices: test,
        },
    ])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::graph::{BondExpansionConfig, CutoffConverter};
    use crate::model::site::Site;
    use crate::model::structure::{Material, Molecule};
    use crate::model::types::Element;

    /// `n` hydrogen chains of growing length, labelled by their index.
    pub(crate) fn chain_dataset(n: usize) -> Arc<GraphDataset> {
        let materials: Vec<Material> = (0..n)
            .map(|i| {
                let sites = (0..=i % 4)
                    .map(|k| Site::new(Element::H, [0.8 * k as f64, 0.0, 0.0]))
                    .collect();
                Molecule::with_sites(sites).into()
            })
            .collect();
        let labels: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut ds = GraphDataset::with_scalar_labels(materials, &labels, "index").unwrap();
        let conv = CutoffConverter::new(vec![Element::H], 1.0).unwrap();
        let expansion = BondExpansionConfig {
            num_centers: 3,
            ..Default::default()
        };
        ds.process(&conv, &expansion).unwrap();
        Arc::new(ds)
    }

    #[test]
    fn subset_maps_positions_through_indices() {
        let ds = chain_dataset(5);
        let view = Subset::new(Arc::clone(&ds), vec![4, 1]).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(0).unwrap().label[0], 4.0);
        assert_eq!(view.get(1).unwrap().label[0], 1.0);
        assert!(matches!(
            view.get(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(Subset::new(ds, vec![5]).is_err());
    }

    #[test]
    fn split_partitions_every_index_once() {
        let ds = chain_dataset(10);
        let [train, val, test] = random_split(ds, [0.75, 0.1, 0.15], Some(7)).unwrap();
        assert_eq!((train.len(), val.len(), test.len()), (7, 1, 2));

        let mut all: Vec<usize> = train
            .indices()
            .iter()
            .chain(val.indices())
            .chain(test.indices())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_reproducible_with_a_seed() {
        let ds = chain_dataset(20);
        let a = random_split(Arc::clone(&ds), [0.5, 0.25, 0.25], Some(42)).unwrap();
        let b = random_split(ds, [0.5, 0.25, 0.25], Some(42)).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.indices(), y.indices());
        }
    }

    #[test]
    fn split_rejects_bad_fractions() {
        let ds = chain_dataset(3);
        assert!(matches!(
            random_split(Arc::clone(&ds), [0.5, 0.5, 0.5], None),
            Err(Error::InvalidSplit(_))
        ));
        assert!(matches!(
            random_split(ds, [1.2, -0.1, -0.1], None),
            Err(Error::InvalidSplit(_))
        ));
    }
}
