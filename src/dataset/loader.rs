//! Batch iteration over dataset views, inline or on worker threads.
//!
//! A [`GraphLoader`] cuts its [`Subset`] into `batch_size` chunks (shuffled
//! each epoch for training) and collates every chunk. With `num_workers > 0`
//! the chunks are dealt round-robin to worker threads that push finished
//! batches into a bounded channel; the consumer reorders them so batches come
//! out in chunk order either way.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Sample;
use super::error::Error;
use super::split::Subset;

/// Loader settings shared by the train/val/test loaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Samples per batch; the last batch of an epoch may be shorter.
    pub batch_size: usize,
    /// Worker threads; `0` collates on the iterating thread.
    pub num_workers: usize,
    /// Batches buffered per worker.
    pub prefetch_factor: usize,
    /// Seed for the training shuffle. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_workers: 0,
            prefetch_factor: 2,
            seed: None,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::InvalidLoaderConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        if self.num_workers > 0 && self.prefetch_factor == 0 {
            return Err(Error::InvalidLoaderConfig(
                "prefetch_factor must be at least 1 when workers are used".into(),
            ));
        }
        Ok(())
    }
}

/// Turns an ordered list of samples into one batch.
///
/// Implemented for every suitable closure or function, including
/// [`collate`](super::collate).
pub trait Collate: Send + Sync + 'static {
    type Output: Send + 'static;

    fn collate(&self, samples: Vec<Sample<'_>>) -> Result<Self::Output, Error>;
}

impl<F, B> Collate for F
where
    F: for<'a> Fn(Vec<Sample<'a>>) -> Result<B, Error> + Send + Sync + 'static,
    B: Send + 'static,
{
    type Output = B;

    fn collate(&self, samples: Vec<Sample<'_>>) -> Result<B, Error> {
        self(samples)
    }
}

/// Batched iteration over one [`Subset`].
pub struct GraphLoader<C> {
    subset: Arc<Subset>,
    collate: Arc<C>,
    batch_size: usize,
    shuffle: bool,
    num_workers: usize,
    prefetch_factor: usize,
    rng: StdRng,
}

impl<C: Collate> GraphLoader<C> {
    pub fn new(
        subset: impl Into<Subset>,
        collate: C,
        shuffle: bool,
        config: &LoaderConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::with_shared(subset.into(), Arc::new(collate), shuffle, config))
    }

    fn with_shared(
        subset: Subset,
        collate: Arc<C>,
        shuffle: bool,
        config: &LoaderConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            subset: Arc::new(subset),
            collate,
            batch_size: config.batch_size,
            shuffle,
            num_workers: config.num_workers,
            prefetch_factor: config.prefetch_factor,
            rng,
        }
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        self.subset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.subset.is_empty()
    }

    pub fn num_samples(&self) -> usize {
        self.subset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn subset(&self) -> &Subset {
        &self.subset
    }

    /// Starts one epoch.
    ///
    /// Shuffling loaders draw a fresh permutation from their generator on
    /// every call, so seeded loaders repeat the same sequence of epochs.
    pub fn iter(&mut self) -> Batches<C> {
        let mut order: Vec<usize> = (0..self.subset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let chunks: Vec<Vec<usize>> = order
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        if self.num_workers == 0 {
            Batches::inline(Arc::clone(&self.subset), Arc::clone(&self.collate), chunks)
        } else {
            Batches::spawn(
                Arc::clone(&self.subset),
                Arc::clone(&self.collate),
                chunks,
                self.num_workers,
                self.prefetch_factor,
            )
        }
    }
}

type Message<T> = (usize, Result<T, Error>);

enum State<C: Collate> {
    Inline {
        subset: Arc<Subset>,
        collate: Arc<C>,
        chunks: std::vec::IntoIter<Vec<usize>>,
    },
    Workers {
        receiver: Option<Receiver<Message<C::Output>>>,
        pending: BTreeMap<usize, Result<C::Output, Error>>,
        next: usize,
        workers: Vec<JoinHandle<()>>,
    },
}

/// One epoch of batches, in chunk order.
///
/// Dropping the iterator early disconnects the channel and joins the workers.
pub struct Batches<C: Collate> {
    state: State<C>,
    remaining: usize,
}

impl<C: Collate> Batches<C> {
    fn inline(subset: Arc<Subset>, collate: Arc<C>, chunks: Vec<Vec<usize>>) -> Self {
        Self {
            remaining: chunks.len(),
            state: State::Inline {
                subset,
                collate,
                chunks: chunks.into_iter(),
            },
        }
    }

    fn spawn(
        subset: Arc<Subset>,
        collate: Arc<C>,
        chunks: Vec<Vec<usize>>,
        num_workers: usize,
        prefetch_factor: usize,
    ) -> Self {
        let total = chunks.len();
        let (sender, receiver) = mpsc::sync_channel(prefetch_factor * num_workers);

        let mut queues: Vec<Vec<(usize, Vec<usize>)>> =
            vec![Vec::new(); num_workers.min(total)];
        let n_queues = queues.len();
        for (k, chunk) in chunks.into_iter().enumerate() {
            queues[k % n_queues].push((k, chunk));
        }

        let workers = queues
            .into_iter()
            .map(|jobs| {
                let sender = sender.clone();
                let subset = Arc::clone(&subset);
                let collate = Arc::clone(&collate);
                thread::spawn(move || {
                    for (k, chunk) in jobs {
                        let result = collate_chunk(&subset, collate.as_ref(), &chunk);
                        if sender.send((k, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        debug!(workers = workers.len(), batches = total, "started loader workers");

        Self {
            remaining: total,
            state: State::Workers {
                receiver: Some(receiver),
                pending: BTreeMap::new(),
                next: 0,
                workers,
            },
        }
    }
}

fn collate_chunk<C: Collate>(
    subset: &Subset,
    collate: &C,
    chunk: &[usize],
) -> Result<C::Output, Error> {
    let samples = chunk
        .iter()
        .map(|&i| subset.get(i))
        .collect::<Result<Vec<_>, _>>()?;
    collate.collate(samples)
}

impl<C: Collate> Iterator for Batches<C> {
    type Item = Result<C::Output, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = match &mut self.state {
            State::Inline {
                subset,
                collate,
                chunks,
            } => {
                let chunk = chunks.next()?;
                collate_chunk(subset, collate.as_ref(), &chunk)
            }
            State::Workers {
                receiver,
                pending,
                next,
                ..
            } => loop {
                if let Some(result) = pending.remove(next) {
                    *next += 1;
                    break result;
                }
                match receiver.as_ref()?.recv() {
                    Ok((k, result)) => {
                        pending.insert(k, result);
                    }
                    Err(_) => {
                        warn!(
                            missing = self.remaining,
                            "loader workers exited before delivering every batch"
                        );
                        self.remaining = 0;
                        return None;
                    }
                }
            },
        };
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<C: Collate> Drop for Batches<C> {
    fn drop(&mut self) {
        if let State::Workers {
            receiver, workers, ..
        } = &mut self.state
        {
            drop(receiver.take());
            for worker in workers.drain(..) {
                let _ = worker.join();
            }
        }
    }
}

/// Train, validation, and test loaders sharing one collate function.
pub struct DataLoaders<C> {
    pub train: GraphLoader<C>,
    pub val: GraphLoader<C>,
    pub test: GraphLoader<C>,
}

/// Builds a shuffled training loader and unshuffled validation/test loaders.
pub fn create_loaders<C: Collate>(
    train: impl Into<Subset>,
    val: impl Into<Subset>,
    test: impl Into<Subset>,
    collate_fn: C,
    config: &LoaderConfig,
) -> Result<DataLoaders<C>, Error> {
    config.validate()?;
    let collate = Arc::new(collate_fn);

    let loaders = DataLoaders {
        train: GraphLoader::with_shared(train.into(), Arc::clone(&collate), true, config),
        val: GraphLoader::with_shared(val.into(), Arc::clone(&collate), false, config),
        test: GraphLoader::with_shared(test.into(), collate, false, config),
    };
    info!(
        train = loaders.train.num_samples(),
        val = loaders.val.num_samples(),
        test = loaders.test.num_samples(),
        batch_size = config.batch_size,
        num_workers = config.num_workers,
        "created data loaders"
    );
    Ok(loaders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::split::tests::chain_dataset;
    use crate::dataset::{Batch, collate, random_split};

    fn labels_of(batches: &[Batch]) -> Vec<f64> {
        batches
            .iter()
            .flat_map(|b| b.labels.column(0).iter().copied().collect::<Vec<_>>())
            .collect()
    }

    fn config(batch_size: usize, num_workers: usize, seed: Option<u64>) -> LoaderConfig {
        LoaderConfig {
            batch_size,
            num_workers,
            prefetch_factor: 2,
            seed,
        }
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        assert!(config(0, 0, None).validate().is_err());
        assert!(
            LoaderConfig {
                prefetch_factor: 0,
                ..config(4, 2, None)
            }
            .validate()
            .is_err()
        );
        assert!(LoaderConfig::default().validate().is_ok());
    }

    #[test]
    fn train_shuffles_and_covers_every_index_once() {
        let ds = chain_dataset(23);
        let mut loaders = create_loaders(
            Arc::clone(&ds),
            Arc::clone(&ds),
            Arc::clone(&ds),
            collate,
            &config(5, 0, Some(3)),
        )
        .unwrap();
        assert_eq!(loaders.train.len(), 5);

        let batches: Vec<Batch> = loaders.train.iter().map(Result::unwrap).collect();
        assert_eq!(batches.len(), 5);
        assert_eq!(batches.last().unwrap().len(), 3);

        let seen = labels_of(&batches);
        let mut sorted = seen.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(sorted, (0..23).map(|i| i as f64).collect::<Vec<_>>());
        assert_ne!(seen, sorted);
    }

    #[test]
    fn val_and_test_preserve_order() {
        let ds = chain_dataset(7);
        let mut loaders = create_loaders(
            Arc::clone(&ds),
            Arc::clone(&ds),
            ds,
            collate,
            &config(3, 0, None),
        )
        .unwrap();

        for loader in [&mut loaders.val, &mut loaders.test] {
            assert!(!loader.is_shuffled());
            let batches: Vec<Batch> = loader.iter().map(Result::unwrap).collect();
            assert_eq!(labels_of(&batches), (0..7).map(|i| i as f64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn workers_yield_the_same_batches_as_inline() {
        let ds = chain_dataset(31);
        let mut inline =
            GraphLoader::new(Arc::clone(&ds), collate, true, &config(4, 0, Some(11))).unwrap();
        let mut threaded =
            GraphLoader::new(ds, collate, true, &config(4, 3, Some(11))).unwrap();

        for _ in 0..2 {
            let a: Vec<Batch> = inline.iter().map(Result::unwrap).collect();
            let b: Vec<Batch> = threaded.iter().map(Result::unwrap).collect();
            assert_eq!(a.len(), 8);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn dropping_an_epoch_early_joins_workers() {
        let ds = chain_dataset(40);
        let mut loader = GraphLoader::new(ds, collate, false, &config(1, 2, None)).unwrap();
        let mut batches = loader.iter();
        assert!(batches.next().unwrap().is_ok());
        drop(batches);

        assert_eq!(loader.iter().count(), 40);
    }

    fn fail_short_batches(samples: Vec<Sample<'_>>) -> Result<usize, Error> {
        if samples.len() < 4 {
            Err(Error::EmptyBatch)
        } else {
            Ok(samples.len())
        }
    }

    #[test]
    fn collation_errors_are_yielded() {
        let ds = chain_dataset(10);
        let mut loader =
            GraphLoader::new(ds, fail_short_batches, false, &config(4, 2, None)).unwrap();
        let results: Vec<_> = loader.iter().collect();
        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 4);
        assert!(matches!(results[2], Err(Error::EmptyBatch)));
    }

    #[test]
    fn loaders_accept_split_views() {
        let ds = chain_dataset(12);
        let [train, val, test] = random_split(ds, [0.5, 0.25, 0.25], Some(1)).unwrap();
        let mut loaders =
            create_loaders(train, val, test, collate, &config(2, 1, Some(1))).unwrap();
        assert_eq!(loaders.train.num_samples(), 6);
        assert_eq!(loaders.val.iter().count(), 2);
        assert_eq!(loaders.test.iter().filter(Result::is_ok).count(), 2);
    }
}
