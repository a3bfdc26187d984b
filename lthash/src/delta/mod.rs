//! Compute the net [Vector] change produced by a changeset.
//!
//! For every [KeyChange], the previous value's contribution (if any) is mixed out and the new
//! value's contribution (unless the key was deleted) is mixed in. Because mixing is
//! commutative and invertible, the resulting delta can be computed in any order and applied
//! to a running accumulator with [Vector::mix_in].
//!
//! Changesets with fewer than [Config::parallel_threshold] entries are processed serially on
//! the calling thread. Larger changesets run in four phases:
//!
//! 1. **Serialize**: encode every old/new key-value pair (single-threaded).
//! 2. **Hash**: split the entries into one contiguous chunk per worker and hash every encoding.
//! 3. **Mix**: each worker folds its chunk into a private partial [Vector].
//! 4. **Merge**: mix every partial into the result (single-threaded).
//!
//! Both paths produce bit-identical results.

use crate::{
    hasher::Hasher,
    pool::Pools,
    vector::Vector,
    xof::{Blake3Xof, Xof},
    Error,
};
use statesum_parallel::{Parallel, Signal, Strategy};
use std::{num::NonZeroUsize, sync::Arc, thread, time::Duration};
use tracing::debug;

mod parallel;
mod serial;

/// Default minimum number of entries processed by the parallel path.
pub const PARALLEL_THRESHOLD: usize = 100;

/// Default number of instances retained by each pool.
pub const POOL_CAPACITY: usize = 1024;

/// A single mutation of a key between two versions of a store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyChange {
    /// The key that changed.
    pub key: Vec<u8>,
    /// The value after the change (ignored if `deleted`).
    pub new_value: Option<Vec<u8>>,
    /// The value before the change, if the key existed.
    pub old_value: Option<Vec<u8>>,
    /// Whether the key was removed.
    pub deleted: bool,
}

impl KeyChange {
    /// A key written for the first time.
    pub fn insert(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            new_value: Some(value.to_vec()),
            old_value: None,
            deleted: false,
        }
    }

    /// A key overwritten with a new value.
    pub fn update(key: &[u8], old_value: &[u8], new_value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            new_value: Some(new_value.to_vec()),
            old_value: Some(old_value.to_vec()),
            deleted: false,
        }
    }

    /// A key removed from the store.
    pub fn delete(key: &[u8], old_value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            new_value: None,
            old_value: Some(old_value.to_vec()),
            deleted: true,
        }
    }

    /// The value whose contribution must be mixed in, if any.
    fn added(&self) -> Option<&[u8]> {
        if self.deleted {
            return None;
        }
        self.new_value.as_deref()
    }

    /// The value whose contribution must be mixed out, if any.
    fn removed(&self) -> Option<&[u8]> {
        self.old_value.as_deref()
    }
}

/// The changes applied to one namespace (logical database) in a commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamedChangeSet {
    pub namespace: Vec<u8>,
    pub changes: Vec<KeyChange>,
}

/// Time spent in each phase of a delta computation.
///
/// The serial path does not merge, so `merge` is zero there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timings {
    pub serialize: Duration,
    pub hash: Duration,
    pub mix: Duration,
    pub merge: Duration,
    pub total: Duration,
    /// Number of workers the entries were split across (1 for the serial path).
    pub workers: usize,
}

/// Configuration for an [Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers used for large changesets.
    ///
    /// If `None`, the available parallelism of the host is used.
    pub workers: Option<NonZeroUsize>,

    /// Changesets with fewer entries than this are processed serially.
    pub parallel_threshold: usize,

    /// Maximum number of released instances retained by each pool.
    pub pool_capacity: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: None,
            parallel_threshold: PARALLEL_THRESHOLD,
            pool_capacity: NonZeroUsize::new(POOL_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Available parallelism of the host (1 if it cannot be determined).
fn default_workers() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Iterate over the entries of a single changeset.
fn entries<'a>(
    namespace: &'a [u8],
    changes: &'a [KeyChange],
) -> impl Iterator<Item = (&'a [u8], &'a KeyChange)> + 'a {
    changes.iter().map(move |change| (namespace, change))
}

/// Iterate over the entries of several changesets.
fn batch_entries<'a>(
    sets: &'a [NamedChangeSet],
) -> impl Iterator<Item = (&'a [u8], &'a KeyChange)> + 'a {
    sets.iter()
        .flat_map(|set| entries(set.namespace.as_slice(), set.changes.as_slice()))
}

/// Computes changeset deltas with a configurable execution [Strategy].
#[derive(Clone, Debug)]
pub struct Engine<S: Strategy = Parallel, X: Xof = Blake3Xof> {
    strategy: S,
    hasher: Hasher<X>,
    parallel_threshold: usize,
}

impl Engine<Parallel, Blake3Xof> {
    /// Create an [Engine] with a dedicated thread pool and its own [Pools].
    pub fn new(cfg: Config) -> Result<Self, Error> {
        let workers = cfg.workers.unwrap_or_else(default_workers);
        let strategy = Parallel::with_workers(workers.get())
            .map_err(|err| Error::ThreadPool(err.to_string()))?;
        let pools = Arc::new(Pools::new(cfg.pool_capacity));
        Ok(Self::with_strategy(
            strategy,
            Hasher::new(pools),
            cfg.parallel_threshold,
        ))
    }
}

impl<S: Strategy, X: Xof> Engine<S, X> {
    /// Create an [Engine] from an existing strategy and [Hasher].
    pub fn with_strategy(strategy: S, hasher: Hasher<X>, parallel_threshold: usize) -> Self {
        Self {
            strategy,
            hasher,
            parallel_threshold,
        }
    }

    /// The [Hasher] used to map key-value pairs to vectors.
    pub fn hasher(&self) -> &Hasher<X> {
        &self.hasher
    }

    /// The pools shared by the [Hasher] and all workers.
    pub fn pools(&self) -> &Arc<Pools> {
        self.hasher.pools()
    }

    /// Compute the delta produced by `changes` in `namespace`.
    pub fn compute_delta(
        &self,
        namespace: &[u8],
        changes: &[KeyChange],
    ) -> Result<(Vector, Timings), Error> {
        self.compute_delta_with(namespace, changes, &Signal::new())
    }

    /// Compute the delta produced by `changes` in `namespace`, stopping early
    /// (with [statesum_parallel::Error::Canceled]) if `signal` is canceled.
    pub fn compute_delta_with(
        &self,
        namespace: &[u8],
        changes: &[KeyChange],
        signal: &Signal,
    ) -> Result<(Vector, Timings), Error> {
        self.dispatch(changes.len(), entries(namespace, changes), signal)
    }

    /// Compute the combined delta of several changesets.
    ///
    /// The threshold applies to the total number of entries across all sets.
    pub fn compute_batch(&self, sets: &[NamedChangeSet]) -> Result<(Vector, Timings), Error> {
        let len = sets.iter().map(|set| set.changes.len()).sum();
        self.dispatch(len, batch_entries(sets), &Signal::new())
    }

    /// Compute `base + delta(changes)` without modifying `base`.
    pub fn apply(
        &self,
        base: &Vector,
        namespace: &[u8],
        changes: &[KeyChange],
    ) -> Result<(Vector, Timings), Error> {
        let (delta, timings) = self.compute_delta(namespace, changes)?;
        let mut next = base.clone();
        next.mix_in(&delta);
        Ok((next, timings))
    }

    /// Compute the delta on the calling thread, regardless of size.
    pub fn serial(&self, namespace: &[u8], changes: &[KeyChange]) -> (Vector, Timings) {
        serial::compute(&self.hasher, entries(namespace, changes))
    }

    /// Compute the delta across all workers, regardless of size.
    pub fn parallel(
        &self,
        namespace: &[u8],
        changes: &[KeyChange],
        signal: &Signal,
    ) -> Result<(Vector, Timings), Error> {
        parallel::compute(
            &self.strategy,
            &self.hasher,
            entries(namespace, changes),
            signal,
        )
    }

    fn dispatch<'a>(
        &self,
        len: usize,
        entries: impl Iterator<Item = (&'a [u8], &'a KeyChange)>,
        signal: &Signal,
    ) -> Result<(Vector, Timings), Error> {
        let (delta, timings) = if len < self.parallel_threshold {
            serial::compute(&self.hasher, entries)
        } else {
            parallel::compute(&self.strategy, &self.hasher, entries, signal)?
        };
        debug!(
            entries = len,
            workers = timings.workers,
            serialize = ?timings.serialize,
            hash = ?timings.hash,
            mix = ?timings.mix,
            merge = ?timings.merge,
            total = ?timings.total,
            "computed delta"
        );
        Ok((delta, timings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use statesum_parallel::Sequential;

    fn engine(workers: usize) -> Engine {
        Engine::new(Config {
            workers: NonZeroUsize::new(workers),
            ..Config::default()
        })
        .unwrap()
    }

    fn changeset(n: usize) -> Vec<KeyChange> {
        (0..n)
            .map(|i| {
                let key = format!("key{i}");
                match i % 4 {
                    0 => KeyChange::insert(key.as_bytes(), format!("value{i}").as_bytes()),
                    1 => KeyChange::update(
                        key.as_bytes(),
                        format!("old{i}").as_bytes(),
                        format!("new{i}").as_bytes(),
                    ),
                    2 => KeyChange::delete(key.as_bytes(), format!("gone{i}").as_bytes()),
                    _ => KeyChange {
                        key: key.into_bytes(),
                        new_value: Some(vec![]),
                        old_value: Some(format!("prior{i}").into_bytes()),
                        deleted: false,
                    },
                }
            })
            .collect()
    }

    #[test_traced]
    fn test_empty_changeset() {
        let (delta, timings) = engine(4).compute_delta(b"test", &[]).unwrap();
        assert!(delta.is_zero());
        assert_eq!(timings.workers, 1);
        assert!(timings.total >= timings.serialize);
    }

    #[test_traced]
    fn test_single_insert() {
        let changes = [KeyChange::insert(b"key1", b"value1")];
        let (delta, _) = engine(4).compute_delta(b"test", &changes).unwrap();
        assert!(!delta.is_zero());
    }

    #[test]
    fn test_insert_then_delete_cancels() {
        let engine = engine(4);
        let (mut inserted, _) = engine
            .compute_delta(b"test", &[KeyChange::insert(b"key1", b"value1")])
            .unwrap();
        let (deleted, _) = engine
            .compute_delta(b"test", &[KeyChange::delete(b"key1", b"value1")])
            .unwrap();
        inserted.mix_in(&deleted);
        assert_eq!(inserted, Vector::identity());
    }

    #[test]
    fn test_update_equals_delete_plus_insert() {
        let engine = engine(2);
        let (update, _) = engine
            .compute_delta(b"test", &[KeyChange::update(b"k", b"v1", b"v2")])
            .unwrap();
        let (mut expected, _) = engine
            .compute_delta(b"test", &[KeyChange::delete(b"k", b"v1")])
            .unwrap();
        let (insert, _) = engine
            .compute_delta(b"test", &[KeyChange::insert(b"k", b"v2")])
            .unwrap();
        expected.mix_in(&insert);
        assert_eq!(update, expected);
    }

    #[test]
    fn test_no_contribution_entries() {
        let engine = engine(2);
        let changes = [
            // Neither value present
            KeyChange {
                key: b"k1".to_vec(),
                ..KeyChange::default()
            },
            // Deletion without a prior value
            KeyChange {
                key: b"k2".to_vec(),
                deleted: true,
                ..KeyChange::default()
            },
            // Deletion ignores the new value
            KeyChange {
                key: b"k3".to_vec(),
                new_value: Some(b"v".to_vec()),
                deleted: true,
                ..KeyChange::default()
            },
            // Empty key
            KeyChange::insert(b"", b"v"),
            // Empty value
            KeyChange::insert(b"k4", b""),
        ];
        let (delta, _) = engine.compute_delta(b"test", &changes).unwrap();
        assert!(delta.is_zero());
    }

    #[test]
    fn test_serial_matches_manual_accumulation() {
        let engine = engine(1);
        let hasher = engine.hasher();
        let changes = changeset(8);

        let mut expected = Vector::identity();
        for change in &changes {
            if let Some(old) = &change.old_value {
                if let Some(v) = hasher.hash_kv(b"ns", &change.key, old) {
                    expected.mix_out(&v);
                }
            }
            if !change.deleted {
                if let Some(new) = &change.new_value {
                    if let Some(v) = hasher.hash_kv(b"ns", &change.key, new) {
                        expected.mix_in(&v);
                    }
                }
            }
        }
        let (delta, timings) = engine.serial(b"ns", &changes);
        assert_eq!(delta, expected);
        assert_eq!(timings.merge, Duration::ZERO);
    }

    #[test_traced]
    fn test_parallel_matches_serial() {
        let changes = changeset(1000);
        for workers in [1, 2, 3, 8] {
            let engine = engine(workers);
            let (serial, _) = engine.serial(b"evm", &changes);
            let (parallel, timings) = engine.parallel(b"evm", &changes, &Signal::new()).unwrap();
            assert_eq!(parallel, serial);
            assert_eq!(timings.workers, workers);
            assert!(!parallel.is_zero());
        }
    }

    #[test]
    fn test_threshold_dispatch() {
        let engine = engine(4);
        let (_, small) = engine.compute_delta(b"ns", &changeset(99)).unwrap();
        assert_eq!(small.workers, 1);
        let (_, large) = engine.compute_delta(b"ns", &changeset(100)).unwrap();
        assert_eq!(large.workers, 4);
    }

    #[test]
    fn test_fewer_entries_than_workers() {
        let engine = Engine::new(Config {
            workers: NonZeroUsize::new(8),
            parallel_threshold: 0,
            ..Config::default()
        })
        .unwrap();
        let changes = changeset(3);
        let (parallel, timings) = engine.compute_delta(b"ns", &changes).unwrap();
        assert_eq!(parallel, engine.serial(b"ns", &changes).0);
        assert_eq!(timings.workers, 3);

        let (empty, _) = engine.compute_delta(b"ns", &[]).unwrap();
        assert!(empty.is_zero());
    }

    #[test]
    fn test_sequential_strategy_matches() {
        let changes = changeset(250);
        let pools = Arc::new(Pools::new(NonZeroUsize::new(8).unwrap()));
        let sequential = Engine::with_strategy(Sequential, Hasher::new(pools), 0);
        let (expected, _) = engine(4).compute_delta(b"ns", &changes).unwrap();
        let (delta, _) = sequential.compute_delta(b"ns", &changes).unwrap();
        assert_eq!(delta, expected);
    }

    #[test]
    fn test_order_independent() {
        let engine = engine(4);
        let changes = changeset(300);
        let mut reversed = changes.clone();
        reversed.reverse();
        let (forward, _) = engine.compute_delta(b"ns", &changes).unwrap();
        let (backward, _) = engine.compute_delta(b"ns", &reversed).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_split_changeset_sums() {
        let engine = engine(4);
        let changes = changeset(400);
        let (whole, _) = engine.compute_delta(b"ns", &changes).unwrap();
        let (mut left, _) = engine.compute_delta(b"ns", &changes[..150]).unwrap();
        let (right, _) = engine.compute_delta(b"ns", &changes[150..]).unwrap();
        left.mix_in(&right);
        assert_eq!(left, whole);
    }

    #[test]
    fn test_apply_leaves_base_untouched() {
        let engine = engine(2);
        let (base, _) = engine
            .compute_delta(b"ns", &[KeyChange::insert(b"a", b"1")])
            .unwrap();
        let snapshot = base.clone();

        let (next, _) = engine
            .apply(&base, b"ns", &[KeyChange::update(b"a", b"1", b"2")])
            .unwrap();
        assert_eq!(base, snapshot);

        let (expected, _) = engine
            .compute_delta(b"ns", &[KeyChange::insert(b"a", b"2")])
            .unwrap();
        assert_eq!(next, expected);
    }

    #[test]
    fn test_batch_matches_individual() {
        let engine = engine(4);
        let sets = vec![
            NamedChangeSet {
                namespace: b"storage".to_vec(),
                changes: changeset(60),
            },
            NamedChangeSet {
                namespace: b"account".to_vec(),
                changes: changeset(60),
            },
            NamedChangeSet {
                namespace: b"code".to_vec(),
                changes: changeset(5),
            },
        ];

        let mut expected = Vector::identity();
        for set in &sets {
            let (delta, _) = engine.compute_delta(&set.namespace, &set.changes).unwrap();
            expected.mix_in(&delta);
        }

        // 125 entries in total: processed in parallel
        let (batch, timings) = engine.compute_batch(&sets).unwrap();
        assert_eq!(batch, expected);
        assert_eq!(timings.workers, 4);

        // Same keys in different namespaces do not cancel
        let (storage, _) = engine.compute_delta(b"storage", &sets[0].changes).unwrap();
        let (account, _) = engine.compute_delta(b"account", &sets[1].changes).unwrap();
        assert_ne!(storage, account);
    }

    #[test]
    fn test_canceled() {
        let engine = engine(4);
        let signal = Signal::new();
        signal.cancel();
        let result = engine.compute_delta_with(b"ns", &changeset(500), &signal);
        assert_eq!(
            result,
            Err(Error::Parallel(statesum_parallel::Error::Canceled))
        );

        // Small changesets run serially and are not interrupted
        assert!(engine
            .compute_delta_with(b"ns", &changeset(10), &signal)
            .is_ok());
    }

    #[test]
    fn test_pools_reused_across_calls() {
        let engine = engine(4);
        let changes = changeset(200);
        engine.compute_delta(b"ns", &changes).unwrap();
        let available = engine.pools().vectors.available();
        assert!(available > 0);

        // A second call draws from (and refills) the same pools
        let (again, _) = engine.compute_delta(b"ns", &changes).unwrap();
        assert_eq!(again, engine.serial(b"ns", &changes).0);
        assert!(engine.pools().vectors.available() >= available.min(4));
    }
}
