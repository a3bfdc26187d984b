use super::{KeyChange, Timings};
use crate::{hasher::Hasher, kv, vector::Vector, xof::Xof, Error};
use statesum_parallel::{chunk_size, Signal, Strategy};
use std::time::Instant;

/// Per-entry working state, owned by exactly one worker during each phase.
#[derive(Default)]
struct Slot {
    removed: Option<Vec<u8>>,
    added: Option<Vec<u8>>,
    removed_hash: Option<Box<Vector>>,
    added_hash: Option<Box<Vector>>,
}

impl Slot {
    fn new(namespace: &[u8], change: &KeyChange) -> Self {
        let encode = |value: &[u8]| kv::serialize(namespace, &change.key, value);
        Self {
            removed: change.removed().and_then(encode),
            added: change.added().and_then(encode),
            ..Self::default()
        }
    }
}

/// Compute the delta of `entries` by splitting them across the workers of `strategy`.
pub(super) fn compute<'a, S: Strategy, X: Xof>(
    strategy: &S,
    hasher: &Hasher<X>,
    entries: impl Iterator<Item = (&'a [u8], &'a KeyChange)>,
    signal: &Signal,
) -> Result<(Vector, Timings), Error> {
    let start = Instant::now();

    // Serialize
    let mut slots: Vec<Slot> = entries
        .map(|(namespace, change)| Slot::new(namespace, change))
        .collect();
    let serialize = start.elapsed();
    let size = chunk_size(slots.len(), strategy.workers());

    // Hash (each worker only writes to the slots in its chunk)
    let phase = Instant::now();
    strategy.chunked(&mut slots, size, signal, |_, chunk| {
        for slot in chunk.iter_mut() {
            // Stop early; the next phase observes the cancellation
            if signal.is_canceled() {
                return;
            }
            slot.removed_hash = slot.removed.take().map(|encoded| hasher.hash(&encoded));
            slot.added_hash = slot.added.take().map(|encoded| hasher.hash(&encoded));
        }
    })?;
    let hash = phase.elapsed();

    // Mix (order within and across chunks is irrelevant)
    let phase = Instant::now();
    let partials = strategy.chunked(&mut slots, size, signal, |_, chunk| {
        let mut partial = hasher.pools().vectors.acquire();
        partial.reset();
        for slot in chunk.iter_mut() {
            if let Some(removed) = slot.removed_hash.take() {
                partial.mix_out(&removed);
                hasher.release(removed);
            }
            if let Some(added) = slot.added_hash.take() {
                partial.mix_in(&added);
                hasher.release(added);
            }
        }
        partial
    })?;
    let mix = phase.elapsed();

    // Merge
    let phase = Instant::now();
    let workers = partials.len();
    let mut result = Vector::identity();
    for partial in partials {
        result.mix_in(&partial);
        hasher.release(partial);
    }
    let merge = phase.elapsed();

    Ok((
        result,
        Timings {
            serialize,
            hash,
            mix,
            merge,
            total: start.elapsed(),
            workers,
        },
    ))
}
