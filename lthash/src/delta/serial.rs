use super::{KeyChange, Timings};
use crate::{hasher::Hasher, kv, vector::Vector, xof::Xof};
use std::time::Instant;

/// Mix the contribution of `(namespace, key, value)` into (or out of) `acc`.
#[allow(clippy::too_many_arguments)]
fn accumulate<X: Xof>(
    hasher: &Hasher<X>,
    acc: &mut Vector,
    scratch: &mut Vec<u8>,
    timings: &mut Timings,
    namespace: &[u8],
    key: &[u8],
    value: &[u8],
    remove: bool,
) {
    let start = Instant::now();
    scratch.clear();
    let encoded = kv::serialize_into(scratch, namespace, key, value);
    timings.serialize += start.elapsed();
    if !encoded {
        return;
    }

    let start = Instant::now();
    let hashed = hasher.hash(scratch.as_slice());
    timings.hash += start.elapsed();

    let start = Instant::now();
    if remove {
        acc.mix_out(&hashed);
    } else {
        acc.mix_in(&hashed);
    }
    hasher.release(hashed);
    timings.mix += start.elapsed();
}

/// Compute the delta of `entries` on the calling thread.
pub(super) fn compute<'a, X: Xof>(
    hasher: &Hasher<X>,
    entries: impl Iterator<Item = (&'a [u8], &'a KeyChange)>,
) -> (Vector, Timings) {
    let start = Instant::now();
    let mut timings = Timings {
        workers: 1,
        ..Timings::default()
    };
    let mut acc = Vector::identity();
    let mut scratch = Vec::new();
    for (namespace, change) in entries {
        if let Some(old) = change.removed() {
            accumulate(
                hasher,
                &mut acc,
                &mut scratch,
                &mut timings,
                namespace,
                &change.key,
                old,
                true,
            );
        }
        if let Some(new) = change.added() {
            accumulate(
                hasher,
                &mut acc,
                &mut scratch,
                &mut timings,
                namespace,
                &change.key,
                new,
                false,
            );
        }
    }
    timings.total = start.elapsed();
    (acc, timings)
}
