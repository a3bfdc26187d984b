//! Map arbitrary bytes to a pseudorandom [Vector].
//!
//! [Hasher::hash] reads [SIZE] bytes of digest output for the input and interprets them as
//! 1024 little-endian `u16` limbs. Hashing empty input yields the identity, so "nothing"
//! contributes nothing when mixed in.
//!
//! If the configured [Xof] returns fewer bytes than requested, the [Hasher] logs a warning
//! and expands the input with [Chained] instead. Both paths are deterministic functions of
//! the input.

use crate::{
    kv,
    pool::Pools,
    vector::{Vector, SIZE},
    xof::{Blake3Xof, Chained, Xof},
};
use std::sync::Arc;
use tracing::warn;

/// Deterministic mapping from bytes to [Vector]s, backed by pooled scratch space.
#[derive(Clone, Debug)]
pub struct Hasher<X: Xof = Blake3Xof> {
    xof: X,
    pools: Arc<Pools>,
}

impl Hasher<Blake3Xof> {
    /// Create a [Hasher] using BLAKE3 in extendable-output mode.
    pub fn new(pools: Arc<Pools>) -> Self {
        Self::with_xof(Blake3Xof, pools)
    }
}

impl<X: Xof> Hasher<X> {
    /// Create a [Hasher] using the provided digest capability.
    pub fn with_xof(xof: X, pools: Arc<Pools>) -> Self {
        Self { xof, pools }
    }

    /// The pools used for scratch buffers and output vectors.
    pub fn pools(&self) -> &Arc<Pools> {
        &self.pools
    }

    /// Hash `data` into a pooled [Vector].
    ///
    /// Return the vector with [Hasher::release] once it is no longer needed.
    pub fn hash(&self, data: &[u8]) -> Box<Vector> {
        let mut vector = self.pools.vectors.acquire();
        if data.is_empty() {
            vector.reset();
            return vector;
        }

        let mut buffer = self.pools.buffers.acquire();
        let read = self.xof.read_digest(data, &mut buffer[..]);
        if read < SIZE {
            warn!(read, expected = SIZE, "short digest read: using chained expansion");
            Chained.read_digest(data, &mut buffer[..]);
        }
        vector.fill_from(&buffer);
        self.pools.buffers.release(buffer);
        vector
    }

    /// Hash the encoding of `(namespace, key, value)`.
    ///
    /// Returns `None` (no contribution, equivalent to the identity) if `key` or
    /// `value` is empty.
    pub fn hash_kv(&self, namespace: &[u8], key: &[u8], value: &[u8]) -> Option<Box<Vector>> {
        kv::serialize(namespace, key, value).map(|encoded| self.hash(&encoded))
    }

    /// Return a vector produced by this [Hasher] to the pool.
    pub fn release(&self, vector: Box<Vector>) {
        self.pools.vectors.release(vector);
    }
}
