//! Reusable instances for the hashing hot path.
//!
//! Hashing a changeset creates and discards one [Vector] and one 2048-byte scratch buffer per
//! key-value pair. A [Pool] keeps released instances on a bounded freelist so later requests
//! can reuse them instead of allocating.
//!
//! # Thread Safety
//!
//! [Pool] is `Send + Sync` and can be shared across workers. Acquire and release are lock-free
//! operations on a [`crossbeam_queue::ArrayQueue`].
//!
//! # Contract
//!
//! [Pool::acquire] returns either a previously released instance (with whatever contents it
//! had when released) or a freshly created one. Callers must initialize what they read.
//! [Pool::release] takes the instance by value, so it cannot be used again by the releaser.
//! When the freelist is full, released instances are dropped.

use crate::vector::{Vector, SIZE};
use crossbeam_queue::ArrayQueue;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::{fmt, num::NonZeroUsize};
use tracing::trace;

/// A 2048-byte scratch buffer.
pub type Buffer = Box<[u8; SIZE]>;

/// Metrics for a [Pool].
#[derive(Clone, Default)]
struct Metrics {
    /// Number of acquisitions served from the freelist.
    hits: Counter,
    /// Number of acquisitions that created a new instance.
    misses: Counter,
    /// Number of released instances dropped because the freelist was full.
    dropped: Counter,
}

/// A bounded pool of reusable instances.
pub struct Pool<T> {
    freelist: ArrayQueue<T>,
    create: fn() -> T,
    metrics: Metrics,
}

impl<T> Pool<T> {
    /// Create a pool that retains at most `capacity` released instances and
    /// creates new ones with `create`.
    pub fn new(capacity: NonZeroUsize, create: fn() -> T) -> Self {
        Self {
            freelist: ArrayQueue::new(capacity.get()),
            create,
            metrics: Metrics::default(),
        }
    }

    /// Take an instance from the pool (or create one if the pool is empty).
    pub fn acquire(&self) -> T {
        match self.freelist.pop() {
            Some(item) => {
                self.metrics.hits.inc();
                item
            }
            None => {
                self.metrics.misses.inc();
                trace!("pool empty: creating instance");
                (self.create)()
            }
        }
    }

    /// Return an instance to the pool.
    pub fn release(&self, item: T) {
        if self.freelist.push(item).is_err() {
            self.metrics.dropped.inc();
        }
    }

    /// Number of instances currently available for reuse.
    pub fn available(&self) -> usize {
        self.freelist.len()
    }

    /// Maximum number of instances retained.
    pub fn capacity(&self) -> usize {
        self.freelist.capacity()
    }

    fn register(&self, registry: &mut Registry, prefix: &str) {
        registry.register(
            format!("{prefix}_hits"),
            "Number of acquisitions served from the freelist",
            self.metrics.hits.clone(),
        );
        registry.register(
            format!("{prefix}_misses"),
            "Number of acquisitions that created a new instance",
            self.metrics.misses.clone(),
        );
        registry.register(
            format!("{prefix}_dropped"),
            "Number of released instances dropped because the freelist was full",
            self.metrics.dropped.clone(),
        );
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("available", &self.freelist.len())
            .field("capacity", &self.freelist.capacity())
            .finish()
    }
}

fn new_vector() -> Box<Vector> {
    Box::new(Vector::identity())
}

fn new_buffer() -> Buffer {
    Box::new([0u8; SIZE])
}

/// The pools used by a [crate::Hasher] and the delta engine.
///
/// A [Pools] is owned by whoever constructs it and shared with workers by reference
/// (typically inside an [`std::sync::Arc`]).
#[derive(Debug)]
pub struct Pools {
    /// Pooled [Vector]s (hash outputs and per-worker partial sums).
    pub vectors: Pool<Box<Vector>>,
    /// Pooled scratch buffers (digest output).
    pub buffers: Pool<Buffer>,
}

impl Pools {
    /// Create pools that each retain at most `capacity` released instances.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            vectors: Pool::new(capacity, new_vector),
            buffers: Pool::new(capacity, new_buffer),
        }
    }

    /// Register pool metrics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        self.vectors.register(registry, "vector_pool");
        self.buffers.register(registry, "buffer_pool");
    }
}
