//! Maintain an order-independent, incrementally updatable checksum over key-value state.
//!
//! The accumulator is a [Vector] of 1024 16-bit limbs forming the group (Z/2^16)^1024. Every
//! `(namespace, key, value)` triple is mapped to a pseudorandom [Vector] by a [Hasher]; mixing
//! that vector in adds the triple to the accumulated state and mixing it out removes it again.
//! Because the group operation is commutative and invertible, the accumulated state depends
//! only on the set of triples present, never on the order in which they were applied.
//!
//! The [Engine] turns a changeset (a list of [KeyChange]s between two versions of a store)
//! into the net [Vector] delta. Small changesets are processed serially; large ones are hashed
//! and folded by several workers and merged at the end.
//!
//! # Example
//!
//! ```rust
//! use statesum_lthash::{Config, Engine, KeyChange, Vector};
//!
//! let engine = Engine::new(Config::default()).unwrap();
//!
//! // Insert a key
//! let insert = [KeyChange::insert(b"key1", b"value1")];
//! let (delta, _) = engine.compute_delta(b"bank", &insert).unwrap();
//! let mut state = Vector::identity();
//! state.mix_in(&delta);
//! assert!(!state.is_zero());
//!
//! // Delete it again
//! let delete = [KeyChange::delete(b"key1", b"value1")];
//! let (delta, _) = engine.compute_delta(b"bank", &delete).unwrap();
//! state.mix_in(&delta);
//! assert_eq!(state, Vector::identity());
//! ```
//!
//! # Status
//!
//! `statesum-lthash` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use thiserror::Error;

pub mod delta;
pub use delta::{Config, Engine, KeyChange, NamedChangeSet, Timings};
pub mod hasher;
pub use hasher::Hasher;
pub mod kv;
pub mod pool;
pub use pool::{Pool, Pools};
pub mod tracker;
pub use tracker::Tracker;
pub mod vector;
pub use vector::{Checksum, Vector};
pub mod xof;
pub use xof::{Blake3Xof, Chained, Xof};

pub use statesum_parallel::Signal;

/// Errors that can occur when interacting with the accumulator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid size: expected {expected} bytes, got {0}", expected = vector::SIZE)]
    InvalidSize(usize),
    #[error("buffer too small: need {expected} bytes, got {0}", expected = vector::SIZE)]
    BufferTooSmall(usize),
    #[error("thread pool: {0}")]
    ThreadPool(String),
    #[error("parallel: {0}")]
    Parallel(#[from] statesum_parallel::Error),
}
