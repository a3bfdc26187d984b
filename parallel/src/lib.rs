//! Fork-join execution over contiguous chunks of a slice.
//!
//! This crate provides the [`Strategy`] trait, which abstracts over sequential and parallel
//! execution of chunked work. Algorithms are written once against [`Strategy`] and executed
//! either on the current thread ([`Sequential`]) or on a rayon thread pool ([`Parallel`]).
//!
//! # Overview
//!
//! [`Strategy::chunked`] splits a mutable slice into contiguous chunks, runs an operation on
//! every chunk, and returns the per-chunk results in chunk order. Every chunk is processed
//! before the call returns (fork-join). Each operation only ever sees its own chunk, so no
//! synchronization is needed between workers.
//!
//! # Failure and Cancellation
//!
//! A panic inside a worker does not unwind through the caller. It is captured and returned
//! as [`Error::Panicked`] (if several workers panic, the one with the lowest chunk index is
//! reported). Before each chunk starts, the provided [`Signal`] is checked: once it has been
//! canceled, no further chunks start and the call returns [`Error::Canceled`]. Operations that
//! run for a long time may poll the [`Signal`] themselves.
//!
//! # Example
//!
//! ```
//! use statesum_parallel::{Sequential, Signal, Strategy};
//! use std::num::NonZeroUsize;
//!
//! let strategy = Sequential;
//! let mut data = vec![1u64, 2, 3, 4, 5];
//!
//! let sums = strategy
//!     .chunked(&mut data, NonZeroUsize::new(2).unwrap(), &Signal::new(), |_, chunk| {
//!         chunk.iter().sum::<u64>()
//!     })
//!     .unwrap();
//! assert_eq!(sums, vec![3, 7, 5]);
//! ```

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
    ThreadPool, ThreadPoolBuilder,
};
use std::{
    any::Any,
    fmt,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while running chunked work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("canceled")]
    Canceled,
    #[error("worker {0} panicked: {1}")]
    Panicked(usize, String),
}

/// Cooperative cancellation shared by the caller and all workers.
///
/// Cloning a [`Signal`] yields a handle to the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    canceled: Arc<AtomicBool>,
}

impl Signal {
    /// Create a new, not yet canceled, signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Chunks that have already started run to completion.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Returns true once [`Signal::cancel`] has been called on any handle.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

/// Number of elements per chunk when splitting `len` elements across `workers`.
///
/// Equals `ceil(len / workers)` (at least 1), so there are never more than
/// `workers` chunks.
pub fn chunk_size(len: usize, workers: NonZeroUsize) -> NonZeroUsize {
    NonZeroUsize::new(len.div_ceil(workers.get())).unwrap_or(NonZeroUsize::MIN)
}

/// A strategy for executing chunked fork-join operations.
pub trait Strategy: Clone + Send + Sync + fmt::Debug + 'static {
    /// Number of workers that may run chunks concurrently.
    fn workers(&self) -> NonZeroUsize;

    /// Run `op` on every contiguous chunk of `items` (of at most `size` elements).
    ///
    /// `op` receives the chunk index and exclusive access to the chunk. Results are
    /// returned in chunk order regardless of the order in which chunks completed.
    fn chunked<T, R, F>(
        &self,
        items: &mut [T],
        size: NonZeroUsize,
        signal: &Signal,
        op: F,
    ) -> Result<Vec<R>, Error>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &mut [T]) -> R + Send + Sync;
}

/// Run a single chunk, converting cancellation and panics into [`Error`].
fn run_chunk<T, R, F>(index: usize, chunk: &mut [T], signal: &Signal, op: &F) -> Result<R, Error>
where
    F: Fn(usize, &mut [T]) -> R,
{
    if signal.is_canceled() {
        return Err(Error::Canceled);
    }
    panic::catch_unwind(AssertUnwindSafe(|| op(index, chunk))).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(worker = index, %message, "worker panicked");
        Error::Panicked(index, message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A sequential execution strategy.
///
/// Processes chunks one after another on the current thread. Useful for small
/// workloads and for checking a parallel result against a deterministic baseline.
#[derive(Default, Debug, Clone)]
pub struct Sequential;

impl Strategy for Sequential {
    fn workers(&self) -> NonZeroUsize {
        NonZeroUsize::MIN
    }

    fn chunked<T, R, F>(
        &self,
        items: &mut [T],
        size: NonZeroUsize,
        signal: &Signal,
        op: F,
    ) -> Result<Vec<R>, Error>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &mut [T]) -> R + Send + Sync,
    {
        items
            .chunks_mut(size.get())
            .enumerate()
            .map(|(index, chunk)| run_chunk(index, chunk, signal, &op))
            .collect()
    }
}

/// A parallel execution strategy backed by a rayon thread pool.
///
/// `Parallel` holds an [`Arc<ThreadPool>`], so it can be cheaply cloned and shared.
/// Every call to [`Strategy::chunked`] blocks until all chunks have been processed.
///
/// # Examples
///
/// ```
/// use statesum_parallel::{chunk_size, Parallel, Signal, Strategy};
///
/// let strategy = Parallel::with_workers(2).unwrap();
/// let mut data: Vec<u64> = (0..1000).collect();
/// let size = chunk_size(data.len(), strategy.workers());
///
/// let partials = strategy
///     .chunked(&mut data, size, &Signal::new(), |_, chunk| chunk.iter().sum::<u64>())
///     .unwrap();
/// assert_eq!(partials.len(), 2);
/// assert_eq!(partials.iter().sum::<u64>(), 499500);
/// ```
#[derive(Debug, Clone)]
pub struct Parallel {
    thread_pool: Arc<ThreadPool>,
}

impl Parallel {
    /// Creates a new [`Parallel`] strategy with the given [`ThreadPool`].
    pub const fn new(thread_pool: Arc<ThreadPool>) -> Self {
        Self { thread_pool }
    }

    /// Creates a new [`Parallel`] strategy backed by a dedicated pool of `workers` threads.
    pub fn with_workers(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("statesum-worker-{index}"))
            .build()?;
        Ok(Self::new(Arc::new(thread_pool)))
    }
}

impl From<Arc<ThreadPool>> for Parallel {
    fn from(thread_pool: Arc<ThreadPool>) -> Self {
        Self::new(thread_pool)
    }
}

impl Strategy for Parallel {
    fn workers(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.thread_pool.current_num_threads()).unwrap_or(NonZeroUsize::MIN)
    }

    fn chunked<T, R, F>(
        &self,
        items: &mut [T],
        size: NonZeroUsize,
        signal: &Signal,
        op: F,
    ) -> Result<Vec<R>, Error>
    where
        T: Send,
        R: Send,
        F: Fn(usize, &mut [T]) -> R + Send + Sync,
    {
        self.thread_pool.install(|| {
            // Collect every chunk's outcome (rather than short-circuiting) so all
            // workers are joined before the first error is reported.
            let outcomes: Vec<Result<R, Error>> = items
                .par_chunks_mut(size.get())
                .enumerate()
                .map(|(index, chunk)| run_chunk(index, chunk, signal, &op))
                .collect();
            outcomes.into_iter().collect()
        })
    }
}
