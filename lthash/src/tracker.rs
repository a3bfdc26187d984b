//! Track the committed and working accumulator of a store.
//!
//! A [Tracker] holds two [Vector]s: the state as of the last commit and the working state
//! that includes all changesets applied since. Applying changesets only touches the working
//! state, [Tracker::commit] makes it the new committed state, and [Tracker::rollback]
//! discards everything applied since the last commit.
//!
//! Persisting the committed state is left to the caller: store [Tracker::marshal_committed]
//! alongside the committed version and pass it to [Tracker::restore] on restart.

use crate::{
    delta::{Engine, KeyChange, NamedChangeSet, Timings},
    vector::{Checksum, Vector},
    xof::Xof,
    Error,
};
use statesum_parallel::Strategy;

/// Committed and working accumulator state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tracker {
    committed: Vector,
    working: Vector,
}

impl Tracker {
    /// Create a tracker for an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker from a persisted committed state.
    pub fn restore(committed: &[u8]) -> Result<Self, Error> {
        let committed = Vector::unmarshal(committed)?;
        Ok(Self {
            working: committed.clone(),
            committed,
        })
    }

    /// Apply `changes` in `namespace` to the working state.
    pub fn apply<S: Strategy, X: Xof>(
        &mut self,
        engine: &Engine<S, X>,
        namespace: &[u8],
        changes: &[KeyChange],
    ) -> Result<Timings, Error> {
        let (delta, timings) = engine.compute_delta(namespace, changes)?;
        self.working.mix_in(&delta);
        Ok(timings)
    }

    /// Apply several changesets to the working state.
    pub fn apply_batch<S: Strategy, X: Xof>(
        &mut self,
        engine: &Engine<S, X>,
        sets: &[NamedChangeSet],
    ) -> Result<Timings, Error> {
        let (delta, timings) = engine.compute_batch(sets)?;
        self.working.mix_in(&delta);
        Ok(timings)
    }

    /// Make the working state the committed state.
    pub fn commit(&mut self) {
        self.committed.clone_from(&self.working);
    }

    /// Discard all changes applied since the last commit.
    pub fn rollback(&mut self) {
        self.working.clone_from(&self.committed);
    }

    /// The working state.
    pub fn working(&self) -> &Vector {
        &self.working
    }

    /// The committed state.
    pub fn committed(&self) -> &Vector {
        &self.committed
    }

    /// Checksum of the working state.
    pub fn root(&self) -> Checksum {
        self.working.checksum()
    }

    /// Checksum of the committed state.
    pub fn committed_root(&self) -> Checksum {
        self.committed.checksum()
    }

    /// Serialize the committed state for persistence.
    pub fn marshal_committed(&self) -> Vec<u8> {
        self.committed.marshal()
    }
}
