//! A 1024-limb additive group element used as the accumulator state.
//!
//! [Vector] is an element of (Z/2^16)^1024 under componentwise wrapping addition. Mixing a
//! vector in is the group operation and mixing it out is its exact inverse, so any set of
//! mix-in/mix-out operations yields the same result in any order:
//!
//! - **Commutative**: `A + B == B + A`
//! - **Associative**: `(A + B) + C == A + (B + C)`
//! - **Invertible**: `(A + B) - B == A`
//!
//! # Format
//!
//! The serialized form is exactly 2048 bytes: each limb as a little-endian `u16`, in index
//! order. This layout is persisted and exchanged between nodes and must not change.
//!
//! ```text
//! +---+---+---+---+-----+------+------+
//! | 0 | 1 | 2 | 3 | ... | 2046 | 2047 |
//! +---+---+---+---+-----+------+------+
//! | limb 0| limb 1| ... |  limb 1023  |
//! +---+---+---+---+-----+------+------+
//! ```
//!
//! # Security Warning
//!
//! Mixing in the same vector 2^16 times wraps every limb back to its starting value. Callers
//! must ensure every contribution is unique (the key-value encoding includes the key).
//!
//! # Acknowledgements
//!
//! * <https://eprint.iacr.org/2019/227>: Securing Update Propagation with Homomorphic Hashing
//! * <https://github.com/solana-foundation/solana-improvement-documents/blob/main/proposals/0215-accounts-lattice-hash.md>: Homomorphic Hashing of Account State

use crate::Error;
use bytes::{Buf, BufMut};
use std::fmt;

/// Number of 16-bit limbs in a [Vector].
///
/// Following "Securing Update Propagation with Homomorphic Hashing", 1024 16-bit
/// integers provide at least 200 bits of security.
pub const LIMBS: usize = 1024;

/// Size of a serialized [Vector] in bytes.
pub const SIZE: usize = LIMBS * 2;

/// Size of a [Checksum] in bytes.
pub const CHECKSUM_SIZE: usize = blake3::OUT_LEN;

/// Accumulator state as 1024 16-bit unsigned integers.
#[derive(Clone, PartialEq, Eq)]
pub struct Vector {
    limbs: [u16; LIMBS],
}

impl Vector {
    /// Create the identity (all-zero) vector.
    pub const fn identity() -> Self {
        Self { limbs: [0u16; LIMBS] }
    }

    /// Overwrite every limb with the little-endian limbs in `bytes`.
    pub(crate) fn fill_from(&mut self, bytes: &[u8; SIZE]) {
        for (limb, pair) in self.limbs.iter_mut().zip(bytes.chunks_exact(2)) {
            *limb = u16::from_le_bytes([pair[0], pair[1]]);
        }
    }

    /// Read-only view of the limbs.
    pub fn limbs(&self) -> &[u16; LIMBS] {
        &self.limbs
    }

    /// Reset the vector to the identity in place.
    pub fn reset(&mut self) {
        self.limbs = [0u16; LIMBS];
    }

    /// Check if the vector is the identity.
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&limb| limb == 0)
    }

    /// Add `other` to this vector (mod 2^16 per limb).
    pub fn mix_in(&mut self, other: &Self) {
        for (limb, other) in self.limbs.iter_mut().zip(other.limbs.iter()) {
            *limb = limb.wrapping_add(*other);
        }
    }

    /// Subtract `other` from this vector (mod 2^16 per limb).
    ///
    /// This is the exact inverse of [Vector::mix_in].
    pub fn mix_out(&mut self, other: &Self) {
        for (limb, other) in self.limbs.iter_mut().zip(other.limbs.iter()) {
            *limb = limb.wrapping_sub(*other);
        }
    }

    /// Append the serialized form to `buf`.
    pub fn write(&self, buf: &mut impl BufMut) {
        for limb in self.limbs.iter() {
            buf.put_u16_le(*limb);
        }
    }

    /// Serialize into a new 2048-byte buffer.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SIZE);
        self.write(&mut buf);
        buf
    }

    /// Serialize into the first [SIZE] bytes of `buf`.
    pub fn marshal_to(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < SIZE {
            return Err(Error::BufferTooSmall(buf.len()));
        }
        let mut dst = &mut buf[..SIZE];
        self.write(&mut dst);
        Ok(())
    }

    /// Parse a vector from exactly [SIZE] bytes.
    pub fn unmarshal(mut data: &[u8]) -> Result<Self, Error> {
        if data.len() != SIZE {
            return Err(Error::InvalidSize(data.len()));
        }
        let mut vector = Self::identity();
        for limb in vector.limbs.iter_mut() {
            *limb = data.get_u16_le();
        }
        Ok(vector)
    }

    /// Compute the BLAKE3-256 digest of the serialized form.
    pub fn checksum(&self) -> Checksum {
        let mut buf = [0u8; SIZE];
        let mut dst = &mut buf[..];
        self.write(&mut dst);
        Checksum(*blake3::hash(&buf).as_bytes())
    }
}

impl Default for Vector {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show first and last 8 limbs
        write!(
            f,
            "Vector {{ limbs: [{:04x?}...{:04x?}] }}",
            &self.limbs[..8],
            &self.limbs[LIMBS - 8..]
        )
    }
}

/// A 32-byte digest of a [Vector], used for cheap comparison and transmission.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; CHECKSUM_SIZE]);

impl Checksum {
    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; CHECKSUM_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; CHECKSUM_SIZE]> for Checksum {
    fn from(bytes: [u8; CHECKSUM_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}
