//! Digest capabilities used to expand input bytes into a full [crate::Vector].
//!
//! An [Xof] reads an arbitrary amount of digest output for some input. [Blake3Xof] is the
//! primary implementation. [Chained] is the fallback expansion used by [crate::Hasher] when
//! an implementation produces fewer bytes than requested: it digests the input once with
//! BLAKE3-256 and then repeatedly digests the previous 32-byte block.
//!
//! The output of [Chained] is not equal to the output of [Blake3Xof] for the same input.

/// Interface for reading digest output of arbitrary length.
pub trait Xof: Clone + Send + Sync + 'static {
    /// Fill `out` with digest output of `data`.
    ///
    /// Returns the number of bytes written. A value smaller than `out.len()` indicates a
    /// short read and the remainder of `out` must not be used.
    fn read_digest(&self, data: &[u8], out: &mut [u8]) -> usize;
}

/// BLAKE3 in extendable-output mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Xof;

impl Xof for Blake3Xof {
    fn read_digest(&self, data: &[u8], out: &mut [u8]) -> usize {
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        hasher.finalize_xof().fill(out);
        out.len()
    }
}

/// Chained fixed-output expansion.
///
/// ```text
/// block[0] = BLAKE3-256(data)
/// block[i] = BLAKE3-256(block[i - 1])
/// output   = block[0] || block[1] || ... (truncated to the requested length)
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Chained;

impl Xof for Chained {
    fn read_digest(&self, data: &[u8], out: &mut [u8]) -> usize {
        let mut block = blake3::hash(data);
        for chunk in out.chunks_mut(blake3::OUT_LEN) {
            chunk.copy_from_slice(&block.as_bytes()[..chunk.len()]);
            block = blake3::hash(block.as_bytes());
        }
        out.len()
    }
}
