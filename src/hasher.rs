//! SHA-3 content fingerprinting.
//!
//! # Overview
//!
//! This module implements the FIPS-202 sponge (Keccak-f[1600]) as a small
//! streaming hasher and exposes the 128-bit variant used for file
//! fingerprints. 128 bits is below the smallest standardized SHA-3 width and
//! is chosen purely for throughput: the digest identifies content, it makes
//! no cryptographic commitment.
//!
//! The capacity follows the SHA-3 rule `rate = 1600 - 2 * digest_bits`, the
//! padding is the domain-separated `0x06 ... 0x80`, and lanes are absorbed
//! little-endian. A digest is converted to [`Hash128`] by taking bytes
//! `[0..8]` as `lo` and `[8..16]` as `hi`, both little-endian.
//!
//! # Example
//!
//! ```
//! use dirdb::hasher::{Sha3, Hash128};
//!
//! let mut hasher = Sha3::sha3_128();
//! hasher.update(b"hello");
//! let hash = Hash128::from_digest(&hasher.finalize());
//! assert_eq!(hash.to_hex().len(), 32);
//! ```

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use crate::error::{DirdbError, Result};
use crate::progress::ProgressTracker;

/// Iota round constants.
const IOTA: [u64; 24] = [
    0x0000000000000001,
    0x0000000000008082,
    0x800000000000808a,
    0x8000000080008000,
    0x000000000000808b,
    0x0000000080000001,
    0x8000000080008081,
    0x8000000000008009,
    0x000000000000008a,
    0x0000000000000088,
    0x0000000080008009,
    0x000000008000000a,
    0x000000008000808b,
    0x800000000000008b,
    0x8000000000008089,
    0x8000000000008003,
    0x8000000000008002,
    0x8000000000000080,
    0x000000000000800a,
    0x800000008000000a,
    0x8000000080008081,
    0x8000000000008080,
    0x0000000080000001,
    0x8000000080008008,
];

/// Rho rotation amounts, in pi-walk order.
const RHO_ROTATE: [u32; 24] = [
    1, 3, 6, 10, 15, 21, 28, 36, 45, 55, 2, 14, 27, 41, 56, 8, 25, 43, 62, 18, 39, 61, 20, 44,
];

/// Pi lane permutation offsets.
const PI_OFFSETS: [usize; 24] = [
    10, 7, 11, 17, 18, 3, 5, 16, 8, 21, 24, 4, 15, 23, 19, 13, 12, 2, 20, 14, 22, 9, 6, 1,
];

/// Streaming SHA-3 hasher over Keccak-f[1600].
///
/// Construct with a digest width, feed data with [`update`](Self::update)
/// and retrieve the digest once with [`finalize`](Self::finalize). Call
/// [`clear`](Self::clear) before reusing the instance for new data.
#[derive(Clone)]
pub struct Sha3 {
    state: [u64; 25],
    digest_bytes: usize,
    block_bytes: usize,
    buffer_pos: usize,
}

impl Sha3 {
    /// Create a hasher for the given digest width in bits.
    ///
    /// The width must be a multiple of 8 and small enough to leave a
    /// positive rate (`digest_bits < 800`).
    #[must_use]
    pub fn new(digest_bits: usize) -> Self {
        assert!(digest_bits % 8 == 0 && digest_bits > 0 && digest_bits < 800);
        let digest_bytes = digest_bits / 8;
        Self {
            state: [0u64; 25],
            digest_bytes,
            block_bytes: 200 - 2 * digest_bytes,
            buffer_pos: 0,
        }
    }

    /// The 128-bit fingerprint variant (non-standard width, fast rate).
    #[must_use]
    pub fn sha3_128() -> Self {
        Self::new(128)
    }

    /// The standard SHA3-256 variant.
    #[must_use]
    pub fn sha3_256() -> Self {
        Self::new(256)
    }

    /// Reset the hasher for a fresh message.
    pub fn clear(&mut self) {
        self.state = [0u64; 25];
        self.buffer_pos = 0;
    }

    /// Absorb message bytes. May be called any number of times.
    pub fn update(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            // Whole-lane fast path when both sides are 8-byte aligned.
            if self.buffer_pos % 8 == 0 {
                while bytes.len() >= 8 && self.block_bytes - self.buffer_pos >= 8 {
                    let lane = u64::from_le_bytes(bytes[..8].try_into().unwrap());
                    self.state[self.buffer_pos / 8] ^= lane;
                    self.buffer_pos += 8;
                    bytes = &bytes[8..];
                }
            }
            if !bytes.is_empty() && self.buffer_pos < self.block_bytes {
                self.xor_byte(self.buffer_pos, bytes[0]);
                self.buffer_pos += 1;
                bytes = &bytes[1..];
            }
            if self.buffer_pos >= self.block_bytes {
                keccak_f(&mut self.state);
                self.buffer_pos = 0;
            }
        }
    }

    /// Pad, permute and return the digest.
    ///
    /// Must be called exactly once per message; call
    /// [`clear`](Self::clear) before hashing new data.
    pub fn finalize(&mut self) -> Vec<u8> {
        self.xor_byte(self.buffer_pos, 0x06);
        self.xor_byte(self.block_bytes - 1, 0x80);
        keccak_f(&mut self.state);

        let mut digest = Vec::with_capacity(self.digest_bytes);
        for lane in 0..self.digest_bytes.div_ceil(8) {
            let bytes = self.state[lane].to_le_bytes();
            let take = (self.digest_bytes - lane * 8).min(8);
            digest.extend_from_slice(&bytes[..take]);
        }
        digest
    }

    fn xor_byte(&mut self, pos: usize, value: u8) {
        self.state[pos / 8] ^= u64::from(value) << ((pos % 8) * 8);
    }
}

/// One Keccak-f[1600] permutation (24 rounds).
fn keccak_f(state: &mut [u64; 25]) {
    for &round_constant in &IOTA {
        // Theta.
        let mut c = [0u64; 5];
        for i in 0..5 {
            c[i] = state[i] ^ state[i + 5] ^ state[i + 10] ^ state[i + 15] ^ state[i + 20];
        }
        for i in 0..5 {
            let d = c[(i + 4) % 5] ^ c[(i + 1) % 5].rotate_left(1);
            for j in (0..25).step_by(5) {
                state[j + i] ^= d;
            }
        }

        // Rho and Pi.
        let mut carry = state[1];
        for i in 0..24 {
            let j = PI_OFFSETS[i];
            let next = state[j];
            state[j] = carry.rotate_left(RHO_ROTATE[i]);
            carry = next;
        }

        // Chi.
        for j in (0..25).step_by(5) {
            let row: [u64; 5] = state[j..j + 5].try_into().unwrap();
            for i in 0..5 {
                state[j + i] = row[i] ^ (!row[(i + 1) % 5] & row[(i + 2) % 5]);
            }
        }

        // Iota.
        state[0] ^= round_constant;
    }
}

/// A 128-bit content fingerprint.
///
/// Ordering compares `hi` first, then `lo`, so sorted fingerprints are in
/// big-endian numeric order. The canonical hex form prints `lo` then `hi`,
/// each as 16 zero-padded hex digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash128 {
    pub hi: u64,
    pub lo: u64,
}

impl Hash128 {
    /// Build from the first 16 bytes of a digest.
    ///
    /// # Panics
    ///
    /// Panics if the digest is shorter than 16 bytes; callers hash with a
    /// width of at least 128 bits.
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        let lo = u64::from_le_bytes(digest[0..8].try_into().unwrap());
        let hi = u64::from_le_bytes(digest[8..16].try_into().unwrap());
        Self { hi, lo }
    }

    /// The digest byte form this fingerprint was built from.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&self.lo.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.hi.to_le_bytes());
        bytes
    }

    /// Canonical 32-digit hex form.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.lo, self.hi)
    }

    /// Fingerprint of this content combined with a file name.
    ///
    /// Re-hashes the 16 digest bytes followed by the raw name bytes. Used
    /// when content identity is required to also match on the basename.
    #[must_use]
    pub fn combined_with_name(self, name: &str) -> Self {
        let mut hasher = Sha3::sha3_128();
        hasher.update(&self.to_bytes());
        hasher.update(name.as_bytes());
        Self::from_digest(&hasher.finalize())
    }

    /// Number of identical leading bits between two fingerprints,
    /// counted from the most significant bit of `hi`.
    #[must_use]
    pub fn common_leading_bits(self, other: Self) -> u32 {
        let hi_xor = self.hi ^ other.hi;
        if hi_xor != 0 {
            hi_xor.leading_zeros()
        } else {
            64 + (self.lo ^ other.lo).leading_zeros()
        }
    }
}

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint an in-memory byte slice.
#[must_use]
pub fn sha3_128(bytes: &[u8]) -> Hash128 {
    let mut hasher = Sha3::sha3_128();
    hasher.update(bytes);
    Hash128::from_digest(&hasher.finalize())
}

/// Stream a file through the fingerprint hasher.
///
/// Reads the file in `bufsize` chunks, reporting per-chunk progress when a
/// tracker is given. Returns the fingerprint and the seconds spent hashing.
///
/// # Errors
///
/// Returns [`DirdbError::Io`] if the file cannot be opened and
/// [`DirdbError::Hash`] if a read fails mid-stream.
pub fn hash_file(
    path: &Path,
    file_size: u64,
    bufsize: usize,
    progress: Option<&ProgressTracker>,
) -> Result<(Hash128, f64)> {
    let mut file = File::open(path).map_err(|e| DirdbError::io(path, e))?;
    if let Some(tracker) = progress {
        tracker.on_hash_start(path, file_size);
    }

    let mut hasher = Sha3::sha3_128();
    let mut buffer = vec![0u8; bufsize.max(1)];
    let start = Instant::now();
    loop {
        let count = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if let Some(tracker) = progress {
                    tracker.on_hash_end();
                }
                return Err(DirdbError::Hash {
                    path: path.to_path_buf(),
                    detail: format!("read failed mid-stream: {e}"),
                });
            }
        };
        hasher.update(&buffer[..count]);
        if let Some(tracker) = progress {
            tracker.on_hash_progress(count as u64);
        }
    }
    let seconds = start.elapsed().as_secs_f64();
    if let Some(tracker) = progress {
        tracker.on_hash_end();
    }

    let digest = hasher.finalize();
    if digest.len() < 16 {
        return Err(DirdbError::Hash {
            path: path.to_path_buf(),
            detail: format!("unexpected digest length {}", digest.len()),
        });
    }
    Ok((Hash128::from_digest(&digest), seconds))
}
