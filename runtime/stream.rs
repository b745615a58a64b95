//! Deterministic byte stream for reproducible execution.
//!
//! Every interposed entry point draws from one process-wide [`Stream`]. Byte
//! `i` of the stream is a pure function of the seed and `i`, so the only
//! shared mutable state is the cursor. A draw reserves its range with a single
//! atomic `fetch_add` and computes the bytes afterwards, which gives
//! concurrent callers disjoint, contiguous slices of the same sequence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Seed every process starts from.
pub const DEFAULT_SEED: u64 = 12345;

/// SplitMix64 increment (2^64 / golden ratio).
const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

const BLOCK_SIZE: u64 = 8;

/// A deterministic, seekable byte stream.
pub struct Stream {
    seed: u64,
    cursor: AtomicU64,
}

impl Stream {
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            cursor: AtomicU64::new(0),
        }
    }

    /// Fill `buf` with the next `buf.len()` bytes of the stream.
    ///
    /// An empty buffer leaves the cursor untouched.
    pub fn draw(&self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        let offset = self.reserve(buf.len());
        self.fill_at(offset, buf);
    }

    /// Claim the next `len` bytes and return the offset of the first one.
    ///
    /// The RMW on the cursor is the linearization point of a draw; callers
    /// that scatter one draw over several buffers fill them with
    /// [`Stream::fill_at`] from the returned offset.
    pub fn reserve(&self, len: usize) -> u64 {
        self.cursor.fetch_add(len as u64, Ordering::Relaxed)
    }

    /// Write the stream bytes starting at `offset` into `buf`.
    pub fn fill_at(&self, offset: u64, buf: &mut [u8]) {
        keystream(self.seed, offset, buf);
    }

    pub fn next_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.draw(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    pub fn next_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.draw(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Number of bytes handed out so far.
    pub fn position(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }
}

/// Write the bytes of the stream for `seed` starting at `offset` into `buf`.
pub fn keystream(seed: u64, offset: u64, buf: &mut [u8]) {
    let mut pos = offset;
    let mut filled = 0;
    while filled < buf.len() {
        let skip = (pos % BLOCK_SIZE) as usize;
        let bytes = block(seed, pos / BLOCK_SIZE).to_le_bytes();
        let take = (bytes.len() - skip).min(buf.len() - filled);
        buf[filled..filled + take].copy_from_slice(&bytes[skip..skip + take]);
        filled += take;
        pos = pos.wrapping_add(take as u64);
    }
}

/// SplitMix64 output for the given block index.
fn block(seed: u64, index: u64) -> u64 {
    let mut z = seed.wrapping_add(index.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
