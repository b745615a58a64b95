//! Classification table for entropy-device descriptors.
//!
//! A descriptor is classified while it refers to an open `/dev/random` or
//! `/dev/urandom`. The table is a fixed bitmap of atomic words, one bit per
//! descriptor number, so lookups from `read` never take a lock or allocate.

use crate::{Error, Result};
use std::ffi::{CStr, c_int, c_uint};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Paths whose descriptors are served from the deterministic stream.
pub const ENTROPY_DEVICES: [&CStr; 2] = [c"/dev/random", c"/dev/urandom"];

/// Descriptors at or above this number cannot be classified.
pub const MAX_TRACKED_FDS: usize = 1 << 16;

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = MAX_TRACKED_FDS / WORD_BITS;

/// Whether `path` names one of the entropy devices, byte for byte.
pub fn is_entropy_device(path: &CStr) -> bool {
    ENTROPY_DEVICES.contains(&path)
}

pub struct Descriptors {
    bits: [AtomicU64; WORDS],
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptors {
    pub const fn new() -> Self {
        Self {
            bits: [const { AtomicU64::new(0) }; WORDS],
        }
    }

    /// Register `fd`, just returned by the kernel for `path`.
    ///
    /// Returns whether the descriptor was classified. A non-device `fd` is
    /// cleared, since the number may have been closed behind our back while
    /// still classified. Fails when the device descriptor is beyond the
    /// table, in which case the caller must not hand the descriptor out.
    pub fn classify_on_open(&self, path: &CStr, fd: c_int) -> Result<bool> {
        if !is_entropy_device(path) {
            self.forget_stale(fd);
            return Ok(false);
        }
        self.classify(fd)?;
        debug!(fd, path = ?path, "classified entropy device");
        Ok(true)
    }

    /// Mark `fd` as an entropy-device descriptor.
    pub fn classify(&self, fd: c_int) -> Result<()> {
        let (word, mask) = slot(fd).ok_or(Error::DescriptorOutOfRange(fd))?;
        self.bits[word].fetch_or(mask, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_classified(&self, fd: c_int) -> bool {
        match slot(fd) {
            Some((word, mask)) => self.bits[word].load(Ordering::SeqCst) & mask != 0,
            None => false,
        }
    }

    /// Forget `fd`. Returns whether it was classified.
    pub fn unclassify_on_close(&self, fd: c_int) -> bool {
        let Some((word, mask)) = slot(fd) else {
            return false;
        };
        let was = self.bits[word].fetch_and(!mask, Ordering::SeqCst) & mask != 0;
        if was {
            debug!(fd, "unclassified entropy device");
        }
        was
    }

    /// Clear `fd` on a fresh descriptor number that is not a device.
    ///
    /// A set bit here means the previous holder of the number was closed by
    /// a route that bypasses `close`, such as stdio's internal close.
    pub fn forget_stale(&self, fd: c_int) {
        let Some((word, mask)) = slot(fd) else {
            return;
        };
        if self.bits[word].fetch_and(!mask, Ordering::SeqCst) & mask != 0 {
            debug!(fd, "dropped stale classification");
        }
    }

    /// Forget every descriptor in `first..=last`, as `close_range` does.
    pub fn unclassify_range(&self, first: c_uint, last: c_uint) {
        if first > last {
            return;
        }
        let end = (last as usize).min(MAX_TRACKED_FDS - 1);
        for fd in (first as usize)..=end {
            let (word, mask) = (fd / WORD_BITS, 1u64 << (fd % WORD_BITS));
            if self.bits[word].load(Ordering::Relaxed) & mask != 0 {
                self.bits[word].fetch_and(!mask, Ordering::SeqCst);
                debug!(fd, "unclassified entropy device");
            }
        }
    }

    /// Give `new_fd` the classification of `old_fd`, as after a duplication
    /// onto `new_fd`.
    pub fn inherit(&self, old_fd: c_int, new_fd: c_int) -> Result<()> {
        if self.is_classified(old_fd) {
            self.classify(new_fd)?;
            debug!(old_fd, new_fd, "duplicated entropy device");
        } else {
            self.unclassify_on_close(new_fd);
        }
        Ok(())
    }
}

fn slot(fd: c_int) -> Option<(usize, u64)> {
    let fd = usize::try_from(fd).ok()?;
    (fd < MAX_TRACKED_FDS).then(|| (fd / WORD_BITS, 1u64 << (fd % WORD_BITS)))
}
