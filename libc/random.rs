//! Kernel randomness calls: `getrandom` and `getentropy`.
//!
//! Both are answered from the stream and never block, whatever flags the
//! caller passes.

use super::{fail, fill_from_stream};
use crate::runtime::{self, Stream};
use crate::{Error, Result};
use libc::{GRND_NONBLOCK, GRND_RANDOM, c_int, c_uint, c_void, size_t, ssize_t};
use macros::interpose;
use tracing::trace;

/// Use the non-blocking pool even before it is initialized (Linux 5.6+).
const GRND_INSECURE: c_uint = 0x0004;

/// Largest request `getentropy` accepts.
pub const GETENTROPY_MAX: size_t = 256;

/// `getrandom` semantics on top of the stream, shared with `syscall()`.
pub(crate) fn getrandom_from_stream(
    stream: &Stream,
    buf: *mut c_void,
    buflen: size_t,
    flags: c_uint,
) -> Result<usize> {
    if flags & !(GRND_NONBLOCK | GRND_RANDOM | GRND_INSECURE) != 0
        || (flags & (GRND_RANDOM | GRND_INSECURE)) == (GRND_RANDOM | GRND_INSECURE)
    {
        return Err(Error::InvalidFlags(flags));
    }
    fill_from_stream(stream, buf, buflen)
}

/// Obtain a series of random bytes.
///
/// Ref: <https://man7.org/linux/man-pages/man2/getrandom.2.html>
#[interpose]
pub fn getrandom(buf: *mut c_void, buflen: size_t, flags: c_uint) -> ssize_t {
    let rt = runtime::get();
    trace!(buflen, flags, "getrandom");
    match getrandom_from_stream(&rt.stream, buf, buflen, flags) {
        Ok(n) => n as ssize_t,
        Err(err) => fail(err),
    }
}

/// Fill a buffer with random bytes.
///
/// Ref: <https://man7.org/linux/man-pages/man3/getentropy.3.html>
#[interpose]
pub fn getentropy(buf: *mut c_void, length: size_t) -> c_int {
    let rt = runtime::get();
    trace!(length, "getentropy");
    if length > GETENTROPY_MAX {
        return fail(Error::EntropyRequestTooLarge(length));
    }
    match fill_from_stream(&rt.stream, buf, length) {
        Ok(_) => 0,
        Err(err) => fail(err),
    }
}
