//! Deterministic libc function implementations.
//!
//! This module provides the interposed C library entry points. Each keeps the
//! exact signature and error convention of the function it shadows and
//! differs only in where "random" bytes come from.
//!
//! # Modules
//!
//! * [`fcntl`] - Descriptor bookkeeping: open, close and duplication
//! * [`unistd`] - Plain and positional reads from entropy-device descriptors
//! * [`uio`] - Vectored reads from entropy-device descriptors
//! * [`random`] - `getrandom` and `getentropy`
//! * [`syscall`] - The raw `syscall()` wrapper
//! * [`rand`] - Pseudo-random number generation functions

use crate::runtime::Stream;
use crate::{Error, Result};

pub mod fcntl;
pub mod rand;
pub mod random;
#[cfg(target_os = "linux")]
pub mod syscall;
pub mod uio;
pub mod unistd;

/// Largest transfer Linux performs in one read-like call.
pub const MAX_RW_COUNT: usize = 0x7fff_f000;

/// Most iovecs one vectored call accepts (`UIO_MAXIOV`).
pub const IOV_MAX: usize = 1024;

/// Set the calling thread's errno.
pub(crate) fn set_errno(errno: libc::c_int) {
    unsafe {
        *libc::__errno_location() = errno;
    }
}

/// Report `err` to a C caller: set errno and return -1.
pub(crate) fn fail<T: From<i8>>(err: Error) -> T {
    set_errno(err.errno());
    T::from(-1)
}

/// Fill a caller buffer from the stream.
///
/// Returns the number of bytes written, which is `len` capped at
/// [`MAX_RW_COUNT`]. A zero length never draws.
pub(crate) fn fill_from_stream(
    stream: &Stream,
    buf: *mut libc::c_void,
    len: libc::size_t,
) -> Result<usize> {
    if len == 0 {
        return Ok(0);
    }
    if buf.is_null() {
        return Err(Error::BadAddress);
    }
    let len = len.min(MAX_RW_COUNT);
    let buf = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, len) };
    stream.draw(buf);
    Ok(len)
}

/// Scatter one draw over an iovec array, filling the vectors in order.
///
/// Follows `readv` on a device: the total is capped at [`MAX_RW_COUNT`], and
/// a vector with a null base ends the transfer early, or fails it with
/// `EFAULT` when nothing was transferred yet.
pub(crate) fn fill_vectored(
    stream: &Stream,
    iov: *const libc::iovec,
    iovcnt: libc::c_int,
) -> Result<usize> {
    let count = usize::try_from(iovcnt).map_err(|_| Error::InvalidIovec)?;
    if count > IOV_MAX {
        return Err(Error::InvalidIovec);
    }
    if count == 0 {
        return Ok(0);
    }
    if iov.is_null() {
        return Err(Error::BadAddress);
    }
    let iov = unsafe { std::slice::from_raw_parts(iov, count) };

    let mut total: usize = 0;
    for vec in iov {
        total = total
            .checked_add(vec.iov_len)
            .filter(|&t| t <= isize::MAX as usize)
            .ok_or(Error::InvalidIovec)?;
    }

    let mut len = 0;
    let mut faulted = false;
    for vec in iov {
        let take = vec.iov_len.min(MAX_RW_COUNT - len);
        if take == 0 {
            continue;
        }
        if vec.iov_base.is_null() {
            faulted = true;
            break;
        }
        len += take;
    }
    if len == 0 {
        return if faulted { Err(Error::BadAddress) } else { Ok(0) };
    }

    let offset = stream.reserve(len);
    let mut done = 0;
    for vec in iov {
        if done == len {
            break;
        }
        let take = vec.iov_len.min(len - done);
        if take == 0 {
            continue;
        }
        let buf = unsafe { std::slice::from_raw_parts_mut(vec.iov_base as *mut u8, take) };
        stream.fill_at(offset + done as u64, buf);
        done += take;
    }
    Ok(len)
}

#[cfg(test)]
pub(crate) fn last_errno() -> libc::c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
