//! Vectored reads: `readv` and the `preadv` family.
//!
//! A classified descriptor fills the caller's vectors in order from a single
//! draw, so the bytes are the same as one `read` of the total length.

use super::{fail, fill_vectored};
use crate::Error;
use crate::runtime::{self, Runtime};
use libc::{c_int, iovec, off_t, off64_t, ssize_t};
use macros::interpose;
use tracing::trace;

/// Vectored read on a classified descriptor.
///
/// `min_offset` is the smallest offset the call accepts: 0 for `preadv`, -1
/// for `preadv2`, where -1 means the current file position.
pub(crate) fn readv_from_stream(
    rt: &Runtime,
    iov: *const iovec,
    iovcnt: c_int,
    offset: i64,
    min_offset: i64,
) -> ssize_t {
    if offset < min_offset {
        return fail(Error::InvalidOffset(offset));
    }
    match fill_vectored(&rt.stream, iov, iovcnt) {
        Ok(n) => n as ssize_t,
        Err(err) => fail(err),
    }
}

/// Read from a descriptor into multiple buffers.
#[interpose]
pub fn readv(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
    let rt = runtime::get();
    if !rt.descriptors.is_classified(fd) {
        return unsafe { (rt.real().readv)(fd, iov, iovcnt) };
    }
    trace!(fd, iovcnt, "readv from entropy device");
    readv_from_stream(rt, iov, iovcnt, 0, 0)
}

#[interpose]
pub fn preadv(fd: c_int, iov: *const iovec, iovcnt: c_int, offset: off_t) -> ssize_t {
    let rt = runtime::get();
    if rt.descriptors.is_classified(fd) {
        trace!(fd, iovcnt, "preadv from entropy device");
        return readv_from_stream(rt, iov, iovcnt, offset as i64, 0);
    }
    match rt.real().preadv {
        Some(real_preadv) => unsafe { real_preadv(fd, iov, iovcnt, offset) },
        None => fail(Error::Unsupported("preadv")),
    }
}

#[interpose]
pub fn preadv64(fd: c_int, iov: *const iovec, iovcnt: c_int, offset: off64_t) -> ssize_t {
    let rt = runtime::get();
    if rt.descriptors.is_classified(fd) {
        trace!(fd, iovcnt, "preadv64 from entropy device");
        return readv_from_stream(rt, iov, iovcnt, offset, 0);
    }
    match rt.real().preadv64 {
        Some(real_preadv64) => unsafe { real_preadv64(fd, iov, iovcnt, offset) },
        None => fail(Error::Unsupported("preadv64")),
    }
}

/// `preadv` with per-call flags. The flags only tune blocking and caching,
/// neither of which applies to the stream, so they are ignored there.
#[interpose]
pub fn preadv2(
    fd: c_int,
    iov: *const iovec,
    iovcnt: c_int,
    offset: off_t,
    flags: c_int,
) -> ssize_t {
    let rt = runtime::get();
    if rt.descriptors.is_classified(fd) {
        trace!(fd, iovcnt, flags, "preadv2 from entropy device");
        return readv_from_stream(rt, iov, iovcnt, offset as i64, -1);
    }
    match rt.real().preadv2 {
        Some(real_preadv2) => unsafe { real_preadv2(fd, iov, iovcnt, offset, flags) },
        None => fail(Error::Unsupported("preadv2")),
    }
}

#[interpose]
pub fn preadv64v2(
    fd: c_int,
    iov: *const iovec,
    iovcnt: c_int,
    offset: off64_t,
    flags: c_int,
) -> ssize_t {
    let rt = runtime::get();
    if rt.descriptors.is_classified(fd) {
        trace!(fd, iovcnt, flags, "preadv64v2 from entropy device");
        return readv_from_stream(rt, iov, iovcnt, offset, -1);
    }
    match rt.real().preadv64v2 {
        Some(real_preadv64v2) => unsafe { real_preadv64v2(fd, iov, iovcnt, offset, flags) },
        None => fail(Error::Unsupported("preadv64v2")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libc::fcntl::{close, open};
    use crate::libc::last_errno;
    use std::ffi::CString;
    use std::io::Write;
    use std::os::unix::ffi::OsStrExt;

    fn vector(buf: &mut [u8]) -> iovec {
        iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        }
    }

    fn open_device() -> c_int {
        let fd = open(c"/dev/urandom".as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        fd
    }

    #[test]
    fn device_readv_fills_every_vector() {
        let fd = open_device();
        let stream = &runtime::get().stream;
        let mut a = [0u8; 16];
        let mut b = [0u8; 48];
        let iov = [vector(&mut a), vector(&mut b)];
        let before = stream.position();
        assert_eq!(readv(fd, iov.as_ptr(), 2), 64);
        assert!(stream.position() - before >= 64);
        assert!(a.iter().any(|&x| x != 0));
        assert!(b.iter().any(|&x| x != 0));
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn every_preadv_variant_serves_devices() {
        let fd = open_device();
        let mut buf = [0u8; 32];
        let iov = [vector(&mut buf)];
        assert_eq!(preadv(fd, iov.as_ptr(), 1, 0), 32);
        assert_eq!(preadv64(fd, iov.as_ptr(), 1, 1 << 40), 32);
        assert_eq!(preadv2(fd, iov.as_ptr(), 1, -1, 0), 32);
        assert_eq!(preadv64v2(fd, iov.as_ptr(), 1, 0, 0), 32);
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn device_vector_errors() {
        let fd = open_device();
        let mut buf = [0u8; 8];
        let iov = [vector(&mut buf)];
        assert_eq!(preadv(fd, iov.as_ptr(), 1, -1), -1);
        assert_eq!(last_errno(), libc::EINVAL);
        assert_eq!(preadv2(fd, iov.as_ptr(), 1, -2, 0), -1);
        assert_eq!(last_errno(), libc::EINVAL);
        assert_eq!(readv(fd, iov.as_ptr(), -1), -1);
        assert_eq!(last_errno(), libc::EINVAL);
        assert_eq!(readv(fd, std::ptr::null(), 1), -1);
        assert_eq!(last_errno(), libc::EFAULT);
        assert_eq!(readv(fd, iov.as_ptr(), 0), 0);
        assert_eq!(buf, [0; 8]);
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn regular_vectored_reads_pass_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plain contents").unwrap();
        let path = CString::new(file.path().as_os_str().as_bytes()).unwrap();

        let fd = open(path.as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        let mut head = [0u8; 6];
        let mut tail = [0u8; 8];
        let iov = [vector(&mut head), vector(&mut tail)];
        assert_eq!(readv(fd, iov.as_ptr(), 2), 14);
        assert_eq!(&head, b"plain ");
        assert_eq!(&tail, b"contents");

        let mut word = [0u8; 5];
        let iov = [vector(&mut word)];
        assert_eq!(preadv(fd, iov.as_ptr(), 1, 0), 5);
        assert_eq!(&word, b"plain");
        assert_eq!(preadv2(fd, iov.as_ptr(), 1, 6, 0), 5);
        assert_eq!(&word, b"conte");
        assert_eq!(close(fd), 0);
    }
}
