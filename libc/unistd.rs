//! Reads from entropy-device descriptors: `read`, `pread` and their
//! fortified variants.

use super::{fail, fill_from_stream};
use crate::Error;
use crate::runtime::{self, Runtime};
use libc::{c_int, c_void, off_t, off64_t, size_t, ssize_t};
use macros::interpose;
use tracing::trace;

/// Read from a descriptor.
///
/// Classified descriptors are served from the stream and always return the
/// full (capped) request at once, even where the real `/dev/random` would
/// block. Everything else goes to the real `read`.
#[interpose]
pub fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    let rt = runtime::get();
    if !rt.descriptors.is_classified(fd) {
        return unsafe { (rt.real().read)(fd, buf, count) };
    }
    trace!(fd, count, "read from entropy device");
    match fill_from_stream(&rt.stream, buf, count) {
        Ok(n) => n as ssize_t,
        Err(err) => fail(err),
    }
}

/// Fortified `read`, emitted by compilers under `_FORTIFY_SOURCE`.
///
/// Aborts when the request is larger than the destination buffer.
#[interpose]
pub fn __read_chk(fd: c_int, buf: *mut c_void, nbytes: size_t, buflen: size_t) -> ssize_t {
    check_fortified(nbytes, buflen);
    read(fd, buf, nbytes)
}

/// Positional read on a classified descriptor.
///
/// Devices ignore the offset, but a negative one is still rejected.
pub(crate) fn pread_from_stream(
    rt: &Runtime,
    buf: *mut c_void,
    count: size_t,
    offset: i64,
) -> ssize_t {
    if offset < 0 {
        return fail(Error::InvalidOffset(offset));
    }
    match fill_from_stream(&rt.stream, buf, count) {
        Ok(n) => n as ssize_t,
        Err(err) => fail(err),
    }
}

/// Read from a descriptor at a given offset.
#[interpose]
pub fn pread(fd: c_int, buf: *mut c_void, count: size_t, offset: off_t) -> ssize_t {
    let rt = runtime::get();
    if !rt.descriptors.is_classified(fd) {
        return unsafe { (rt.real().pread)(fd, buf, count, offset) };
    }
    trace!(fd, count, "pread from entropy device");
    pread_from_stream(rt, buf, count, offset as i64)
}

/// Read from a descriptor at a given offset (large-file variant).
#[interpose]
pub fn pread64(fd: c_int, buf: *mut c_void, count: size_t, offset: off64_t) -> ssize_t {
    let rt = runtime::get();
    if rt.descriptors.is_classified(fd) {
        trace!(fd, count, "pread64 from entropy device");
        return pread_from_stream(rt, buf, count, offset);
    }
    match rt.real().pread64 {
        Some(real_pread64) => unsafe { real_pread64(fd, buf, count, offset) },
        None => fail(Error::Unsupported("pread64")),
    }
}

fn check_fortified(nbytes: size_t, buflen: size_t) {
    if nbytes > buflen {
        runtime::fatal(Error::BufferOverflow {
            requested: nbytes,
            capacity: buflen,
        });
    }
}

#[interpose]
pub fn __pread_chk(
    fd: c_int,
    buf: *mut c_void,
    nbytes: size_t,
    offset: off_t,
    buflen: size_t,
) -> ssize_t {
    check_fortified(nbytes, buflen);
    pread(fd, buf, nbytes, offset)
}

#[interpose]
pub fn __pread64_chk(
    fd: c_int,
    buf: *mut c_void,
    nbytes: size_t,
    offset: off64_t,
    buflen: size_t,
) -> ssize_t {
    check_fortified(nbytes, buflen);
    pread64(fd, buf, nbytes, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libc::fcntl::{close, open};
    use crate::libc::last_errno;
    use std::ffi::CString;
    use std::io::Write;
    use std::os::unix::ffi::OsStrExt;

    fn open_device() -> c_int {
        let fd = open(c"/dev/urandom".as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        fd
    }

    #[test]
    fn device_reads_return_full_request() {
        let fd = open_device();
        let stream = &runtime::get().stream;
        for len in [1usize, 7, 100, 4096] {
            let mut buf = vec![0u8; len];
            let before = stream.position();
            assert_eq!(read(fd, buf.as_mut_ptr().cast(), len), len as ssize_t);
            assert!(stream.position() - before >= len as u64);
        }
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn blocking_device_does_not_block() {
        let fd = open(c"/dev/random".as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        let mut buf = [0u8; 1 << 16];
        assert_eq!(read(fd, buf.as_mut_ptr().cast(), buf.len()), buf.len() as ssize_t);
        assert!(buf.iter().any(|&b| b != 0));
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn device_read_edge_cases() {
        let fd = open_device();
        let mut buf = [0u8; 4];
        assert_eq!(read(fd, buf.as_mut_ptr().cast(), 0), 0);
        assert_eq!(buf, [0; 4]);
        assert_eq!(read(fd, std::ptr::null_mut(), 4), -1);
        assert_eq!(last_errno(), libc::EFAULT);
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn regular_reads_pass_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plain contents").unwrap();
        let path = CString::new(file.path().as_os_str().as_bytes()).unwrap();

        let fd = open(path.as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        let mut buf = [0u8; 64];
        let n = read(fd, buf.as_mut_ptr().cast(), buf.len());
        assert_eq!(n, 14);
        assert_eq!(&buf[..14], b"plain contents");
        assert_eq!(read(fd, buf.as_mut_ptr().cast(), buf.len()), 0);
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn read_errors_pass_through() {
        let mut buf = [0u8; 8];
        assert_eq!(read(-1, buf.as_mut_ptr().cast(), buf.len()), -1);
        assert_eq!(last_errno(), libc::EBADF);
    }

    #[test]
    fn positional_device_reads_follow_stream() {
        let fd = open_device();
        let stream = &runtime::get().stream;
        let mut buf = [0u8; 24];
        for offset in [0, 4096, i64::MAX] {
            let before = stream.position();
            assert_eq!(pread(fd, buf.as_mut_ptr().cast(), 24, offset), 24);
            assert_eq!(pread64(fd, buf.as_mut_ptr().cast(), 24, offset), 24);
            assert!(stream.position() - before >= 48);
        }
        assert!(buf.iter().any(|&b| b != 0));
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn positional_device_read_edge_cases() {
        let fd = open_device();
        let mut buf = [0u8; 8];
        assert_eq!(pread(fd, buf.as_mut_ptr().cast(), 8, -1), -1);
        assert_eq!(last_errno(), libc::EINVAL);
        assert_eq!(pread64(fd, buf.as_mut_ptr().cast(), 0, 0), 0);
        assert_eq!(buf, [0; 8]);
        assert_eq!(pread(fd, std::ptr::null_mut(), 8, 0), -1);
        assert_eq!(last_errno(), libc::EFAULT);
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn positional_regular_reads_pass_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plain contents").unwrap();
        let path = CString::new(file.path().as_os_str().as_bytes()).unwrap();

        let fd = open(path.as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        let mut buf = [0u8; 8];
        assert_eq!(pread(fd, buf.as_mut_ptr().cast(), 8, 6), 8);
        assert_eq!(&buf, b"contents");
        assert_eq!(pread64(fd, buf.as_mut_ptr().cast(), 5, 0), 5);
        assert_eq!(&buf[..5], b"plain");
        assert_eq!(__pread_chk(fd, buf.as_mut_ptr().cast(), 3, 11, buf.len()), 3);
        assert_eq!(&buf[..3], b"nts");
        assert_eq!(close(fd), 0);
    }

    #[test]
    fn fortified_read_within_bounds() {
        let fd = open_device();
        let mut buf = [0u8; 32];
        assert_eq!(__read_chk(fd, buf.as_mut_ptr().cast(), 16, buf.len()), 16);
        assert_eq!(buf[16..], [0; 16]);
        assert_eq!(__pread64_chk(fd, buf.as_mut_ptr().cast(), 32, 0, buf.len()), 32);
        assert_eq!(close(fd), 0);
    }
}
