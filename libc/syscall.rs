//! Deterministic syscall wrapper.
//!
//! Intercepts the libc `syscall()` function so that code calling
//! `syscall(SYS_getrandom, ...)` directly gets stream bytes too, and so that
//! descriptor calls made this way keep the classification table accurate.
//! Any other number is forwarded to the real `syscall()`.

use super::{fail, fcntl, fill_from_stream, random, uio, unistd};
use crate::runtime::{self, Runtime};
use libc::{c_char, c_int, c_long, c_uint, c_void, iovec, size_t};
use macros::interpose;
use tracing::trace;

/// Fixed-arity stand-in for the variadic `syscall(long number, ...)`.
///
/// Integer varargs are passed like ordinary arguments on the supported
/// targets, so reading six of them is harmless when fewer were passed.
#[interpose]
pub fn syscall(
    number: c_long,
    arg1: c_long,
    arg2: c_long,
    arg3: c_long,
    arg4: c_long,
    arg5: c_long,
    arg6: c_long,
) -> c_long {
    let rt = runtime::get();
    let args = [arg1, arg2, arg3, arg4, arg5, arg6];
    match number {
        libc::SYS_getrandom => {
            trace!(len = arg2, flags = arg3, "syscall: getrandom");
            let ret = random::getrandom_from_stream(
                &rt.stream,
                arg1 as *mut c_void,
                arg2 as size_t,
                arg3 as c_uint,
            );
            match ret {
                Ok(n) => n as c_long,
                Err(err) => fail(err),
            }
        }
        libc::SYS_read if rt.descriptors.is_classified(arg1 as c_int) => {
            trace!(fd = arg1, count = arg3, "syscall: read from entropy device");
            match fill_from_stream(&rt.stream, arg2 as *mut c_void, arg3 as size_t) {
                Ok(n) => n as c_long,
                Err(err) => fail(err),
            }
        }
        libc::SYS_pread64 if rt.descriptors.is_classified(arg1 as c_int) => {
            trace!(fd = arg1, count = arg3, "syscall: pread64 from entropy device");
            unistd::pread_from_stream(rt, arg2 as *mut c_void, arg3 as size_t, arg4) as c_long
        }
        libc::SYS_readv if rt.descriptors.is_classified(arg1 as c_int) => {
            trace!(fd = arg1, iovcnt = arg3, "syscall: readv from entropy device");
            uio::readv_from_stream(rt, arg2 as *const iovec, arg3 as c_int, 0, 0) as c_long
        }
        libc::SYS_preadv if rt.descriptors.is_classified(arg1 as c_int) => {
            trace!(fd = arg1, iovcnt = arg3, "syscall: preadv from entropy device");
            uio::readv_from_stream(rt, arg2 as *const iovec, arg3 as c_int, arg4, 0) as c_long
        }
        libc::SYS_preadv2 if rt.descriptors.is_classified(arg1 as c_int) => {
            trace!(fd = arg1, iovcnt = arg3, "syscall: preadv2 from entropy device");
            uio::readv_from_stream(rt, arg2 as *const iovec, arg3 as c_int, arg4, -1) as c_long
        }
        libc::SYS_close => {
            rt.descriptors.unclassify_on_close(arg1 as c_int);
            forward(rt, number, args)
        }
        libc::SYS_close_range => {
            if arg3 as c_uint & fcntl::CLOSE_RANGE_CLOEXEC == 0 {
                rt.descriptors.unclassify_range(arg1 as c_uint, arg2 as c_uint);
            }
            forward(rt, number, args)
        }
        libc::SYS_fcntl => {
            let ret = forward(rt, number, args);
            fcntl::register_fcntl(rt, arg1 as c_int, arg2 as c_int, ret as c_int) as c_long
        }
        libc::SYS_openat => {
            let fd = forward(rt, number, args);
            fcntl::register_open(rt, arg2 as *const c_char, arg3 as c_int, fd as c_int) as c_long
        }
        #[cfg(target_arch = "x86_64")]
        libc::SYS_open => {
            let fd = forward(rt, number, args);
            fcntl::register_open(rt, arg1 as *const c_char, arg2 as c_int, fd as c_int) as c_long
        }
        libc::SYS_dup | libc::SYS_dup3 => {
            let fd = forward(rt, number, args);
            fcntl::register_dup(rt, arg1 as c_int, fd as c_int) as c_long
        }
        #[cfg(target_arch = "x86_64")]
        libc::SYS_dup2 => {
            let fd = forward(rt, number, args);
            fcntl::register_dup(rt, arg1 as c_int, fd as c_int) as c_long
        }
        _ => forward(rt, number, args),
    }
}

fn forward(rt: &Runtime, number: c_long, args: [c_long; 6]) -> c_long {
    let [a1, a2, a3, a4, a5, a6] = args;
    unsafe { (rt.real().syscall)(number, a1, a2, a3, a4, a5, a6) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libc::fcntl::{close, open};
    use crate::libc::last_errno;

    fn call(number: c_long, args: &[c_long]) -> c_long {
        let mut all = [0; 6];
        all[..args.len()].copy_from_slice(args);
        let [a1, a2, a3, a4, a5, a6] = all;
        syscall(number, a1, a2, a3, a4, a5, a6)
    }

    #[test]
    fn getrandom_is_served_from_stream() {
        let stream = &runtime::get().stream;
        let mut buf = [0u8; 48];
        let before = stream.position();
        let ret = call(libc::SYS_getrandom, &[buf.as_mut_ptr() as c_long, 48, 0]);
        assert_eq!(ret, 48);
        assert!(stream.position() - before >= 48);
    }

    #[test]
    fn getrandom_flag_errors() {
        let mut buf = [0u8; 8];
        let ret = call(libc::SYS_getrandom, &[buf.as_mut_ptr() as c_long, 8, 0x40]);
        assert_eq!(ret, -1);
        assert_eq!(last_errno(), libc::EINVAL);
    }

    #[test]
    fn other_numbers_are_forwarded() {
        assert_eq!(call(libc::SYS_getpid, &[]), std::process::id() as c_long);
        assert_eq!(call(libc::SYS_close, &[-1]), -1);
        assert_eq!(last_errno(), libc::EBADF);
    }

    #[test]
    fn openat_read_and_close_track_devices() {
        let rt = runtime::get();
        let path = c"/dev/urandom";
        let fd = call(
            libc::SYS_openat,
            &[libc::AT_FDCWD as c_long, path.as_ptr() as c_long, libc::O_RDONLY as c_long],
        );
        assert!(fd >= 0);
        assert!(rt.descriptors.is_classified(fd as c_int));

        let dupfd = call(libc::SYS_dup, &[fd]);
        assert!(dupfd >= 0);
        assert!(rt.descriptors.is_classified(dupfd as c_int));

        let mut buf = [0u8; 32];
        let before = rt.stream.position();
        let n = call(libc::SYS_read, &[fd, buf.as_mut_ptr() as c_long, 32]);
        assert_eq!(n, 32);
        assert!(rt.stream.position() - before >= 32);

        assert_eq!(call(libc::SYS_close, &[dupfd]), 0);
        assert_eq!(close(fd as c_int), 0);
    }

    #[test]
    fn positional_and_vectored_reads_track_devices() {
        let rt = runtime::get();
        let fd = open(c"/dev/urandom".as_ptr(), libc::O_RDONLY, 0) as c_long;
        assert!(fd >= 0);

        let mut buf = [0u8; 24];
        let before = rt.stream.position();
        let n = call(libc::SYS_pread64, &[fd, buf.as_mut_ptr() as c_long, 24, 0]);
        assert_eq!(n, 24);
        assert!(rt.stream.position() - before >= 24);
        let n = call(libc::SYS_pread64, &[fd, buf.as_mut_ptr() as c_long, 24, -1]);
        assert_eq!(n, -1);
        assert_eq!(last_errno(), libc::EINVAL);

        let iov = [iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        }];
        let iov_ptr = iov.as_ptr() as c_long;
        assert_eq!(call(libc::SYS_readv, &[fd, iov_ptr, 1]), 24);
        assert_eq!(call(libc::SYS_preadv, &[fd, iov_ptr, 1, 0, 0]), 24);
        assert_eq!(call(libc::SYS_preadv2, &[fd, iov_ptr, 1, -1, 0, 0]), 24);

        let dupfd = call(libc::SYS_fcntl, &[fd, libc::F_DUPFD_CLOEXEC as c_long, 0]);
        assert!(dupfd >= 0);
        assert!(rt.descriptors.is_classified(dupfd as c_int));
        assert_eq!(call(libc::SYS_close_range, &[dupfd, dupfd, 0]), 0);
        assert!(!rt.descriptors.is_classified(dupfd as c_int));

        assert_eq!(close(fd as c_int), 0);
    }
}
