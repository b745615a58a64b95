//! Descriptor bookkeeping for entropy devices.
//!
//! The open family registers descriptors that refer to `/dev/random` or
//! `/dev/urandom` and clears every other number it returns; the close and
//! duplication calls keep the classification table in step with the kernel's
//! descriptor table. The real call always runs, so the descriptor stays valid
//! for everything that isn't a read.

use super::fail;
use crate::Error;
use crate::runtime::{self, Runtime};
use libc::{c_char, c_int, c_long, c_uint, mode_t};
use macros::interpose;
use std::ffi::CStr;
use tracing::trace;

/// Classify `fd` if it was opened readable on an entropy device, and clear
/// it otherwise.
///
/// A device descriptor the table cannot hold is closed again and the open
/// fails with `EMFILE`, so no device descriptor escapes unclassified.
pub(crate) fn register_open(
    rt: &Runtime,
    path: *const c_char,
    flags: c_int,
    fd: c_int,
) -> c_int {
    if fd < 0 {
        return fd;
    }
    if path.is_null() || flags & libc::O_ACCMODE == libc::O_WRONLY || flags & libc::O_PATH != 0
    {
        rt.descriptors.forget_stale(fd);
        return fd;
    }
    let path = unsafe { CStr::from_ptr(path) };
    match rt.descriptors.classify_on_open(path, fd) {
        Ok(_) => fd,
        Err(err) => {
            unsafe { (rt.real().close)(fd) };
            fail(err)
        }
    }
}

/// Carry the classification of `oldfd` over to the duplicate `newfd`.
pub(crate) fn register_dup(rt: &Runtime, oldfd: c_int, newfd: c_int) -> c_int {
    if newfd < 0 || newfd == oldfd {
        return newfd;
    }
    match rt.descriptors.inherit(oldfd, newfd) {
        Ok(()) => newfd,
        Err(err) => {
            unsafe { (rt.real().close)(newfd) };
            fail(err)
        }
    }
}

/// Open a file.
#[interpose]
pub fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let rt = runtime::get();
    trace!(flags, "open");
    let fd = unsafe { (rt.real().open)(path, flags, mode) };
    register_open(rt, path, flags, fd)
}

/// Open a file (large-file variant).
#[interpose]
pub fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let rt = runtime::get();
    trace!(flags, "open64");
    let fd = unsafe { (rt.real().open64)(path, flags, mode) };
    register_open(rt, path, flags, fd)
}

/// Open a file relative to a directory descriptor.
///
/// Only absolute device paths are recognized; a relative `urandom` opened
/// through a `/dev` descriptor is not.
#[interpose]
pub fn openat(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let rt = runtime::get();
    trace!(dirfd, flags, "openat");
    let fd = unsafe { (rt.real().openat)(dirfd, path, flags, mode) };
    register_open(rt, path, flags, fd)
}

/// Open a file relative to a directory descriptor (large-file variant).
#[interpose]
pub fn openat64(dirfd: c_int, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    let rt = runtime::get();
    trace!(dirfd, flags, "openat64");
    let fd = unsafe { (rt.real().openat64)(dirfd, path, flags, mode) };
    register_open(rt, path, flags, fd)
}

/// Close a descriptor.
///
/// The classification is dropped before the real close, so the number is
/// clean by the time the kernel can hand it out again.
#[interpose]
pub fn close(fd: c_int) -> c_int {
    let rt = runtime::get();
    rt.descriptors.unclassify_on_close(fd);
    unsafe { (rt.real().close)(fd) }
}

/// `close_range` flag that marks descriptors close-on-exec instead of closing.
pub(crate) const CLOSE_RANGE_CLOEXEC: c_uint = 1 << 2;

/// Close every descriptor in `first..=last`.
#[interpose]
pub fn close_range(first: c_uint, last: c_uint, flags: c_int) -> c_int {
    let rt = runtime::get();
    let Some(real_close_range) = rt.real().close_range else {
        return fail(Error::Unsupported("close_range"));
    };
    trace!(first, last, flags, "close_range");
    if flags as c_uint & CLOSE_RANGE_CLOEXEC == 0 {
        rt.descriptors.unclassify_range(first, last);
    }
    unsafe { real_close_range(first, last, flags) }
}

/// Close every descriptor from `lowfd` up.
#[interpose]
pub fn closefrom(lowfd: c_int) {
    let rt = runtime::get();
    trace!(lowfd, "closefrom");
    let Ok(first) = c_uint::try_from(lowfd) else {
        return;
    };
    rt.descriptors.unclassify_range(first, c_uint::MAX);
    match rt.real().closefrom {
        Some(real_closefrom) => unsafe { real_closefrom(lowfd) },
        None => unsafe {
            let last = c_long::from(c_uint::MAX);
            (rt.real().syscall)(libc::SYS_close_range, c_long::from(lowfd), last, 0 as c_long);
        },
    }
}

/// Duplicate a descriptor.
#[interpose]
pub fn dup(oldfd: c_int) -> c_int {
    let rt = runtime::get();
    let newfd = unsafe { (rt.real().dup)(oldfd) };
    register_dup(rt, oldfd, newfd)
}

/// Duplicate a descriptor onto a given number.
#[interpose]
pub fn dup2(oldfd: c_int, newfd: c_int) -> c_int {
    let rt = runtime::get();
    let ret = unsafe { (rt.real().dup2)(oldfd, newfd) };
    register_dup(rt, oldfd, ret)
}

/// Duplicate a descriptor onto a given number, with flags.
#[interpose]
pub fn dup3(oldfd: c_int, newfd: c_int, flags: c_int) -> c_int {
    let rt = runtime::get();
    let Some(real_dup3) = rt.real().dup3 else {
        return fail(Error::Unsupported("dup3"));
    };
    let ret = unsafe { real_dup3(oldfd, newfd, flags) };
    register_dup(rt, oldfd, ret)
}

pub(crate) fn register_fcntl(rt: &Runtime, fd: c_int, cmd: c_int, ret: c_int) -> c_int {
    match cmd {
        libc::F_DUPFD | libc::F_DUPFD_CLOEXEC => register_dup(rt, fd, ret),
        _ => ret,
    }
}

/// Manipulate a descriptor.
///
/// Only `F_DUPFD` and `F_DUPFD_CLOEXEC` affect the table.
#[interpose]
pub fn fcntl(fd: c_int, cmd: c_int, arg: c_long) -> c_int {
    let rt = runtime::get();
    let ret = unsafe { (rt.real().fcntl)(fd, cmd, arg) };
    register_fcntl(rt, fd, cmd, ret)
}

/// `fcntl` with 64-bit lock structures; what `fcntl` binds to when a
/// program is built with `_FILE_OFFSET_BITS=64`.
#[interpose]
pub fn fcntl64(fd: c_int, cmd: c_int, arg: c_long) -> c_int {
    let rt = runtime::get();
    let ret = unsafe { (rt.real().fcntl64)(fd, cmd, arg) };
    register_fcntl(rt, fd, cmd, ret)
}
