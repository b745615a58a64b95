//! Handles to the real C library functions behind the interposed ones.
//!
//! Pass-through calls must never reach the interposed symbols again, so the
//! next definition of each name is looked up explicitly with
//! `dlsym(RTLD_NEXT, ...)` once per process. Resolution must not log or
//! otherwise reach an interposed function: it runs inside initialization.

use crate::{Error, Result};
use libc::{c_char, c_int, c_long, c_uint, c_void, iovec, off_t, off64_t, size_t, ssize_t};
use std::ffi::CStr;

pub type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
pub type OpenatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, ...) -> c_int;
pub type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, size_t) -> ssize_t;
pub type CloseFn = unsafe extern "C" fn(c_int) -> c_int;
pub type DupFn = unsafe extern "C" fn(c_int) -> c_int;
pub type Dup2Fn = unsafe extern "C" fn(c_int, c_int) -> c_int;
pub type Dup3Fn = unsafe extern "C" fn(c_int, c_int, c_int) -> c_int;
pub type FcntlFn = unsafe extern "C" fn(c_int, c_int, ...) -> c_int;
pub type SyscallFn = unsafe extern "C" fn(c_long, ...) -> c_long;
pub type PreadFn = unsafe extern "C" fn(c_int, *mut c_void, size_t, off_t) -> ssize_t;
pub type Pread64Fn = unsafe extern "C" fn(c_int, *mut c_void, size_t, off64_t) -> ssize_t;
pub type ReadvFn = unsafe extern "C" fn(c_int, *const iovec, c_int) -> ssize_t;
pub type PreadvFn = unsafe extern "C" fn(c_int, *const iovec, c_int, off_t) -> ssize_t;
pub type Preadv64Fn = unsafe extern "C" fn(c_int, *const iovec, c_int, off64_t) -> ssize_t;
pub type Preadv2Fn = unsafe extern "C" fn(c_int, *const iovec, c_int, off_t, c_int) -> ssize_t;
pub type Preadv64v2Fn =
    unsafe extern "C" fn(c_int, *const iovec, c_int, off64_t, c_int) -> ssize_t;
pub type CloseRangeFn = unsafe extern "C" fn(c_uint, c_uint, c_int) -> c_int;
pub type ClosefromFn = unsafe extern "C" fn(c_int);

/// Real implementations used for pass-through.
pub struct RealFns {
    pub open: OpenFn,
    pub open64: OpenFn,
    pub openat: OpenatFn,
    pub openat64: OpenatFn,
    pub read: ReadFn,
    pub pread: PreadFn,
    pub pread64: Option<Pread64Fn>,
    pub readv: ReadvFn,
    pub preadv: Option<PreadvFn>,
    pub preadv64: Option<Preadv64Fn>,
    pub preadv2: Option<Preadv2Fn>,
    pub preadv64v2: Option<Preadv64v2Fn>,
    pub close: CloseFn,
    pub close_range: Option<CloseRangeFn>,
    pub closefrom: Option<ClosefromFn>,
    pub dup: DupFn,
    pub dup2: Dup2Fn,
    pub dup3: Option<Dup3Fn>,
    pub fcntl: FcntlFn,
    pub fcntl64: FcntlFn,
    pub syscall: SyscallFn,
}

/// Look up the next definition of `name` after this library.
fn next_symbol(name: &CStr) -> Option<*mut c_void> {
    let addr = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) };
    (!addr.is_null()).then_some(addr)
}

macro_rules! optional {
    ($name:expr, $ty:ty) => {
        next_symbol($name).map(|addr| unsafe { std::mem::transmute::<*mut c_void, $ty>(addr) })
    };
}

macro_rules! required {
    ($name:expr, $ty:ty) => {
        optional!($name, $ty)
            .ok_or_else(|| Error::UnresolvedSymbol($name.to_str().unwrap_or("?")))?
    };
}

impl RealFns {
    /// Resolve every real function.
    ///
    /// The large-file `open` and `fcntl` variants fall back to the plain ones
    /// on C libraries that only export a single name. Functions newer than
    /// the baseline C library are optional.
    pub fn resolve() -> Result<Self> {
        let open = required!(c"open", OpenFn);
        let openat = required!(c"openat", OpenatFn);
        let fcntl = required!(c"fcntl", FcntlFn);
        Ok(Self {
            open,
            open64: optional!(c"open64", OpenFn).unwrap_or(open),
            openat,
            openat64: optional!(c"openat64", OpenatFn).unwrap_or(openat),
            read: required!(c"read", ReadFn),
            pread: required!(c"pread", PreadFn),
            pread64: optional!(c"pread64", Pread64Fn),
            readv: required!(c"readv", ReadvFn),
            preadv: optional!(c"preadv", PreadvFn),
            preadv64: optional!(c"preadv64", Preadv64Fn),
            preadv2: optional!(c"preadv2", Preadv2Fn),
            preadv64v2: optional!(c"preadv64v2", Preadv64v2Fn),
            close: required!(c"close", CloseFn),
            close_range: optional!(c"close_range", CloseRangeFn),
            closefrom: optional!(c"closefrom", ClosefromFn),
            dup: required!(c"dup", DupFn),
            dup2: required!(c"dup2", Dup2Fn),
            dup3: optional!(c"dup3", Dup3Fn),
            fcntl,
            fcntl64: optional!(c"fcntl64", FcntlFn).unwrap_or(fcntl),
            syscall: required!(c"syscall", SyscallFn),
        })
    }
}
