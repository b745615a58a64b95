//! Detrand - deterministic randomness for unmodified processes.
//!
//! Detrand is built as a shared library that is injected with `LD_PRELOAD`.
//! It shadows every C library and kernel entry point through which a process
//! obtains random bytes and serves all of them from a single deterministic
//! stream, so repeated runs of the same command see the same "random" data.
//!
//! # Modules
//!
//! - [`runtime`] - Process-wide state: the stream, the descriptor table and the
//!   resolved real functions
//! - [`libc`] - Deterministic replacements for C library entry points
//! - [`symbols`] - Registry of the interposed symbol names
//!
//! # Error Handling
//!
//! Interposed functions report errors the way the C functions they replace
//! do, through a `-1` return and `errno`. Internally every failure is an
//! [`Error`]; [`Error::errno`] gives the code written back to the caller.

pub mod libc;
pub mod runtime;
pub mod symbols;

/// Consolidated error type for all Detrand operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("buffer address is null")]
    BadAddress,

    #[error("invalid getrandom flags: {0:#x}")]
    InvalidFlags(std::ffi::c_uint),

    #[error("getentropy request of {0} bytes exceeds 256")]
    EntropyRequestTooLarge(usize),

    #[error("negative file offset {0}")]
    InvalidOffset(i64),

    #[error("invalid iovec array")]
    InvalidIovec,

    #[error("descriptor {0} is beyond the classification table")]
    DescriptorOutOfRange(std::ffi::c_int),

    #[error("`{0}` is not available in the C library")]
    Unsupported(&'static str),

    #[error("cannot resolve the real `{0}`")]
    UnresolvedSymbol(&'static str),

    #[error("initialization re-entered on the same thread")]
    ReentrantInitialization,

    #[error("read of {requested} bytes into a buffer of {capacity} bytes")]
    BufferOverflow { requested: usize, capacity: usize },
}

impl Error {
    /// The errno value a C caller observes for this error.
    ///
    /// Fatal errors never reach a caller; they map to `EFAULT` only so the
    /// function is total.
    pub fn errno(&self) -> std::ffi::c_int {
        use ::libc::{EFAULT, EINVAL, EIO, EMFILE, ENOSYS};

        match self {
            Error::BadAddress => EFAULT,
            Error::InvalidFlags(_) | Error::InvalidOffset(_) | Error::InvalidIovec => EINVAL,
            Error::EntropyRequestTooLarge(_) => EIO,
            Error::DescriptorOutOfRange(_) => EMFILE,
            Error::Unsupported(_) => ENOSYS,
            Error::UnresolvedSymbol(_)
            | Error::ReentrantInitialization
            | Error::BufferOverflow { .. } => EFAULT,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

pub use runtime::stream::{DEFAULT_SEED, Stream, keystream};
