//! Process-wide state behind the interposed functions.
//!
//! Callers of `read` or `getrandom` hold no context object, so the state lives
//! in a single module-scoped [`Runtime`]:
//! - **Stream**: the deterministic byte source every entry point draws from
//! - **Descriptors**: which open descriptors refer to entropy devices
//! - **Real functions**: the C library definitions used for pass-through
//!
//! The stream and the table are const-initialized, so they exist before any
//! code in the process runs. The real functions are resolved by a load-time
//! constructor, or on first use if an interposed function is reached before
//! the constructor ran. Nothing here outlives the process or is shared with
//! another one.

use crate::Error;
use std::cell::Cell;
use tracing::{debug, error};

pub mod descriptors;
pub mod real;
pub mod stream;

pub use descriptors::Descriptors;
pub use real::RealFns;
pub use stream::{DEFAULT_SEED, Stream};

/// Environment variable holding the diagnostic log filter.
pub const LOG_ENV: &str = "DETRAND_LOG";

pub struct Runtime {
    pub stream: Stream,
    pub descriptors: Descriptors,
    real: spin::Once<RealFns>,
}

impl Runtime {
    const fn new() -> Self {
        Self {
            stream: Stream::new(DEFAULT_SEED),
            descriptors: Descriptors::new(),
            real: spin::Once::new(),
        }
    }

    /// Real C library functions.
    pub fn real(&self) -> &RealFns {
        match self.real.get() {
            Some(real) => real,
            None => fatal(Error::UnresolvedSymbol("<uninitialized>")),
        }
    }
}

static RUNTIME: Runtime = Runtime::new();

thread_local! {
    static INITIALIZING: Cell<bool> = const { Cell::new(false) };
}

/// Get the process runtime, initializing it if needed.
#[inline]
pub fn get() -> &'static Runtime {
    if !RUNTIME.real.is_completed() {
        initialize();
    }
    &RUNTIME
}

#[cold]
fn initialize() {
    if INITIALIZING.with(Cell::get) {
        fatal(Error::ReentrantInitialization);
    }
    INITIALIZING.with(|flag| flag.set(true));
    RUNTIME
        .real
        .call_once(|| RealFns::resolve().unwrap_or_else(|err| fatal(err)));
    INITIALIZING.with(|flag| flag.set(false));
}

/// Abort the process on an internal invariant violation.
#[cold]
pub fn fatal(err: Error) -> ! {
    error!(%err, "aborting");
    eprintln!("detrand: fatal: {}", err);
    std::process::abort();
}

/// Install a stderr subscriber when `DETRAND_LOG` is set.
fn setup_logging() {
    if std::env::var_os(LOG_ENV).is_none() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::from_env(LOG_ENV);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

extern "C" fn init_on_load() {
    get();
    setup_logging();
    debug!(
        symbols = crate::symbols::names().count(),
        seed = DEFAULT_SEED,
        "deterministic randomness active"
    );
}

#[cfg(all(target_os = "linux", not(test)))]
#[used]
#[unsafe(link_section = ".init_array")]
static INIT_ON_LOAD: extern "C" fn() = init_on_load;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_resolves_real_functions() {
        let rt = get();
        assert!(RUNTIME.real.is_completed());
        let fd = unsafe { (rt.real().open)(c"/dev/null".as_ptr(), libc::O_RDONLY) };
        assert!(fd >= 0);
        assert_eq!(unsafe { (rt.real().close)(fd) }, 0);
    }

    #[test]
    fn constructor_is_idempotent() {
        init_on_load();
        init_on_load();
        assert!(std::ptr::eq(get(), &RUNTIME));
    }

    #[test]
    fn error_codes() {
        assert_eq!(Error::BadAddress.errno(), libc::EFAULT);
        assert_eq!(Error::InvalidFlags(0x80).errno(), libc::EINVAL);
        assert_eq!(Error::InvalidOffset(-4).errno(), libc::EINVAL);
        assert_eq!(Error::InvalidIovec.errno(), libc::EINVAL);
        assert_eq!(Error::EntropyRequestTooLarge(257).errno(), libc::EIO);
        assert_eq!(Error::DescriptorOutOfRange(70000).errno(), libc::EMFILE);
        assert_eq!(Error::Unsupported("dup3").errno(), libc::ENOSYS);
    }
}
