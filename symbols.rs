//! Registry of the C library entry points this crate shadows.
//!
//! Every function declared with the `#[interpose]` attribute macro lands in
//! [`SHADOWED_SYMBOLS`] alongside its exported address.

use linkme::distributed_slice;

/// A function pointer wrapper that's Sync.
///
/// Function pointers are safe to share across threads (they're just addresses
/// into read-only code), but Rust doesn't automatically implement Sync for
/// raw pointers.
#[derive(Clone, Copy)]
pub struct FnPtr(pub *const ());

// SAFETY: Function pointers point to immutable code, so they're safe to share.
unsafe impl Sync for FnPtr {}

/// Distributed slice of interposed symbols.
///
/// Each entry maps a C symbol name (e.g., "getrandom") to the address of the
/// deterministic implementation exported under that name.
#[distributed_slice]
pub static SHADOWED_SYMBOLS: [(&str, FnPtr)] = [..];

/// Look up an interposed symbol by its C name.
///
/// Returns the function address if found, or None if the symbol is not
/// shadowed by this library.
pub fn lookup(symbol_name: &str) -> Option<usize> {
    SHADOWED_SYMBOLS
        .iter()
        .find(|(name, _)| *name == symbol_name)
        .map(|(_, ptr)| ptr.0 as usize)
}

/// Names of all interposed symbols, in registration order.
pub fn names() -> impl Iterator<Item = &'static str> {
    SHADOWED_SYMBOLS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_entry_points_are_registered() {
        for name in [
            "open", "open64", "openat", "openat64", "close", "close_range", "closefrom", "dup",
            "dup2", "dup3", "fcntl", "fcntl64", "read", "__read_chk", "pread", "pread64",
            "__pread_chk", "__pread64_chk", "readv", "preadv", "preadv64", "preadv2",
            "preadv64v2", "getrandom", "getentropy", "syscall", "srand", "rand", "srandom",
            "random", "srand48", "lrand48", "mrand48", "drand48", "arc4random", "arc4random_buf",
            "arc4random_uniform",
        ] {
            assert!(lookup(name).is_some(), "{name} is not interposed");
        }
    }

    #[test]
    fn names_are_unique() {
        let mut all: Vec<_> = names().collect();
        let count = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), count);
    }

    #[test]
    fn unknown_symbol_is_not_shadowed() {
        assert!(lookup("write").is_none());
        assert!(lookup("malloc").is_none());
    }
}
