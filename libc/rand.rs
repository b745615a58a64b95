//! Pseudo-random number generation functions.
//!
//! Seeding calls are accepted and ignored; the value-producing calls draw
//! from the stream and keep their documented ranges.

use crate::runtime::{self, Stream};
use libc::{c_double, c_int, c_long, c_uint, c_void, size_t};
use macros::interpose;
use tracing::trace;

/// Largest value returned by `rand`, `random` and `lrand48`.
const RAND_MAX: u32 = 0x7fff_ffff;

fn nonnegative_31(stream: &Stream) -> u32 {
    stream.next_u32() & RAND_MAX
}

fn signed_32(stream: &Stream) -> i32 {
    stream.next_u32() as i32
}

/// A double in `[0, 1)` with 53 random bits.
fn unit_double(stream: &Stream) -> f64 {
    (stream.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// A uniform value in `[0, bound)`, or 0 when `bound < 2`.
fn uniform(stream: &Stream, bound: u32) -> u32 {
    if bound < 2 {
        return 0;
    }
    // Values below `min` would bias the result towards small numbers.
    let min = bound.wrapping_neg() % bound;
    loop {
        let r = stream.next_u32();
        if r >= min {
            return r % bound;
        }
    }
}

/// Seeds the pseudo-random number generator.
#[interpose]
pub fn srand(seed: c_uint) {
    trace!(seed, "srand ignored");
}

/// Generates a pseudo-random integer in `[0, RAND_MAX]`.
#[interpose]
pub fn rand() -> c_int {
    nonnegative_31(&runtime::get().stream) as c_int
}

#[interpose]
pub fn srandom(seed: c_uint) {
    trace!(seed, "srandom ignored");
}

#[interpose]
pub fn random() -> c_long {
    nonnegative_31(&runtime::get().stream) as c_long
}

#[interpose]
pub fn srand48(seed: c_long) {
    trace!(seed, "srand48 ignored");
}

/// Non-negative long in `[0, 2^31)`.
#[interpose]
pub fn lrand48() -> c_long {
    nonnegative_31(&runtime::get().stream) as c_long
}

/// Signed long in `[-2^31, 2^31)`.
#[interpose]
pub fn mrand48() -> c_long {
    signed_32(&runtime::get().stream) as c_long
}

/// Double in `[0.0, 1.0)`.
#[interpose]
pub fn drand48() -> c_double {
    unit_double(&runtime::get().stream)
}

#[interpose]
pub fn arc4random() -> u32 {
    runtime::get().stream.next_u32()
}

#[interpose]
pub fn arc4random_buf(buf: *mut c_void, nbytes: size_t) {
    if nbytes == 0 || buf.is_null() {
        return;
    }
    let buf = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, nbytes) };
    runtime::get().stream.draw(buf);
}

#[interpose]
pub fn arc4random_uniform(upper_bound: u32) -> u32 {
    uniform(&runtime::get().stream, upper_bound)
}
