//! Kernel-wide error codes.
//!
//! Numeric values match the userspace-visible ABI (`v0` on syscall return,
//! and the historical `errno.h` of the reference kernel this core descends
//! from) so a syscall can hand an `Errno` straight back to userspace as an
//! integer without translation.

use core::fmt;

/// Recoverable error code returned by kernel operations.
///
/// Fatal conditions (invariant violations) are never represented here --
/// they panic instead. See the module docs in `lib.rs` for the two-tier
/// error model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Success. Not actually an error; included so `Errno as i32` can be
    /// written straight into a syscall return register.
    Eok = 0,
    /// Operation is not implemented.
    Enoimpl = 1,
    /// Out of memory (frames or heap space).
    Enomem = 2,
    /// Operation would block (trylock/trywait) or a resource is in use.
    Ebusy = 3,
    /// Operation attempted on a thread/process that has already exited.
    Eexited = 4,
    /// Invalid argument (misaligned size, null pointer, bad range).
    Einval = 5,
    /// No such mapping/range (address space miss, bad frame range).
    Enoent = 6,
    /// Operation attempted on a killed thread/process.
    Ekilled = 7,
}

impl Errno {
    /// The raw ABI value handed back to userspace in `v0`.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Errno::Eok => "success",
            Errno::Enoimpl => "not implemented",
            Errno::Enomem => "out of memory",
            Errno::Ebusy => "resource busy",
            Errno::Eexited => "already exited",
            Errno::Einval => "invalid argument",
            Errno::Enoent => "no such mapping",
            Errno::Ekilled => "killed",
        };
        f.write_str(msg)
    }
}

/// Result type used throughout the core.
pub type KResult<T> = Result<T, Errno>;

/// Panics with a formatted message if `cond` is false.
///
/// Used at the handful of call sites spec'd as fatal invariant violations
/// (double free, ASID underflow, destroying a primitive with queued
/// waiters, ...) rather than threading an `Errno` through code paths that
/// should be unreachable in a correct kernel.
#[macro_export]
macro_rules! panic_if {
    ($cond:expr, $($arg:tt)*) => {
        if $cond {
            panic!($($arg)*);
        }
    };
}
