//! Bare-metal binary entry. The actual entry point is `__start`, a naked
//! function in `msim_kernel::arch::mips::boot`; pulling in the library
//! crate is enough to link it (and the panic handler, global allocator,
//! and exception vector) into this binary. Kept as a thin shell so the
//! library crate alone can be built and unit-tested on the host target.

#![cfg_attr(target_arch = "mips", no_std)]
#![cfg_attr(target_arch = "mips", no_main)]

#[cfg(target_arch = "mips")]
use msim_kernel as _;

#[cfg(not(target_arch = "mips"))]
fn main() {
    eprintln!("msim-kernel only runs on the mipsel-unknown-none target");
}
