//! A small educational kernel for a MIPS R4000-class machine simulated
//! by MSIM: software-refilled TLB, a bitmap frame allocator, a kernel
//! heap, ASID-tagged address spaces, a preemptive round-robin scheduler,
//! blocking sync primitives, and a trap-based syscall interface for
//! userspace processes.
//!
//! `#![no_std]` only on the real target; the host build (`cargo test`)
//! links `std` so every portable subsystem can be unit-tested without a
//! MIPS simulator.

#![cfg_attr(target_arch = "mips", no_std)]
#![cfg_attr(target_arch = "mips", no_main)]
#![cfg_attr(target_arch = "mips", feature(alloc_error_handler))]

extern crate alloc;

pub mod arch;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod irq;
pub mod klog;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(target_arch = "mips")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    let _ = arch::interrupts_disable();
    log::error!("panic: {info}");
    arch::halt()
}
