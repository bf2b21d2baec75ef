//! Boot-time constants.
//!
//! Mirrors how the teacher groups architecture/geometry constants in one
//! place (`mm::frame_allocator::FRAME_SIZE` and friends) rather than
//! scattering magic numbers through the subsystems that use them.

/// Size in bytes of one physical page / frame.
pub const PAGE_SIZE: usize = 4096;
/// Alias kept distinct from `PAGE_SIZE` at call sites that talk about
/// frames specifically (C1), even though the two are numerically equal.
pub const FRAME_SIZE: usize = PAGE_SIZE;

/// Size of a kernel thread's stack, in bytes.
pub const THREAD_STACK_SIZE: usize = 4096;
/// Maximum length of a thread's debug name, not counting the NUL.
pub const THREAD_NAME_MAX_LENGTH: usize = 31;

/// Number of hardware TLB entries.
pub const TLB_ENTRY_COUNT: usize = 48;
/// Number of ASIDs, including the reserved invalid ASID 0.
pub const ASID_COUNT: usize = 256;
/// ASID value that never names a live address space.
pub const INVALID_ASID: u8 = 0;

/// First virtual address made available to a newly created address space.
pub const INITIAL_VIRTUAL_ADDRESS: usize = PAGE_SIZE;
/// Virtual address at which a userspace process image is linked to start.
pub const PROCESS_ENTRY_POINT: usize = 0x0000_4000;
/// Number of pages reserved for a fresh userspace process's stack.
pub const PROCESS_STACK_PAGES: usize = 3;

/// CP0 Count ticks between timer interrupts.
pub const CYCLES: u32 = 100_000;

/// Base of the unmapped, cached KSEG0 segment.
pub const KSEG0_BASE: usize = 0x8000_0000;

/// Minimum payload size handed out by the kernel heap allocator.
pub const MIN_ALLOCATION_SIZE: usize = 4;

/// Syscall numbers, per the trap ABI (`v0` on entry).
pub mod syscall {
    pub const EXIT: u32 = 0;
    pub const PUTCHAR: u32 = 1;
    pub const WRITE: u32 = 2;
    pub const INFO: u32 = 3;
}

/// CP0 Cause register exception codes the dispatcher branches on.
pub mod exc_code {
    pub const INT: u32 = 0;
    pub const TLBL: u32 = 2;
    pub const TLBS: u32 = 3;
    pub const ADEL: u32 = 4;
    pub const SYS: u32 = 8;
    pub const CPU: u32 = 11;
}

/// Bit index of the clock interrupt within CP0 Cause's IP field.
pub const CLOCK_IRQ_BIT: u32 = 7;
