//! Stand-in backend used when running the host test target
//! (`cfg(not(target_arch = "mips"))`). Lets the portable subsystems
//! (frame allocator, heap, ASID pool, scheduler queue logic, sync
//! primitives) be unit-tested with `cargo test` without real hardware.
//!
//! Anything that requires an actual context switch or userspace jump is
//! exercised only by the bare-metal integration tests under `tests/`,
//! which run on the MIPS target; those two functions are left unreachable
//! here on purpose.

use core::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn interrupts_disable() -> bool {
    INTERRUPTS_ENABLED.swap(false, Ordering::SeqCst)
}

pub fn interrupts_restore(prev_enabled: bool) {
    INTERRUPTS_ENABLED.store(prev_enabled, Ordering::SeqCst);
}

/// # Safety
/// Never called on the host target; unit tests build `Thread` values
/// directly rather than going through `thread_create`.
pub unsafe fn new_thread_context(_stack_top: *mut u8, _entry_wrapper: extern "C" fn() -> !) -> *mut usize {
    unreachable!("new_thread_context is only exercised by bare-metal integration tests")
}

/// # Safety
/// Never called on the host target; unit tests exercise scheduler queue
/// discipline against mock thread handles instead of a real switch.
pub unsafe fn cpu_switch_context(_old_slot: *mut usize, _new_slot: *mut usize, _new_asid: u8) {
    unreachable!("cpu_switch_context is only exercised by bare-metal integration tests")
}

/// # Safety
/// Never called on the host target.
pub unsafe fn cpu_jump_to_userspace(_user_sp: usize, _user_entry: usize) -> ! {
    unreachable!("cpu_jump_to_userspace is only exercised by bare-metal integration tests")
}

pub fn printer_putchar(c: u8) {
    std::eprint!("{}", c as char);
}

pub fn halt() -> ! {
    std::process::exit(0);
}

pub fn probe_memory() -> (usize, usize) {
    // A deterministic fake range; host unit tests construct their own
    // frame allocators over fixed-size scratch buffers instead of relying
    // on this beyond sanity checks.
    (0, 16 * 1024 * 1024)
}

pub mod cp0 {
    //! No CP0 on the host; these only exist so `mm::tlb`'s portable logic
    //! still type-checks under `cargo test`. The TLB refill handler itself
    //! is exercised only by the bare-metal integration tests, which
    //! require a real TLB miss exception.
    use crate::arch::TlbEntryLo;

    fn unreachable_host_cp0() -> ! {
        unreachable!("CP0 is only accessible on the MIPS target")
    }

    pub fn write_page_mask_4k() {
        unreachable_host_cp0()
    }

    pub fn write_entry_hi(_vpn2: u32, _asid: u8) {
        unreachable_host_cp0()
    }

    pub fn write_entry_lo(_lo0: TlbEntryLo, _lo1: TlbEntryLo) {
        unreachable_host_cp0()
    }

    pub fn tlb_write_random() {
        unreachable_host_cp0()
    }

    pub fn tlb_write_indexed(_index: u32) {
        unreachable_host_cp0()
    }

    pub fn tlb_read_entry_asid(_index: u32) -> u8 {
        unreachable_host_cp0()
    }

    pub fn rearm_timer(_cycles: u32) {
        unreachable_host_cp0()
    }
}
