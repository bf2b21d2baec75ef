//! MIPS R4000-class backend: CP0 register access, TLB instructions, the
//! assembly context switch, and the boot entry point.

pub mod boot;
pub mod cp0;
pub mod trap;

use crate::config::KSEG0_BASE;

/// Disables interrupts via CP0 STATUS.IE, returns the prior state.
#[inline]
pub fn interrupts_disable() -> bool {
    cp0::status_disable_ie()
}

#[inline]
pub fn interrupts_restore(prev_enabled: bool) {
    cp0::status_restore_ie(prev_enabled)
}

/// # Safety
/// See [`crate::arch::new_thread_context`].
pub unsafe fn new_thread_context(stack_top: *mut u8, entry_wrapper: extern "C" fn() -> !) -> *mut usize {
    // SAFETY: forwarded from the caller.
    unsafe { boot::new_thread_context(stack_top, entry_wrapper) }
}

/// # Safety
/// See [`crate::arch::cpu_switch_context`].
pub unsafe fn cpu_switch_context(old_slot: *mut usize, new_slot: *mut usize, new_asid: u8) {
    // SAFETY: forwarded from the caller.
    unsafe { boot::cpu_switch_context(old_slot, new_slot, new_asid) }
}

/// # Safety
/// See [`crate::arch::cpu_jump_to_userspace`].
pub unsafe fn cpu_jump_to_userspace(user_sp: usize, user_entry: usize) -> ! {
    // SAFETY: forwarded from the caller.
    unsafe { boot::cpu_jump_to_userspace(user_sp, user_entry) }
}

pub fn printer_putchar(c: u8) {
    // SAFETY: the printer MMIO register is a fixed, always-valid address
    // on the MSIM machine; writes are single bytes with no alignment
    // requirement.
    unsafe {
        core::ptr::write_volatile(PRINTER_MMIO as *mut u8, c);
    }
}

pub fn halt() -> ! {
    loop {
        // SAFETY: `wait` merely idles the core until the next interrupt.
        unsafe {
            core::arch::asm!("wait", options(nomem, nostack));
        }
    }
}

pub fn probe_memory() -> (usize, usize) {
    extern "C" {
        /// Linker-provided symbol marking the end of the loaded kernel
        /// image; the frame allocator may not hand out pages below it.
        static _kernel_end: u8;
    }
    // SAFETY: `_kernel_end` is an address-only symbol; we only read its
    // address, never dereference it.
    let kernel_end = unsafe { &_kernel_end as *const u8 as usize };
    let first_free = (kernel_end + crate::config::PAGE_SIZE - 1) & !(crate::config::PAGE_SIZE - 1);
    // SAFETY: `memory_probe_top` is provided by the MSIM boot monitor and
    // returns the highest writable physical byte, exclusive, as a KSEG0
    // address.
    let top = unsafe { memory_probe_top() };
    (first_free, top - KSEG0_BASE)
}

/// Fixed MMIO address of the MSIM console output register.
const PRINTER_MMIO: usize = KSEG0_BASE + 0x1000_0000;

extern "C" {
    fn memory_probe_top() -> usize;
}
