//! CP0 (system control coprocessor) register accessors and TLB write
//! instructions. Register numbers and bit layouts per the MIPS R4000
//! architecture manual.

use core::arch::asm;

const STATUS_IE: u32 = 1 << 0;

/// Reads CP0 STATUS.
#[inline]
pub fn read_status() -> u32 {
    let v: u32;
    // SAFETY: `mfc0` from a fixed, always-readable coprocessor register.
    unsafe {
        asm!("mfc0 {0}, $12", out(reg) v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Writes CP0 STATUS.
#[inline]
pub fn write_status(v: u32) {
    // SAFETY: `mtc0` to STATUS; callers are responsible for not clearing
    // bits that would break the running kernel mode (we only ever
    // twiddle IE here).
    unsafe {
        asm!("mtc0 {0}, $12", in(reg) v, options(nomem, nostack, preserves_flags));
    }
}

/// Clears STATUS.IE and returns whether it had been set.
#[inline]
pub fn status_disable_ie() -> bool {
    let prev = read_status();
    write_status(prev & !STATUS_IE);
    prev & STATUS_IE != 0
}

/// Restores STATUS.IE to `enabled`, leaving every other bit untouched.
#[inline]
pub fn status_restore_ie(enabled: bool) {
    let prev = read_status();
    if enabled {
        write_status(prev | STATUS_IE);
    } else {
        write_status(prev & !STATUS_IE);
    }
}

/// Reads CP0 CAUSE.
#[inline]
pub fn read_cause() -> u32 {
    let v: u32;
    // SAFETY: `mfc0` from a fixed, always-readable coprocessor register.
    unsafe {
        asm!("mfc0 {0}, $13", out(reg) v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Extracts the 5-bit exception code (`ExcCode`) from a CAUSE value.
#[inline]
pub fn exc_code(cause: u32) -> u32 {
    (cause >> 2) & 0x1f
}

/// Reads CP0 COUNT.
#[inline]
pub fn read_count() -> u32 {
    let v: u32;
    // SAFETY: `mfc0` from a fixed, always-readable coprocessor register.
    unsafe {
        asm!("mfc0 {0}, $9", out(reg) v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Writes CP0 COMPARE, arming the next timer interrupt.
#[inline]
pub fn write_compare(v: u32) {
    // SAFETY: `mtc0` to COMPARE, a write-only timer arming register.
    unsafe {
        asm!("mtc0 {0}, $11", in(reg) v, options(nomem, nostack, preserves_flags));
    }
}

/// Re-arms the timer for `cycles` CP0 Count ticks from now.
#[inline]
pub fn rearm_timer(cycles: u32) {
    write_compare(read_count().wrapping_add(cycles));
}

/// Writes CP0 ENTRYHI (VPN2 + ASID).
#[inline]
pub fn write_entry_hi(vpn2: u32, asid: u8) {
    let v = (vpn2 << 13) | asid as u32;
    // SAFETY: `mtc0` to ENTRYHI ahead of a TLB write instruction.
    unsafe {
        asm!("mtc0 {0}, $10", in(reg) v, options(nomem, nostack, preserves_flags));
    }
}

/// Writes CP0 ENTRYLO0/ENTRYLO1 from the even/odd page descriptors.
#[inline]
pub fn write_entry_lo(lo0: super::super::TlbEntryLo, lo1: super::super::TlbEntryLo) {
    let v0 = encode_entry_lo(lo0);
    let v1 = encode_entry_lo(lo1);
    // SAFETY: `mtc0` to ENTRYLO0/ENTRYLO1 ahead of a TLB write instruction.
    unsafe {
        asm!("mtc0 {0}, $2", in(reg) v0, options(nomem, nostack, preserves_flags));
        asm!("mtc0 {0}, $3", in(reg) v1, options(nomem, nostack, preserves_flags));
    }
}

fn encode_entry_lo(e: super::super::TlbEntryLo) -> u32 {
    ((e.pfn & 0x00ff_ffff) << 6) | ((e.global as u32) << 0) | ((e.valid as u32) << 1) | ((e.dirty as u32) << 2)
}

/// Writes CP0 PAGEMASK to select a 4 KiB page pair.
#[inline]
pub fn write_page_mask_4k() {
    // SAFETY: `mtc0` to PAGEMASK, value 0 selects the minimum (4K) mask.
    unsafe {
        asm!("mtc0 $0, $5", options(nomem, nostack, preserves_flags));
    }
}

/// Programs a TLB entry at a random index (`tlbwr`).
#[inline]
pub fn tlb_write_random() {
    // SAFETY: `tlbwr` consumes the ENTRYHI/ENTRYLO0/ENTRYLO1/PAGEMASK
    // registers already staged by the caller.
    unsafe {
        asm!("tlbwr", options(nomem, nostack, preserves_flags));
    }
}

/// Programs the TLB entry at CP0 INDEX (`tlbwi`).
#[inline]
pub fn tlb_write_indexed(index: u32) {
    // SAFETY: `mtc0`+`tlbwi`; `index` must be `< TLB_ENTRY_COUNT`.
    unsafe {
        asm!("mtc0 {0}, $0", in(reg) index, options(nomem, nostack, preserves_flags));
        asm!("tlbwi", options(nomem, nostack, preserves_flags));
    }
}

/// Reads CP0 EPC (the PC at which the exception happened).
#[inline]
pub fn read_epc() -> u32 {
    let v: u32;
    // SAFETY: `mfc0` from a fixed, always-readable coprocessor register.
    unsafe {
        asm!("mfc0 {0}, $14", out(reg) v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Writes CP0 EPC. Used to advance past a successfully handled syscall.
#[inline]
pub fn write_epc(v: u32) {
    // SAFETY: `mtc0` to EPC; the caller is responsible for leaving it
    // pointing at a valid instruction before the exception handler
    // returns via `eret`.
    unsafe {
        asm!("mtc0 {0}, $14", in(reg) v, options(nomem, nostack, preserves_flags));
    }
}

/// Reads CP0 BADVADDR, the faulting virtual address for TLB/address
/// exceptions.
#[inline]
pub fn read_badvaddr() -> u32 {
    let v: u32;
    // SAFETY: `mfc0` from a fixed, always-readable coprocessor register.
    unsafe {
        asm!("mfc0 {0}, $8", out(reg) v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Reads the ASID field of TLB entry `index`'s ENTRYHI via `tlbr`.
#[inline]
pub fn tlb_read_entry_asid(index: u32) -> u8 {
    let entry_hi: u32;
    // SAFETY: `tlbr` loads ENTRYHI/ENTRYLO* from the indexed TLB entry
    // into the coprocessor registers, which we then read back.
    unsafe {
        asm!("mtc0 {0}, $0", in(reg) index, options(nomem, nostack, preserves_flags));
        asm!("tlbr", options(nomem, nostack, preserves_flags));
        asm!("mfc0 {0}, $10", out(reg) entry_hi, options(nomem, nostack, preserves_flags));
    }
    (entry_hi & 0xff) as u8
}
