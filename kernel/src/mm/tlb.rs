//! C4: TLB refill handler.

use crate::arch::{self, TlbEntryLo};
use crate::config::{INVALID_ASID, PAGE_SIZE, TLB_ENTRY_COUNT};
use crate::error::Errno;
use crate::mm::address_space::AddressSpace;
use crate::process::thread;

/// Handles a TLB refill exception for `badva`, using `as_` (the faulting
/// thread's address space). Programs one TLB entry covering the even/odd
/// VPN2 pair containing `badva`, or kills the current thread if neither
/// half of the pair is mapped.
pub fn handle_tlb_refill(as_: &AddressSpace, badva: usize) {
    let vpn2 = badva >> 13;
    let vpn_even = vpn2 * 2;
    let vpn_odd = vpn2 * 2 + 1;

    let (valid_even, pfn_even) = lookup(as_, vpn_even);
    let (valid_odd, pfn_odd) = lookup(as_, vpn_odd);

    if !valid_even && !valid_odd {
        thread::thread_kill(thread::current());
        return;
    }

    arch::cp0::write_page_mask_4k();
    arch::cp0::write_entry_hi(vpn2 as u32, as_.asid());
    arch::cp0::write_entry_lo(
        TlbEntryLo {
            pfn: pfn_even,
            valid: valid_even,
            dirty: true,
            global: false,
        },
        TlbEntryLo {
            pfn: pfn_odd,
            valid: valid_odd,
            dirty: true,
            global: false,
        },
    );
    arch::cp0::tlb_write_random();
}

/// Looks up one virtual page number, returning `(mapped, pfn)`. A
/// mapping error other than "not present" (`ENOENT`) is a kernel bug.
fn lookup(as_: &AddressSpace, vpn: usize) -> (bool, u32) {
    match as_.get_mapping(vpn * PAGE_SIZE) {
        Ok(phys) => (true, (phys / PAGE_SIZE) as u32),
        Err(Errno::Enoent) => (false, 0),
        Err(e) => panic!("TLB refill: unexpected mapping error {e}"),
    }
}

/// Invalidates every TLB entry tagged with `asid`, per spec.md §4.2 (must
/// run before the ASID is returned to the pool).
pub fn invalidate_tlb(asid: u8) {
    for index in 0..TLB_ENTRY_COUNT as u32 {
        if arch::cp0::tlb_read_entry_asid(index) == asid {
            arch::cp0::write_page_mask_4k();
            arch::cp0::write_entry_hi(0, INVALID_ASID);
            arch::cp0::write_entry_lo(
                TlbEntryLo {
                    pfn: 0,
                    valid: false,
                    dirty: false,
                    global: false,
                },
                TlbEntryLo {
                    pfn: 0,
                    valid: false,
                    dirty: false,
                    global: false,
                },
            );
            arch::cp0::tlb_write_indexed(index);
        }
    }
}
