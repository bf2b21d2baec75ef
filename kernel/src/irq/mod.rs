//! C8: exception and system-call dispatch. The sole entry point from
//! hardware: timer interrupts, TLB misses, address errors, coprocessor
//! faults, and syscalls all arrive here by CP0 `Cause` exception code.

use crate::config::exc_code;
use crate::process::thread;

/// The subset of an interrupted register context the portable dispatcher
/// and syscall handlers need. Built by `arch::mips::trap::__exception_vector`
/// from the raw saved-register frame; every other GPR is preserved by
/// the assembly trampoline without ever reaching Rust.
#[repr(C)]
pub struct ExceptionFrame {
    pub cause: u32,
    pub status: u32,
    pub epc: u32,
    pub v0: u32,
    pub a0: u32,
}

/// Bit position of the clock-interrupt pending bit within `Cause.IP`.
const CLOCK_IP_BIT: u32 = 8 + crate::config::CLOCK_IRQ_BIT;

/// Decodes `frame.cause`'s exception code and dispatches per spec.md
/// §4.8. Runs with interrupts already disabled by hardware on exception
/// entry; never re-enables them itself.
pub fn dispatch(frame: &mut ExceptionFrame) {
    let code = (frame.cause >> 2) & 0x1f;
    match code {
        exc_code::INT => handle_interrupt(frame),
        exc_code::TLBL | exc_code::TLBS => handle_tlb_miss(),
        exc_code::ADEL => kill_current(),
        exc_code::SYS => handle_syscall(frame),
        exc_code::CPU => kill_current(),
        other => panic!("unhandled exception code {other} at epc={:#x}", frame.epc),
    }
}

fn handle_interrupt(frame: &ExceptionFrame) {
    if frame.cause & (1 << CLOCK_IP_BIT) != 0 {
        crate::arch::cp0::rearm_timer(crate::config::CYCLES);
        crate::sched::scheduler::schedule_next();
    }
    // Any other pending interrupt bit with no handler is silently
    // ignored, per spec.md §7.
}

/// A TLB miss with no mapping for the faulting address terminates only
/// the offending thread; `mm::tlb::handle_tlb_refill` already covers the
/// "mapping exists" path by reprogramming the TLB directly from the
/// software refill handler and never reaching here. By the time this
/// dispatcher sees `TLBL`/`TLBS`, the refill handler has already tried
/// and failed.
fn handle_tlb_miss() {
    let cur = thread::current();
    // SAFETY: `cur` is the thread now running.
    let as_ = unsafe { cur.as_ref().address_space() };
    match as_ {
        Some(as_) => {
            let badva = crate::arch::cp0::read_badvaddr() as usize;
            crate::mm::tlb::handle_tlb_refill(as_, badva);
        }
        None => kill_current(),
    }
}

fn kill_current() {
    // SAFETY: always valid to read the current handle; `thread_kill` of
    // the current thread never returns.
    let cur = thread::current();
    let _ = thread::thread_kill(cur);
}

fn handle_syscall(frame: &mut ExceptionFrame) {
    match crate::syscall::dispatch(frame.v0, frame.a0 as usize) {
        Ok(retval) => {
            frame.v0 = retval as u32;
            frame.epc = frame.epc.wrapping_add(4);
        }
        Err(_) => kill_current(),
    }
}
