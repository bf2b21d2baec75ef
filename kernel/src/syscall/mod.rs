//! Syscall handlers dispatched from `irq` by `v0`. Each returns the value
//! to load back into `v0` on success, or `EINVAL` if `v0` named no
//! defined syscall -- the dispatcher kills the calling thread on error.

use crate::config::syscall;
use crate::error::{Errno, KResult};
use crate::process::thread;

/// Runs on the faulting thread's own kernel stack, with interrupts
/// disabled by hardware on exception entry (re-enabled once `irq`
/// returns via `eret`'s restore of `STATUS`).
pub fn dispatch(id: u32, a0: usize) -> KResult<usize> {
    match id {
        syscall::EXIT => sys_exit(a0),
        syscall::PUTCHAR => sys_putchar(a0),
        syscall::WRITE => sys_write(a0),
        syscall::INFO => sys_info(a0),
        _ => Err(Errno::Einval),
    }
}

/// Never returns to the dispatcher: `thread_finish` switches away.
fn sys_exit(a0: usize) -> KResult<usize> {
    thread::thread_finish(a0 as *mut u8);
}

fn sys_putchar(a0: usize) -> KResult<usize> {
    crate::arch::printer_putchar(a0 as u8);
    Ok(0)
}

/// Writes a NUL-terminated userspace string one byte at a time, stopping
/// at a generous bound so a missing terminator cannot hang the kernel.
fn sys_write(a0: usize) -> KResult<usize> {
    const MAX_LEN: usize = 64 * 1024;
    let ptr = a0 as *const u8;
    let mut count = 0usize;
    while count < MAX_LEN {
        // SAFETY: the syscall ABI hands us a raw userspace pointer; this
        // kernel runs with a single shared address space (spec.md §2), so
        // the byte is directly readable from kernel mode.
        let byte = unsafe { *ptr.add(count) };
        if byte == 0 {
            break;
        }
        crate::arch::printer_putchar(byte);
        count += 1;
    }
    Ok(count)
}

/// Userspace-visible `np_proc_info` layout: `{ id, virt_mem_size, total_ticks }`.
#[repr(C)]
struct ProcInfo {
    id: u32,
    virt_mem_size: u32,
    total_ticks: u32,
}

/// Returns `3` for a null pointer (per spec.md §4.8), else the process
/// id. `total_ticks` counts `SYSCALL_INFO` calls, not real scheduler
/// ticks -- an explicit simplification the spec allows (see DESIGN.md).
fn sys_info(a0: usize) -> KResult<usize> {
    if a0 == 0 {
        return Ok(3);
    }
    let cur = thread::current();
    // SAFETY: `cur` is the thread now running.
    let mut proc = unsafe { cur.as_ref() }.proc.expect("SYSCALL_INFO from a thread with no process");
    // SAFETY: `proc` is the live process this thread belongs to.
    let proc_mut = unsafe { proc.as_mut() };
    proc_mut.total_ticks += 1;

    let out = a0 as *mut ProcInfo;
    // SAFETY: per the syscall ABI the caller passes a valid userspace
    // pointer to an `np_proc_info` record; this kernel's single shared
    // address space makes it directly writable from kernel mode.
    unsafe {
        (*out).id = proc_mut.id;
        (*out).virt_mem_size = proc_mut.memory_size() as u32;
        (*out).total_ticks = proc_mut.total_ticks;
    }
    Ok(proc_mut.id as usize)
}
