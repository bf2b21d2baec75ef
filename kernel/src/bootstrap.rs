//! Kernel C-entry point, called from `arch::mips::boot::__start` on the
//! boot stack. Runs on a stack that belongs to no thread; never returns.

use crate::klog;
use crate::process::thread::{self, ThreadKind};

/// Order mandated by spec.md §9's Design Notes: frame allocator, then
/// the ASID pool, then the heap (since the heap's backing frames must
/// already be allocatable), then the scheduler, then the first thread.
pub extern "C" fn kernel_main() -> ! {
    klog::init();
    log::info!("booting");

    crate::mm::init();
    crate::sched::scheduler::init();

    let init = thread::thread_create(init_thread, 0, ThreadKind::Kernel, "[INIT]").expect("init thread creation failed");
    // SAFETY: `init` was just created and is not referenced anywhere but
    // the scheduler's ready queue yet.
    log::info!("created {}", unsafe { init.as_ref().name() });

    crate::sched::scheduler::schedule_next();
    unreachable!("kernel_main: schedule_next switched away and never returned")
}

extern "C" fn init_thread(_arg: usize) -> *mut u8 {
    log::info!("hello from the init thread");
    crate::arch::halt()
}
