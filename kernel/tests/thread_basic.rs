//! Scenario 1 of spec.md §8: spawn one worker that yields 5 times and
//! returns; the main "thread" (this bare-metal entry, which never had
//! its own `Thread` descriptor) joins it and observes `EOK`.
//!
//! Requires a real context switch, so this runs only under the MSIM/
//! QEMU-style bare-metal runner (`harness = false` in Cargo.toml), never
//! on the host test target.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use msim_kernel::process::thread::{self, ThreadKind};
use msim_kernel::{arch, klog, mm, sched};

const LOOPS: usize = 5;

extern "C" fn worker(_arg: usize) -> *mut u8 {
    for _ in 0..LOOPS {
        thread::thread_yield();
    }
    core::ptr::null_mut()
}

#[unsafe(no_mangle)]
pub extern "C" fn __start() -> ! {
    klog::init();
    mm::init();
    sched::scheduler::init();

    let main = thread::thread_create(run_test, 0, ThreadKind::Kernel, "[TEST]").expect("main test thread");
    let _ = main;
    sched::scheduler::schedule_next();
    unreachable!("__start: schedule_next never returns")
}

extern "C" fn run_test(_arg: usize) -> *mut u8 {
    let worker_handle = thread::thread_create(worker, 0, ThreadKind::Kernel, "test-worker").expect("thread_create");
    let mut retval = core::ptr::null_mut();
    let result = thread::thread_join(Some(worker_handle), &mut retval as *mut *mut u8);
    assert_eq!(result, Ok(()), "thread_join should report EOK");
    log::info!("thread/basic: PASSED");
    arch::halt()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("thread/basic: FAILED: {info}");
    arch::halt()
}
