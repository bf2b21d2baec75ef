//! Scenario 2 of spec.md §8: a worker kills itself via
//! `thread_kill(thread_get_current())`; control must never return to it,
//! and the joiner observes `EKILLED`.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use msim_kernel::process::thread::{self, ThreadKind};
use msim_kernel::{arch, error::Errno, klog, mm, sched};

extern "C" fn suicide_worker(_arg: usize) -> *mut u8 {
    let _ = thread::thread_kill(thread::current());
    // `thread_kill` of the current thread never returns; reaching here
    // is itself the failure.
    panic!("thread survived killing itself");
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
    let worker = thread::thread_create(suicide_worker, 0, ThreadKind::Kernel, "suicide").expect("thread_create");
    let mut retval = core::ptr::null_mut();
    let result = thread::thread_join(Some(worker), &mut retval as *mut *mut u8);
    assert_eq!(result, Err(Errno::Ekilled), "thread_join should report EKILLED");
    log::info!("thread/selfkill: PASSED");
    arch::halt()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("thread/selfkill: FAILED: {info}");
    arch::halt()
}
