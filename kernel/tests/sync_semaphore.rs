//! spec.md §8's *Sync safety* property plus §9's resolution of the
//! `sem_post` open question ("yield only after a wake"): two threads
//! block on a semaphore with no permits, then two posts wake them in
//! FIFO order, each post yielding exactly once to its own waiter.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicUsize, Ordering};

use msim_kernel::process::thread::{self, ThreadKind};
use msim_kernel::sync::semaphore::Semaphore;
use msim_kernel::{arch, klog, mm, sched};

static SEM: Semaphore = Semaphore::new(0);
static WAKE_ORDER: AtomicUsize = AtomicUsize::new(0);
static FIRST_WOKEN_AT: AtomicUsize = AtomicUsize::new(0);
static SECOND_WOKEN_AT: AtomicUsize = AtomicUsize::new(0);

extern "C" fn waiter(which: usize) -> *mut u8 {
    SEM.wait();
    let seq = WAKE_ORDER.fetch_add(1, Ordering::SeqCst) + 1;
    if which == 1 {
        FIRST_WOKEN_AT.store(seq, Ordering::SeqCst);
    } else {
        SECOND_WOKEN_AT.store(seq, Ordering::SeqCst);
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
    let first = thread::thread_create(waiter, 1, ThreadKind::Kernel, "waiter-1").expect("thread_create");
    let second = thread::thread_create(waiter, 2, ThreadKind::Kernel, "waiter-2").expect("thread_create");

    // Let both waiters run, find the semaphore empty, and queue themselves
    // before either post.
    thread::thread_yield();
    thread::thread_yield();

    SEM.post();
    SEM.post();

    let mut retval = core::ptr::null_mut();
    let r1 = thread::thread_join(Some(first), &mut retval as *mut *mut u8);
    assert_eq!(r1, Ok(()), "first waiter should join cleanly");
    let r2 = thread::thread_join(Some(second), &mut retval as *mut *mut u8);
    assert_eq!(r2, Ok(()), "second waiter should join cleanly");

    assert_eq!(FIRST_WOKEN_AT.load(Ordering::SeqCst), 1, "first-queued waiter should be woken by the first post");
    assert_eq!(SECOND_WOKEN_AT.load(Ordering::SeqCst), 2, "second-queued waiter should be woken by the second post");

    log::info!("sync/semaphore: PASSED");
    arch::halt()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("sync/semaphore: FAILED: {info}");
    arch::halt()
}
