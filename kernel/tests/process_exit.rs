//! Scenario 6 of spec.md §8: load a trivial image that issues
//! `SYSCALL_EXIT(7)`; `process_join` must return `EOK` with
//! `exit_status == 7`.
//!
//! The "image" is hand-assembled MIPS: `ori $a0, $zero, 7; ori $v0,
//! $zero, 0; syscall`, placed at `PROCESS_ENTRY_POINT` the same way a
//! linked userspace binary would be -- everything before that offset is
//! the part of the image the loader does not copy (spec.md §4.9).

#![no_std]
#![no_main]

extern crate alloc;

use alloc::vec;
use core::panic::PanicInfo;

use msim_kernel::config::PROCESS_ENTRY_POINT;
use msim_kernel::process::process;
use msim_kernel::{arch, klog, mm, process::thread, sched};

/// `ori $a0, $zero, 7`
const ORI_A0_7: u32 = (0x0D << 26) | (4 << 16) | 7;
/// `ori $v0, $zero, 0` (SYSCALL_EXIT == 0)
const ORI_V0_0: u32 = (0x0D << 26) | (2 << 16);
/// `syscall`
const SYSCALL: u32 = 0x0000_000C;

/// Large enough that `PROCESS_ENTRY_POINT` plus the three instructions
/// above stays within one page.
const MEM_SIZE: usize = PROCESS_ENTRY_POINT + 0x1000;

#[unsafe(no_mangle)]
pub extern "C" fn __start() -> ! {
    klog::init();
    mm::init();
    sched::scheduler::init();

    let main = thread::thread_create(run_test, 0, thread::ThreadKind::Kernel, "[TEST]").expect("main test thread");
    let _ = main;
    sched::scheduler::schedule_next();
    unreachable!("__start: schedule_next never returns")
}

extern "C" fn run_test(_arg: usize) -> *mut u8 {
    let code = [ORI_A0_7, ORI_V0_0, SYSCALL];
    let img_size = PROCESS_ENTRY_POINT + code.len() * 4;
    let mut image = vec![0u8; img_size];
    for (i, word) in code.iter().enumerate() {
        image[PROCESS_ENTRY_POINT + i * 4..PROCESS_ENTRY_POINT + i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }

    let p = process::process_create(image.as_ptr() as usize, img_size, MEM_SIZE).expect("process_create");
    let mut exit_status: i32 = -1;
    let result = process::process_join(p, &mut exit_status as *mut i32);
    assert_eq!(result, Ok(()), "process_join should report EOK");
    assert_eq!(exit_status, 7, "exit status should be the SYSCALL_EXIT argument");
    log::info!("process: PASSED");
    arch::halt()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("process: FAILED: {info}");
    arch::halt()
}
