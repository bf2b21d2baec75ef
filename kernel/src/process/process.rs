//! C9: userspace processes -- a thread plus an image.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch;
use crate::config::{PAGE_SIZE, PROCESS_ENTRY_POINT, PROCESS_STACK_PAGES};
use crate::error::{Errno, KResult};
use crate::process::thread::{self, ThreadHandle, ThreadKind};

pub struct Process {
    pub id: u32,
    /// Set synchronously by `process_create`, once.
    pub thread: Option<ThreadHandle>,
    image_location: usize,
    image_size: usize,
    memory_size: usize,
    pub total_ticks: u32,
}

impl Process {
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }
}

static NEXT_PROCESS_ID: AtomicU32 = AtomicU32::new(1);

/// Creates a userspace process: validates the image geometry, assigns a
/// monotonically increasing id, and starts a userspace thread running
/// the loader, which attaches itself to this `Process` and jumps to
/// userspace.
pub fn process_create(img_location: usize, img_size: usize, mem_size: usize) -> KResult<NonNull<Process>> {
    if mem_size < img_size || mem_size % PAGE_SIZE != 0 {
        return Err(Errno::Einval);
    }
    let id = NEXT_PROCESS_ID.fetch_add(1, Ordering::SeqCst);

    let process = alloc::boxed::Box::new(Process {
        id,
        thread: None,
        image_location: img_location,
        image_size: img_size,
        memory_size: mem_size,
        total_ticks: 0,
    });
    let mut proc_handle = NonNull::from(alloc::boxed::Box::leak(process));

    let arg = proc_handle.as_ptr() as usize;
    let thread_handle = thread::thread_create_new_as(loader_entry, arg, ThreadKind::Userspace, "UAPP", mem_size)?;
    // SAFETY: `proc_handle` uniquely owned by this function so far.
    unsafe {
        proc_handle.as_mut().thread = Some(thread_handle);
    }
    Ok(proc_handle)
}

/// Runs once, on the freshly created userspace thread, before it ever
/// reaches userspace. Attaches the thread to its process, copies the
/// image into user memory, and jumps to userspace. Never returns.
extern "C" fn loader_entry(arg: usize) -> *mut u8 {
    let mut proc = unsafe { NonNull::new_unchecked(arg as *mut Process) };
    let mut cur = thread::current();
    // SAFETY: `cur` is the thread now running, not referenced
    // concurrently; `proc` is the process this thread belongs to.
    unsafe {
        cur.as_mut().proc = Some(proc);
    }

    // SAFETY: the thread's address space was just created by
    // `thread_create_new_as` and is not shared with anyone else yet.
    let as_ = unsafe { cur.as_ref().address_space() }.expect("userspace thread has no address space");
    let dest_phys = as_
        .get_mapping(PROCESS_ENTRY_POINT)
        .expect("process image does not start at PROCESS_ENTRY_POINT");

    // SAFETY: per spec.md §4.9, the image bytes live at
    // `img_location + PROCESS_ENTRY_POINT` in kernel-accessible memory,
    // the destination is the freshly mapped (and therefore non-
    // overlapping) user region, and the copy length never exceeds the
    // process's validated `image_size`.
    let proc_ref = unsafe { proc.as_ref() };
    let copy_len = proc_ref.image_size.saturating_sub(PROCESS_ENTRY_POINT);
    if copy_len > 0 {
        let src = (proc_ref.image_location + PROCESS_ENTRY_POINT) as *const u8;
        let dest = (dest_phys + crate::config::KSEG0_BASE) as *mut u8;
        // SAFETY: see above.
        unsafe {
            core::ptr::copy_nonoverlapping(src, dest, copy_len);
        }
    }

    let user_sp = crate::config::INITIAL_VIRTUAL_ADDRESS + PROCESS_STACK_PAGES * PAGE_SIZE - core::mem::size_of::<usize>();
    // SAFETY: `user_sp` lies within the freshly mapped user stack pages
    // and `PROCESS_ENTRY_POINT` is the process's validated entry.
    unsafe { arch::cpu_jump_to_userspace(user_sp, PROCESS_ENTRY_POINT) }
}

/// Joins a process's userspace thread, writing its exit status (the
/// kernel's stand-in for an `int`) through `exit_status` if non-null.
pub fn process_join(p: NonNull<Process>, exit_status: *mut i32) -> KResult<()> {
    // SAFETY: `p` is a live process handle.
    let thread_handle = unsafe { p.as_ref().thread };
    let mut retval: *mut u8 = core::ptr::null_mut();
    let result = thread::thread_join(thread_handle, &mut retval as *mut *mut u8);
    if !exit_status.is_null() {
        // SAFETY: caller-provided output slot.
        unsafe { *exit_status = retval as usize as i32 };
    }
    // SAFETY: the joined thread has already been reclaimed by
    // `thread_join`; this process record has no other owner left.
    drop(unsafe { alloc::boxed::Box::from_raw(p.as_ptr()) });
    result
}
