//! C6: thread lifecycle, stacks, and saved contexts.

use alloc::boxed::Box;
use core::ptr::NonNull;

use crate::arch;
use crate::config::{PAGE_SIZE, THREAD_NAME_MAX_LENGTH};
use crate::error::{Errno, KResult};
use crate::mm::address_space::{self, AddressSpace};
use crate::mm::frame;
use crate::process::process::Process;
use crate::sched::scheduler;

/// Opaque handle to a live thread. Threads are heap-allocated (`Box`) and
/// live until a joiner reclaims them; this handle is simply the raw
/// pointer `Box::into_raw` produced, the kernel's usual style for
/// singleton-owned, arena-free objects.
pub type ThreadHandle = NonNull<Thread>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    Kernel,
    Userspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Suspended,
    Waiting,
    Finished,
    Killed,
}

pub type ThreadEntry = extern "C" fn(usize) -> *mut u8;

/// A thread. Doubles as an intrusive doubly-linked list node shared by
/// the ready queue, the suspended queue, and every mutex/semaphore wait
/// queue -- a thread is a member of at most one such list at a time, so
/// one pair of links suffices for all of them.
pub struct Thread {
    pub kind: ThreadKind,
    pub state: ThreadState,
    name: [u8; THREAD_NAME_MAX_LENGTH],
    name_len: u8,

    stack_base: *mut u8,
    stack_pages: usize,
    /// Top-of-stack saved-context slot. Meaningful only while the thread
    /// is not the one currently running.
    ctx_slot: *mut usize,

    entry: ThreadEntry,
    arg: usize,
    retval: *mut u8,

    pub(crate) sched_prev: Option<ThreadHandle>,
    pub(crate) sched_next: Option<ThreadHandle>,

    /// Shared, refcounted handle into an `mm::address_space` record. See
    /// `mm::address_space::as_create_shared`/`as_share_handle`/`as_release`.
    as_: Option<NonNull<AddressSpace>>,
    pub(crate) proc: Option<NonNull<Process>>,
}

// SAFETY: a `Thread` is only ever touched while interrupts are disabled
// or while it is the exclusively-running thread; there is a single CPU.
unsafe impl Send for Thread {}

impl Thread {
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    /// # Safety
    /// The returned reference must not outlive any call that might
    /// release or destroy this thread's address space.
    pub unsafe fn address_space(&self) -> Option<&AddressSpace> {
        // SAFETY: forwarded from the caller.
        self.as_.map(|p| unsafe { p.as_ref() })
    }
}

/// A simple FIFO/queue of threads linked via [`Thread::sched_prev`] /
/// [`Thread::sched_next`]. Used for the scheduler's suspended queue and
/// for each mutex/semaphore's wait queue.
pub struct ThreadList {
    head: Option<ThreadHandle>,
    tail: Option<ThreadHandle>,
}

impl ThreadList {
    pub const fn new() -> Self {
        ThreadList {
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<ThreadHandle> {
        self.head
    }

    pub fn push_back(&mut self, mut t: ThreadHandle) {
        // SAFETY: exclusive access, interrupts disabled by the caller.
        unsafe {
            t.as_mut().sched_prev = self.tail;
            t.as_mut().sched_next = None;
        }
        match self.tail {
            Some(mut tail) => unsafe { tail.as_mut().sched_next = Some(t) },
            None => self.head = Some(t),
        }
        self.tail = Some(t);
    }

    /// Inserts `t` immediately before `before` in the list, or at the
    /// tail if `before` is `None`.
    pub fn insert_before(&mut self, mut t: ThreadHandle, before: Option<ThreadHandle>) {
        let Some(mut before) = before else {
            self.push_back(t);
            return;
        };
        // SAFETY: exclusive access, interrupts disabled by the caller.
        unsafe {
            let prev = before.as_ref().sched_prev;
            t.as_mut().sched_prev = prev;
            t.as_mut().sched_next = Some(before);
            before.as_mut().sched_prev = Some(t);
            match prev {
                Some(mut p) => p.as_mut().sched_next = Some(t),
                None => self.head = Some(t),
            }
        }
    }

    pub fn remove(&mut self, mut t: ThreadHandle) {
        // SAFETY: exclusive access, interrupts disabled by the caller.
        unsafe {
            let prev = t.as_ref().sched_prev;
            let next = t.as_ref().sched_next;
            match prev {
                Some(mut p) => p.as_mut().sched_next = next,
                None => self.head = next,
            }
            match next {
                Some(mut n) => n.as_mut().sched_prev = prev,
                None => self.tail = prev,
            }
            t.as_mut().sched_prev = None;
            t.as_mut().sched_next = None;
        }
    }

    pub fn pop_front(&mut self) -> Option<ThreadHandle> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }

    /// The element following `t` in address order, wrapping to the head
    /// of the list if `t` is the tail.
    pub fn next_wrapping(&self, t: ThreadHandle) -> Option<ThreadHandle> {
        // SAFETY: `t` is a member of this list.
        let next = unsafe { t.as_ref().sched_next };
        next.or(self.head)
    }
}

impl Default for ThreadList {
    fn default() -> Self {
        Self::new()
    }
}

static RUNNING_THREAD: spin::Mutex<Option<ThreadHandle>> = spin::Mutex::new(None);

/// Returns the handle of the thread currently executing.
pub fn current() -> ThreadHandle {
    RUNNING_THREAD.lock().expect("no running thread")
}

pub(crate) fn set_current(t: ThreadHandle) {
    *RUNNING_THREAD.lock() = Some(t);
}

/// Creates a new kernel thread, inheriting the caller's address space
/// (refcount++, `None` for the very first kernel thread). Allocates the
/// thread descriptor from the kernel heap and its stack from the frame
/// allocator.
pub fn thread_create(entry: ThreadEntry, arg: usize, kind: ThreadKind, name: &str) -> KResult<ThreadHandle> {
    let stack_pages = crate::config::THREAD_STACK_SIZE.div_ceil(PAGE_SIZE).max(1);
    let stack_base = frame::kframe_alloc(stack_pages)?;

    let mut name_buf = [0u8; THREAD_NAME_MAX_LENGTH];
    let name_bytes = name.as_bytes();
    let copy_len = name_bytes.len().min(THREAD_NAME_MAX_LENGTH);
    name_buf[..copy_len].copy_from_slice(&name_bytes[..copy_len]);

    let inherited_as = {
        let _guard = arch::InterruptGuard::new();
        let cur = *RUNNING_THREAD.lock();
        match cur {
            // SAFETY: `parent` is the live running thread; sharing its
            // address space handle is valid while interrupts stay
            // disabled across the increment.
            Some(parent) => unsafe {
                parent.as_ref().as_.inspect(|&handle| {
                    address_space::as_share_handle(handle);
                })
            },
            None => None,
        }
    };

    let thread = Box::new(Thread {
        kind,
        state: ThreadState::Ready,
        name: name_buf,
        name_len: copy_len as u8,
        stack_base,
        stack_pages,
        ctx_slot: core::ptr::null_mut(),
        entry,
        arg,
        retval: core::ptr::null_mut(),
        sched_prev: None,
        sched_next: None,
        as_: inherited_as,
        proc: None,
    });
    let mut handle = NonNull::from(Box::leak(thread));

    // SAFETY: `stack_base` was just allocated and is large enough for the
    // saved-context frame (stack_pages * PAGE_SIZE >= THREAD_STACK_SIZE).
    let stack_top = unsafe { stack_base.add(stack_pages * PAGE_SIZE) };
    // SAFETY: `stack_top` points one-past-the-end of the freshly
    // allocated stack.
    let ctx_slot = unsafe { arch::new_thread_context(stack_top, entry_wrapper) };
    // SAFETY: `handle` uniquely owns this thread; no aliasing yet.
    unsafe {
        handle.as_mut().ctx_slot = ctx_slot;
    }

    scheduler::add_ready(handle);
    Ok(handle)
}

/// Like [`thread_create`] but replaces the inherited address space with a
/// freshly created one of `size` bytes.
pub fn thread_create_new_as(
    entry: ThreadEntry,
    arg: usize,
    kind: ThreadKind,
    name: &str,
    size: usize,
) -> KResult<ThreadHandle> {
    let mut handle = thread_create(entry, arg, kind, name)?;
    let new_as = match address_space::as_create_shared(size) {
        Ok(a) => a,
        Err(e) => {
            // SAFETY: `handle` was just created by this call and has not
            // been published to any other subsystem but the scheduler's
            // ready queue; it is safe to tear down immediately.
            unsafe {
                scheduler::park(handle);
                free_thread(handle);
            }
            return Err(e);
        }
    };
    // SAFETY: exclusive access to the freshly created thread.
    unsafe {
        if let Some(old_as) = handle.as_mut().as_.take() {
            let _ = address_space::as_release(old_as);
        }
        handle.as_mut().as_ = Some(new_as);
    }
    Ok(handle)
}

/// The only function invoked directly from the context-switch trampoline
/// for a brand-new thread. Runs the thread's entry point and funnels its
/// return value into [`thread_finish`], which never returns.
extern "C" fn entry_wrapper() -> ! {
    let handle = current();
    // SAFETY: `handle` is the thread now running; no one else touches it
    // concurrently.
    let (entry, arg) = unsafe {
        let t = handle.as_ref();
        (t.entry, t.arg)
    };
    let retval = entry(arg);
    thread_finish(retval)
}

/// Scratch context-save area used only for the very first switch away
/// from the boot stack, which has no `Thread` descriptor of its own.
/// Never restored into: the boot stack never resumes.
static mut BOOT_SWITCH_SLOT: [usize; 13] = [0; 13];

/// Invoked only by [`crate::sched::scheduler::schedule_next`]. Performs
/// the actual context switch into `next`.
pub(crate) fn thread_switch_to(next: ThreadHandle) {
    let prev = *RUNNING_THREAD.lock();
    if prev == Some(next) {
        return;
    }
    set_current(next);
    // SAFETY: `next` is a live thread about to become current.
    let new_asid = unsafe { next.as_ref().as_ }
        .map(|p| unsafe { p.as_ref().asid() })
        .unwrap_or(crate::config::INVALID_ASID);
    let old_slot = match prev {
        // SAFETY: `prev`'s ctx_slot is the fixed context-save area at the
        // top of its own stack.
        Some(p) => unsafe { (*p.as_ptr()).ctx_slot },
        // SAFETY: only ever reached once, before any real thread has run;
        // single-CPU, so no concurrent access.
        None => unsafe { core::ptr::addr_of_mut!(BOOT_SWITCH_SLOT) as *mut usize },
    };
    // SAFETY: `new_slot` was populated either by `new_thread_context` at
    // creation or by a prior switch away from `next`.
    unsafe {
        let new_slot = (*next.as_ptr()).ctx_slot;
        arch::cpu_switch_context(old_slot, new_slot, new_asid);
    }
}

pub fn thread_yield() {
    scheduler::schedule_next();
}

pub fn thread_suspend() {
    let cur = current();
    scheduler::suspend(cur);
    scheduler::schedule_next();
}

/// Leaves rotation and switches away without touching the scheduler's own
/// suspended queue. Used by `sync::mutex`/`sync::semaphore`, which park a
/// waiting thread on their own wait queue and only need the scheduler to
/// stop considering it for the ready rotation; the caller must already
/// have set the thread's state (`Waiting`) and enqueued it before calling
/// this.
pub(crate) fn thread_suspend_without_requeue() {
    let cur = current();
    scheduler::park(cur);
    scheduler::schedule_next();
}

pub fn thread_wakeup(t: ThreadHandle) -> KResult<()> {
    scheduler::wakeup(t)
}

/// Frees a thread descriptor and its stack. Only valid once the thread is
/// Finished/Killed and no longer referenced by the scheduler.
///
/// # Safety
/// `t` must not be scheduled, suspended, or enqueued on any wait queue,
/// and must not be used again after this call.
unsafe fn free_thread(t: ThreadHandle) {
    // SAFETY: forwarded from the caller.
    let thread = unsafe { Box::from_raw(t.as_ptr()) };
    drop(frame::frame_free(
        thread.stack_base as usize - crate::config::KSEG0_BASE,
        thread.stack_pages,
    ));
    if let Some(as_handle) = thread.as_ {
        // SAFETY: this thread held the last reference it was entitled to
        // release; no other subsystem may dereference this handle
        // through the thread being freed.
        drop(unsafe { address_space::as_release(as_handle) });
    }
}

/// Disables interrupts, marks the current thread Finished, records
/// `retval`, removes it from the scheduler, and switches away. Never
/// returns.
pub fn thread_finish(retval: *mut u8) -> ! {
    let _guard = arch::InterruptGuard::new();
    let mut cur = current();
    // SAFETY: exclusive access under the interrupt-disabled section.
    unsafe {
        cur.as_mut().state = ThreadState::Finished;
        cur.as_mut().retval = retval;
    }
    scheduler::remove(cur);
    scheduler::schedule_next();
    unreachable!("thread_finish: schedule_next switched away and never returned")
}

/// Marks `t` Killed and removes it from the scheduler. If `t` is the
/// current thread, switches away and never returns. A thread killed while
/// queued on a mutex/semaphore wait queue is left there (spec'd
/// limitation; see the module docs in `sync`).
pub fn thread_kill(mut t: ThreadHandle) -> KResult<()> {
    let _guard = arch::InterruptGuard::new();
    // SAFETY: exclusive access under the interrupt-disabled section.
    unsafe {
        t.as_mut().state = ThreadState::Killed;
    }
    scheduler::remove(t);
    if t == current() {
        scheduler::schedule_next();
        unreachable!("thread_kill(current): schedule_next switched away and never returned")
    }
    Ok(())
}

/// Busy-yields until `t` reaches Finished or Killed, then reclaims its
/// descriptor and address space and writes its exit value through
/// `retval` (if non-null).
pub fn thread_join(t: Option<ThreadHandle>, retval: *mut *mut u8) -> KResult<()> {
    let t = t.ok_or(Errno::Einval)?;
    loop {
        // SAFETY: reading `state` racily is fine -- we only act once it
        // settles into a terminal value, which is written under an
        // interrupt-disabled section and therefore observable as a
        // single atomic word on this single-CPU machine.
        let state = unsafe { t.as_ref().state };
        match state {
            ThreadState::Finished | ThreadState::Killed => break,
            _ => thread_yield(),
        }
    }
    // SAFETY: the thread is terminal and no longer referenced by any
    // scheduler queue; this call uniquely owns it from here on.
    let (state, retval_val) = unsafe { (t.as_ref().state, t.as_ref().retval) };
    if !retval.is_null() {
        // SAFETY: caller-provided output slot.
        unsafe { *retval = retval_val };
    }
    // SAFETY: terminal thread, safe to reclaim.
    unsafe { free_thread(t) };
    match state {
        ThreadState::Killed => Err(Errno::Ekilled),
        _ => Ok(()),
    }
}
