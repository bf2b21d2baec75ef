//! C5: round-robin scheduler over a ready queue, plus a suspended queue
//! for `thread_suspend`/`wakeup`.

use spin::Mutex;

use crate::arch;
use crate::config::CYCLES;
use crate::error::{Errno, KResult};
use crate::process::thread::{self, ThreadHandle, ThreadList, ThreadState};

struct Scheduler {
    ready: ThreadList,
    suspended: ThreadList,
    /// The thread currently at the front of round-robin rotation. May
    /// differ momentarily from the thread actually running on the CPU;
    /// only `schedule_next` (via `thread_switch_to`) reconciles them.
    scheduled_thread: Option<ThreadHandle>,
    /// Set when `remove`/`suspend` already advanced `scheduled_thread`
    /// within the current preemption point, so `schedule_next` does not
    /// advance twice (the fairness invariant of spec.md §3/§4.5).
    changed_scheduled_thread: bool,
    ever_scheduled: bool,
}

impl Scheduler {
    const fn new() -> Self {
        Scheduler {
            ready: ThreadList::new(),
            suspended: ThreadList::new(),
            scheduled_thread: None,
            changed_scheduled_thread: false,
            ever_scheduled: false,
        }
    }
}

static SCHED: Mutex<Scheduler> = Mutex::new(Scheduler::new());

pub fn init() {}

/// Inserts `t` into the ready queue immediately before `scheduled_thread`
/// (so it runs after one full rotation). The very first thread ever
/// added becomes `scheduled_thread` directly and arms the preemption
/// timer.
pub fn add_ready(mut t: ThreadHandle) {
    let _guard = arch::InterruptGuard::new();
    let mut sched = SCHED.lock();
    // SAFETY: exclusive access under the interrupt-disabled section.
    unsafe {
        t.as_mut().state = ThreadState::Ready;
    }
    if sched.scheduled_thread.is_none() {
        sched.ready.push_back(t);
        sched.scheduled_thread = Some(t);
        arch::cp0::rearm_timer(CYCLES);
    } else {
        let before = sched.scheduled_thread;
        sched.ready.insert_before(t, before);
    }
}

/// Unlinks `t` from the ready queue without requiring it to be terminal
/// and without moving it onto the suspended queue. Used both to roll back
/// a thread created moments ago that failed a later setup step (e.g.
/// `thread_create_new_as` failing to allocate its address space) and to
/// park a thread that a sync primitive (mutex/semaphore) has already
/// queued on its own independent wait list -- such a thread must leave
/// rotation but has nowhere to go in the scheduler's own queues.
pub(crate) fn park(t: ThreadHandle) {
    let _guard = arch::InterruptGuard::new();
    let mut sched = SCHED.lock();
    advance_off(&mut sched, t);
    sched.ready.remove(t);
}

/// Removes a Finished/Killed thread from the ready queue.
pub fn remove(t: ThreadHandle) {
    let _guard = arch::InterruptGuard::new();
    let mut sched = SCHED.lock();
    // SAFETY: caller sets state before calling; we only read it here.
    let state = unsafe { t.as_ref().state };
    crate::panic_if!(
        !matches!(state, ThreadState::Finished | ThreadState::Killed),
        "scheduler::remove on a thread that is neither Finished nor Killed"
    );
    advance_off(&mut sched, t);
    sched.ready.remove(t);
}

/// If `t` is the current rotation pointer, advances it to the next ready
/// thread (panicking if none remains) and marks the pointer fresh.
fn advance_off(sched: &mut Scheduler, t: ThreadHandle) {
    if sched.scheduled_thread == Some(t) {
        let next = sched.ready.next_wrapping(t);
        crate::panic_if!(
            next == Some(t) || next.is_none(),
            "removing the last runnable thread from the scheduler"
        );
        sched.scheduled_thread = next;
        sched.changed_scheduled_thread = true;
    }
}

/// Moves `t` from the ready queue to the suspended queue.
pub fn suspend(mut t: ThreadHandle) {
    let _guard = arch::InterruptGuard::new();
    let mut sched = SCHED.lock();
    advance_off(&mut sched, t);
    sched.ready.remove(t);
    // SAFETY: exclusive access under the interrupt-disabled section.
    unsafe {
        t.as_mut().state = ThreadState::Suspended;
    }
    sched.suspended.push_back(t);
}

/// Moves `t` from the suspended queue back to the ready queue.
/// Idempotent: a thread already Ready/Running returns `EOK` untouched.
pub fn wakeup(mut t: ThreadHandle) -> KResult<()> {
    let _guard = arch::InterruptGuard::new();
    // SAFETY: exclusive access under the interrupt-disabled section.
    let state = unsafe { t.as_ref().state };
    match state {
        ThreadState::Finished | ThreadState::Killed => Err(Errno::Eexited),
        ThreadState::Ready => Ok(()),
        ThreadState::Suspended => {
            let mut sched = SCHED.lock();
            sched.suspended.remove(t);
            // SAFETY: exclusive access under the interrupt-disabled
            // section.
            unsafe {
                t.as_mut().state = ThreadState::Ready;
            }
            if sched.scheduled_thread.is_none() {
                sched.ready.push_back(t);
                sched.scheduled_thread = Some(t);
                arch::cp0::rearm_timer(CYCLES);
            } else {
                let before = sched.scheduled_thread;
                sched.ready.insert_before(t, before);
            }
            Ok(())
        }
        ThreadState::Waiting => Ok(()),
    }
}

/// The only entry point that actually switches the CPU to another
/// thread. On the first call, picks the head of the ready queue.
/// Otherwise advances the rotation pointer unless it was already
/// advanced this preemption point, then switches into it.
pub fn schedule_next() {
    let next = {
        let mut sched = SCHED.lock();
        if !sched.ever_scheduled {
            sched.ever_scheduled = true;
            sched.scheduled_thread = sched.ready.head();
        } else if sched.changed_scheduled_thread {
            sched.changed_scheduled_thread = false;
        } else if let Some(cur) = sched.scheduled_thread {
            sched.scheduled_thread = sched.ready.next_wrapping(cur);
        }
        sched.scheduled_thread
    };
    let next = next.expect("schedule_next with an empty ready queue");
    thread::thread_switch_to(next);
}

/// The thread currently at the front of round-robin rotation (may differ
/// momentarily from the CPU's actual current thread during a switch).
pub fn scheduled() -> Option<ThreadHandle> {
    SCHED.lock().scheduled_thread
}
