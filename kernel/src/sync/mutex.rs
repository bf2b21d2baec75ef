//! Blocking mutex with a FIFO wait queue.
//!
//! A thread killed while queued here is left queued (spec.md §9's noted
//! limitation) -- destroying a mutex with waiters still queued is a
//! fatal invariant violation, not a recoverable error.

use spin::Mutex as SpinMutex;

use crate::arch;
use crate::error::{Errno, KResult};
use crate::process::thread::{self, ThreadHandle, ThreadList, ThreadState};

struct State {
    locked: bool,
    owner: Option<ThreadHandle>,
    wait_queue: ThreadList,
}

pub struct Mutex {
    inner: SpinMutex<State>,
}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: SpinMutex::new(State {
                locked: false,
                owner: None,
                wait_queue: ThreadList::new(),
            }),
        }
    }

    /// Tests-and-sets atomically. Returns `EBUSY` if already locked.
    pub fn trylock(&self) -> KResult<()> {
        let _guard = arch::InterruptGuard::new();
        let mut state = self.inner.lock();
        if state.locked {
            return Err(Errno::Ebusy);
        }
        state.locked = true;
        state.owner = Some(thread::current());
        Ok(())
    }

    /// Repeatedly attempts `trylock`; on `EBUSY`, moves the caller onto
    /// this mutex's wait queue with state `Waiting` and yields, retrying
    /// once woken.
    pub fn lock(&self) {
        loop {
            if self.trylock().is_ok() {
                return;
            }
            let _guard = arch::InterruptGuard::new();
            let mut cur = thread::current();
            {
                let mut state = self.inner.lock();
                // SAFETY: exclusive access under the interrupt-disabled
                // section; the caller is about to leave the ready queue.
                unsafe {
                    cur.as_mut().state = ThreadState::Waiting;
                }
                state.wait_queue.push_back(cur);
            }
            thread::thread_suspend_without_requeue();
        }
    }

    /// Panics if called by a thread other than the current owner. Clears
    /// `locked`; if the wait queue is non-empty, wakes its head and
    /// yields to give it a chance to acquire (a cooperative fairness
    /// heuristic, not a guaranteed handoff).
    pub fn unlock(&self) {
        let woke;
        {
            let _guard = arch::InterruptGuard::new();
            let mut state = self.inner.lock();
            crate::panic_if!(
                state.owner != Some(thread::current()),
                "mutex unlocked by a thread that does not own it"
            );
            state.locked = false;
            state.owner = None;
            woke = state.wait_queue.pop_front();
            if let Some(mut w) = woke {
                // SAFETY: exclusive access under the interrupt-disabled
                // section.
                unsafe {
                    w.as_mut().state = ThreadState::Ready;
                }
                crate::sched::scheduler::add_ready(w);
            }
        }
        if woke.is_some() {
            thread::thread_yield();
        }
    }

    /// Panics if any thread is still queued.
    pub fn destroy(self) {
        let state = self.inner.into_inner();
        crate::panic_if!(!state.wait_queue.is_empty(), "destroyed a mutex with threads still queued");
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
