//! Counting semaphore with a FIFO wait queue.
//!
//! `post` always increments `value` and, if a thread was waiting, wakes
//! its head and yields once to give it a chance to run; a `post` that
//! finds no one waiting never yields.

use spin::Mutex as SpinMutex;

use crate::arch;
use crate::error::{Errno, KResult};
use crate::process::thread::{self, ThreadHandle, ThreadList, ThreadState};

struct State {
    value: i32,
    wait_queue: ThreadList,
}

pub struct Semaphore {
    inner: SpinMutex<State>,
}

impl Semaphore {
    pub const fn new(initial: i32) -> Self {
        Semaphore {
            inner: SpinMutex::new(State {
                value: initial,
                wait_queue: ThreadList::new(),
            }),
        }
    }

    /// Decrements and returns `EOK` if `value > 0`; otherwise leaves
    /// `value` untouched and returns `EBUSY`.
    pub fn trywait(&self) -> KResult<()> {
        let _guard = arch::InterruptGuard::new();
        let mut state = self.inner.lock();
        if state.value <= 0 {
            return Err(Errno::Ebusy);
        }
        state.value -= 1;
        Ok(())
    }

    /// Repeatedly attempts `trywait`; on `EBUSY`, moves the caller onto
    /// this semaphore's wait queue with state `Waiting` and yields,
    /// retrying once woken.
    pub fn wait(&self) {
        loop {
            if self.trywait().is_ok() {
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

    /// Increments `value` and, if a thread is queued, wakes its head and
    /// yields to give it a chance to run. Yields only when it woke
    /// someone; a `post` that finds the wait queue empty never yields.
    pub fn post(&self) {
        let woke;
        {
            let _guard = arch::InterruptGuard::new();
            let mut state = self.inner.lock();
            state.value += 1;
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
        crate::panic_if!(!state.wait_queue.is_empty(), "destroyed a semaphore with threads still queued");
    }
}
