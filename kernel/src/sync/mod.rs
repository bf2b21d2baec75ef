//! C7: blocking synchronization primitives built on the scheduler.

pub mod mutex;
pub mod semaphore;
