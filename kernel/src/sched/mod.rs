//! C5: the round-robin scheduler.

pub mod scheduler;
