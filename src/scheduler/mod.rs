//! Central runtime scheduler: run queue, watchdog dispatch loop, lifecycle
//! operations, channels, and the shared global namespace. All tasklet
//! coordination flows through a `Scheduler` instance.

pub mod scheduler;
pub use scheduler::*;
