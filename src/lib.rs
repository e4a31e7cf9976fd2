//! weft: a cooperative tasklet scheduler with serializable continuations.
//!
//! Tasklets are lightweight execution units that suspend at their own
//! request or when the watchdog budget runs out, serialize to portable
//! bytes while paused, and resume exactly where they left off -- including
//! mid-call-stack.

pub mod channel;
pub mod context;
pub mod error;
pub mod foreign;
pub mod loader;
pub mod program;
pub mod scheduler;
pub mod serialize;
pub mod switch;
pub mod symbol;
pub mod tasklet;
pub mod value;

#[cfg(test)]
mod lifecycle_tests;

// Re-export the main public APIs
pub use channel::ChannelId;
pub use error::SchedError;
pub use program::{Activation, Frame, StepEvent};
pub use scheduler::Scheduler;
pub use symbol::Symbol;
pub use tasklet::{TaskletId, TaskletState, TaskletStatus};
pub use value::Value;
