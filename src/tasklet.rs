//! Tasklet records and the lifecycle state machine.
//! A tasklet wraps a program reference, its creation arguments, and -- once
//! it has run at least once -- the execution context it will resume from.

use crate::context::ExecutionContext;
use crate::symbol::Symbol;
use crate::value::Value;
use std::fmt;

/// Handle to a tasklet, unique within one scheduler instance and stable
/// across dump/load within a process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskletId(pub u64);

impl fmt::Display for TaskletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states for cooperative scheduling.
///
/// `Dead` is terminal; every other state can reach it via `kill`. A tasklet
/// sits in the scheduler's run queue exactly when it is `Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskletState {
    /// Created but not yet bound into a run queue.
    Unborn,
    /// Waiting in the run queue for activation.
    Scheduled,
    /// Currently occupying the scheduler's active slot.
    Running,
    /// Suspended off-queue; resumable via `insert`.
    Paused,
    /// Waiting on a channel; resumable only by channel notification.
    Blocked,
    /// Finished, killed, or failed. Terminal.
    Dead,
}

/// One schedulable unit: program + args + suspended execution state.
#[derive(Debug)]
pub(crate) struct Tasklet {
    pub id: TaskletId,
    /// Program registry name, fixed at creation.
    pub program: Symbol,
    /// Creation arguments, immutable once the tasklet has started.
    pub args: Vec<Value>,
    pub state: TaskletState,
    /// Owned while suspended; taken by the scheduler's active slot while
    /// running. `None` before first activation and after death.
    pub context: Option<ExecutionContext>,
    /// Nested, not-yet-unwound dispatch frames attributable to this
    /// tasklet. 0 when unrun or fully unwound; 1 while suspended under a
    /// soft switch, 2 under a hard switch.
    pub recursion_depth: u32,
    /// Permits kill to unwind through nested dispatch frames.
    pub ignore_nesting: bool,
    /// Completion value, set exactly once on normal return.
    pub result: Option<Value>,
}

impl Tasklet {
    pub fn new(id: TaskletId, program: Symbol, args: Vec<Value>) -> Self {
        Tasklet {
            id,
            program,
            args,
            state: TaskletState::Unborn,
            context: None,
            recursion_depth: 0,
            ignore_nesting: false,
            result: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != TaskletState::Dead
    }

    pub fn is_scheduled(&self) -> bool {
        self.state == TaskletState::Scheduled
    }

    pub fn is_paused(&self) -> bool {
        self.state == TaskletState::Paused
    }

    /// Mark completed with a result, releasing the context and resetting
    /// the depth counter (the frame chain has fully unwound).
    pub fn complete(&mut self, result: Value) {
        self.result = Some(result);
        self.context = None;
        self.recursion_depth = 0;
        self.state = TaskletState::Dead;
    }

    /// Unconditional transition to `Dead`. The caller is responsible for
    /// the nesting guard and for releasing any arena segment first.
    pub fn mark_dead(&mut self) {
        self.context = None;
        self.recursion_depth = 0;
        self.state = TaskletState::Dead;
    }
}

/// Public snapshot of a tasklet's observable flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskletStatus {
    pub state: TaskletState,
    pub alive: bool,
    pub scheduled: bool,
    pub paused: bool,
    pub blocked: bool,
    pub recursion_depth: u32,
    /// Completion value, present only once the tasklet returned normally.
    pub result: Option<Value>,
}

impl TaskletStatus {
    pub(crate) fn of(t: &Tasklet) -> Self {
        TaskletStatus {
            state: t.state,
            alive: t.is_alive(),
            scheduled: t.is_scheduled(),
            paused: t.is_paused(),
            blocked: t.state == TaskletState::Blocked,
            recursion_depth: t.recursion_depth,
            result: t.result.clone(),
        }
    }
}
