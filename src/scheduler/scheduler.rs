//! The scheduler proper: a FIFO run queue of tasklets plus the stepping
//! loop that activates, runs, and re-queues them.
//!
//! Scheduling is cooperative and single-threaded: at most one tasklet
//! occupies the active slot at any instant, and control only changes hands
//! at a tasklet's own suspension points or when the watchdog budget runs
//! out. The budget counts scheduler-level transfers (program steps), not
//! wall-clock time, so runs are deterministic and reproducible.
//!
//! Each scheduler is an explicitly owned instance; tests can run several
//! side by side. Only the interner and the program/foreign registries are
//! process-wide.

use crate::channel::{ChannelId, ChannelTable};
use crate::context::{ExecutionContext, StackArena};
use crate::error::SchedError;
use crate::program::{self, Activation, Frame, StepEvent};
use crate::switch::{self, SwitchMode};
use crate::symbol::Symbol;
use crate::tasklet::{Tasklet, TaskletId, TaskletState, TaskletStatus};
use crate::value::Value;
use ahash::AHashMap;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// A process-wide style run loop, owned explicitly.
pub struct Scheduler {
    pub(crate) tasklets: AHashMap<TaskletId, Tasklet>,
    /// Scheduled tasklets in dispatch order. A tasklet id appears here iff
    /// its state is `Scheduled`.
    run_queue: VecDeque<TaskletId>,
    /// The active slot: at most one `Running` tasklet.
    current: Option<TaskletId>,
    /// Selects the switch strategy, read at the moment of each switch.
    softswitch_enabled: bool,
    pub(crate) arena: StackArena,
    channels: ChannelTable,
    /// Shared global namespace with copy-on-write semantics.
    globals: im::HashMap<Symbol, Value>,
    /// Bumped on every global change, for cheap snapshot comparison.
    global_version: u64,
    /// Append-only log of activations, in dispatch order.
    activations: boxcar::Vec<TaskletId>,
    next_id: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tasklets: AHashMap::new(),
            run_queue: VecDeque::new(),
            current: None,
            softswitch_enabled: true,
            arena: StackArena::default(),
            channels: ChannelTable::default(),
            globals: im::HashMap::new(),
            global_version: 0,
            activations: boxcar::Vec::new(),
            next_id: 1,
        }
    }

    // ------------------------------------------------------------------
    // Tasklet lifecycle
    // ------------------------------------------------------------------

    /// Create a tasklet running `program(args)`, scheduled at the queue
    /// tail. Does not begin execution.
    pub fn spawn(&mut self, prog: Symbol, args: Vec<Value>) -> Result<TaskletId, SchedError> {
        if !program::is_registered(prog) {
            return Err(SchedError::UnknownProgram(prog));
        }
        let id = TaskletId(self.next_id);
        self.next_id += 1;
        let mut tasklet = Tasklet::new(id, prog, args);
        tasklet.state = TaskletState::Scheduled;
        self.tasklets.insert(id, tasklet);
        self.run_queue.push_back(id);
        debug!(tasklet = %id, program = %prog, "spawned");
        Ok(id)
    }

    /// Move a paused (or unborn) tasklet to the queue tail.
    pub fn insert(&mut self, id: TaskletId) -> Result<(), SchedError> {
        let t = self.tasklet_mut(id)?;
        match t.state {
            TaskletState::Paused | TaskletState::Unborn => {
                t.state = TaskletState::Scheduled;
                self.run_queue.push_back(id);
                debug!(tasklet = %id, "inserted");
                Ok(())
            }
            state => Err(SchedError::InvalidState {
                op: "insert",
                id,
                state,
            }),
        }
    }

    /// Take a scheduled tasklet off the queue without touching its context.
    pub fn remove(&mut self, id: TaskletId) -> Result<(), SchedError> {
        let t = self.tasklet_mut(id)?;
        match t.state {
            TaskletState::Scheduled => {
                t.state = TaskletState::Paused;
                self.run_queue.retain(|&q| q != id);
                debug!(tasklet = %id, "removed");
                Ok(())
            }
            state => Err(SchedError::InvalidState {
                op: "remove",
                id,
                state,
            }),
        }
    }

    /// Forcibly terminate a tasklet. Refused while the tasklet holds
    /// not-yet-unwound dispatch frames, unless `ignore_nesting` is set;
    /// the frames pending in the context or arena are the unwind hazard.
    pub fn kill(&mut self, id: TaskletId) -> Result<(), SchedError> {
        let t = self.tasklet_mut(id)?;
        if t.state == TaskletState::Dead {
            return Ok(());
        }
        if t.recursion_depth > 0 && !t.ignore_nesting {
            return Err(SchedError::Nesting {
                id,
                depth: t.recursion_depth,
            });
        }
        t.mark_dead();
        self.run_queue.retain(|&q| q != id);
        self.arena.release(id);
        self.channels.forget(id);
        if self.current == Some(id) {
            self.current = None;
        }
        debug!(tasklet = %id, "killed");
        Ok(())
    }

    /// Permit `kill` to unwind through nested dispatch frames.
    pub fn set_ignore_nesting(&mut self, id: TaskletId, flag: bool) -> Result<(), SchedError> {
        self.tasklet_mut(id)?.ignore_nesting = flag;
        Ok(())
    }

    /// Observable flags for a tasklet.
    pub fn status(&self, id: TaskletId) -> Result<TaskletStatus, SchedError> {
        self.tasklets
            .get(&id)
            .map(TaskletStatus::of)
            .ok_or(SchedError::UnknownTasklet(id))
    }

    fn tasklet_mut(&mut self, id: TaskletId) -> Result<&mut Tasklet, SchedError> {
        self.tasklets
            .get_mut(&id)
            .ok_or(SchedError::UnknownTasklet(id))
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Toggle the switch strategy, returning the previous setting. Affects
    /// only switches performed after the change.
    pub fn enable_softswitch(&mut self, enabled: bool) -> bool {
        let previous = self.softswitch_enabled;
        self.softswitch_enabled = enabled;
        previous
    }

    pub fn softswitch_enabled(&self) -> bool {
        self.softswitch_enabled
    }

    fn switch_mode(&self) -> SwitchMode {
        if self.softswitch_enabled {
            SwitchMode::Soft
        } else {
            SwitchMode::Hard
        }
    }

    // ------------------------------------------------------------------
    // Globals (copy-on-write shared namespace)
    // ------------------------------------------------------------------

    pub fn set_global(&mut self, name: Symbol, value: Value) {
        self.globals = self.globals.update(name, value);
        self.global_version += 1;
    }

    pub fn get_global(&self, name: Symbol) -> Option<Value> {
        self.globals.get(&name).cloned()
    }

    pub fn global_version(&self) -> u64 {
        self.global_version
    }

    /// O(1) snapshot of the global namespace plus its version.
    pub fn global_snapshot(&self) -> (im::HashMap<Symbol, Value>, u64) {
        (self.globals.clone(), self.global_version)
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub fn create_channel(&mut self) -> ChannelId {
        self.channels.create()
    }

    /// Deliver a value on a channel: wakes the first waiter (scheduling it
    /// at the queue tail) or queues the value for the next receiver.
    pub fn send(&mut self, channel: ChannelId, value: Value) -> Result<(), SchedError> {
        if !self.channels.is_valid(channel) {
            return Err(SchedError::UnknownChannel(channel));
        }
        if let Some((waiter, value)) = self.channels.notify(channel, value) {
            self.unblock(waiter, value)?;
        }
        Ok(())
    }

    /// Wake a blocked tasklet: the delivered value lands in its top frame's
    /// locals and the tasklet rejoins the queue tail.
    fn unblock(&mut self, id: TaskletId, value: Value) -> Result<(), SchedError> {
        let parked = {
            let t = self.tasklet_mut(id)?;
            debug_assert_eq!(t.state, TaskletState::Blocked);
            match t.context.as_mut() {
                Some(ExecutionContext::Soft { frames }) => {
                    if let Some(top) = frames.last_mut() {
                        top.locals.push(value);
                    }
                    None
                }
                Some(ExecutionContext::Hard { owner }) => Some((*owner, value)),
                None => None,
            }
        };
        if let Some((owner, value)) = parked {
            // Hard contexts keep their frames in the arena; edit in place.
            if let Some(mut frames) = self.arena.take(owner) {
                if let Some(top) = frames.last_mut() {
                    top.locals.push(value);
                }
                self.arena
                    .store(owner, frames)
                    .map_err(|msg| SchedError::TaskletFailure { id, message: msg })?;
            }
        }
        let t = self.tasklet_mut(id)?;
        t.state = TaskletState::Scheduled;
        self.run_queue.push_back(id);
        trace!(tasklet = %id, "unblocked");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Activation order so far, one entry per switch into a tasklet.
    pub fn activation_trace(&self) -> Vec<TaskletId> {
        self.activations.iter().map(|(_, &id)| id).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.run_queue.len()
    }

    // ------------------------------------------------------------------
    // The watchdog dispatch loop
    // ------------------------------------------------------------------

    /// Dispatch tasklets from the run queue.
    ///
    /// With `budget` = Some(n), performs at most `n` transfers and then
    /// pauses whichever tasklet was active, returning it. With no budget,
    /// runs until the queue drains and returns `None`.
    ///
    /// An uncaught failure in a tasklet's program kills that tasklet and
    /// propagates out of this call; the rest of the queue is untouched and
    /// a later `run` picks up where this one stopped.
    pub fn run(&mut self, budget: Option<u64>) -> Result<Option<TaskletId>, SchedError> {
        let mut remaining = budget;
        loop {
            // Budget spent at a switch boundary: nobody is mid-run, so the
            // caller gets control back with the queue as it stands.
            if remaining == Some(0) {
                return Ok(None);
            }
            let Some(id) = self.run_queue.pop_front() else {
                return Ok(None);
            };
            let mut frames = self.activate(id)?;

            // Step the active tasklet until it suspends, completes, or the
            // watchdog budget runs out.
            loop {
                if remaining == Some(0) {
                    self.suspend_active(id, frames, TaskletState::Paused)?;
                    debug!(tasklet = %id, "watchdog interrupt");
                    return Ok(Some(id));
                }

                let top = frames.last_mut().expect("active tasklet has frames");
                let func = match program::lookup(top.program) {
                    Some(func) => func,
                    None => return Err(self.fail_active(id, "program vanished from registry")),
                };

                let mut act = Activation::new(&mut self.globals, &mut self.global_version);
                let outcome = func(top, &mut act);
                let (spawned, sends) = act.into_requests();
                if let Some(n) = remaining.as_mut() {
                    *n -= 1;
                }
                // A bad structural request (unknown program, invalid
                // channel) is the requesting tasklet's failure, not the
                // caller's: the tasklet dies, the queue survives.
                for (prog, args) in spawned {
                    if let Err(err) = self.spawn(prog, args) {
                        return Err(self.fail_active(id, &err.to_string()));
                    }
                }
                for (channel, value) in sends {
                    if let Err(err) = self.send(channel, value) {
                        return Err(self.fail_active(id, &err.to_string()));
                    }
                }

                let event = match outcome {
                    Ok(event) => event,
                    Err(err) => return Err(self.fail_active(id, &err.to_string())),
                };
                trace!(tasklet = %id, ?event, "step");

                match event {
                    StepEvent::Continue => {}
                    StepEvent::Call { program, locals } => {
                        if !program::is_registered(program) {
                            return Err(
                                self.fail_active(id, &format!("call to unknown program '{program}'"))
                            );
                        }
                        frames.push(Frame::entry(program, locals));
                    }
                    StepEvent::Return(value) => {
                        frames.pop();
                        match frames.last_mut() {
                            Some(caller) => caller.locals.push(value),
                            None => {
                                // Entry frame returned: fully unwound.
                                let t = self.tasklet_mut(id)?;
                                t.complete(value);
                                self.current = None;
                                debug!(tasklet = %id, "completed");
                                break;
                            }
                        }
                    }
                    StepEvent::Yield => {
                        self.suspend_active(id, frames, TaskletState::Scheduled)?;
                        break;
                    }
                    StepEvent::Pause => {
                        self.suspend_active(id, frames, TaskletState::Paused)?;
                        break;
                    }
                    StepEvent::Block(channel) => {
                        if !self.channels.is_valid(channel) {
                            return Err(
                                self.fail_active(id, &format!("block on unknown channel {channel:?}"))
                            );
                        }
                        if let Some(value) = self.channels.try_receive(channel) {
                            // A value was already pending: receive without
                            // suspending.
                            frames
                                .last_mut()
                                .expect("active tasklet has frames")
                                .locals
                                .push(value);
                        } else {
                            self.suspend_active(id, frames, TaskletState::Blocked)?;
                            self.channels.park(channel, id);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Move a queued tasklet into the active slot and rebuild its live
    /// frame chain.
    fn activate(&mut self, id: TaskletId) -> Result<Vec<Frame>, SchedError> {
        let (prog, args, context) = {
            let t = self.tasklet_mut(id)?;
            t.state = TaskletState::Running;
            (t.program, t.args.clone(), t.context.take())
        };
        self.current = Some(id);
        self.activations.push(id);
        trace!(tasklet = %id, program = %prog, "activated");
        match context {
            None => Ok(vec![Frame::entry(prog, args)]),
            Some(ctx) => switch::resume(ctx, &mut self.arena)
                .ok_or_else(|| self.fail_active(id, "context missing its arena segment")),
        }
    }

    /// Capture the active tasklet's frames through the current switch
    /// strategy and leave it in `target` state.
    fn suspend_active(
        &mut self,
        id: TaskletId,
        frames: Vec<Frame>,
        target: TaskletState,
    ) -> Result<(), SchedError> {
        let mode = self.switch_mode();
        let (context, depth) = switch::suspend(mode, id, frames, &mut self.arena)
            .map_err(|msg| self.fail_active(id, &msg))?;
        let t = self.tasklet_mut(id)?;
        t.context = Some(context);
        t.recursion_depth = depth;
        t.state = target;
        self.current = None;
        if target == TaskletState::Scheduled {
            self.run_queue.push_back(id);
        }
        trace!(tasklet = %id, ?mode, ?target, depth, "suspended");
        Ok(())
    }

    /// Rebuild a tasklet from deserialized parts, in `Paused` state with a
    /// fresh identity. Mid-run dumps come back in the soft representation
    /// (there is no live native stack to restore into), so the depth is 1;
    /// a never-activated dump carries no frames and stays at depth 0.
    pub(crate) fn restore(
        &mut self,
        prog: Symbol,
        args: Vec<Value>,
        frames: Vec<Frame>,
    ) -> TaskletId {
        let id = TaskletId(self.next_id);
        self.next_id += 1;
        let mut t = Tasklet::new(id, prog, args);
        t.state = TaskletState::Paused;
        if !frames.is_empty() {
            t.context = Some(ExecutionContext::Soft { frames });
            t.recursion_depth = 1;
        }
        self.tasklets.insert(id, t);
        debug!(tasklet = %id, program = %prog, "restored from image");
        id
    }

    /// Kill the active tasklet after an uncaught failure, leaving the rest
    /// of the queue intact, and build the error to propagate.
    fn fail_active(&mut self, id: TaskletId, message: &str) -> SchedError {
        if let Some(t) = self.tasklets.get_mut(&id) {
            t.mark_dead();
        }
        self.arena.release(id);
        self.channels.forget(id);
        self.current = None;
        debug!(tasklet = %id, message, "tasklet failed");
        SchedError::TaskletFailure {
            id,
            message: message.to_string(),
        }
    }
}
