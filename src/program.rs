// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The callable model: programs as registered step functions.
//!
//! A program is a plain function dispatched once per scheduler transfer
//! against an explicit frame (resume point `pc` + `locals`). Because the
//! whole continuation is data -- a chain of frames -- it can be relocated by
//! the soft switch, parked in the hard-switch arena, or serialized, without
//! any live native stack to worry about.
//!
//! Programs are registered process-wide under an interned name, the same
//! registry idiom as the symbol interner. Serialized tasklets refer to
//! programs by that name.

use crate::channel::ChannelId;
use crate::error::SchedError;
use crate::foreign;
use crate::symbol::Symbol;
use crate::value::Value;
use ahash::AHasher;
use once_cell::sync::Lazy;
use papaya::HashMap;
use std::hash::BuildHasherDefault;

/// One logical call frame of a suspended or running program.
///
/// `pc` is the tagged resume point: "resume after call site `pc` with
/// locals `locals`". A callee's return value is appended to the caller's
/// `locals`, so locals double as the operand stack across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub program: Symbol,
    pub pc: u32,
    pub locals: Vec<Value>,
}

impl Frame {
    pub fn entry(program: Symbol, locals: Vec<Value>) -> Self {
        Frame {
            program,
            pc: 0,
            locals,
        }
    }
}

/// What a program did with its transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// One unit of work done; the frame was advanced in place.
    Continue,
    /// Push a callee frame; this frame resumes when the callee returns.
    Call { program: Symbol, locals: Vec<Value> },
    /// Pop this frame, appending the value to the caller's locals or, for
    /// the entry frame, completing the tasklet.
    Return(Value),
    /// Give up the rest of this activation; reschedule at the queue tail.
    Yield,
    /// Leave the run queue, staying alive for a later `insert`.
    Pause,
    /// Park on a channel until a value is delivered to it.
    Block(ChannelId),
}

/// A program step function. Invoked with the topmost frame of the running
/// tasklet; one invocation consumes one budget unit.
pub type ProgramFn = fn(&mut Frame, &mut Activation<'_>) -> Result<StepEvent, SchedError>;

static REGISTRY: Lazy<HashMap<Symbol, ProgramFn, BuildHasherDefault<AHasher>>> =
    Lazy::new(HashMap::default);

/// Register (or replace) a program under `name`.
pub fn register(name: Symbol, func: ProgramFn) {
    REGISTRY.pin().insert(name, func);
}

/// Look up a registered program.
pub fn lookup(name: Symbol) -> Option<ProgramFn> {
    REGISTRY.pin().get(&name).copied()
}

pub fn is_registered(name: Symbol) -> bool {
    REGISTRY.pin().contains_key(&name)
}

/// The scheduler facilities a program may touch during one step.
///
/// Globals are read and written directly; structural requests (spawning a
/// tasklet, sending on a channel) are collected and applied by the dispatch
/// loop after the step returns, so a step never re-enters the scheduler.
pub struct Activation<'a> {
    globals: &'a mut im::HashMap<Symbol, Value>,
    global_version: &'a mut u64,
    /// Tasklets to spawn once this step completes.
    pub(crate) spawned: Vec<(Symbol, Vec<Value>)>,
    /// Channel sends to deliver once this step completes.
    pub(crate) sends: Vec<(ChannelId, Value)>,
}

impl<'a> Activation<'a> {
    pub(crate) fn new(globals: &'a mut im::HashMap<Symbol, Value>, version: &'a mut u64) -> Self {
        Activation {
            globals,
            global_version: version,
            spawned: Vec::new(),
            sends: Vec::new(),
        }
    }

    pub fn get_global(&self, name: Symbol) -> Option<Value> {
        self.globals.get(&name).cloned()
    }

    pub fn set_global(&mut self, name: Symbol, value: Value) {
        *self.globals = self.globals.update(name, value);
        *self.global_version += 1;
    }

    /// Request a new tasklet running `program(args)`, appended to the run
    /// queue tail after this step.
    pub fn spawn(&mut self, program: Symbol, args: Vec<Value>) {
        self.spawned.push((program, args));
    }

    /// Send a value on a channel after this step, waking the first waiter.
    pub fn send(&mut self, channel: ChannelId, value: Value) {
        self.sends.push((channel, value));
    }

    /// One atomic foreign call. Never suspends the caller.
    pub fn call_foreign(&self, name: Symbol, args: &[Value]) -> Result<Value, SchedError> {
        foreign::call(name, args)
    }

    /// Hand the collected structural requests to the dispatch loop.
    pub(crate) fn into_requests(
        self,
    ) -> (Vec<(Symbol, Vec<Value>)>, Vec<(ChannelId, Value)>) {
        (self.spawned, self.sends)
    }
}
