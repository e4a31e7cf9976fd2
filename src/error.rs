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

//! Error taxonomy for the tasklet runtime.
//! Every rejected operation surfaces as a distinguishable variant; a failed
//! operation never leaves scheduler state partially mutated.

use crate::channel::ChannelId;
use crate::symbol::Symbol;
use crate::tasklet::{TaskletId, TaskletState};

/// Runtime error raised by scheduler, tasklet, serializer and collaborator
/// operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedError {
    /// Operation requested on a tasklet whose state forbids it. The
    /// tasklet's state is unchanged.
    InvalidState {
        op: &'static str,
        id: TaskletId,
        state: TaskletState,
    },
    /// A kill/forced removal would violate unwind order: the tasklet still
    /// holds not-yet-unwound dispatch frames and `ignore_nesting` is unset.
    Nesting { id: TaskletId, depth: u32 },
    /// Dump requested on a non-paused tasklet, or load given bytes that
    /// cannot be reconstructed.
    Serialization(String),
    /// An uncaught failure escaped a running tasklet's program. The tasklet
    /// is dead; the rest of the run queue is untouched.
    TaskletFailure { id: TaskletId, message: String },
    /// No tasklet with this id is known to the scheduler.
    UnknownTasklet(TaskletId),
    /// Program name not present in the program registry.
    UnknownProgram(Symbol),
    /// Foreign call invoked with the wrong number of arguments.
    Arity {
        name: Symbol,
        expected: usize,
        got: usize,
    },
    /// Foreign call argument or result could not be converted.
    TypeConversion { name: Symbol, detail: String },
    /// Code unit name not present in the loader registry.
    UnknownUnit(Symbol),
    /// Reload requested for a unit that was never loaded.
    UnitNotLoaded(Symbol),
    /// A code unit failed partway through (re)load. Names bound before the
    /// failure stay bound and the namespace stays reachable.
    LoadFailure { name: Symbol, message: String },
    /// Channel id not created by this scheduler.
    UnknownChannel(ChannelId),
}

impl std::fmt::Display for SchedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedError::InvalidState { op, id, state } => {
                write!(f, "{op}: tasklet {id} is {state:?}")
            }
            SchedError::Nesting { id, depth } => {
                write!(
                    f,
                    "tasklet {id} holds {depth} nested dispatch frame(s); \
                     set ignore_nesting to override"
                )
            }
            SchedError::Serialization(msg) => write!(f, "serialization: {msg}"),
            SchedError::TaskletFailure { id, message } => {
                write!(f, "tasklet {id} failed: {message}")
            }
            SchedError::UnknownTasklet(id) => write!(f, "unknown tasklet {id}"),
            SchedError::UnknownProgram(name) => write!(f, "unknown program '{name}'"),
            SchedError::Arity {
                name,
                expected,
                got,
            } => {
                write!(
                    f,
                    "foreign call '{name}' expects {expected} argument(s), got {got}"
                )
            }
            SchedError::TypeConversion { name, detail } => {
                write!(f, "foreign call '{name}': {detail}")
            }
            SchedError::UnknownUnit(name) => write!(f, "unknown code unit '{name}'"),
            SchedError::UnitNotLoaded(name) => {
                write!(f, "code unit '{name}' has not been loaded")
            }
            SchedError::LoadFailure { name, message } => {
                write!(f, "code unit '{name}' failed to load: {message}")
            }
            SchedError::UnknownChannel(id) => write!(f, "unknown channel {}", id.0),
        }
    }
}

impl std::error::Error for SchedError {}
