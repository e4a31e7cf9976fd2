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

//! Serialization of suspended tasklets.
//!
//! A dump is a self-describing image: format version, program name, args,
//! and the frame chain (program name / resume pc / locals per frame). Only
//! `Paused` tasklets can be dumped -- a running tasklet's context is not
//! self-consistent mid-switch, and scheduled or dead tasklets have no
//! resumable context worth a snapshot. Hard contexts are read out of the
//! arena and written in the soft form, so the bytes never depend on which
//! strategy produced the pause.

use crate::error::SchedError;
use crate::program::{self, Frame};
use crate::scheduler::Scheduler;
use crate::symbol::Symbol;
use crate::tasklet::{TaskletId, TaskletState};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bumped whenever the image layout changes shape.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct FrameImage {
    program: String,
    pc: u32,
    locals: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskletImage {
    version: u32,
    program: String,
    args: Vec<Value>,
    frames: Vec<FrameImage>,
}

/// Encode a paused tasklet to portable bytes.
pub fn dump(sched: &Scheduler, id: TaskletId) -> Result<Vec<u8>, SchedError> {
    let t = sched
        .tasklets
        .get(&id)
        .ok_or(SchedError::UnknownTasklet(id))?;
    if t.state != TaskletState::Paused {
        return Err(SchedError::Serialization(format!(
            "tasklet {id} is {:?}, only paused tasklets can be dumped",
            t.state
        )));
    }

    let frames: Vec<FrameImage> = match &t.context {
        None => Vec::new(),
        Some(crate::context::ExecutionContext::Soft { frames }) => {
            frames.iter().map(frame_image).collect()
        }
        Some(crate::context::ExecutionContext::Hard { owner }) => sched
            .arena
            .peek(*owner)
            .ok_or_else(|| {
                SchedError::Serialization(format!("tasklet {id}: arena segment missing"))
            })?
            .iter()
            .map(frame_image)
            .collect(),
    };

    let image = TaskletImage {
        version: FORMAT_VERSION,
        program: t.program.as_string(),
        args: t.args.clone(),
        frames,
    };
    let bytes = serde_json::to_vec(&image)
        .map_err(|err| SchedError::Serialization(err.to_string()))?;
    debug!(tasklet = %id, bytes = bytes.len(), "dumped");
    Ok(bytes)
}

/// Decode an image back into a paused tasklet owned by `sched`.
///
/// Everything is validated before the scheduler is touched: a malformed
/// image, wrong format version, or unregistered program name leaves the
/// scheduler exactly as it was.
pub fn load(sched: &mut Scheduler, bytes: &[u8]) -> Result<TaskletId, SchedError> {
    let image: TaskletImage = serde_json::from_slice(bytes)
        .map_err(|err| SchedError::Serialization(format!("malformed image: {err}")))?;
    if image.version != FORMAT_VERSION {
        return Err(SchedError::Serialization(format!(
            "unsupported image version {} (expected {FORMAT_VERSION})",
            image.version
        )));
    }

    let prog = resolve_program(&image.program)?;
    let frames = image
        .frames
        .into_iter()
        .map(|f| {
            Ok(Frame {
                program: resolve_program(&f.program)?,
                pc: f.pc,
                locals: f.locals,
            })
        })
        .collect::<Result<Vec<Frame>, SchedError>>()?;

    Ok(sched.restore(prog, image.args, frames))
}

fn frame_image(frame: &Frame) -> FrameImage {
    FrameImage {
        program: frame.program.as_string(),
        pc: frame.pc,
        locals: frame.locals.clone(),
    }
}

fn resolve_program(name: &str) -> Result<Symbol, SchedError> {
    let sym = Symbol::mk(name);
    if !program::is_registered(sym) {
        return Err(SchedError::Serialization(format!(
            "image references unregistered program '{name}'"
        )));
    }
    Ok(sym)
}
