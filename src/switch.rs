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

//! Switch strategies: how a tasklet's frame chain crosses a suspension.
//!
//! Soft switch relocates the chain into the tasklet's own context and
//! restores it directly on resume; nothing stays behind, so a suspended
//! tasklet accounts for a single dispatch frame. Hard switch instead leaves
//! the chain in place in the arena and keeps the dispatch call pinned until
//! resumption, which costs one extra level of nesting. Both produce
//! identical observable tasklet semantics; the depth delta and the storage
//! location are the only differences, and dumps normalize them away.

use crate::context::{ExecutionContext, StackArena};
use crate::program::Frame;
use crate::tasklet::TaskletId;

/// Dispatch frames a suspended-mid-run tasklet accounts for under each
/// strategy.
pub const SOFT_SUSPEND_DEPTH: u32 = 1;
pub const HARD_SUSPEND_DEPTH: u32 = 2;

/// Which mechanism to use for the next switch. Read from the scheduler's
/// `softswitch_enabled` toggle at the moment of each switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchMode {
    Soft,
    Hard,
}

/// Capture `frames` into a context for a tasklet leaving the active slot.
/// Returns the context and the recursion depth the suspended tasklet now
/// accounts for.
pub(crate) fn suspend(
    mode: SwitchMode,
    owner: TaskletId,
    frames: Vec<Frame>,
    arena: &mut StackArena,
) -> Result<(ExecutionContext, u32), String> {
    match mode {
        SwitchMode::Soft => Ok((ExecutionContext::Soft { frames }, SOFT_SUSPEND_DEPTH)),
        SwitchMode::Hard => {
            arena.store(owner, frames)?;
            Ok((ExecutionContext::Hard { owner }, HARD_SUSPEND_DEPTH))
        }
    }
}

/// Restore a context into a live frame chain for the active slot. A hard
/// context takes its chain back out of the arena; `None` means the segment
/// is gone, which indicates the context was not self-consistent.
pub(crate) fn resume(context: ExecutionContext, arena: &mut StackArena) -> Option<Vec<Frame>> {
    match context {
        ExecutionContext::Soft { frames } => Some(frames),
        ExecutionContext::Hard { owner } => arena.take(owner),
    }
}
