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

//! Saved execution state of a suspended tasklet.
//!
//! A context is an owned, movable snapshot: the frame chain between the
//! tasklet's entry point and its suspension point, tagged with the switch
//! strategy that produced it. Soft contexts carry the chain inline (the
//! relocatable buffer); hard contexts leave the chain "in place" in a
//! bounded arena segment keyed by tasklet handle and carry only the key.
//! Exactly one owner exists at any time: the suspended tasklet, or the
//! scheduler's active slot while running.

use crate::program::Frame;
use crate::tasklet::TaskletId;
use ahash::AHashMap;

/// Maximum frame-chain depth a hard-switch segment will hold.
pub const SEGMENT_CAPACITY: usize = 64;

/// The continuation of one suspended tasklet.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionContext {
    /// Frame chain relocated into the context itself (soft switch).
    Soft { frames: Vec<Frame> },
    /// Frame chain parked in the scheduler's arena under the owning
    /// tasklet's handle (hard switch).
    Hard { owner: TaskletId },
}

impl ExecutionContext {
    /// Whether this context was produced by the hard switch and therefore
    /// still pins a live dispatch frame.
    pub fn is_hard(&self) -> bool {
        matches!(self, ExecutionContext::Hard { .. })
    }
}

/// Arena of bounded frame segments for hard-switched tasklets.
///
/// The safe stand-in for raw stack-pointer swapping: a hard suspend leaves
/// the tasklet's frames here untouched, and resume takes them back out.
/// Segments are created and released only during a switch or a kill, so no
/// locking is involved.
#[derive(Debug, Default)]
pub(crate) struct StackArena {
    segments: AHashMap<TaskletId, Vec<Frame>>,
}

impl StackArena {
    /// Park `frames` for `owner`. Fails when the chain exceeds the segment
    /// capacity; the caller surfaces that as a tasklet failure.
    pub fn store(&mut self, owner: TaskletId, frames: Vec<Frame>) -> Result<(), String> {
        if frames.len() > SEGMENT_CAPACITY {
            return Err(format!(
                "frame chain depth {} exceeds segment capacity {SEGMENT_CAPACITY}",
                frames.len()
            ));
        }
        self.segments.insert(owner, frames);
        Ok(())
    }

    /// Take the parked chain back for resumption.
    pub fn take(&mut self, owner: TaskletId) -> Option<Vec<Frame>> {
        self.segments.remove(&owner)
    }

    /// Read the parked chain without disturbing it (dump path).
    pub fn peek(&self, owner: TaskletId) -> Option<&[Frame]> {
        self.segments.get(&owner).map(Vec::as_slice)
    }

    /// Discard a dead tasklet's segment, if any.
    pub fn release(&mut self, owner: TaskletId) {
        self.segments.remove(&owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use crate::value::Value;

    fn chain(depth: usize) -> Vec<Frame> {
        (0..depth)
            .map(|i| Frame {
                program: Symbol::mk("arena_prog"),
                pc: i as u32,
                locals: vec![Value::Int(i as i64)],
            })
            .collect()
    }

    #[test]
    fn test_store_take_round_trip() {
        let mut arena = StackArena::default();
        let owner = TaskletId(3);
        let frames = chain(2);
        arena.store(owner, frames.clone()).unwrap();

        assert_eq!(arena.peek(owner), Some(frames.as_slice()));
        assert_eq!(arena.take(owner), Some(frames));
        assert_eq!(arena.take(owner), None);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut arena = StackArena::default();
        let err = arena.store(TaskletId(1), chain(SEGMENT_CAPACITY + 1));
        assert!(err.is_err());
        assert!(arena.peek(TaskletId(1)).is_none());
    }

    #[test]
    fn test_release_discards_segment() {
        let mut arena = StackArena::default();
        arena.store(TaskletId(9), chain(1)).unwrap();
        arena.release(TaskletId(9));
        assert!(arena.peek(TaskletId(9)).is_none());
    }

    #[test]
    fn test_context_strategy_tag() {
        let soft = ExecutionContext::Soft { frames: chain(1) };
        let hard = ExecutionContext::Hard {
            owner: TaskletId(1),
        };
        assert!(!soft.is_hard());
        assert!(hard.is_hard());
    }
}
