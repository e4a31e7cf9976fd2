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

//! Minimal synchronization channel.
//!
//! The one primitive that moves tasklets between `Scheduled` and `Blocked`:
//! a tasklet that steps `Block(channel)` either receives an already-pending
//! value immediately or parks as a waiter; `notify` hands a value to the
//! first waiter in arrival order. Everything richer (select, timeouts,
//! bounded send) is out of scope.

use crate::tasklet::TaskletId;
use crate::value::Value;
use std::collections::VecDeque;

/// Handle to a channel owned by one scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

#[derive(Debug, Default)]
struct Channel {
    /// Tasklets parked on a receive, FIFO.
    waiters: VecDeque<TaskletId>,
    /// Values sent with no waiter present, FIFO.
    pending: VecDeque<Value>,
}

/// All channels belonging to one scheduler.
#[derive(Debug, Default)]
pub(crate) struct ChannelTable {
    channels: Vec<Channel>,
}

impl ChannelTable {
    pub fn create(&mut self) -> ChannelId {
        self.channels.push(Channel::default());
        ChannelId((self.channels.len() - 1) as u32)
    }

    pub fn is_valid(&self, id: ChannelId) -> bool {
        (id.0 as usize) < self.channels.len()
    }

    /// Try to satisfy a receive without blocking. Returns the pending value
    /// if one was queued.
    pub fn try_receive(&mut self, id: ChannelId) -> Option<Value> {
        self.channels[id.0 as usize].pending.pop_front()
    }

    /// Park a tasklet as a waiter on `id`.
    pub fn park(&mut self, id: ChannelId, tasklet: TaskletId) {
        self.channels[id.0 as usize].waiters.push_back(tasklet);
    }

    /// Hand `value` to the first waiter, if any. Returns the waiter that
    /// should be rescheduled; with no waiter the value is queued for the
    /// next receive.
    pub fn notify(&mut self, id: ChannelId, value: Value) -> Option<(TaskletId, Value)> {
        let chan = &mut self.channels[id.0 as usize];
        match chan.waiters.pop_front() {
            Some(waiter) => Some((waiter, value)),
            None => {
                chan.pending.push_back(value);
                None
            }
        }
    }

    /// Drop a dead tasklet from every waiter list.
    pub fn forget(&mut self, tasklet: TaskletId) {
        for chan in &mut self.channels {
            chan.waiters.retain(|&id| id != tasklet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_with_waiter_hands_off_in_fifo_order() {
        let mut table = ChannelTable::default();
        let chan = table.create();
        table.park(chan, TaskletId(1));
        table.park(chan, TaskletId(2));

        assert_eq!(
            table.notify(chan, Value::Int(10)),
            Some((TaskletId(1), Value::Int(10)))
        );
        assert_eq!(
            table.notify(chan, Value::Int(20)),
            Some((TaskletId(2), Value::Int(20)))
        );
        assert_eq!(table.notify(chan, Value::Int(30)), None);
    }

    #[test]
    fn test_value_queued_when_no_waiter() {
        let mut table = ChannelTable::default();
        let chan = table.create();

        assert_eq!(table.notify(chan, Value::Int(1)), None);
        assert_eq!(table.try_receive(chan), Some(Value::Int(1)));
        assert_eq!(table.try_receive(chan), None);
    }

    #[test]
    fn test_forget_removes_dead_waiters() {
        let mut table = ChannelTable::default();
        let chan = table.create();
        table.park(chan, TaskletId(1));
        table.park(chan, TaskletId(2));
        table.forget(TaskletId(1));

        assert_eq!(
            table.notify(chan, Value::None),
            Some((TaskletId(2), Value::None))
        );
    }

    #[test]
    fn test_channel_ids_are_distinct() {
        let mut table = ChannelTable::default();
        let a = table.create();
        let b = table.create();
        assert_ne!(a, b);
        assert!(table.is_valid(a));
        assert!(table.is_valid(b));
        assert!(!table.is_valid(ChannelId(99)));
    }
}
