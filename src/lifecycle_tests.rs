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

//! Whole-crate lifecycle tests: watchdog runs, both switch strategies,
//! dump/load round trips, channels, and scheduling order.

#[cfg(test)]
mod tests {
    use crate::channel::ChannelId;
    use crate::error::SchedError;
    use crate::program::{self, Activation, Frame, StepEvent};
    use crate::scheduler::Scheduler;
    use crate::serialize::{dump, load};
    use crate::switch::{HARD_SUSPEND_DEPTH, SOFT_SUSPEND_DEPTH};
    use crate::symbol::Symbol;
    use crate::tasklet::TaskletId;
    use crate::value::Value;
    use once_cell::sync::Lazy;

    /// locals: [limit, count]. One increment per transfer; publishes the
    /// final count to the `counter_out` global.
    fn run_task(frame: &mut Frame, act: &mut Activation<'_>) -> Result<StepEvent, SchedError> {
        let limit = frame.locals[0].as_int().unwrap();
        let count = frame.locals[1].as_int().unwrap();
        if count < limit {
            frame.locals[1] = Value::Int(count + 1);
            Ok(StepEvent::Continue)
        } else {
            act.set_global(Symbol::mk("counter_out"), Value::Int(count));
            Ok(StepEvent::Return(Value::Int(count)))
        }
    }

    /// pc 0: yield once. pc 1: return.
    fn yield_then_done(
        frame: &mut Frame,
        _act: &mut Activation<'_>,
    ) -> Result<StepEvent, SchedError> {
        match frame.pc {
            0 => {
                frame.pc = 1;
                Ok(StepEvent::Yield)
            }
            _ => Ok(StepEvent::Return(Value::None)),
        }
    }

    /// pc 0: call `double_slowly(n)`. pc 1: return the callee's result + 1.
    fn outer(frame: &mut Frame, _act: &mut Activation<'_>) -> Result<StepEvent, SchedError> {
        match frame.pc {
            0 => {
                frame.pc = 1;
                let n = frame.locals[0].clone();
                Ok(StepEvent::Call {
                    program: Symbol::mk("double_slowly"),
                    locals: vec![n],
                })
            }
            _ => {
                let returned = frame.locals.last().unwrap().as_int().unwrap();
                Ok(StepEvent::Return(Value::Int(returned + 1)))
            }
        }
    }

    /// pc 0: burn a step. pc 1: return n * 2.
    fn double_slowly(
        frame: &mut Frame,
        _act: &mut Activation<'_>,
    ) -> Result<StepEvent, SchedError> {
        match frame.pc {
            0 => {
                frame.pc = 1;
                Ok(StepEvent::Continue)
            }
            _ => {
                let n = frame.locals[0].as_int().unwrap();
                Ok(StepEvent::Return(Value::Int(n * 2)))
            }
        }
    }

    /// locals: [channel id]. pc 0: block. pc 1: publish the received value.
    fn consumer(frame: &mut Frame, act: &mut Activation<'_>) -> Result<StepEvent, SchedError> {
        match frame.pc {
            0 => {
                frame.pc = 1;
                let chan = ChannelId(frame.locals[0].as_int().unwrap() as u32);
                Ok(StepEvent::Block(chan))
            }
            _ => {
                let received = frame.locals.last().unwrap().clone();
                act.set_global(Symbol::mk("received"), received.clone());
                Ok(StepEvent::Return(received))
            }
        }
    }

    /// locals: [channel id, value]. Sends and returns.
    fn producer(frame: &mut Frame, act: &mut Activation<'_>) -> Result<StepEvent, SchedError> {
        let chan = ChannelId(frame.locals[0].as_int().unwrap() as u32);
        act.send(chan, frame.locals[1].clone());
        Ok(StepEvent::Return(Value::None))
    }

    /// pc 0: spawn a new `run_task(3)` tasklet, then finish.
    fn spawner(_frame: &mut Frame, act: &mut Activation<'_>) -> Result<StepEvent, SchedError> {
        act.spawn(
            Symbol::mk("lc_run_task"),
            vec![Value::Int(3), Value::Int(0)],
        );
        Ok(StepEvent::Return(Value::None))
    }

    static REGISTER: Lazy<()> = Lazy::new(|| {
        program::register(Symbol::mk("lc_run_task"), run_task);
        program::register(Symbol::mk("lc_yield_then_done"), yield_then_done);
        program::register(Symbol::mk("lc_outer"), outer);
        program::register(Symbol::mk("double_slowly"), double_slowly);
        program::register(Symbol::mk("lc_consumer"), consumer);
        program::register(Symbol::mk("lc_producer"), producer);
        program::register(Symbol::mk("lc_spawner"), spawner);
    });

    fn scheduler(soft: bool) -> Scheduler {
        Lazy::force(&REGISTER);
        let mut sched = Scheduler::new();
        sched.enable_softswitch(soft);
        sched
    }

    fn spawn_run_task(sched: &mut Scheduler, limit: i64) -> TaskletId {
        sched
            .spawn(
                Symbol::mk("lc_run_task"),
                vec![Value::Int(limit), Value::Int(0)],
            )
            .unwrap()
    }

    /// The lifecycle walk from the original watchdog suite: unrun flags,
    /// partial run under budget, reinsert, run to completion.
    fn lifecycle(sched: &mut Scheduler, t: TaskletId) {
        let soft = sched.softswitch_enabled();

        // Initial state - unrun
        let status = sched.status(t).unwrap();
        assert!(status.alive);
        assert!(status.scheduled);
        assert_eq!(status.recursion_depth, 0);

        sched.set_ignore_nesting(t, true).unwrap();

        // Run a little
        let res = sched.run(Some(10)).unwrap();
        assert_eq!(res, Some(t));
        let status = sched.status(t).unwrap();
        assert!(status.alive);
        assert!(status.paused);
        assert!(!status.scheduled);
        let expected = if soft {
            SOFT_SUSPEND_DEPTH
        } else {
            HARD_SUSPEND_DEPTH
        };
        assert_eq!(status.recursion_depth, expected);

        // Push back onto the queue
        sched.insert(t).unwrap();
        let status = sched.status(t).unwrap();
        assert!(!status.paused);
        assert!(status.scheduled);

        // Run to completion
        sched.run(None).unwrap();
        let status = sched.status(t).unwrap();
        assert!(!status.alive);
        assert!(!status.scheduled);
        assert_eq!(status.recursion_depth, 0);
    }

    #[test]
    fn test_lifecycle_soft() {
        let mut sched = scheduler(true);
        let t = spawn_run_task(&mut sched, 1000);
        lifecycle(&mut sched, t);
    }

    #[test]
    fn test_lifecycle_hard() {
        let mut sched = scheduler(false);
        let t = spawn_run_task(&mut sched, 1000);
        lifecycle(&mut sched, t);
    }

    #[test]
    fn test_lifecycle_of_reloaded_unrun_tasklet() {
        for soft in [true, false] {
            let mut sched = scheduler(soft);
            let t = spawn_run_task(&mut sched, 1000);

            // Park it so it can be dumped, round-trip it, discard the
            // original, and walk the fresh copy through the lifecycle.
            sched.remove(t).unwrap();
            let bytes = dump(&sched, t).unwrap();
            let t_new = load(&mut sched, &bytes).unwrap();
            sched.kill(t).unwrap();

            sched.insert(t_new).unwrap();
            lifecycle(&mut sched, t_new);
        }
    }

    #[test]
    fn test_lifecycle_of_reloaded_midrun_tasklet() {
        for soft in [true, false] {
            let mut sched = scheduler(soft);
            let t = spawn_run_task(&mut sched, 1000);
            sched.set_ignore_nesting(t, true).unwrap();

            // Run a little
            let res = sched.run(Some(100)).unwrap();
            assert_eq!(res, Some(t));
            let expected = if soft {
                SOFT_SUSPEND_DEPTH
            } else {
                HARD_SUSPEND_DEPTH
            };
            assert_eq!(sched.status(t).unwrap().recursion_depth, expected);

            // Save, load, swap the copies around
            let bytes = dump(&sched, t).unwrap();
            let t_new = load(&mut sched, &bytes).unwrap();
            sched.kill(t).unwrap();
            sched.insert(t_new).unwrap();

            // Reloaded mid-run tasklets always come back soft-switchable
            let status = sched.status(t_new).unwrap();
            assert!(status.alive);
            assert!(status.scheduled);
            assert_eq!(status.recursion_depth, 1);

            // Run to completion
            sched.run(None).unwrap();
            let status = sched.status(t_new).unwrap();
            assert!(!status.alive);
            assert!(!status.scheduled);
            assert_eq!(status.recursion_depth, 0);
            assert_eq!(
                sched.get_global(Symbol::mk("counter_out")),
                Some(Value::Int(1000))
            );
        }
    }

    #[test]
    fn test_watchdog_scenario_counter_reaches_exactly_1000() {
        let mut sched = scheduler(true);
        let t = spawn_run_task(&mut sched, 1000);

        assert_eq!(sched.run(Some(10)).unwrap(), Some(t));
        assert!(sched.status(t).unwrap().paused);

        sched.insert(t).unwrap();
        assert_eq!(sched.run(None).unwrap(), None);
        assert_eq!(
            sched.get_global(Symbol::mk("counter_out")),
            Some(Value::Int(1000))
        );
    }

    #[test]
    fn test_fifo_fairness_is_round_robin() {
        let mut sched = scheduler(true);
        let a = sched.spawn(Symbol::mk("lc_yield_then_done"), vec![]).unwrap();
        let b = sched.spawn(Symbol::mk("lc_yield_then_done"), vec![]).unwrap();

        sched.run(None).unwrap();
        assert_eq!(sched.activation_trace(), vec![a, b, a, b]);
    }

    #[test]
    fn test_tasklet_spawned_midrun_goes_to_the_tail() {
        let mut sched = scheduler(true);
        let spawner = sched.spawn(Symbol::mk("lc_spawner"), vec![]).unwrap();
        let other = sched.spawn(Symbol::mk("lc_yield_then_done"), vec![]).unwrap();

        sched.run(None).unwrap();
        // The tasklet spawned during `spawner`'s activation lands behind
        // the already-queued `other`.
        let spawned = TaskletId(other.0 + 1);
        assert_eq!(
            sched.activation_trace(),
            vec![spawner, other, spawned, other]
        );
    }

    #[test]
    fn test_dump_midcallstack_and_resume() {
        for soft in [true, false] {
            let mut sched = scheduler(soft);
            let t = sched
                .spawn(Symbol::mk("lc_outer"), vec![Value::Int(21)])
                .unwrap();

            // Step 1 pushes the callee frame, step 2 is the callee's first
            // step; the watchdog fires with two live frames.
            assert_eq!(sched.run(Some(2)).unwrap(), Some(t));

            let bytes = dump(&sched, t).unwrap();
            let t_new = load(&mut sched, &bytes).unwrap();
            sched.set_ignore_nesting(t, true).unwrap();
            sched.kill(t).unwrap();

            sched.insert(t_new).unwrap();
            sched.run(None).unwrap();
            // double_slowly(21) + 1
            assert_eq!(sched.status(t_new).unwrap().result, Some(Value::Int(43)));
        }
    }

    #[test]
    fn test_round_trip_matches_uninterrupted_execution() {
        // Reference: run to completion without serialization.
        let mut reference = scheduler(true);
        let r = spawn_run_task(&mut reference, 250);
        reference.run(None).unwrap();
        let expected = reference.status(r).unwrap().result;

        // Same program interrupted, dumped, reloaded, resumed.
        let mut sched = scheduler(true);
        let t = spawn_run_task(&mut sched, 250);
        assert_eq!(sched.run(Some(40)).unwrap(), Some(t));
        let bytes = dump(&sched, t).unwrap();
        let t_new = load(&mut sched, &bytes).unwrap();
        sched.set_ignore_nesting(t, true).unwrap();
        sched.kill(t).unwrap();
        sched.insert(t_new).unwrap();
        sched.run(None).unwrap();

        assert_eq!(sched.status(t_new).unwrap().result, expected);
    }

    #[test]
    fn test_channel_blocks_then_receives() {
        let mut sched = scheduler(true);
        let chan = sched.create_channel();
        let chan_arg = Value::Int(chan.0 as i64);

        let consumer = sched
            .spawn(Symbol::mk("lc_consumer"), vec![chan_arg.clone()])
            .unwrap();
        let producer = sched
            .spawn(
                Symbol::mk("lc_producer"),
                vec![chan_arg, Value::Int(42)],
            )
            .unwrap();

        sched.run(None).unwrap();
        assert_eq!(sched.get_global(Symbol::mk("received")), Some(Value::Int(42)));
        assert!(!sched.status(consumer).unwrap().alive);
        assert!(!sched.status(producer).unwrap().alive);
    }

    #[test]
    fn test_channel_receive_of_pending_value_does_not_block() {
        let mut sched = scheduler(true);
        let chan = sched.create_channel();
        sched.send(chan, Value::Int(7)).unwrap();

        let consumer = sched
            .spawn(
                Symbol::mk("lc_consumer"),
                vec![Value::Int(chan.0 as i64)],
            )
            .unwrap();
        sched.run(None).unwrap();
        assert_eq!(sched.status(consumer).unwrap().result, Some(Value::Int(7)));
    }

    #[test]
    fn test_external_send_unblocks_a_parked_consumer() {
        let mut sched = scheduler(true);
        let chan = sched.create_channel();
        let consumer = sched
            .spawn(
                Symbol::mk("lc_consumer"),
                vec![Value::Int(chan.0 as i64)],
            )
            .unwrap();

        // Drain: the consumer parks on the channel.
        sched.run(None).unwrap();
        let status = sched.status(consumer).unwrap();
        assert!(status.alive);
        assert!(status.blocked);
        assert!(!status.scheduled);

        // An outside send reschedules it at the tail.
        sched.send(chan, Value::Str("ping".into())).unwrap();
        assert!(sched.status(consumer).unwrap().scheduled);
        sched.run(None).unwrap();
        assert_eq!(
            sched.status(consumer).unwrap().result,
            Some(Value::Str("ping".into()))
        );
    }
}
