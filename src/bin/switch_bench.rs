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

//! Standalone switch-throughput benchmark.
//! Measures scheduler transfers per second under the soft and hard switch
//! strategies, including a dump/load cycle for the serializer path.

use std::time::Instant;
use tracing_subscriber::EnvFilter;
use weft::program::{self, Activation, Frame, StepEvent};
use weft::serialize;
use weft::{SchedError, Scheduler, Symbol, Value};

/// locals: [limit, count]. One increment per transfer.
fn spin(frame: &mut Frame, _act: &mut Activation<'_>) -> Result<StepEvent, SchedError> {
    let limit = frame.locals[0].as_int().unwrap_or(0);
    let count = frame.locals[1].as_int().unwrap_or(0);
    if count < limit {
        frame.locals[1] = Value::Int(count + 1);
        Ok(StepEvent::Continue)
    } else {
        Ok(StepEvent::Return(Value::Int(count)))
    }
}

fn bench_mode(soft: bool, transfers: u64) -> Result<(), Box<dyn std::error::Error>> {
    let label = if soft { "soft" } else { "hard" };
    let mut sched = Scheduler::new();
    sched.enable_softswitch(soft);

    let t = sched.spawn(
        Symbol::mk("bench_spin"),
        vec![Value::Int(transfers as i64 * 2), Value::Int(0)],
    )?;

    // Interrupt every 64 transfers to exercise the switch machinery, not
    // just the step loop.
    let start = Instant::now();
    let mut spent = 0u64;
    while spent < transfers {
        let res = sched.run(Some(64))?;
        spent += 64;
        if res.is_none() {
            break;
        }
        sched.insert(t)?;
    }
    let elapsed = start.elapsed();

    let per_sec = spent as f64 / elapsed.as_secs_f64();
    println!("{label}: {spent} transfers in {elapsed:?} ({per_sec:.0}/s)");

    // One serializer round trip at the interrupted point, for comparison.
    sched.remove(t).ok();
    let dump_start = Instant::now();
    let bytes = serialize::dump(&sched, t)?;
    let reloaded = serialize::load(&mut sched, &bytes)?;
    println!(
        "{label}: dump+load of {} byte image in {:?}",
        bytes.len(),
        dump_start.elapsed()
    );
    sched.set_ignore_nesting(t, true)?;
    sched.kill(t)?;
    sched.kill(reloaded).ok();

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("weft switch benchmark");
    println!("=====================");

    program::register(Symbol::mk("bench_spin"), spin);

    let transfers = 1_000_000;
    bench_mode(true, transfers)?;
    bench_mode(false, transfers)?;

    Ok(())
}
