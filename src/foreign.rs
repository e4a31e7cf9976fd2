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

//! Foreign-call primitive.
//!
//! Host functions are registered process-wide under an interned name with a
//! fixed arity. A call is one atomic, non-suspending operation: it checks
//! arity, runs the function, and converts the result or raises a
//! distinguishable conversion error. The scheduler never switches inside a
//! foreign call.

use crate::error::SchedError;
use crate::symbol::Symbol;
use crate::value::Value;
use ahash::AHasher;
use once_cell::sync::Lazy;
use papaya::HashMap;
use std::hash::BuildHasherDefault;

/// A host function: receives already-arity-checked arguments, returns a
/// value or a conversion failure description.
pub type ForeignFn = fn(&[Value]) -> Result<Value, String>;

#[derive(Clone, Copy)]
struct ForeignDef {
    arity: usize,
    func: ForeignFn,
}

static REGISTRY: Lazy<HashMap<Symbol, ForeignDef, BuildHasherDefault<AHasher>>> =
    Lazy::new(HashMap::default);

/// Register (or replace) a host function under `name` with a fixed arity.
pub fn register(name: Symbol, arity: usize, func: ForeignFn) {
    REGISTRY.pin().insert(name, ForeignDef { arity, func });
}

/// Perform one foreign call. Atomic: either a converted result comes back
/// or an `Arity`/`TypeConversion`/`UnknownProgram` error does.
pub fn call(name: Symbol, args: &[Value]) -> Result<Value, SchedError> {
    let def = {
        let guard = REGISTRY.pin();
        match guard.get(&name) {
            Some(def) => *def,
            None => return Err(SchedError::UnknownProgram(name)),
        }
    };
    if args.len() != def.arity {
        return Err(SchedError::Arity {
            name,
            expected: def.arity,
            got: args.len(),
        });
    }
    (def.func)(args).map_err(|detail| SchedError::TypeConversion { name, detail })
}
