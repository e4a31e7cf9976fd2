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

//! Case-sensitive interned names.
//!
//! Program names, global-variable names and namespace names are all interned
//! down to a single u32 id. The interner is process-wide and thread-safe:
//! lookups are lock-free, only the first interning of a new string takes a
//! short allocation lock.

use ahash::AHasher;
use boxcar::Vec as BoxcarVec;
use once_cell::sync::Lazy;
use papaya::HashMap;
use std::fmt::{Debug, Display};
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use std::sync::Mutex;

struct Interner {
    /// String -> id, lock-free reads via pinned guards
    by_name: HashMap<String, u32, BuildHasherDefault<AHasher>>,
    /// id -> string, indexed directly (ids are boxcar slots)
    by_id: BoxcarVec<Arc<str>>,
    /// Serializes id allocation for strings not seen before
    alloc: Mutex<()>,
}

impl Interner {
    fn intern(&self, s: &str) -> u32 {
        let guard = self.by_name.pin();
        if let Some(&id) = guard.get(s) {
            return id;
        }

        let _lock = self.alloc.lock();
        // Another thread may have won the race while we waited
        if let Some(&id) = guard.get(s) {
            return id;
        }

        let id = self.by_id.push(Arc::from(s)) as u32;
        guard.insert(s.to_string(), id);
        id
    }

    fn resolve(&self, id: u32) -> Option<&Arc<str>> {
        self.by_id.get(id as usize)
    }
}

static INTERNER: Lazy<Interner> = Lazy::new(|| Interner {
    by_name: HashMap::default(),
    by_id: BoxcarVec::new(),
    alloc: Mutex::new(()),
});

/// An interned, case-sensitive name.
///
/// Comparison and hashing operate on the u32 id, so symbols are cheap to
/// store in frames and registries and cheap to compare at every dispatch.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    id: u32,
}

impl Symbol {
    /// Intern a string, returning its symbol. Repeated calls with the same
    /// string are fast and return identical symbols.
    pub fn mk(s: &str) -> Self {
        Symbol {
            id: INTERNER.intern(s),
        }
    }

    /// The symbol's unique id within this process.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The interned string. Shared, not copied.
    pub fn as_arc_str(&self) -> Arc<str> {
        INTERNER
            .resolve(self.id)
            .unwrap_or_else(|| panic!("Symbol: id {} not in interner", self.id))
            .clone()
    }

    /// The interned string as an owned `String`.
    pub fn as_string(&self) -> String {
        self.as_arc_str().as_ref().to_string()
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_arc_str())
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match INTERNER.resolve(self.id) {
            Some(s) => write!(f, "Symbol({s:?}, {})", self.id),
            None => write!(f, "Symbol(<invalid>, {})", self.id),
        }
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::mk(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::mk(&s)
    }
}

impl From<&String> for Symbol {
    fn from(s: &String) -> Self {
        Symbol::mk(s.as_str())
    }
}
