//! Global symbol interner.
//!
//! Every name that flows through the runtime is interned exactly once and
//! referred to by a [`Symbol`], a `Copy` index into the process-wide table.
//! Equality is identity, and the hash is computed once at interning time,
//! so symbol-keyed maps never rehash string data.

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// An interned name.
///
/// Symbols compare and hash by identity; two `Symbol`s are equal iff they
/// were interned from the same string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// The raw interner index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The interned text.
    #[inline]
    pub fn text(self) -> Arc<str> {
        interner().record(self.0).text
    }

    /// The hash computed when the symbol was interned.
    #[inline]
    pub fn precomputed_hash(self) -> u64 {
        interner().record(self.0).hash
    }

    /// Compiler-generated names start with `#` and are hidden from
    /// name enumeration by default.
    #[inline]
    pub fn is_hidden(self) -> bool {
        self.text().starts_with('#')
    }
}

impl Hash for Symbol {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.0);
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// Intern a string, returning its stable [`Symbol`].
pub fn intern(name: &str) -> Symbol {
    let interner = interner();
    if let Some(id) = interner.ids.get(name) {
        return Symbol(*id);
    }
    let id = *interner.ids.entry(name.to_owned()).or_insert_with(|| {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        let mut records = interner.records.write();
        records.push(SymbolRecord {
            text: Arc::from(name),
            hash: hasher.finish(),
        });
        (records.len() - 1) as u32
    });
    Symbol(id)
}

/// Reconstitute a symbol from a raw index previously produced by [`intern`].
#[inline]
pub(crate) fn intern_raw(raw: u32) -> Symbol {
    Symbol(raw)
}

#[derive(Clone)]
struct SymbolRecord {
    text: Arc<str>,
    hash: u64,
}

struct Interner {
    /// Name → id. Concurrent so interning never blocks readers of other shards.
    ids: DashMap<String, u32>,
    /// Id → record. Append-only.
    records: RwLock<Vec<SymbolRecord>>,
}

impl Interner {
    fn record(&self, id: u32) -> SymbolRecord {
        self.records.read()[id as usize].clone()
    }
}

static INTERNER: OnceLock<Interner> = OnceLock::new();

fn interner() -> &'static Interner {
    INTERNER.get_or_init(|| Interner {
        ids: DashMap::new(),
        records: RwLock::new(Vec::new()),
    })
}
