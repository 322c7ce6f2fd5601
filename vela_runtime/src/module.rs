//! The module object: a named namespace holding bindings and `using` edges.
//!
//! One `parking_lot::Mutex` per module protects the *structure* of the
//! binding table and the `usings` list. Binding contents are atomic and are
//! never read under this lock. Everything else on the module (counters,
//! inheritable knobs, flags) is an atomic field.

use crate::binding::Binding;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use vela_core::intern::Symbol;
use vela_core::value::ModuleId;

// =============================================================================
// Identifiers
// =============================================================================

/// 128-bit identifier split into high and low words, used both for the
/// package UUID and for the per-session build id (low word unique per
/// construction, high word reserved for serialization metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uuid128 {
    pub hi: u64,
    pub lo: u64,
}

impl Uuid128 {
    pub const ZERO: Uuid128 = Uuid128 { hi: 0, lo: 0 };

    #[inline]
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.hi == 0 && self.lo == 0
    }
}

/// Knob value meaning "inherit from the parent module".
pub const KNOB_INHERIT: i32 = -1;

// =============================================================================
// Module
// =============================================================================

/// Structure protected by the module lock.
pub(crate) struct ModuleInner {
    pub(crate) bindings: FxHashMap<Symbol, Arc<Binding>>,
    /// Ordered `using` edges; later entries shadow earlier ones.
    pub(crate) usings: Vec<ModuleId>,
}

/// A named namespace, the unit of `using`/`import`.
pub struct Module {
    id: ModuleId,
    name: Symbol,
    /// Root modules are their own parent.
    parent: ModuleId,
    /// Zero until assigned via `set_module_uuid`.
    uuid: RwLock<Uuid128>,
    /// Unique per construction within a process; `hi` starts at `!0`
    /// ("not yet serialized").
    build_id: Uuid128,
    /// Generator for unique internal names.
    counter: AtomicU32,

    // Inheritable knobs; `KNOB_INHERIT` defers to the parent chain.
    optlevel: AtomicI32,
    compile: AtomicI32,
    infer: AtomicI32,
    max_methods: AtomicI32,
    nospecialize: AtomicI32,

    istopmod: AtomicBool,
    inner: Mutex<ModuleInner>,
}

impl Module {
    pub(crate) fn new(id: ModuleId, name: Symbol, parent: ModuleId, build_id_lo: u64) -> Module {
        Module {
            id,
            name,
            parent,
            uuid: RwLock::new(Uuid128::ZERO),
            build_id: Uuid128::new(!0u64, build_id_lo),
            counter: AtomicU32::new(1),
            optlevel: AtomicI32::new(KNOB_INHERIT),
            compile: AtomicI32::new(KNOB_INHERIT),
            infer: AtomicI32::new(KNOB_INHERIT),
            max_methods: AtomicI32::new(KNOB_INHERIT),
            nospecialize: AtomicI32::new(0),
            istopmod: AtomicBool::new(false),
            inner: Mutex::new(ModuleInner {
                bindings: FxHashMap::default(),
                usings: Vec::new(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn parent(&self) -> ModuleId {
        self.parent
    }

    #[inline]
    pub fn uuid(&self) -> Uuid128 {
        *self.uuid.read()
    }

    pub(crate) fn set_uuid(&self, uuid: Uuid128) {
        *self.uuid.write() = uuid;
    }

    #[inline]
    pub fn build_id(&self) -> Uuid128 {
        self.build_id
    }

    /// Fetch-add the internal name counter, returning the prior value.
    #[inline]
    pub fn next_counter(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn istopmod(&self) -> bool {
        self.istopmod.load(Ordering::Acquire)
    }

    pub(crate) fn mark_topmod(&self) {
        self.istopmod.store(true, Ordering::Release);
    }

    /// Lock the binding table and `usings` list.
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, ModuleInner> {
        self.inner.lock()
    }

    // -------------------------------------------------------------------------
    // Knob cells (raw, non-inheriting access; chain walks live on the registry)
    // -------------------------------------------------------------------------

    #[inline]
    pub(crate) fn raw_optlevel(&self) -> i32 {
        self.optlevel.load(Ordering::Relaxed)
    }

    pub(crate) fn set_raw_optlevel(&self, lvl: i32) {
        self.optlevel.store(lvl, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn raw_compile(&self) -> i32 {
        self.compile.load(Ordering::Relaxed)
    }

    pub(crate) fn set_raw_compile(&self, value: i32) {
        self.compile.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn raw_infer(&self) -> i32 {
        self.infer.load(Ordering::Relaxed)
    }

    pub(crate) fn set_raw_infer(&self, value: i32) {
        self.infer.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn raw_max_methods(&self) -> i32 {
        self.max_methods.load(Ordering::Relaxed)
    }

    pub(crate) fn set_raw_max_methods(&self, value: i32) {
        self.max_methods.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn nospecialize(&self) -> i32 {
        self.nospecialize.load(Ordering::Relaxed)
    }

    pub(crate) fn set_nospecialize(&self, on: bool) {
        self.nospecialize
            .store(if on { -1 } else { 0 }, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name.text())
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::intern::intern;

    fn test_module(id: u32) -> Module {
        let mid = ModuleId::from_raw(id);
        Module::new(mid, intern("M"), mid, 42)
    }

    #[test]
    fn test_fresh_module_state() {
        let m = test_module(0);
        assert_eq!(m.parent(), m.id());
        assert!(m.uuid().is_zero());
        assert_eq!(m.build_id().hi, !0u64);
        assert_eq!(m.build_id().lo, 42);
        assert!(!m.istopmod());
        assert_eq!(m.raw_optlevel(), KNOB_INHERIT);
    }

    #[test]
    fn test_next_counter_monotonic() {
        let m = test_module(0);
        assert_eq!(m.next_counter(), 1);
        assert_eq!(m.next_counter(), 2);
        assert_eq!(m.next_counter(), 3);
    }

    #[test]
    fn test_set_uuid() {
        let m = test_module(0);
        m.set_uuid(Uuid128::new(1, 2));
        assert_eq!(m.uuid(), Uuid128::new(1, 2));
    }

    #[test]
    fn test_nospecialize_toggle() {
        let m = test_module(0);
        m.set_nospecialize(true);
        assert_eq!(m.nospecialize(), -1);
        m.set_nospecialize(false);
        assert_eq!(m.nospecialize(), 0);
    }
}
