//! Bindings: the authoritative slots for globals.
//!
//! A [`Binding`] holds one name's value, declared type, ownership, and
//! visibility flags inside one module. Bindings are shared as
//! `Arc<Binding>`, so a record's address is stable for the lifetime of the
//! module that created it, and other modules can alias it through
//! [`BindingOwner::Alias`] without copying.
//!
//! Concurrency discipline: `value` and `ty` are lock-free atomic cells;
//! `owner` and the flag fields are written only while holding the owning
//! module's lock but may be read from anywhere.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use vela_core::intern::Symbol;
use vela_core::value::{ModuleId, TypeCell, TypeId, Value, ValueCell};

// =============================================================================
// Deprecation flag
// =============================================================================

/// Deprecation state of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Deprecation {
    /// Not deprecated.
    None = 0,
    /// Renamed; uses warn.
    Renamed = 1,
    /// Moved elsewhere; the value is an error-throwing stub, so uses do not
    /// warn a second time.
    Moved = 2,
}

impl Deprecation {
    #[inline]
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Deprecation::Renamed,
            2 => Deprecation::Moved,
            _ => Deprecation::None,
        }
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// Who answers for a binding's value.
#[derive(Debug, Clone, Default)]
pub enum BindingOwner {
    /// Slot exists (e.g. created by `export`) but ownership is undecided.
    #[default]
    Unresolved,
    /// This binding is the authoritative source for its name.
    Owned,
    /// The name is an alias for a binding elsewhere. The target is always
    /// fully resolved: its own owner is `Owned`.
    Alias(Arc<Binding>),
}

// =============================================================================
// Binding
// =============================================================================

/// The slot storing one global within a module.
#[derive(Debug)]
pub struct Binding {
    /// Module whose table this record was created in.
    module: ModuleId,
    name: Symbol,
    value: ValueCell,
    ty: TypeCell,
    owner: RwLock<BindingOwner>,
    constp: AtomicBool,
    exportp: AtomicBool,
    imported: AtomicBool,
    deprecated: AtomicU8,
}

impl Binding {
    /// Fresh unresolved binding for `name` in `module`.
    pub(crate) fn new(module: ModuleId, name: Symbol) -> Arc<Binding> {
        Arc::new(Binding {
            module,
            name,
            value: ValueCell::new(),
            ty: TypeCell::new(),
            owner: RwLock::new(BindingOwner::Unresolved),
            constp: AtomicBool::new(false),
            exportp: AtomicBool::new(false),
            imported: AtomicBool::new(false),
            deprecated: AtomicU8::new(Deprecation::None as u8),
        })
    }

    /// Fresh self-owned binding.
    pub(crate) fn new_owned(module: ModuleId, name: Symbol) -> Arc<Binding> {
        let b = Binding::new(module, name);
        *b.owner.write() = BindingOwner::Owned;
        b
    }

    /// Module the record was created in (its `GlobalRef` home).
    #[inline]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn value(&self) -> Option<Value> {
        self.value.load()
    }

    #[inline]
    pub(crate) fn value_cell(&self) -> &ValueCell {
        &self.value
    }

    #[inline]
    pub fn declared_type(&self) -> Option<TypeId> {
        self.ty.load()
    }

    #[inline]
    pub(crate) fn type_cell(&self) -> &TypeCell {
        &self.ty
    }

    // -------------------------------------------------------------------------
    // Ownership
    // -------------------------------------------------------------------------

    /// Current ownership state.
    #[inline]
    pub fn owner(&self) -> BindingOwner {
        self.owner.read().clone()
    }

    /// Follow the owner edge once: the binding itself when self-owned, the
    /// alias target when aliased, `None` when unresolved.
    pub fn owner_binding(self: &Arc<Self>) -> Option<Arc<Binding>> {
        match &*self.owner.read() {
            BindingOwner::Unresolved => None,
            BindingOwner::Owned => Some(Arc::clone(self)),
            BindingOwner::Alias(target) => Some(Arc::clone(target)),
        }
    }

    #[inline]
    pub fn is_self_owned(&self) -> bool {
        matches!(&*self.owner.read(), BindingOwner::Owned)
    }

    /// Whether ownership has been decided at all.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        !matches!(&*self.owner.read(), BindingOwner::Unresolved)
    }

    /// Claim the slot for its own module. Caller holds the module lock.
    #[inline]
    pub(crate) fn claim(&self) {
        *self.owner.write() = BindingOwner::Owned;
    }

    /// Point the slot at another module's binding. Caller holds the module
    /// lock; `target` must be fully resolved.
    pub(crate) fn set_owner_alias(&self, target: Arc<Binding>) {
        debug_assert!(target.is_self_owned());
        *self.owner.write() = BindingOwner::Alias(target);
    }

    // -------------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------------

    #[inline]
    pub fn is_const(&self) -> bool {
        self.constp.load(Ordering::Acquire)
    }

    /// CAS `constp` from false to true. Returns whether this call made the
    /// transition.
    #[inline]
    pub(crate) fn mark_const(&self) -> bool {
        self.constp
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditionally set `constp`. Monotonic, so a plain store suffices.
    #[inline]
    pub(crate) fn force_const(&self) {
        self.constp.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_exported(&self) -> bool {
        self.exportp.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_exported(&self) {
        self.exportp.store(true, Ordering::Release);
    }

    /// Whether the name was introduced by an explicit `import` (as opposed
    /// to resolution through `using`).
    #[inline]
    pub fn is_imported(&self) -> bool {
        self.imported.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_imported(&self, explicit: bool) {
        self.imported.store(explicit, Ordering::Release);
    }

    #[inline]
    pub fn deprecation(&self) -> Deprecation {
        Deprecation::from_raw(self.deprecated.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_deprecated(&self) -> bool {
        self.deprecation() != Deprecation::None
    }

    #[inline]
    pub(crate) fn set_deprecation(&self, flag: Deprecation) {
        self.deprecated.store(flag as u8, Ordering::Release);
    }
}

// =============================================================================
// Binding equivalence
// =============================================================================

/// Two bindings are equivalent when they are the same record, answer to the
/// same owner, or are both constants holding the same value.
pub fn eq_bindings(a: &Arc<Binding>, b: &Arc<Binding>) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    if owner_key(a) == owner_key(b) {
        return true;
    }
    if a.is_const() && b.is_const() {
        if let (Some(av), Some(bv)) = (a.value(), b.value()) {
            return av.egal(bv);
        }
    }
    false
}

/// Identity of a binding's owner edge, for equivalence comparison. Two
/// unresolved bindings compare equal here, matching the resolver's use: it
/// only compares fully resolved candidates.
fn owner_key(b: &Arc<Binding>) -> Option<*const Binding> {
    match &*b.owner.read() {
        BindingOwner::Unresolved => None,
        BindingOwner::Owned => Some(Arc::as_ptr(b)),
        BindingOwner::Alias(target) => Some(Arc::as_ptr(target)),
    }
}

// =============================================================================
// GlobalRef
// =============================================================================

/// Stable `(module, name, binding)` handle, letting compiled code refer to
/// "the slot at `M.x`" without re-hashing. The binding's `owner` may change
/// after the ref is taken, so consumers re-resolve through the registry
/// before reading the value.
#[derive(Debug, Clone)]
pub struct GlobalRef {
    module: ModuleId,
    name: Symbol,
    binding: Arc<Binding>,
}

impl GlobalRef {
    pub(crate) fn new(module: ModuleId, name: Symbol, binding: Arc<Binding>) -> Self {
        Self {
            module,
            name,
            binding,
        }
    }

    #[inline]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }
}

// =============================================================================
// Tests
// =============================================================================
