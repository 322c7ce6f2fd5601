//! Name resolution across module `using`/`import` edges.
//!
//! The entry points follow one discipline: a lookup first consults the
//! module's own table, then walks the `usings` list newest→oldest, resolving
//! each candidate through to its owner. A successful `using` lookup is
//! *promoted* into an implicit import record in the requesting module, so
//! future reads are stable and a later assignment to the same name either
//! succeeds (local, unresolved slot) or fails deterministically (aliased
//! slot).
//!
//! Lock discipline: no two module locks are ever held across a recursive
//! resolution. `using_resolve` snapshots the `usings` list under the lock
//! and releases it before recursing into other modules.

use crate::binding::{eq_bindings, Binding, BindingOwner, Deprecation, GlobalRef};
use crate::registry::ModuleRegistry;
use smallvec::SmallVec;
use std::sync::Arc;
use vela_core::error::{ModuleError, ModuleResult};
use vela_core::intern::Symbol;
use vela_core::options::DepWarn;
use vela_core::value::{ModuleId, TypeId, Value};

/// Stack of `(module, name)` pairs currently being resolved, for breaking
/// `using` cycles.
type ModStack = SmallVec<[(ModuleId, Symbol); 8]>;

impl ModuleRegistry {
    // =========================================================================
    // Binding table primitives
    // =========================================================================

    /// Raw locked lookup; never traverses `usings`.
    pub fn get_module_binding(&self, m: ModuleId, var: Symbol) -> Option<Arc<Binding>> {
        let module = self.module(m);
        let inner = module.lock();
        inner.bindings.get(&var).cloned()
    }

    /// Binding for assignment. An existing unresolved slot is claimed for
    /// `m`; an aliased slot is an error when `alloc` is set (the name
    /// belongs to another module) and falls through unchanged otherwise.
    /// With `alloc`, a missing slot is created self-owned, so the result is
    /// always a binding.
    pub fn get_binding_wr(
        &self,
        m: ModuleId,
        var: Symbol,
        alloc: bool,
    ) -> ModuleResult<Option<Arc<Binding>>> {
        let module = self.module(m);
        let mut inner = module.lock();
        if let Some(b) = inner.bindings.get(&var).cloned() {
            if !b.is_self_owned() {
                if !b.is_resolved() {
                    b.claim();
                } else if alloc {
                    drop(inner);
                    return Err(ModuleError::assign_to_imported(
                        &module.name().text(),
                        &var.text(),
                    ));
                }
            }
            return Ok(Some(b));
        }
        if !alloc {
            return Ok(None);
        }
        let b = Binding::new_owned(m, var);
        inner.bindings.insert(var, Arc::clone(&b));
        Ok(Some(b))
    }

    /// `get_binding_wr` with `alloc`, unwrapped.
    pub fn get_binding_wr_or_error(&self, m: ModuleId, var: Symbol) -> ModuleResult<Arc<Binding>> {
        let b = self.get_binding_wr(m, var, true)?;
        Ok(b.expect("get_binding_wr with alloc always yields a binding"))
    }

    /// Binding for adding a method. Like `get_binding_wr` but with a
    /// different error path: a name resolving to another module's binding
    /// may be extended only when it was explicitly imported or when it is a
    /// constant type (constructor extension).
    pub fn get_binding_for_method_def(
        &self,
        m: ModuleId,
        var: Symbol,
    ) -> ModuleResult<Arc<Binding>> {
        let module = self.module(m);
        let mut inner = module.lock();
        if let Some(b) = inner.bindings.get(&var).cloned() {
            return match b.owner() {
                BindingOwner::Owned => Ok(b),
                BindingOwner::Unresolved => {
                    b.claim();
                    Ok(b)
                }
                BindingOwner::Alias(owner) => {
                    drop(inner);
                    let const_type =
                        owner.is_const() && owner.value().is_some_and(Value::is_type);
                    if !b.is_imported() && !const_type {
                        Err(ModuleError::method_not_imported(
                            &module.name().text(),
                            &var.text(),
                        ))
                    } else {
                        Ok(owner)
                    }
                }
            };
        }
        let b = Binding::new_owned(m, var);
        inner.bindings.insert(var, Arc::clone(&b));
        Ok(b)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `m.var` to its owning binding, starting from `seed` when the
    /// caller already holds a binding record (e.g. through a `GlobalRef`).
    /// A non-none result is always self-owned.
    pub fn resolve_owner(
        &self,
        seed: Option<&Arc<Binding>>,
        m: ModuleId,
        var: Symbol,
    ) -> Option<Arc<Binding>> {
        let mut stack = ModStack::new();
        self.resolve_owner_rec(seed, m, var, &mut stack)
    }

    /// Resolving read: `resolve_owner` from the module table.
    pub fn get_binding(&self, m: ModuleId, var: Symbol) -> Option<Arc<Binding>> {
        self.resolve_owner(None, m, var)
    }

    fn resolve_owner_rec(
        &self,
        seed: Option<&Arc<Binding>>,
        m: ModuleId,
        var: Symbol,
        stack: &mut ModStack,
    ) -> Option<Arc<Binding>> {
        let owner = match seed {
            Some(b) => b.owner_binding(),
            None => self
                .get_module_binding(m, var)
                .and_then(|b| b.owner_binding()),
        };
        if let Some(owner) = owner {
            debug_assert!(owner.is_self_owned());
            return Some(owner);
        }
        // Unresolved: search through `usings`, breaking import cycles.
        if stack.iter().any(|&(sm, sv)| sm == m && sv == var) {
            return None;
        }
        stack.push((m, var));
        let found = self.using_resolve(m, var, stack, true);
        stack.pop();
        let (from, b) = found?;
        // Promote the lookup into an implicit import so the result of this
        // resolution cannot change, for example if this var is assigned to
        // later.
        self.import_binding(m, from, Some(Arc::clone(&b)), var, var, false);
        Some(b)
    }

    /// Search `m`'s `usings` for an exported binding of `var`, newest edge
    /// first. Returns the winning `(module, owner binding)`.
    pub(crate) fn using_resolve(
        &self,
        m: ModuleId,
        var: Symbol,
        stack: &mut ModStack,
        warn: bool,
    ) -> Option<(ModuleId, Arc<Binding>)> {
        let usings: Vec<ModuleId> = {
            let module = self.module(m);
            let inner = module.lock();
            inner.usings.clone()
        };
        let mut best: Option<(ModuleId, Arc<Binding>)> = None;
        for &imp in usings.iter().rev() {
            let Some(local) = self.get_module_binding(imp, var) else {
                continue;
            };
            if !local.is_exported() {
                continue;
            }
            let Some(candidate) = self.resolve_owner_rec(None, imp, var, stack) else {
                // couldn't resolve; try next using
                continue;
            };
            if let Some((best_from, best_b)) = &best {
                if !candidate.is_deprecated()
                    && !best_b.is_deprecated()
                    && !eq_bindings(&candidate, best_b)
                {
                    if warn {
                        // Mark the name resolved by installing a self-owned
                        // placeholder, so the warning is emitted at most once.
                        let _ = self.get_binding_wr(m, var, true);
                        self.warn(format!(
                            "WARNING: both {} and {} export \"{}\"; uses of it in module {} must be qualified",
                            self.name_text(*best_from),
                            self.name_text(imp),
                            var,
                            self.name_text(m),
                        ));
                    }
                    return None;
                }
            }
            if best.is_none() || !candidate.is_deprecated() {
                best = Some((imp, candidate));
            }
        }
        best
    }

    // =========================================================================
    // Import / using / export
    // =========================================================================

    /// Explicitly import `from.s` into `to`.
    pub fn module_import(&self, to: ModuleId, from: ModuleId, s: Symbol) {
        let b = self.get_binding(from, s);
        self.import_binding(to, from, b, s, s, true);
    }

    /// Explicitly import `from.s` into `to` under the name `asname`.
    pub fn module_import_as(&self, to: ModuleId, from: ModuleId, s: Symbol, asname: Symbol) {
        let b = self.get_binding(from, s);
        self.import_binding(to, from, b, asname, s, true);
    }

    /// Make `from.s` visible in `to` without the right to redefine it.
    pub fn module_use(&self, to: ModuleId, from: ModuleId, s: Symbol) {
        let b = self.get_binding(from, s);
        self.import_binding(to, from, b, s, s, false);
    }

    pub fn module_use_as(&self, to: ModuleId, from: ModuleId, s: Symbol, asname: Symbol) {
        let b = self.get_binding(from, s);
        self.import_binding(to, from, b, asname, s, false);
    }

    pub(crate) fn import_binding(
        &self,
        to: ModuleId,
        from: ModuleId,
        b: Option<Arc<Binding>>,
        asname: Symbol,
        s: Symbol,
        explicit: bool,
    ) {
        let Some(b) = b else {
            self.warn(format!(
                "WARNING: could not import {}.{} into {}",
                self.name_text(from),
                s,
                self.name_text(to),
            ));
            return;
        };
        debug_assert!(b.is_self_owned());
        let dep = b.deprecation();
        if dep != Deprecation::None {
            if b.value().is_some_and(Value::is_nothing) {
                // silently skip importing deprecated values rebound to
                // nothing (to allow later mutation)
                return;
            }
            let wellknown_dest =
                Some(to) == self.main_module() || Some(to) == self.base_module();
            if !wellknown_dest && self.options().depwarn != DepWarn::Off {
                let asname_part = if asname == s {
                    String::new()
                } else {
                    format!(" as {asname}")
                };
                self.warn(format!(
                    "WARNING: importing deprecated binding {}.{} into {}{}.",
                    self.name_text(from),
                    s,
                    self.name_text(to),
                    asname_part,
                ));
                let note = self.dep_message_suffix(from, s, &b);
                if !note.is_empty() {
                    self.warn(&note);
                }
            }
        }

        let to_module = self.module(to);
        let mut inner = to_module.lock();
        match inner.bindings.get(&asname).cloned() {
            Some(bto) => {
                if Arc::ptr_eq(&bto, &b) {
                    // importing a binding on top of itself. harmless.
                } else if eq_bindings(&bto, &b) {
                    // already imported; remember whether it is now explicit
                    bto.set_imported(explicit);
                } else if bto.is_resolved() {
                    // already imported from somewhere else
                    drop(inner);
                    self.warn(format!(
                        "WARNING: ignoring conflicting import of {}.{} into {}",
                        self.name_text(from),
                        s,
                        self.name_text(to),
                    ));
                } else if bto.is_const() || bto.value().is_some() {
                    // conflict with name owned by destination module
                    drop(inner);
                    self.warn(format!(
                        "WARNING: import of {}.{} into {} conflicts with an existing identifier; ignored.",
                        self.name_text(from),
                        s,
                        self.name_text(to),
                    ));
                } else {
                    bto.set_owner_alias(Arc::clone(&b));
                    bto.set_imported(explicit);
                }
            }
            None => {
                let nb = Binding::new(to, asname);
                nb.set_owner_alias(Arc::clone(&b));
                nb.set_imported(explicit);
                // already warned about this above, but use sites may warn too
                nb.set_deprecation(dep);
                inner.bindings.insert(asname, nb);
            }
        }
    }

    /// Append `from` to `to`'s `using` list. Idempotent. Names made visible
    /// that conflict with an existing identifier in `to` produce a warning;
    /// note that an identifier added to `to` later still silently shadows a
    /// `using` name.
    pub fn module_using(&self, to: ModuleId, from: ModuleId) {
        if to == from {
            return;
        }
        {
            let to_module = self.module(to);
            let inner = to_module.lock();
            if inner.usings.contains(&from) {
                return;
            }
        }
        let exports: Vec<(Symbol, Arc<Binding>)> = {
            let from_module = self.module(from);
            let inner = from_module.lock();
            inner
                .bindings
                .iter()
                .filter(|(_, b)| b.is_exported() && (b.is_self_owned() || b.is_imported()))
                .map(|(&name, b)| (name, Arc::clone(b)))
                .collect()
        };
        let to_name = self.module_name(to);
        for (var, b) in exports {
            let Some(local) = self.get_module_binding(to, var) else {
                continue;
            };
            // conflicts with the module's own name are expected, not noteworthy
            if !local.is_resolved() || var == to_name {
                continue;
            }
            let conflicts = match self.get_binding(to, var) {
                Some(resolved) => !eq_bindings(&resolved, &b),
                None => false,
            };
            if conflicts {
                self.warn(format!(
                    "WARNING: using {}.{} in module {} conflicts with an existing identifier.",
                    self.name_text(from),
                    var,
                    self.name_text(to),
                ));
            }
        }
        let to_module = self.module(to);
        let mut inner = to_module.lock();
        if !inner.usings.contains(&from) {
            inner.usings.push(from);
        }
    }

    /// Mark `from.s` as exported, creating a placeholder slot (with
    /// ownership still undecided) when the name has no binding yet.
    pub fn module_export(&self, from: ModuleId, s: Symbol) {
        let module = self.module(from);
        let mut inner = module.lock();
        let b = inner
            .bindings
            .entry(s)
            .or_insert_with(|| Binding::new(from, s));
        b.set_exported();
    }

    // =========================================================================
    // Read-side lookups
    // =========================================================================

    /// Resolving read that raises `UndefinedVar` for unbound names and
    /// routes deprecated bindings through the deprecation machinery.
    pub fn get_binding_or_error(&self, m: ModuleId, var: Symbol) -> ModuleResult<Arc<Binding>> {
        match self.get_binding(m, var) {
            None => Err(ModuleError::undefined_var(&var.text())),
            Some(b) => {
                if b.is_deprecated() {
                    self.binding_deprecation_warning(m, var, &b)?;
                }
                Ok(b)
            }
        }
    }

    /// The owner binding if the local slot is already resolved; never
    /// triggers resolution.
    pub fn get_binding_if_bound(&self, m: ModuleId, var: Symbol) -> Option<Arc<Binding>> {
        self.get_module_binding(m, var)
            .and_then(|b| b.owner_binding())
    }

    /// The current likely owner of `m.var`, without resolving the binding
    /// (it may change later) and without warnings.
    pub fn binding_owner(&self, m: ModuleId, var: Symbol) -> Option<Arc<Binding>> {
        match self
            .get_module_binding(m, var)
            .and_then(|b| b.owner_binding())
        {
            Some(owner) => Some(owner),
            None => {
                let mut stack = ModStack::new();
                self.using_resolve(m, var, &mut stack, false).map(|(_, b)| b)
            }
        }
    }

    /// Declared type of `m.var` without resolving the binding.
    pub fn get_binding_type(&self, m: ModuleId, var: Symbol) -> Option<TypeId> {
        self.get_module_binding(m, var)?
            .owner_binding()?
            .declared_type()
    }

    // =========================================================================
    // GlobalRefs
    // =========================================================================

    /// Stable reference to the slot at `m.var`, creating the slot (with
    /// ownership undecided) if needed.
    pub fn module_globalref(&self, m: ModuleId, var: Symbol) -> GlobalRef {
        let module = self.module(m);
        let mut inner = module.lock();
        let b = inner
            .bindings
            .entry(var)
            .or_insert_with(|| Binding::new(m, var));
        GlobalRef::new(m, var, Arc::clone(b))
    }

    /// Module where the resolved owner binding's record lives.
    pub fn get_module_of_binding(&self, m: ModuleId, var: Symbol) -> Option<ModuleId> {
        self.get_binding(m, var).map(|b| b.module())
    }

    /// Value behind a `GlobalRef`, re-resolving ownership first. Ignores
    /// deprecation.
    pub fn globalref_value(&self, gr: &GlobalRef) -> Option<Value> {
        self.resolve_owner(Some(gr.binding()), gr.module(), gr.name())
            .and_then(|b| b.value())
    }

    pub fn globalref_is_const(&self, gr: &GlobalRef) -> bool {
        self.resolve_owner(Some(gr.binding()), gr.module(), gr.name())
            .is_some_and(|b| b.is_const())
    }

    pub fn globalref_boundp(&self, gr: &GlobalRef) -> bool {
        self.resolve_owner(Some(gr.binding()), gr.module(), gr.name())
            .is_some_and(|b| b.value().is_some())
    }

    // =========================================================================
    // Local queries
    // =========================================================================

    /// Does `m` explicitly import `s`?
    pub fn is_imported(&self, m: ModuleId, s: Symbol) -> bool {
        self.get_module_binding(m, s)
            .is_some_and(|b| b.is_imported())
    }

    pub fn module_exports_p(&self, m: ModuleId, var: Symbol) -> bool {
        self.get_module_binding(m, var)
            .is_some_and(|b| b.is_exported())
    }

    pub fn defines_or_exports_p(&self, m: ModuleId, var: Symbol) -> bool {
        self.get_module_binding(m, var)
            .is_some_and(|b| b.is_exported() || b.is_self_owned())
    }

    pub fn binding_resolved_p(&self, m: ModuleId, var: Symbol) -> bool {
        self.get_module_binding(m, var)
            .is_some_and(|b| b.is_resolved())
    }
}
