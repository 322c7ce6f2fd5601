//! Assignment semantics for mutable, constant, and typed globals.
//!
//! Every store to a global funnels through [`ModuleRegistry::checked_assignment`],
//! which enforces the declared-type constraint and the constant rules.
//! Constant initialization is a CAS on the value cell so concurrent
//! initializers agree on one winner; `constp` itself transitions by CAS and
//! never reverts.

use crate::binding::Binding;
use crate::registry::ModuleRegistry;
use std::sync::Arc;
use vela_core::error::{ModuleError, ModuleErrorKind, ModuleResult};
use vela_core::intern::Symbol;
use vela_core::value::{ModuleId, TypeId, Value};

impl ModuleRegistry {
    /// Store `rhs` into `b`, enforcing type and constness invariants.
    ///
    /// The declared type is CAS-initialized to the universal type on first
    /// assignment; afterwards, incompatible values are rejected. Assigning a
    /// constant is allowed only for the initializing store, for an
    /// egal-identical value (silent no-op), or for a same-type replacement
    /// (which warns and stores).
    pub fn checked_assignment(
        &self,
        b: &Arc<Binding>,
        m: ModuleId,
        var: Symbol,
        rhs: Value,
    ) -> ModuleResult<()> {
        if let Some(declared) = b.type_cell().init_any() {
            if declared != TypeId::ANY && rhs.type_id() != declared {
                return Err(ModuleError::incompatible_assignment(
                    &self.name_text(m),
                    &var.text(),
                ));
            }
        }
        if b.is_const() {
            if b.value_cell().init(rhs) {
                return Ok(());
            }
            if let Some(old) = b.value() {
                if rhs.egal(old) {
                    return Ok(());
                }
                if rhs.type_id() != old.type_id() || rhs.is_type() || rhs.is_module() {
                    return Err(ModuleError::const_redefinition(format!(
                        "{}.{}",
                        self.name_text(m),
                        var
                    )));
                }
            }
            self.warn(format!(
                "WARNING: redefinition of constant {}.{}. This may fail, cause incorrect answers, or produce other errors.",
                self.name_text(m),
                var,
            ));
        }
        b.value_cell().store_release(rhs);
        Ok(())
    }

    /// Assign `m.var = val` through the write path.
    pub fn set_global(&self, m: ModuleId, var: Symbol, val: Value) -> ModuleResult<()> {
        let b = self.get_binding_wr_or_error(m, var)?;
        self.checked_assignment(&b, m, var, val)
    }

    /// Bind `m.var` as a constant. Fails on any existing value, including
    /// an equal one.
    pub fn set_const(&self, m: ModuleId, var: Symbol, val: Value) -> ModuleResult<()> {
        let b = self.get_binding_wr_or_error(m, var)?;
        if b.value().is_none() {
            let _ = b.type_cell().init_any();
            if b.mark_const() && b.value_cell().init(val) {
                return Ok(());
            }
        }
        Err(ModuleError::const_redefinition(var.text()))
    }

    /// Declare an existing binding constant. Fails when the binding is not
    /// self-owned or already holds a non-constant value.
    pub fn declare_constant(
        &self,
        b: &Arc<Binding>,
        m: ModuleId,
        var: Symbol,
    ) -> ModuleResult<()> {
        if !b.is_self_owned() || (b.value().is_some() && !b.is_const()) {
            return Err(ModuleError::new(
                ModuleErrorKind::InvalidConstantRedefinition,
                format!(
                    "cannot declare {}.{} constant; it already has a value",
                    self.name_text(m),
                    var
                ),
            ));
        }
        b.force_const();
        Ok(())
    }

    /// Declare a concrete type constraint for `m.var`. Idempotent for the
    /// same type; fails once a different constraint is in place.
    pub fn set_binding_type(&self, m: ModuleId, var: Symbol, ty: TypeId) -> ModuleResult<()> {
        let b = self.get_binding_wr_or_error(m, var)?;
        match b.type_cell().init(ty) {
            Ok(()) => Ok(()),
            Err(existing) if existing == ty => Ok(()),
            Err(_) => Err(ModuleError::new(
                ModuleErrorKind::IncompatibleTypedAssignment,
                format!(
                    "cannot set type for global {}.{}; it is already set to a different type",
                    self.name_text(m),
                    var
                ),
            )),
        }
    }

    /// Resolving read of `m.var`'s value. Deprecated bindings go through the
    /// deprecation machinery first.
    pub fn get_global(&self, m: ModuleId, var: Symbol) -> ModuleResult<Option<Value>> {
        let Some(b) = self.get_binding(m, var) else {
            return Ok(None);
        };
        if b.is_deprecated() {
            self.binding_deprecation_warning(m, var, &b)?;
        }
        Ok(b.value())
    }

    /// Is `m.var` bound to a value (through resolution)?
    pub fn boundp(&self, m: ModuleId, var: Symbol) -> bool {
        self.get_binding(m, var)
            .is_some_and(|b| b.value().is_some())
    }

    /// Is `m.var` constant (through resolution)?
    pub fn is_const(&self, m: ModuleId, var: Symbol) -> bool {
        self.get_binding(m, var).is_some_and(|b| b.is_const())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::intern::intern;
    use vela_core::options::RuntimeOptions;

    fn registry() -> ModuleRegistry {
        let reg = ModuleRegistry::new(RuntimeOptions::default());
        reg.bootstrap();
        reg
    }

    #[test]
    fn test_set_get_global() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let x = intern("x");
        reg.set_global(m, x, Value::int(42).unwrap()).unwrap();
        assert_eq!(reg.get_global(m, x).unwrap().unwrap().as_int(), Some(42));
        assert!(reg.boundp(m, x));
        assert!(!reg.is_const(m, x));
    }

    #[test]
    fn test_get_global_unbound() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        assert_eq!(reg.get_global(m, intern("missing")).unwrap(), None);
        assert!(!reg.boundp(m, intern("missing")));
    }

    #[test]
    fn test_set_const_then_set_const_fails() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let k = intern("k");
        reg.set_const(m, k, Value::int(1).unwrap()).unwrap();
        // even an equal value is a redefinition through set_const
        let err = reg.set_const(m, k, Value::int(1).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::InvalidConstantRedefinition);
        assert_eq!(err.to_string(), "invalid redefinition of constant k");
    }

    #[test]
    fn test_const_reassign_same_value_is_noop() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let k = intern("k");
        reg.set_const(m, k, Value::int(1).unwrap()).unwrap();
        let b = reg.get_binding(m, k).unwrap();
        reg.checked_assignment(&b, m, k, Value::int(1).unwrap())
            .unwrap();
        assert_eq!(reg.get_global(m, k).unwrap().unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_const_reassign_same_type_warns_and_stores() {
        use std::sync::Arc;
        use vela_core::diag::CaptureSink;

        let sink = Arc::new(CaptureSink::new());
        let reg = ModuleRegistry::with_sink(RuntimeOptions::default(), sink.clone());
        reg.bootstrap();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let k = intern("k");
        reg.set_const(m, k, Value::int(1).unwrap()).unwrap();
        let b = reg.get_binding(m, k).unwrap();
        reg.checked_assignment(&b, m, k, Value::int(2).unwrap())
            .unwrap();
        assert_eq!(reg.get_global(m, k).unwrap().unwrap().as_int(), Some(2));
        let warnings = sink.messages();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("WARNING: redefinition of constant M.k."));
    }

    #[test]
    fn test_const_reassign_different_type_fails() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let k = intern("k");
        reg.set_const(m, k, Value::int(1).unwrap()).unwrap();
        let b = reg.get_binding(m, k).unwrap();
        let err = reg
            .checked_assignment(&b, m, k, Value::string(intern("s")))
            .unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::InvalidConstantRedefinition);
        assert_eq!(err.to_string(), "invalid redefinition of constant M.k");
    }

    #[test]
    fn test_const_module_value_never_redefined() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let k = intern("k");
        let other = reg.new_module(intern("Other"), reg.main_module(), false);
        reg.set_const(m, k, Value::module(other)).unwrap();
        let b = reg.get_binding(m, k).unwrap();
        // same type (module), but module values are not silently replaceable
        let err = reg
            .checked_assignment(&b, m, k, Value::module(m))
            .unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::InvalidConstantRedefinition);
    }

    #[test]
    fn test_typed_global_enforced() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let x = intern("x");
        reg.set_binding_type(m, x, TypeId::INT).unwrap();
        reg.set_global(m, x, Value::int(5).unwrap()).unwrap();
        let err = reg.set_global(m, x, Value::float(1.0)).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::IncompatibleTypedAssignment);
        assert_eq!(
            err.to_string(),
            "cannot assign an incompatible value to the global M.x."
        );
        // the well-typed value survived
        assert_eq!(reg.get_global(m, x).unwrap().unwrap().as_int(), Some(5));
    }

    #[test]
    fn test_set_binding_type_idempotent_same_type() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let x = intern("x");
        reg.set_binding_type(m, x, TypeId::INT).unwrap();
        reg.set_binding_type(m, x, TypeId::INT).unwrap();
        let err = reg.set_binding_type(m, x, TypeId::STR).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::IncompatibleTypedAssignment);
    }

    #[test]
    fn test_untyped_global_accepts_any_type() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let x = intern("x");
        reg.set_global(m, x, Value::int(1).unwrap()).unwrap();
        // first assignment pinned the constraint to Any, not Int
        reg.set_global(m, x, Value::string(intern("now a string")))
            .unwrap();
        assert!(reg.get_global(m, x).unwrap().unwrap().as_str().is_some());
    }

    #[test]
    fn test_declare_constant() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let c = intern("c");
        let b = reg.get_binding_wr_or_error(m, c).unwrap();
        reg.declare_constant(&b, m, c).unwrap();
        assert!(b.is_const());
        // initializing store still works
        reg.checked_assignment(&b, m, c, Value::int(3).unwrap())
            .unwrap();
        assert!(reg.is_const(m, c));
    }

    #[test]
    fn test_declare_constant_rejects_existing_value() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let x = intern("x");
        reg.set_global(m, x, Value::int(1).unwrap()).unwrap();
        let b = reg.get_binding(m, x).unwrap();
        let err = reg.declare_constant(&b, m, x).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::InvalidConstantRedefinition);
    }

    #[test]
    fn test_assign_to_used_name_fails() {
        let reg = registry();
        let a = reg.new_module(intern("A"), reg.main_module(), false);
        let c = reg.new_module(intern("C"), reg.main_module(), false);
        let y = intern("y");
        reg.set_global(a, y, Value::int(1).unwrap()).unwrap();
        reg.module_export(a, y);
        reg.module_using(c, a);
        // resolve through the using, promoting an alias record into C
        assert!(reg.get_binding(c, y).is_some());
        let err = reg.set_global(c, y, Value::int(2).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::AssignToImported);
        assert_eq!(
            err.to_string(),
            "cannot assign a value to imported variable C.y"
        );
    }

    #[test]
    fn test_concurrent_const_init_single_winner() {
        use std::thread;

        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let k = intern("k");
        let b = reg.get_binding_wr_or_error(m, k).unwrap();
        reg.declare_constant(&b, m, k).unwrap();

        let winners: usize = (0..8)
            .map(|i| {
                let b = Arc::clone(&b);
                thread::spawn(move || b.value_cell().init(Value::int(i).unwrap()) as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
        assert!(reg.is_const(m, k));
        assert!(reg.boundp(m, k));
    }
}
