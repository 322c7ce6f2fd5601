//! Deprecation flags, warnings, and replacement hints.
//!
//! A renamed binding (flag 1) warns on use; a moved binding (flag 2) holds
//! an error-throwing stub, so its uses do not warn a second time. The
//! replacement hint comes from a companion `_dep_message_<name>` string
//! binding when present, otherwise it is synthesized from the deprecated
//! binding's current value.

use crate::binding::{Binding, Deprecation};
use crate::registry::ModuleRegistry;
use std::sync::Arc;
use vela_core::error::{ModuleError, ModuleResult};
use vela_core::intern::{intern, Symbol};
use vela_core::options::DepWarn;
use vela_core::value::{func_info, ModuleId, Value, ValueKind};

const DEP_MESSAGE_PREFIX: &str = "_dep_message_";

impl ModuleRegistry {
    /// Set the deprecation flag on `m.var`. The flag lands on the owner
    /// binding, which may live in another module.
    pub fn deprecate_binding(&self, m: ModuleId, var: Symbol, flag: Deprecation) {
        if let Some(b) = self.get_binding(m, var) {
            b.set_deprecation(flag);
        }
    }

    /// Whether the (resolved) binding behind `m.var` is deprecated. Names
    /// that were never resolved are not considered deprecated.
    pub fn is_binding_deprecated(&self, m: ModuleId, var: Symbol) -> bool {
        if self.binding_resolved_p(m, var) {
            self.get_binding(m, var).is_some_and(|b| b.is_deprecated())
        } else {
            false
        }
    }

    /// Report a use of the deprecated binding `b` reached through `m.var`.
    ///
    /// Only renamed bindings report. Under `DepWarn::Warn` a `WARNING:` line
    /// goes to the sink; under `DepWarn::Error` the line is printed without
    /// the prefix and the access fails with `DeprecatedUse`.
    pub fn binding_deprecation_warning(
        &self,
        m: ModuleId,
        var: Symbol,
        b: &Arc<Binding>,
    ) -> ModuleResult<()> {
        if b.deprecation() != Deprecation::Renamed || self.options().depwarn == DepWarn::Off {
            return Ok(());
        }
        let error_mode = self.options().depwarn == DepWarn::Error;
        let mut msg = String::new();
        if !error_mode {
            msg.push_str("WARNING: ");
        }
        msg.push_str(&format!("{}.{} is deprecated", self.name_text(m), var));
        msg.push_str(&self.dep_message_suffix(m, var, b));
        if !error_mode {
            msg.push_str(&format!(" in module {}", self.name_text(m)));
        }
        self.warn(msg);
        if error_mode {
            Err(ModuleError::deprecated_use(&self.name_text(m), &var.text()))
        } else {
            Ok(())
        }
    }

    /// Replacement hint for a deprecated binding: the companion
    /// `_dep_message_<name>` string when bound, else `", use <new> instead."`
    /// synthesized from the value. Empty when there is nothing to suggest.
    pub(crate) fn dep_message_suffix(
        &self,
        m: ModuleId,
        name: Symbol,
        b: &Arc<Binding>,
    ) -> String {
        let companion = intern(&format!("{DEP_MESSAGE_PREFIX}{name}"));
        if let Some(db) = self.get_binding(m, companion) {
            if let Some(text) = db.value().and_then(Value::as_str) {
                return text.text().to_string();
            }
        }
        let Some(v) = b.value() else {
            return String::new();
        };
        if v.is_type() || v.is_module() {
            format!(", use {} instead.", self.render_value(v))
        } else if let Some(f) = v.as_func() {
            let info = func_info(f);
            let core_name = self.core_module().map(|c| self.module_name(c));
            let qualifier = match info.module_name {
                Some(module) if Some(module) != core_name => format!("{module}."),
                _ => String::new(),
            };
            format!(", use {}{} instead.", qualifier, info.name)
        } else {
            String::new()
        }
    }

    /// Short human-readable rendering of a value for diagnostics.
    fn render_value(&self, v: Value) -> String {
        match v.kind() {
            ValueKind::Float => v.as_float().map(|f| f.to_string()).unwrap_or_default(),
            ValueKind::Int => v.as_int().map(|i| i.to_string()).unwrap_or_default(),
            ValueKind::Bool => v.as_bool().map(|b| b.to_string()).unwrap_or_default(),
            ValueKind::Nothing => "nothing".to_owned(),
            ValueKind::Str => v
                .as_str()
                .map(|s| format!("\"{s}\""))
                .unwrap_or_default(),
            ValueKind::Module => v
                .as_module()
                .map(|id| self.module_name(id).to_string())
                .unwrap_or_default(),
            ValueKind::Type => v.as_type().map(|t| t.name()).unwrap_or_default(),
            ValueKind::Func => v
                .as_func()
                .map(|f| func_info(f).name.to_string())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::diag::CaptureSink;
    use vela_core::error::ModuleErrorKind;
    use vela_core::options::RuntimeOptions;

    fn registry_with_sink(depwarn: DepWarn) -> (ModuleRegistry, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        let opts = RuntimeOptions {
            depwarn,
            ..RuntimeOptions::default()
        };
        let reg = ModuleRegistry::with_sink(opts, sink.clone());
        reg.bootstrap();
        (reg, sink)
    }

    #[test]
    fn test_deprecate_then_use_warns() {
        let (reg, sink) = registry_with_sink(DepWarn::Warn);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let old = intern("old_name");
        reg.set_global(m, old, Value::int(1).unwrap()).unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);
        assert!(reg.is_binding_deprecated(m, old));

        let v = reg.get_global(m, old).unwrap();
        assert_eq!(v.unwrap().as_int(), Some(1));
        let warnings = sink.messages();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("WARNING: M.old_name is deprecated"));
        assert!(warnings[0].ends_with("in module M"));
    }

    #[test]
    fn test_depwarn_off_is_silent() {
        let (reg, sink) = registry_with_sink(DepWarn::Off);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let old = intern("old_name");
        reg.set_global(m, old, Value::int(1).unwrap()).unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);
        reg.get_global(m, old).unwrap();
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_depwarn_error_raises() {
        let (reg, sink) = registry_with_sink(DepWarn::Error);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let old = intern("old_name");
        reg.set_global(m, old, Value::int(1).unwrap()).unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);

        let err = reg.get_global(m, old).unwrap_err();
        assert_eq!(err.kind(), ModuleErrorKind::DeprecatedUse);
        assert_eq!(err.to_string(), "use of deprecated variable: M.old_name");
        // printed without the WARNING: prefix
        let warnings = sink.messages();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("M.old_name is deprecated"));
    }

    #[test]
    fn test_moved_binding_does_not_warn() {
        let (reg, sink) = registry_with_sink(DepWarn::Warn);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let gone = intern("gone");
        reg.set_global(m, gone, Value::int(1).unwrap()).unwrap();
        reg.deprecate_binding(m, gone, Deprecation::Moved);
        reg.get_global(m, gone).unwrap();
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_dep_message_from_companion_binding() {
        let (reg, sink) = registry_with_sink(DepWarn::Warn);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let old = intern("old_api");
        reg.set_global(m, old, Value::int(1).unwrap()).unwrap();
        reg.set_global(
            m,
            intern("_dep_message_old_api"),
            Value::string(intern(", use new_api instead.")),
        )
        .unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);

        reg.get_global(m, old).unwrap();
        let warnings = sink.messages();
        assert!(warnings[0].contains(", use new_api instead."));
    }

    #[test]
    fn test_dep_message_synthesized_from_module_value() {
        let (reg, sink) = registry_with_sink(DepWarn::Warn);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let repl = reg.new_module(intern("Replacement"), reg.main_module(), false);
        let old = intern("OldMod");
        reg.set_global(m, old, Value::module(repl)).unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);

        reg.get_global(m, old).unwrap();
        let warnings = sink.messages();
        assert!(warnings[0].contains(", use Replacement instead."));
    }

    #[test]
    fn test_dep_message_synthesized_from_function_value() {
        let (reg, sink) = registry_with_sink(DepWarn::Warn);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let f = vela_core::value::register_func(intern("new_func"), Some(intern("Helpers")));
        let old = intern("old_func");
        reg.set_global(m, old, Value::func(f)).unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);

        reg.get_global(m, old).unwrap();
        let warnings = sink.messages();
        assert!(warnings[0].contains(", use Helpers.new_func instead."));
    }

    #[test]
    fn test_dep_message_core_function_unqualified() {
        let (reg, sink) = registry_with_sink(DepWarn::Warn);
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        let f = vela_core::value::register_func(intern("collect"), Some(intern("Core")));
        let old = intern("gather");
        reg.set_global(m, old, Value::func(f)).unwrap();
        reg.deprecate_binding(m, old, Deprecation::Renamed);

        reg.get_global(m, old).unwrap();
        let warnings = sink.messages();
        assert!(warnings[0].contains(", use collect instead."));
        assert!(!warnings[0].contains("Core.collect"));
    }
}
