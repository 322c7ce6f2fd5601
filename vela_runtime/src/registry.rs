//! The module registry: single owner of every module in the runtime.
//!
//! Modules are kept in an append-only arena and referred to by [`ModuleId`]
//! handles; cross-module references (parents, `using` edges, owner aliases)
//! are handles or shared binding records, never owning pointers into another
//! module. The registry also carries the process-wide pieces: the three
//! well-known modules (Core, Base, Main), runtime options, the diagnostic
//! sink, the deferred init-order queue, and the build-id uniquifier.

use crate::module::{Module, Uuid128, KNOB_INHERIT};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use vela_core::diag::{DiagnosticSink, StderrSink};
use vela_core::intern::{intern, Symbol};
use vela_core::options::RuntimeOptions;
use vela_core::value::{ModuleId, Value};

/// Hook invoked for each restored module whose initializer should run.
pub type ModuleInitFn = Box<dyn Fn(&ModuleRegistry, ModuleId) + Send + Sync>;

/// Owner of all modules and of the runtime-global state around them.
pub struct ModuleRegistry {
    /// Arena; a `ModuleId` is an index into it. Append-only.
    modules: RwLock<Vec<Arc<Module>>>,

    core: OnceLock<ModuleId>,
    base: OnceLock<ModuleId>,
    main: OnceLock<ModuleId>,
    /// Primary top-level module designated via `set_istopmod`.
    top_module: RwLock<Option<ModuleId>>,

    options: RuntimeOptions,
    sink: Arc<dyn DiagnosticSink>,

    /// Modules whose initializers were deferred while generating output.
    init_order: Mutex<Vec<ModuleId>>,
    initializer: RwLock<Option<ModuleInitFn>>,

    /// Counter folded into build ids in case the clock does not advance
    /// between constructions.
    build_id_counter: AtomicU64,
}

impl ModuleRegistry {
    pub fn new(options: RuntimeOptions) -> Self {
        Self::with_sink(options, Arc::new(StderrSink))
    }

    pub fn with_sink(options: RuntimeOptions, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
            core: OnceLock::new(),
            base: OnceLock::new(),
            main: OnceLock::new(),
            top_module: RwLock::new(None),
            options,
            sink,
            init_order: Mutex::new(Vec::new()),
            initializer: RwLock::new(None),
            build_id_counter: AtomicU64::new(0),
        }
    }

    /// Create the three well-known modules. Core comes first so that Base
    /// and Main (and every later `default_names` module) pick up
    /// `using Core`; Base is parented to Main.
    pub fn bootstrap(&self) {
        let core = self.new_module(intern("Core"), None, true);
        let _ = self.core.set(core);
        let main = self.new_module(intern("Main"), None, true);
        let _ = self.main.set(main);
        let base = self.new_module(intern("Base"), Some(main), true);
        let _ = self.base.set(base);
    }

    #[inline]
    pub fn core_module(&self) -> Option<ModuleId> {
        self.core.get().copied()
    }

    #[inline]
    pub fn base_module(&self) -> Option<ModuleId> {
        self.base.get().copied()
    }

    #[inline]
    pub fn main_module(&self) -> Option<ModuleId> {
        self.main.get().copied()
    }

    #[inline]
    pub fn top_module(&self) -> Option<ModuleId> {
        *self.top_module.read()
    }

    #[inline]
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Look up a module by handle.
    ///
    /// Panics on a handle that was never issued by this registry; handles
    /// are not forgeable through the public API.
    pub fn module(&self, id: ModuleId) -> Arc<Module> {
        Arc::clone(&self.modules.read()[id.raw() as usize])
    }

    pub(crate) fn warn(&self, message: impl AsRef<str>) {
        self.sink.warn(message.as_ref());
    }

    pub(crate) fn name_text(&self, m: ModuleId) -> Arc<str> {
        self.module(m).name().text()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Allocate a new module. `parent = None` makes the module its own
    /// parent (a root). With `default_names`, the module gets `using Core`,
    /// plus a constant binding of its own name to itself so that
    /// `using Foo` exposes `Foo`. The name is always exported.
    pub fn new_module(
        &self,
        name: Symbol,
        parent: Option<ModuleId>,
        default_names: bool,
    ) -> ModuleId {
        let build_id_lo = self.next_build_id();
        let id = {
            let mut modules = self.modules.write();
            let id = ModuleId::from_raw(modules.len() as u32);
            let parent = parent.unwrap_or(id);
            modules.push(Arc::new(Module::new(id, name, parent, build_id_lo)));
            id
        };
        if default_names {
            if let Some(core) = self.core_module() {
                if core != id {
                    self.module_using(id, core);
                }
            }
            self.set_const(id, name, Value::module(id))
                .expect("fresh module has no binding for its own name yet");
        }
        self.module_export(id, name);
        id
    }

    /// New module parented to Main, for modules entered at the top level.
    pub fn new_toplevel_module(&self, name: Symbol, default_names: bool) -> ModuleId {
        self.new_module(name, self.main_module(), default_names)
    }

    /// Build-id low word: monotonic clock plus a counter so two modules
    /// constructed in the same clock tick still differ. Zero is invalid.
    fn next_build_id(&self) -> u64 {
        let clock = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        let lo = clock.wrapping_add(self.build_id_counter.fetch_add(1, Ordering::Relaxed) + 1);
        if lo == 0 {
            1
        } else {
            lo
        }
    }

    // =========================================================================
    // Module metadata
    // =========================================================================

    #[inline]
    pub fn module_name(&self, m: ModuleId) -> Symbol {
        self.module(m).name()
    }

    #[inline]
    pub fn module_parent(&self, m: ModuleId) -> ModuleId {
        self.module(m).parent()
    }

    #[inline]
    pub fn module_uuid(&self, m: ModuleId) -> Uuid128 {
        self.module(m).uuid()
    }

    pub fn set_module_uuid(&self, m: ModuleId, uuid: Uuid128) {
        self.module(m).set_uuid(uuid);
    }

    #[inline]
    pub fn module_build_id(&self, m: ModuleId) -> Uuid128 {
        self.module(m).build_id()
    }

    /// Fetch-add the module's internal name counter.
    #[inline]
    pub fn next_counter(&self, m: ModuleId) -> u32 {
        self.module(m).next_counter()
    }

    /// Mark `m` as a top-level module; with `primary`, it becomes the
    /// registry's designated top module.
    pub fn set_istopmod(&self, m: ModuleId, primary: bool) {
        self.module(m).mark_topmod();
        if primary {
            *self.top_module.write() = Some(m);
        }
    }

    #[inline]
    pub fn istopmod(&self, m: ModuleId) -> bool {
        self.module(m).istopmod()
    }

    /// Walk parent edges; true when `parent` is reached.
    pub fn is_submodule(&self, child: ModuleId, parent: ModuleId) -> bool {
        let mut cur = child;
        loop {
            if cur == parent {
                return true;
            }
            let module = self.module(cur);
            if module.parent() == cur {
                return false;
            }
            cur = module.parent();
        }
    }

    // =========================================================================
    // Inheritable knobs
    // =========================================================================

    pub fn set_optlevel(&self, m: ModuleId, lvl: i32) {
        self.module(m).set_raw_optlevel(lvl);
    }

    pub fn optlevel(&self, m: ModuleId) -> i32 {
        self.inherited_knob(m, Module::raw_optlevel)
    }

    pub fn set_compile(&self, m: ModuleId, value: i32) {
        self.module(m).set_raw_compile(value);
    }

    pub fn compile(&self, m: ModuleId) -> i32 {
        self.inherited_knob(m, Module::raw_compile)
    }

    /// Turning inference off also disables specialization.
    pub fn set_infer(&self, m: ModuleId, value: i32) {
        let module = self.module(m);
        module.set_raw_infer(value);
        if value == 0 {
            module.set_nospecialize(true);
        }
    }

    pub fn infer(&self, m: ModuleId) -> i32 {
        self.inherited_knob(m, Module::raw_infer)
    }

    pub fn set_max_methods(&self, m: ModuleId, value: i32) {
        self.module(m).set_raw_max_methods(value);
    }

    pub fn max_methods(&self, m: ModuleId) -> i32 {
        self.inherited_knob(m, Module::raw_max_methods)
    }

    pub fn set_nospecialize(&self, m: ModuleId, on: bool) {
        self.module(m).set_nospecialize(on);
    }

    pub fn nospecialize(&self, m: ModuleId) -> i32 {
        self.module(m).nospecialize()
    }

    /// Resolve a knob along the parent chain, stopping at a self-parented
    /// root or at Base.
    fn inherited_knob(&self, m: ModuleId, read: impl Fn(&Module) -> i32) -> i32 {
        let base = self.base_module();
        let mut module = self.module(m);
        let mut value = read(&module);
        while value == KNOB_INHERIT && module.parent() != module.id() && Some(module.id()) != base {
            module = self.module(module.parent());
            value = read(&module);
        }
        value
    }

    // =========================================================================
    // Name enumeration and maintenance
    // =========================================================================

    /// Names visible in `m`: exported names, explicitly imported ones when
    /// `imported` is set, and self-owned unexported names (everywhere with
    /// `all`, otherwise only in Main). Hidden (`#`-prefixed) and deprecated
    /// names are filtered unless `all`.
    pub fn module_names(&self, m: ModuleId, all: bool, imported: bool) -> Vec<Symbol> {
        let main = self.main_module();
        let module = self.module(m);
        let inner = module.lock();
        inner
            .bindings
            .iter()
            .filter(|(name, b)| {
                let wanted = b.is_exported()
                    || (imported && b.is_imported())
                    || (b.is_self_owned() && !b.is_imported() && (all || Some(m) == main));
                wanted && (all || (!b.is_deprecated() && !name.is_hidden()))
            })
            .map(|(&name, _)| name)
            .collect()
    }

    /// Snapshot of the `using` list, most recent first.
    pub fn module_usings(&self, m: ModuleId) -> Vec<ModuleId> {
        let module = self.module(m);
        let inner = module.lock();
        inner.usings.iter().rev().copied().collect()
    }

    /// Drop every binding that is neither self-owned nor explicitly
    /// imported, resetting the module's implicit resolution decisions.
    /// Intended for modules that are essentially empty.
    pub fn clear_implicit_imports(&self, m: ModuleId) {
        let module = self.module(m);
        let mut inner = module.lock();
        inner
            .bindings
            .retain(|_, b| b.is_self_owned() || b.is_imported());
    }

    // =========================================================================
    // Restored-module initialization
    // =========================================================================

    /// Install the hook that runs a restored module's initializer.
    pub fn set_module_initializer(&self, f: ModuleInitFn) {
        *self.initializer.write() = Some(f);
    }

    /// Run (or defer) initializers for modules restored from a compiled
    /// image. While generating non-incremental output, initializers are
    /// pushed onto the init-order queue instead of running.
    pub fn init_restored_modules(&self, modules: &[ModuleId]) {
        for &m in modules {
            if !self.options.generating_output || self.options.incremental {
                if let Some(init) = self.initializer.read().as_ref() {
                    init(self, m);
                }
            } else {
                self.init_order.lock().push(m);
            }
        }
    }

    /// Drain the deferred init-order queue.
    pub fn take_deferred_inits(&self) -> Vec<ModuleId> {
        std::mem::take(&mut self.init_order.lock())
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.read().len())
            .field("core", &self.core.get())
            .field("base", &self.base.get())
            .field("main", &self.main.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModuleRegistry {
        let reg = ModuleRegistry::new(RuntimeOptions::default());
        reg.bootstrap();
        reg
    }

    #[test]
    fn test_bootstrap_wellknown() {
        let reg = registry();
        let core = reg.core_module().unwrap();
        let main = reg.main_module().unwrap();
        let base = reg.base_module().unwrap();
        assert_eq!(reg.module_name(core), intern("Core"));
        assert_eq!(reg.module_parent(core), core);
        assert_eq!(reg.module_parent(main), main);
        assert_eq!(reg.module_parent(base), main);
    }

    #[test]
    fn test_build_ids_unique_and_nonzero() {
        let reg = registry();
        let a = reg.new_module(intern("A"), reg.main_module(), false);
        let b = reg.new_module(intern("B"), reg.main_module(), false);
        let bid_a = reg.module_build_id(a);
        let bid_b = reg.module_build_id(b);
        assert_ne!(bid_a.lo, 0);
        assert_ne!(bid_b.lo, 0);
        assert_ne!(bid_a.lo, bid_b.lo);
        // high word is the "not yet serialized" sentinel
        assert_eq!(bid_a.hi, !0u64);
    }

    #[test]
    fn test_knob_inheritance() {
        let reg = registry();
        let outer = reg.new_module(intern("Outer"), reg.main_module(), false);
        let inner = reg.new_module(intern("Inner"), Some(outer), false);

        assert_eq!(reg.optlevel(inner), KNOB_INHERIT);
        reg.set_optlevel(outer, 2);
        assert_eq!(reg.optlevel(inner), 2);
        reg.set_optlevel(inner, 0);
        assert_eq!(reg.optlevel(inner), 0);
        assert_eq!(reg.optlevel(outer), 2);
    }

    #[test]
    fn test_knob_inheritance_stops_at_base() {
        let reg = registry();
        let base = reg.base_module().unwrap();
        let main = reg.main_module().unwrap();
        // Base inherits; its parent (Main) must not be consulted.
        reg.set_optlevel(main, 3);
        assert_eq!(reg.optlevel(base), KNOB_INHERIT);
    }

    #[test]
    fn test_infer_zero_disables_specialization() {
        let reg = registry();
        let m = reg.new_module(intern("M"), reg.main_module(), false);
        assert_eq!(reg.nospecialize(m), 0);
        reg.set_infer(m, 0);
        assert_eq!(reg.nospecialize(m), -1);
    }

    #[test]
    fn test_is_submodule() {
        let reg = registry();
        let main = reg.main_module().unwrap();
        let a = reg.new_module(intern("A"), Some(main), false);
        let b = reg.new_module(intern("B"), Some(a), false);
        assert!(reg.is_submodule(b, a));
        assert!(reg.is_submodule(b, main));
        assert!(reg.is_submodule(a, a));
        assert!(!reg.is_submodule(a, b));
        assert!(!reg.is_submodule(main, a));
    }

    #[test]
    fn test_set_istopmod_primary() {
        let reg = registry();
        let main = reg.main_module().unwrap();
        assert!(reg.top_module().is_none());
        reg.set_istopmod(main, true);
        assert!(reg.istopmod(main));
        assert_eq!(reg.top_module(), Some(main));
    }

    #[test]
    fn test_init_restored_modules_immediate() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let reg = registry();
        let m = reg.new_module(intern("Restored"), reg.main_module(), false);
        static RAN: AtomicUsize = AtomicUsize::new(0);
        reg.set_module_initializer(Box::new(|_, _| {
            RAN.fetch_add(1, Ordering::SeqCst);
        }));
        reg.init_restored_modules(&[m]);
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
        assert!(reg.take_deferred_inits().is_empty());
    }

    #[test]
    fn test_init_restored_modules_deferred() {
        let opts = RuntimeOptions {
            generating_output: true,
            ..RuntimeOptions::default()
        };
        let reg = ModuleRegistry::new(opts);
        reg.bootstrap();
        let m = reg.new_module(intern("Deferred"), reg.main_module(), false);
        reg.init_restored_modules(&[m]);
        assert_eq!(reg.take_deferred_inits(), vec![m]);
        assert!(reg.take_deferred_inits().is_empty());
    }

    #[test]
    fn test_next_counter_per_module() {
        let reg = registry();
        let a = reg.new_module(intern("A"), reg.main_module(), false);
        let b = reg.new_module(intern("B"), reg.main_module(), false);
        assert_eq!(reg.next_counter(a), 1);
        assert_eq!(reg.next_counter(a), 2);
        assert_eq!(reg.next_counter(b), 1);
    }
}
