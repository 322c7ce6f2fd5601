//! Module and binding subsystem of the Vela runtime.
//!
//! This crate implements hierarchical namespaces and the machinery around
//! them: global bindings with constants and typed globals, name resolution
//! across transitive `using`/`import` relationships, export and deprecation
//! handling, and the concurrency discipline that protects all of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 ModuleRegistry                    │
//! │  arena of modules · Core/Base/Main · options     │
//! │  diagnostic sink · init-order queue              │
//! ├──────────────────────────────────────────────────┤
//! │  ┌────────────┐   usings    ┌────────────┐       │
//! │  │  Module A  │────────────▶│  Module B  │       │
//! │  │ bindings   │             │ bindings   │       │
//! │  └─────┬──────┘             └─────┬──────┘       │
//! │        │ Arc<Binding>             │              │
//! │        ▼                          ▼              │
//! │   Binding { value, ty, owner, flags }            │
//! │        ▲ owner: Alias ───────────▶ (B's record)  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Resolution (`get_binding`) walks `usings` newest→oldest, promotes the
//! result into an implicit import record, and always returns a self-owned
//! binding. Assignment (`set_global`/`set_const`) enforces the declared
//! type and constness against the binding's atomic cells.
//!
//! # Example
//!
//! ```
//! use vela_core::{intern, RuntimeOptions, Value};
//! use vela_runtime::ModuleRegistry;
//!
//! let registry = ModuleRegistry::new(RuntimeOptions::default());
//! registry.bootstrap();
//!
//! let math = registry.new_toplevel_module(intern("Math"), true);
//! registry.set_const(math, intern("pi"), Value::float(3.141592653589793)).unwrap();
//! registry.module_export(math, intern("pi"));
//!
//! let user = registry.new_toplevel_module(intern("User"), true);
//! registry.module_using(user, math);
//! let pi = registry.get_global(user, intern("pi")).unwrap();
//! assert_eq!(pi.unwrap().as_float(), Some(3.141592653589793));
//! ```

pub mod assign;
pub mod binding;
pub mod deprecation;
pub mod module;
pub mod registry;
pub mod resolver;

pub use binding::{eq_bindings, Binding, BindingOwner, Deprecation, GlobalRef};
pub use module::{Module, Uuid128, KNOB_INHERIT};
pub use registry::{ModuleInitFn, ModuleRegistry};
