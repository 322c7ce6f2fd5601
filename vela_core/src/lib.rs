//! Core types shared across the Vela runtime.
//!
//! This crate provides the pieces the module and binding subsystem is built
//! on: the global symbol interner, the NaN-boxed [`Value`] model with its
//! atomic cells, the binding error type, runtime options, and the
//! diagnostic sink.
//!
//! Nothing here knows about modules; `vela_runtime` layers the namespace
//! machinery on top.

pub mod diag;
pub mod error;
pub mod intern;
pub mod options;
pub mod value;

pub use diag::{CaptureSink, DiagnosticSink, StderrSink};
pub use error::{ModuleError, ModuleErrorKind, ModuleResult};
pub use intern::{intern, Symbol};
pub use options::{DepWarn, RuntimeOptions};
pub use value::{
    func_info, register_func, FuncId, FuncInfo, ModuleId, TypeCell, TypeId, Value, ValueCell,
    ValueKind,
};
