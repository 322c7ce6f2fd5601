//! Error type for module and binding operations.
//!
//! Warnings never surface here; they go to the diagnostic sink. An error is
//! raised only for the hard failure modes of the binding subsystem.

/// Classification of a binding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleErrorKind {
    /// Write to a name whose binding is owned by another module and was not
    /// explicitly imported.
    AssignToImported,
    /// Method definition on a non-type, non-imported name.
    MethodNotExplicitlyImported,
    /// Illegal rebinding of a constant.
    InvalidConstantRedefinition,
    /// Value does not conform to the binding's declared type.
    IncompatibleTypedAssignment,
    /// Read-or-error on a name that resolves to nothing.
    UndefinedVar,
    /// Use of a deprecated binding while `depwarn` is set to error.
    DeprecatedUse,
}

/// A binding operation failure: a kind plus a rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    kind: ModuleErrorKind,
    message: String,
}

pub type ModuleResult<T> = Result<T, ModuleError>;

impl ModuleError {
    pub fn new(kind: ModuleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[inline]
    pub fn kind(&self) -> ModuleErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn assign_to_imported(module: &str, var: &str) -> Self {
        Self::new(
            ModuleErrorKind::AssignToImported,
            format!("cannot assign a value to imported variable {module}.{var}"),
        )
    }

    pub fn method_not_imported(module: &str, var: &str) -> Self {
        Self::new(
            ModuleErrorKind::MethodNotExplicitlyImported,
            format!(
                "error in method definition: function {module}.{var} must be explicitly imported to be extended"
            ),
        )
    }

    /// `qualified` is the name as it should appear in the message, either
    /// bare (`k`) or module-qualified (`M.k`).
    pub fn const_redefinition(qualified: impl std::fmt::Display) -> Self {
        Self::new(
            ModuleErrorKind::InvalidConstantRedefinition,
            format!("invalid redefinition of constant {qualified}"),
        )
    }

    pub fn incompatible_assignment(module: &str, var: &str) -> Self {
        Self::new(
            ModuleErrorKind::IncompatibleTypedAssignment,
            format!("cannot assign an incompatible value to the global {module}.{var}."),
        )
    }

    pub fn undefined_var(var: &str) -> Self {
        Self::new(ModuleErrorKind::UndefinedVar, format!("{var} not defined"))
    }

    pub fn deprecated_use(module: &str, var: &str) -> Self {
        Self::new(
            ModuleErrorKind::DeprecatedUse,
            format!("use of deprecated variable: {module}.{var}"),
        )
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ModuleError {}
