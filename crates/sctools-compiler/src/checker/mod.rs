//! Semantic checker.
//!
//! Checking runs in two passes over an [`ast::Script`](crate::ast::Script):
//!
//! - [`declarations`]: Pass 1 - hoist enums, structs, statics, globals,
//!   natives and function signatures into the global symbol table
//! - [`bodies`]: Pass 2 - type check data initializers and function bodies
//!   into a [`TypedProgram`]
//!
//! Problems never abort the check. Every declaration and type error becomes a
//! [`Diagnostic`](sctools_core::Diagnostic) and checking carries on with the
//! next declaration or statement.
//!
//! # Example
//!
//! ```
//! use sctools_compiler::ast::{FunctionDecl, Item, Script};
//! use sctools_compiler::checker::check;
//! use sctools_core::Span;
//!
//! let script = Script {
//!     items: vec![Item::Function(FunctionDecl {
//!         name: "main".into(),
//!         params: vec![],
//!         return_type: None,
//!         body: vec![],
//!         span: Span::default(),
//!     })],
//! };
//! let output = check(&script);
//! assert!(output.is_success());
//! assert_eq!(output.program.functions.len(), 1);
//! ```

mod bodies;
mod declarations;
mod expr;
mod typed;

pub(crate) use bodies::needs_default_init;
pub use typed::{
    Conversion, TypedExpr, TypedExprKind, TypedFunction, TypedNative, TypedProgram, TypedStatic,
    TypedStmt,
};

use tracing::debug;

use sctools_core::Diagnostics;
use sctools_registry::TypeRegistry;

use crate::ast::Script;
use crate::symbols::GlobalSymbolTable;

/// Result of checking a script.
#[derive(Debug, Clone)]
pub struct CheckOutput {
    pub program: TypedProgram,
    pub diagnostics: Diagnostics,
}

impl CheckOutput {
    /// No errors were reported. Warnings are allowed.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Check a script against the built-in types.
pub fn check(script: &Script) -> CheckOutput {
    Checker::new().check(script)
}

/// A single-use checker for one compilation unit.
#[derive(Debug)]
pub struct Checker {
    registry: TypeRegistry,
    globals: GlobalSymbolTable,
    diagnostics: Diagnostics,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker {
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::with_builtins())
    }

    /// Check against a caller-provided set of types. Every type in the
    /// registry can be named by the script.
    pub fn with_registry(registry: TypeRegistry) -> Self {
        let globals = GlobalSymbolTable::with_types(&registry);
        Self {
            registry,
            globals,
            diagnostics: Diagnostics::new(),
        }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn check(mut self, script: &Script) -> CheckOutput {
        let declared = self.declare(script);
        let bodies = self.check_bodies(&declared);

        debug!(
            statics = bodies.statics.len(),
            globals = bodies.globals.len(),
            functions = bodies.functions.len(),
            natives = declared.natives.len(),
            errors = self.diagnostics.error_count(),
            warnings = self.diagnostics.warning_count(),
            "checked script"
        );

        CheckOutput {
            program: TypedProgram {
                types: self.registry,
                globals: self.globals,
                statics: bodies.statics,
                global_vars: bodies.globals,
                natives: declared.natives,
                functions: bodies.functions,
            },
            diagnostics: self.diagnostics,
        }
    }
}
