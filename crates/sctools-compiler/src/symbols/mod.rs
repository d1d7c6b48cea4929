//! Symbols and the tables that resolve them.
//!
//! - [`Symbol`] - a named, typed entity
//! - [`GlobalSymbolTable`] - built-in and top-level declarations
//! - [`ScopeSymbolTable`] - block-scoped arguments and locals of one function
//! - [`LabelSymbolTable`] - statement labels of one function
//!
//! All lookups are case-insensitive: every table is keyed by the identity
//! hash of the name.

mod global;
mod label;
mod scope;

pub use global::GlobalSymbolTable;
pub use label::{LabelSymbol, LabelSymbolTable};
pub use scope::ScopeSymbolTable;

use sctools_core::{Literal, Span, SymbolId};
use sctools_registry::Type;

/// Whether a function symbol is compiled from script or provided by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Script,
    Native,
}

/// A named, typed entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// A type name.
    Type { name: String, ty: Type, span: Span },
    /// A static variable or script argument.
    StaticField {
        name: String,
        ty: Type,
        is_arg: bool,
        initializer: Option<Literal>,
        span: Span,
    },
    /// A variable of the script's GLOBALS block.
    GlobalField { name: String, ty: Type, span: Span },
    /// A function, procedure or native. `ty` is always a [`Type::Function`].
    Function {
        name: String,
        ty: Type,
        kind: FunctionKind,
        span: Span,
    },
    /// A function argument at a frame slot.
    Arg {
        name: String,
        ty: Type,
        slot: u32,
        span: Span,
    },
    /// A local variable at a frame slot.
    Local {
        name: String,
        ty: Type,
        slot: u32,
        span: Span,
    },
    /// A member of an enum; its type is the enum.
    EnumMember {
        name: String,
        ty: Type,
        value: i32,
        span: Span,
    },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Type { name, .. }
            | Symbol::StaticField { name, .. }
            | Symbol::GlobalField { name, .. }
            | Symbol::Function { name, .. }
            | Symbol::Arg { name, .. }
            | Symbol::Local { name, .. }
            | Symbol::EnumMember { name, .. } => name,
        }
    }

    #[inline]
    pub fn id(&self) -> SymbolId {
        SymbolId::from_name(self.name())
    }

    /// The symbol's type. For a type symbol, this is the named type itself.
    pub fn ty(&self) -> &Type {
        match self {
            Symbol::Type { ty, .. }
            | Symbol::StaticField { ty, .. }
            | Symbol::GlobalField { ty, .. }
            | Symbol::Function { ty, .. }
            | Symbol::Arg { ty, .. }
            | Symbol::Local { ty, .. }
            | Symbol::EnumMember { ty, .. } => ty,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Symbol::Type { span, .. }
            | Symbol::StaticField { span, .. }
            | Symbol::GlobalField { span, .. }
            | Symbol::Function { span, .. }
            | Symbol::Arg { span, .. }
            | Symbol::Local { span, .. }
            | Symbol::EnumMember { span, .. } => *span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Symbol::Type { .. } => "type",
            Symbol::StaticField { is_arg: true, .. } => "script argument",
            Symbol::StaticField { .. } => "static",
            Symbol::GlobalField { .. } => "global",
            Symbol::Function {
                kind: FunctionKind::Native,
                ..
            } => "native",
            Symbol::Function { .. } => "function",
            Symbol::Arg { .. } => "argument",
            Symbol::Local { .. } => "local",
            Symbol::EnumMember { .. } => "enum member",
        }
    }

    #[inline]
    pub fn is_type(&self) -> bool {
        matches!(self, Symbol::Type { .. })
    }

    /// Statics, globals, arguments and locals name storage.
    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            Symbol::StaticField { .. }
                | Symbol::GlobalField { .. }
                | Symbol::Arg { .. }
                | Symbol::Local { .. }
        )
    }
}
