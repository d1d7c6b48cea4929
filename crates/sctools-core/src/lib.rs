//! Core types shared by the scripting toolchain.
//!
//! This crate has no knowledge of scripts, types or containers. It provides
//! the vocabulary every other crate speaks:
//!
//! - [`SymbolId`] - case-insensitive 32-bit identity hash
//! - [`ScriptValue`] - the 4-byte storage cell of statics and globals
//! - [`Literal`] - compile-time constants
//! - [`Span`] - source locations
//! - [`Diagnostics`] - collected checker messages
//! - error types for every phase, unified under [`ScToolsError`]

mod diagnostics;
mod error;
mod hash;
mod literal;
mod script_value;
mod span;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{
    DeclarationError, EncodingError, FormatError, KeyError, Result, ScToolsError, TypeError,
};
pub use hash::SymbolId;
pub use literal::Literal;
pub use script_value::ScriptValue;
pub use span::Span;
