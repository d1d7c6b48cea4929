//! Error types for every phase of the toolchain.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ScToolsError (top-level wrapper)
//! ├── DeclarationError - duplicate/colliding identities, bad type graphs
//! ├── TypeError        - checker type rules (always reported as diagnostics)
//! ├── FormatError      - container framing, unknown magic, truncation
//! ├── EncodingError    - assembler/disassembler internal consistency
//! └── KeyError         - key material lookup
//! ```
//!
//! Declaration and type errors produced while checking a script are collected
//! into [`Diagnostics`](crate::Diagnostics) instead of being returned. The
//! other kinds abort the single operation that raised them.

use std::path::PathBuf;

use thiserror::Error;

use crate::SymbolId;

// ============================================================================
// Declaration Errors
// ============================================================================

/// Errors raised when registering symbols and types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeclarationError {
    /// The same name was registered twice.
    #[error("'{name}' is already declared")]
    DuplicateIdentity { name: String },

    /// Two different names hash to the same identity.
    #[error("'{name}' collides with '{existing}' (identity {id})")]
    HashCollision {
        name: String,
        existing: String,
        id: SymbolId,
    },

    /// Type declarations that never resolve, either because they reference
    /// unknown types or because they reference each other.
    #[error("undefined or circular type reference in: {}", names.join(", "))]
    UndefinedOrCircular { names: Vec<String> },

    /// A naked function declared arguments, locals or a return type.
    #[error("naked function '{name}' cannot have arguments, locals or a return type")]
    MalformedNakedFunction { name: String },

    /// A type cannot be removed while other registered types use it.
    #[error("type '{name}' is used by: {}", dependents.join(", "))]
    HasDependents { name: String, dependents: Vec<String> },

    /// A built-in placeholder that can never be removed.
    #[error("type '{name}' cannot be unregistered")]
    PermanentType { name: String },

    /// A referenced type name is not registered.
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    /// Text labels only exist for multiples of 8 between 8 and 248.
    #[error("invalid text label length {length}")]
    InvalidTextLabelLength { length: u32 },

    /// A label was defined twice in the same function.
    #[error("label '{name}' is already defined")]
    DuplicateLabel { name: String },

    /// A script has a single global segment, so at most one GLOBALS block.
    #[error("GLOBALS block '{name}' conflicts with block '{existing}'")]
    DuplicateGlobalBlock { name: String, existing: String },
}

// ============================================================================
// Type Errors
// ============================================================================

/// Type rule violations found while checking function bodies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("mismatched types: expected '{expected}', found '{found}'")]
    Mismatch { expected: String, found: String },

    #[error("unknown name '{name}'")]
    UnknownName { name: String },

    #[error("'{name}' is not a type")]
    NotAType { name: String },

    #[error("cannot call '{name}', it is not a procedure or a function")]
    NotCallable { name: String },

    #[error("mismatched number of arguments: expected {expected}, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("mismatched type of argument #{index}: expected '{expected}', found '{found}'")]
    ArgumentType {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("operator '{op}' is not defined for '{operand}'")]
    InvalidUnaryOperator { op: String, operand: String },

    #[error("operator '{op}' is not defined for '{lhs}' and '{rhs}'")]
    InvalidBinaryOperator { op: String, lhs: String, rhs: String },

    #[error("type '{ty}' has no field '{field}'")]
    UnknownField { ty: String, field: String },

    #[error("type '{ty}' cannot be indexed")]
    NotIndexable { ty: String },

    #[error("{context} requires {expected} type, found '{found}'")]
    RequiredType {
        context: String,
        expected: String,
        found: String,
    },

    #[error("expression cannot be assigned to")]
    NotAnLValue,

    #[error("returned type '{found}' does not match the function return type '{expected}'")]
    ReturnMismatch { expected: String, found: String },

    #[error("function must return a value of type '{expected}'")]
    MissingReturnValue { expected: String },

    #[error("procedures cannot return a value")]
    UnexpectedReturnValue,

    #[error("unknown label '{name}'")]
    UnknownLabel { name: String },

    /// `kind` is `static` or `global`.
    #[error("{kind} '{name}': {reason}")]
    InvalidStaticInitializer {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A type name where a value is expected. Only `SIZE_OF` takes types.
    #[error("type '{name}' cannot be used as a value")]
    TypeAsValue { name: String },

    #[error("duplicate SWITCH case value {value}")]
    DuplicateCase { value: i32 },
}

// ============================================================================
// Format Errors
// ============================================================================

/// Errors decoding or encoding a container image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("unrecognized container format (magic 0x{magic:08X})")]
    UnrecognizedMagic { magic: u32 },

    #[error("truncated container: {context}")]
    Truncated { context: String },

    #[error("{what} length mismatch: expected {expected}, found {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("compression failed: {message}")]
    Compression { message: String },
}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::Truncated {
            context: e.to_string(),
        }
    }
}

// ============================================================================
// Encoding Errors
// ============================================================================

/// Internal-consistency failures in the assembler, static initializer and
/// disassembler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    #[error("unresolved label '{name}'")]
    UnresolvedLabel { name: String },

    #[error("label '{name}' is defined more than once")]
    DuplicateLabel { name: String },

    #[error("unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { mnemonic: String },

    #[error("{mnemonic} expects {expected} operand(s), found {found}")]
    OperandCount {
        mnemonic: String,
        expected: String,
        found: usize,
    },

    #[error("{mnemonic} operand #{index} must be {expected}")]
    OperandType {
        mnemonic: String,
        index: usize,
        expected: &'static str,
    },

    #[error("{mnemonic} operand {value} does not fit in {width}")]
    OperandOutOfRange {
        mnemonic: String,
        value: i64,
        width: &'static str,
    },

    #[error("relative jump to '{label}' is out of range (offset {offset})")]
    JumpOutOfRange { label: String, offset: i64 },

    #[error("static initializer for '{ty}' wrote {written} bytes, expected {expected}")]
    StaticSizeMismatch {
        ty: String,
        expected: usize,
        written: usize,
    },

    #[error("instruction {mnemonic} at {ip:#06X} declares {declared} bytes but decodes {consumed}")]
    LengthMismatch {
        ip: usize,
        mnemonic: String,
        declared: usize,
        consumed: usize,
    },

    #[error("instruction at {ip:#06X} runs past the end of the code")]
    TruncatedInstruction { ip: usize },

    #[error("code generation does not support {what}")]
    UnsupportedExpression { what: String },
}

// ============================================================================
// Key Errors
// ============================================================================

/// Errors recovering key material.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    #[error("AES key for {target} not found in '{}'", path.display())]
    NotFound { target: String, path: PathBuf },

    #[error("no key available for {target}")]
    Missing { target: String },

    #[error("no cached key and no executable configured for {target}")]
    NoExecutable { target: String },

    #[error("i/o error on '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },
}

// ============================================================================
// Unified Error
// ============================================================================

/// Top-level error wrapping every phase.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScToolsError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Result alias over [`ScToolsError`].
pub type Result<T> = std::result::Result<T, ScToolsError>;
