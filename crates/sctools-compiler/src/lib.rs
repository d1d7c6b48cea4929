//! Compiler for the scripting language.
//!
//! ## Pipeline
//!
//! - **Check**: [`checker`] resolves an [`ast::Script`] against the type
//!   registry and the [`symbols`] tables into a [`TypedProgram`], collecting
//!   diagnostics
//! - **Generate**: [`codegen`] lowers the typed program to
//!   [`FunctionDefinition`]s and [`StaticField`]s
//! - **Assemble**: [`assemble_with_globals`] encodes them into code bytes and
//!   the static and global segments
//!
//! The way back is [`disassemble`] and the [`printer`] listing.
//!
//! ## Modules
//!
//! - [`ast`]: Tree handed over by the parser
//! - [`bytecode`]: Opcodes, the length rule and the fix-up buffer
//! - [`checker`]: Two-pass semantic checker
//! - [`symbols`]: Global, scope and label symbol tables
//! - [`codegen`]: Typed program to assembly statements
//! - [`assembler`]: Two-pass assembler
//! - [`static_init`]: Static and global segment layout and initialization
//! - [`disassembler`]: Code bytes back to instructions
//! - [`printer`]: Text listings

pub mod assembler;
pub mod ast;
pub mod bytecode;
pub mod checker;
pub mod codegen;
pub mod disassembler;
mod function_def;
mod options;
pub mod printer;
pub mod static_init;
pub mod symbols;

pub use assembler::{AssembledScript, assemble, assemble_with_globals};
pub use checker::{CheckOutput, Checker, TypedProgram, check};
pub use codegen::{GeneratedScript, generate};
pub use disassembler::{Disassembly, Instruction, NativeDb, disassemble};
pub use function_def::{
    AsmStatement, ENTRY_POINT_NAME, FieldDef, FunctionDefinition, FunctionFlags, Operand,
    StaticField,
};
pub use options::CodegenOptions;
pub use printer::{Listing, ScriptParts};
pub use static_init::{StaticSegment, build_static_segment};
