//! Bytecode encoding.
//!
//! - [`Opcode`] / [`Op`] - the instruction set and its length rule
//! - [`CodeBuffer`] - emitted bytes plus deferred label fix-ups

mod code_buffer;
mod opcode;

pub use code_buffer::{CodeBuffer, Fixup, FixupKind};
pub use opcode::{Op, Opcode, OperandLayout, PUSH_CONST_SMALL_MAX, PUSH_CONST_SMALL_MIN};
