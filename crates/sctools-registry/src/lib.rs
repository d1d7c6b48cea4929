//! Type registry for the scripting toolchain.
//!
//! - [`Type`] - the structurally identified type model, with byte sizes and
//!   struct field offsets
//! - [`TypeRegistry`] - interning store keyed by identity hash, with
//!   dependency-aware removal
//! - [`builtins`] - the types every script can name

pub mod builtins;
mod registry;
mod types;

pub use registry::TypeRegistry;
pub use types::{
    ArrayType, EnumType, Field, FunctionType, HandleKind, SLOT_SIZE, StructType,
    TEXT_LABEL_MAX_LENGTH, TEXT_LABEL_MIN_LENGTH, Type, is_valid_text_label_length,
    text_label_lengths, text_label_type_name,
};
