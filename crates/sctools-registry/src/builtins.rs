//! Built-in types every script can name without declaring them.

use crate::types::{HandleKind, Type, text_label_lengths};

/// Primitive types addressable by name.
pub const PRIMITIVES: [Type; 6] = [
    Type::Any,
    Type::Int,
    Type::Float,
    Type::Bool,
    Type::String,
    Type::Vector,
];

/// Every built-in type: primitives, `VECTOR`, the handle types and the text
/// labels of every valid length. `AUTO` is not included; the registry always
/// holds it.
pub fn builtin_types() -> Vec<Type> {
    PRIMITIVES
        .into_iter()
        .chain(HandleKind::ALL.into_iter().map(Type::Handle))
        .chain(text_label_lengths().map(Type::TextLabel))
        .collect()
}
