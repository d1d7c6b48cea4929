//! Literal values used by initializers and assembly operands.

use std::fmt;

use ordered_float::OrderedFloat;

use crate::ScriptValue;

/// A constant value known at compile time.
///
/// `Eq` and `Hash` are implemented (floats compare by total order) so literals
/// can be part of structurally hashed types, e.g. struct field initializers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i32),
    Float(OrderedFloat<f32>),
    Bool(bool),
    String(String),
    Null,
}

impl Literal {
    /// Shorthand for `Literal::Float(OrderedFloat(v))`.
    #[inline]
    pub fn float(v: f32) -> Self {
        Literal::Float(OrderedFloat(v))
    }

    /// The single-slot representation of this literal, if it has one.
    ///
    /// Strings have no slot representation; they are materialized byte-wise
    /// into text labels.
    pub fn to_script_value(&self) -> Option<ScriptValue> {
        match self {
            Literal::Int(v) => Some(ScriptValue::from_i32(*v)),
            Literal::Float(v) => Some(ScriptValue::from_f32(v.0)),
            Literal::Bool(v) => Some(ScriptValue::from_u32(*v as u32)),
            Literal::Null => Some(ScriptValue::ZERO),
            Literal::String(_) => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{:?}", v.0),
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_value_encoding() {
        assert_eq!(Literal::Int(-3).to_script_value(), Some(ScriptValue::from_i32(-3)));
        assert_eq!(Literal::Bool(true).to_script_value(), Some(ScriptValue::from_u32(1)));
        assert_eq!(Literal::float(2.5).to_script_value(), Some(ScriptValue::from_f32(2.5)));
        assert_eq!(Literal::Null.to_script_value(), Some(ScriptValue::ZERO));
        assert_eq!(Literal::String("x".into()).to_script_value(), None);
    }

    #[test]
    fn floats_hash_structurally() {
        use std::collections::HashSet;
        let set: HashSet<Literal> = [Literal::float(1.0), Literal::float(1.0)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display() {
        assert_eq!(Literal::float(1.0).to_string(), "1.0");
        assert_eq!(Literal::Bool(false).to_string(), "FALSE");
    }
}
