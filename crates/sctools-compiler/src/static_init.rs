//! Static segment materialization.
//!
//! Each static field owns `size_of(type)` bytes of the static segment. The
//! region is zero-filled, then an explicit [`Init`] tree, derived from the
//! type and the optional initializer, is written over it:
//!
//! - a scalar with a literal copies the literal's 4 bytes;
//! - an array writes its element count in the first slot, then each element;
//! - a struct initializes each field at its offset from the field's own
//!   initializer;
//! - a text label initialized from a string copies the bytes, NUL-padded.
//!
//! # Example
//!
//! ```
//! use sctools_compiler::{StaticField, build_static_segment};
//! use sctools_core::ScriptValue;
//! use sctools_registry::Type;
//!
//! let fields = [StaticField::new("counts", Type::array(Type::Int, 3), None)];
//! let segment = build_static_segment(&fields).unwrap();
//! assert_eq!(segment.values[0], ScriptValue::from_u32(3));
//! assert_eq!(segment.values.len(), 4);
//! ```

use sctools_core::{EncodingError, Literal, ScriptValue};
use sctools_registry::{SLOT_SIZE, Type};

use crate::function_def::StaticField;

/// How a byte region is initialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// Leave `n` bytes zeroed.
    Zero(usize),
    /// Write a literal into a region of `n` bytes.
    Literal(Literal, usize),
    /// Consecutive sub-regions.
    Recurse(Vec<Init>),
}

impl Init {
    /// Derive the initializer for a value of type `ty`.
    pub fn for_type(ty: &Type, literal: Option<&Literal>) -> Init {
        match ty {
            Type::Array(array) => {
                let count = Init::Literal(Literal::Int(array.length() as i32), SLOT_SIZE);
                let items_size = array.size() - SLOT_SIZE;
                if *array.item() == Type::Auto {
                    return Init::Recurse(vec![count, Init::Zero(items_size)]);
                }
                let mut children = Vec::with_capacity(array.length() as usize + 1);
                children.push(count);
                for _ in 0..array.length() {
                    children.push(Init::for_type(array.item(), None));
                }
                Init::Recurse(children)
            }
            Type::Struct(s) => Init::Recurse(
                s.fields()
                    .iter()
                    .map(|f| Init::for_type(&f.ty, f.initializer.as_ref()))
                    .collect(),
            ),
            _ => match literal {
                Some(lit) => Init::Literal(lit.clone(), ty.size_of()),
                None => Init::Zero(ty.size_of()),
            },
        }
    }

    /// Bytes covered by this initializer.
    pub fn size(&self) -> usize {
        match self {
            Init::Zero(n) | Init::Literal(_, n) => *n,
            Init::Recurse(children) => children.iter().map(Init::size).sum(),
        }
    }

    /// Write into `dest`, which must already be zeroed. Returns the number of
    /// bytes covered.
    fn write(&self, dest: &mut [u8], ty_name: &str) -> Result<usize, EncodingError> {
        match self {
            Init::Zero(n) => Ok(*n),
            Init::Literal(Literal::String(s), n) => {
                // text label: copy bytes, keep at least one trailing NUL
                let dest_len = dest.len();
                let region = dest.get_mut(..*n).ok_or_else(|| mismatch(ty_name, dest_len, *n))?;
                let copy = s.len().min(n.saturating_sub(1));
                region[..copy].copy_from_slice(&s.as_bytes()[..copy]);
                Ok(*n)
            }
            Init::Literal(lit, n) => {
                let Some(value) = lit.to_script_value() else {
                    return Err(EncodingError::UnsupportedExpression {
                        what: format!("initializer {lit} for '{ty_name}'"),
                    });
                };
                if *n != SLOT_SIZE {
                    return Err(mismatch(ty_name, *n, SLOT_SIZE));
                }
                let dest_len = dest.len();
                let region = dest.get_mut(..SLOT_SIZE).ok_or_else(|| mismatch(ty_name, dest_len, SLOT_SIZE))?;
                region.copy_from_slice(&value.to_le_bytes());
                Ok(SLOT_SIZE)
            }
            Init::Recurse(children) => {
                let mut offset = 0;
                for child in children {
                    let dest_len = dest.len();
                    let rest = dest.get_mut(offset..).ok_or_else(|| mismatch(ty_name, dest_len, offset))?;
                    offset += child.write(rest, ty_name)?;
                }
                Ok(offset)
            }
        }
    }
}

fn mismatch(ty: &str, expected: usize, written: usize) -> EncodingError {
    EncodingError::StaticSizeMismatch {
        ty: ty.into(),
        expected,
        written,
    }
}

/// Materialize one static field into bytes.
pub fn initialize_static(field: &StaticField) -> Result<Vec<u8>, EncodingError> {
    let size = field.ty.size_of();
    let mut bytes = vec![0u8; size];
    let init = Init::for_type(&field.ty, field.initializer.as_ref());
    let name = field.ty.name();
    let written = init.write(&mut bytes, &name)?;
    if written != size {
        return Err(mismatch(&name, size, written));
    }
    Ok(bytes)
}

/// The static segment of a script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StaticSegment {
    pub values: Vec<ScriptValue>,
    /// Slots occupied by script arguments, at the end of `values`.
    pub args_count: u32,
    /// First slot of each field, in layout order.
    pub layout: Vec<(String, usize)>,
}

/// Plain fields first, then arguments.
fn layout_order(fields: &[StaticField]) -> impl Iterator<Item = &StaticField> {
    let plain = fields.iter().filter(|f| !f.is_arg);
    let args = fields.iter().filter(|f| f.is_arg);
    plain.chain(args)
}

/// First slot of each field, without materializing the segment.
pub fn static_layout(fields: &[StaticField]) -> Vec<(String, usize)> {
    let mut next = 0;
    layout_order(fields)
        .map(|field| {
            let slot = next;
            next += field.ty.slot_count();
            (field.name.clone(), slot)
        })
        .collect()
}

/// Lay out statics back to back, plain fields first, then arguments.
pub fn build_static_segment(fields: &[StaticField]) -> Result<StaticSegment, EncodingError> {
    let mut bytes = Vec::new();
    let mut layout = Vec::with_capacity(fields.len());
    let mut args_bytes = 0;

    for field in layout_order(fields) {
        let region = initialize_static(field)?;
        layout.push((field.name.clone(), bytes.len() / SLOT_SIZE));
        if field.is_arg {
            args_bytes += region.len();
        }
        bytes.extend_from_slice(&region);
        // keep every field slot-aligned
        bytes.resize(bytes.len().next_multiple_of(SLOT_SIZE), 0);
    }

    Ok(StaticSegment {
        values: ScriptValue::vec_from_bytes(&bytes),
        args_count: args_bytes.div_ceil(SLOT_SIZE) as u32,
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sctools_registry::{Field, StructType};

    #[test]
    fn scalar_literal() {
        let f = StaticField::new("x", Type::Float, Some(Literal::float(2.0)));
        assert_eq!(initialize_static(&f).unwrap(), 2.0f32.to_le_bytes());
    }

    #[test]
    fn uninitialized_is_zero() {
        let f = StaticField::new("v", Type::Vector, None);
        assert_eq!(initialize_static(&f).unwrap(), vec![0; 12]);
    }

    #[test]
    fn array_writes_count() {
        let f = StaticField::new("a", Type::array(Type::Int, 3), None);
        let bytes = initialize_static(&f).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert!(bytes[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn nested_arrays() {
        let inner = Type::array(Type::Int, 2);
        let f = StaticField::new("m", Type::array(inner, 2), None);
        let values = ScriptValue::vec_from_bytes(&initialize_static(&f).unwrap());
        let raw: Vec<u32> = values.iter().map(|v| v.as_u32()).collect();
        assert_eq!(raw, [2, 2, 0, 0, 2, 0, 0]);
    }

    #[test]
    fn auto_items_are_skipped() {
        let f = StaticField::new("a", Type::array(Type::Auto, 2), None);
        let bytes = initialize_static(&f).unwrap();
        assert_eq!(&bytes[..4], &2u32.to_le_bytes());
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn struct_fields_use_their_initializers() {
        let s = Type::structure(StructType::new(
            "S",
            vec![
                Field::new("a", Type::Int).with_initializer(Literal::Int(7)),
                Field::new("b", Type::Float),
                Field::new("c", Type::Bool).with_initializer(Literal::Bool(true)),
            ],
        ));
        let values = ScriptValue::vec_from_bytes(&initialize_static(&StaticField::new("s", s, None)).unwrap());
        assert_eq!(values[0].as_i32(), 7);
        assert_eq!(values[1].as_u32(), 0);
        assert_eq!(values[2].as_u32(), 1);
    }

    #[test]
    fn text_label_from_string() {
        let f = StaticField::new("t", Type::TextLabel(8), Some(Literal::String("HELLO".into())));
        assert_eq!(initialize_static(&f).unwrap(), b"HELLO\0\0\0");

        let long = StaticField::new("t", Type::TextLabel(8), Some(Literal::String("TOO LONG!".into())));
        assert_eq!(initialize_static(&long).unwrap(), b"TOO LON\0");
    }

    #[test]
    fn literal_into_wide_type_is_a_size_mismatch() {
        let f = StaticField::new("v", Type::Vector, Some(Literal::Int(1)));
        assert_eq!(
            initialize_static(&f),
            Err(EncodingError::StaticSizeMismatch {
                ty: "VECTOR".into(),
                expected: 12,
                written: 4,
            })
        );
    }

    #[test]
    fn segment_puts_args_last() {
        let fields = [
            StaticField::arg("arg0", Type::Int, None),
            StaticField::new("a", Type::Int, Some(Literal::Int(5))),
            StaticField::new("b", Type::array(Type::Int, 1), None),
        ];
        let seg = build_static_segment(&fields).unwrap();
        let raw: Vec<u32> = seg.values.iter().map(|v| v.as_u32()).collect();
        assert_eq!(raw, [5, 1, 0, 0]);
        assert_eq!(seg.args_count, 1);
        assert_eq!(
            seg.layout,
            [("a".to_string(), 0), ("b".to_string(), 1), ("arg0".to_string(), 3)]
        );
    }

    #[test]
    fn layout_matches_materialized_segment() {
        let fields = [
            StaticField::arg("p", Type::Vector, None),
            StaticField::new("t", Type::TextLabel(16), None),
            StaticField::new("n", Type::Int, None),
        ];
        let seg = build_static_segment(&fields).unwrap();
        assert_eq!(static_layout(&fields), seg.layout);
        assert_eq!(seg.args_count, 3);
    }
}
