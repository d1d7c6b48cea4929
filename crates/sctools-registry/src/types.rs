//! The script type model.
//!
//! [`Type`] is an immutable value with structural identity: two instances that
//! describe the same logical type compare and hash equal, wherever they were
//! built. Composite types share their children through `Arc`, so cloning a
//! `Type` is cheap.
//!
//! Sizes are in bytes. Every scalar occupies one 4-byte slot, `VECTOR` three.
//!
//! # Example
//!
//! ```
//! use sctools_registry::{Field, StructType, Type};
//!
//! let point = Type::structure(StructType::new(
//!     "POINT",
//!     vec![Field::new("x", Type::Int), Field::new("y", Type::Int)],
//! ));
//!
//! assert_eq!(point.size_of(), 8);
//! let s = point.as_struct().unwrap();
//! assert_eq!(s.fields()[1].offset, 4);
//! ```

use std::fmt;
use std::sync::Arc;

use sctools_core::{DeclarationError, Literal};

/// Bytes in one storage slot.
pub const SLOT_SIZE: usize = 4;

/// Smallest text label capacity.
pub const TEXT_LABEL_MIN_LENGTH: u32 = 8;
/// Largest text label capacity.
pub const TEXT_LABEL_MAX_LENGTH: u32 = 248;

// ============================================================================
// Handles
// ============================================================================

/// Kinds of opaque native object handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    PlayerIndex,
    EntityIndex,
    PedIndex,
    VehicleIndex,
    ObjectIndex,
    CameraIndex,
    PickupIndex,
    BlipInfoId,
}

impl HandleKind {
    pub const ALL: [HandleKind; 8] = [
        HandleKind::PlayerIndex,
        HandleKind::EntityIndex,
        HandleKind::PedIndex,
        HandleKind::VehicleIndex,
        HandleKind::ObjectIndex,
        HandleKind::CameraIndex,
        HandleKind::PickupIndex,
        HandleKind::BlipInfoId,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            HandleKind::PlayerIndex => "PLAYER_INDEX",
            HandleKind::EntityIndex => "ENTITY_INDEX",
            HandleKind::PedIndex => "PED_INDEX",
            HandleKind::VehicleIndex => "VEHICLE_INDEX",
            HandleKind::ObjectIndex => "OBJECT_INDEX",
            HandleKind::CameraIndex => "CAMERA_INDEX",
            HandleKind::PickupIndex => "PICKUP_INDEX",
            HandleKind::BlipInfoId => "BLIP_INFO_ID",
        }
    }

    /// Peds, vehicles and objects are entities.
    #[inline]
    pub const fn is_entity(self) -> bool {
        matches!(
            self,
            HandleKind::EntityIndex
                | HandleKind::PedIndex
                | HandleKind::VehicleIndex
                | HandleKind::ObjectIndex
        )
    }
}

// ============================================================================
// Declared Types
// ============================================================================

/// An enum declaration. Enums are identified by name only: two enums with the
/// same name are the same type regardless of their members.
#[derive(Debug, Clone)]
pub struct EnumType {
    name: String,
    members: Vec<(String, i32)>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, members: Vec<(String, i32)>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[(String, i32)] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<i32> {
        self.members
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for EnumType {}

impl std::hash::Hash for EnumType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for b in self.name.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

/// A struct field with its byte offset inside the struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// Byte offset, assigned by [`StructType::new`].
    pub offset: usize,
    pub initializer: Option<Literal>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            offset: 0,
            initializer: None,
        }
    }

    pub fn with_initializer(mut self, value: Literal) -> Self {
        self.initializer = Some(value);
        self
    }
}

/// A struct declaration. Offsets are a running sum in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    name: String,
    fields: Vec<Field>,
    size: usize,
}

impl StructType {
    pub fn new(name: impl Into<String>, mut fields: Vec<Field>) -> Self {
        let mut offset = 0;
        for field in &mut fields {
            field.offset = offset;
            offset += field.ty.size_of();
        }
        Self {
            name: name.into(),
            fields,
            size: offset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A fixed-length array, preceded in memory by its element count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    item: Type,
    length: u32,
    size: usize,
}

impl ArrayType {
    pub fn new(item: Type, length: u32) -> Self {
        let size = SLOT_SIZE + length as usize * item.size_of();
        Self { item, length, size }
    }

    pub fn item(&self) -> &Type {
        &self.item
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A function or procedure signature. Procedures have no return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: Option<Type>,
    pub params: Vec<Type>,
}

impl FunctionType {
    pub fn new(return_type: Option<Type>, params: Vec<Type>) -> Self {
        Self {
            return_type,
            params,
        }
    }

    pub fn is_procedure(&self) -> bool {
        self.return_type.is_none()
    }

    /// Total size of the parameters, in slots.
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(Type::slot_count).sum()
    }

    /// Size of the return value, in slots.
    pub fn return_slots(&self) -> usize {
        self.return_type.as_ref().map_or(0, Type::slot_count)
    }
}

// ============================================================================
// Type
// ============================================================================

/// A script type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int,
    Float,
    Bool,
    String,
    Null,
    Any,
    /// Placeholder for a type not yet inferred.
    Auto,
    Vector,
    Handle(HandleKind),
    /// In-place string with a capacity in bytes; see [`Type::text_label`].
    TextLabel(u32),
    Enum(Arc<EnumType>),
    Struct(Arc<StructType>),
    Array(Arc<ArrayType>),
    Function(Arc<FunctionType>),
    /// The type of an expression that names a type.
    TypeName(Arc<Type>),
}

impl Type {
    /// A validated text label type.
    pub fn text_label(length: u32) -> Result<Type, DeclarationError> {
        if is_valid_text_label_length(length) {
            Ok(Type::TextLabel(length))
        } else {
            Err(DeclarationError::InvalidTextLabelLength { length })
        }
    }

    pub fn structure(s: StructType) -> Type {
        Type::Struct(Arc::new(s))
    }

    pub fn array(item: Type, length: u32) -> Type {
        Type::Array(Arc::new(ArrayType::new(item, length)))
    }

    pub fn enumeration(e: EnumType) -> Type {
        Type::Enum(Arc::new(e))
    }

    pub fn function(return_type: Option<Type>, params: Vec<Type>) -> Type {
        Type::Function(Arc::new(FunctionType::new(return_type, params)))
    }

    /// Size in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Type::Void | Type::TypeName(_) => 0,
            Type::Int
            | Type::Float
            | Type::Bool
            | Type::String
            | Type::Null
            | Type::Any
            | Type::Auto
            | Type::Handle(_)
            | Type::Enum(_)
            | Type::Function(_) => SLOT_SIZE,
            Type::Vector => 3 * SLOT_SIZE,
            Type::TextLabel(n) => *n as usize,
            Type::Struct(s) => s.size(),
            Type::Array(a) => a.size(),
        }
    }

    /// Size in slots, rounded up.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.size_of().div_ceil(SLOT_SIZE)
    }

    /// Canonical name. Its identity hash is the registry key.
    pub fn name(&self) -> String {
        match self {
            Type::Void => "VOID".into(),
            Type::Int => "INT".into(),
            Type::Float => "FLOAT".into(),
            Type::Bool => "BOOL".into(),
            Type::String => "STRING".into(),
            Type::Null => "NULL".into(),
            Type::Any => "ANY".into(),
            Type::Auto => "AUTO".into(),
            Type::Vector => "VECTOR".into(),
            Type::Handle(k) => k.name().into(),
            Type::TextLabel(n) => text_label_type_name(*n),
            Type::Enum(e) => e.name().into(),
            Type::Struct(s) => s.name().into(),
            Type::Array(a) => format!("{}[{}]", a.item().name(), a.length()),
            Type::Function(f) => {
                let params = f
                    .params
                    .iter()
                    .map(Type::name)
                    .collect::<Vec<_>>()
                    .join(", ");
                match &f.return_type {
                    Some(ret) => format!("FUNC {}({})", ret.name(), params),
                    None => format!("PROC({params})"),
                }
            }
            Type::TypeName(t) => format!("TYPENAME({})", t.name()),
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match self {
            Type::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            Type::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Field lookup on anything with named members: structs, `VECTOR`
    /// (`x`, `y`, `z`) and handles (`value`).
    pub fn field(&self, name: &str) -> Option<Field> {
        match self {
            Type::Struct(s) => s.field(name).cloned(),
            Type::Vector => ["x", "y", "z"]
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
                .map(|i| Field {
                    name: ["x", "y", "z"][i].into(),
                    ty: Type::Float,
                    offset: i * SLOT_SIZE,
                    initializer: None,
                }),
            Type::Handle(_) if name.eq_ignore_ascii_case("value") => Some(Field::new("value", Type::Int)),
            _ => None,
        }
    }

    /// Types the type is built from, in declaration order.
    pub fn children(&self) -> Vec<&Type> {
        match self {
            Type::Struct(s) => s.fields().iter().map(|f| &f.ty).collect(),
            Type::Array(a) => vec![a.item()],
            Type::Function(f) => f.return_type.iter().chain(f.params.iter()).collect(),
            Type::TypeName(t) => vec![t.as_ref()],
            _ => Vec::new(),
        }
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Whether a value of type `source` may be stored into this type.
    pub fn is_assignable_from(&self, source: &Type) -> bool {
        if self == source {
            return true;
        }
        match (self, source) {
            (Type::Int | Type::Float | Type::Bool | Type::String, Type::Null) => true,
            (Type::Bool, Type::Int) => true,
            (Type::String, Type::TextLabel(_)) => true,
            (Type::Any, src) => src.size_of() == SLOT_SIZE,
            (Type::Handle(_), Type::Null) => true,
            (Type::Handle(HandleKind::EntityIndex), Type::Handle(src)) => src.is_entity(),
            (Type::TextLabel(_), Type::TextLabel(_) | Type::String) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// ============================================================================
// Text Labels
// ============================================================================

/// Multiples of 8 in `[8, 248]`.
#[inline]
pub fn is_valid_text_label_length(length: u32) -> bool {
    (TEXT_LABEL_MIN_LENGTH..=TEXT_LABEL_MAX_LENGTH).contains(&length) && length % 8 == 0
}

/// `TEXT_LABEL_{n-1}`: the name counts usable characters, excluding the NUL.
pub fn text_label_type_name(length: u32) -> String {
    format!("TEXT_LABEL_{}", length.saturating_sub(1))
}

/// All valid text label lengths, ascending.
pub fn text_label_lengths() -> impl Iterator<Item = u32> {
    (TEXT_LABEL_MIN_LENGTH..=TEXT_LABEL_MAX_LENGTH).step_by(8)
}
