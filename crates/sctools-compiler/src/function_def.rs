//! Assembler input: function and static field definitions.
//!
//! A [`FunctionDefinition`] is a named list of [`AsmStatement`]s together
//! with the argument and local layout that sizes its frame. A
//! [`StaticField`] describes one entry of the static segment.

use bitflags::bitflags;

use sctools_core::{DeclarationError, Literal, SymbolId};
use sctools_registry::Type;

/// Name of the script entry point.
pub const ENTRY_POINT_NAME: &str = "main";

bitflags! {
    /// Function attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u8 {
        /// The function is `main`; it is always emitted first.
        const ENTRY_POINT = 1 << 0;
        /// No automatic `ENTER` prologue; the body manages the frame itself.
        const NAKED = 1 << 1;
    }
}

/// An assembly operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i64),
    Float(f32),
    String(String),
    /// A label, function or native name.
    Identifier(String),
    /// `value:label`, only valid for `SWITCH`.
    SwitchCase(i64, String),
}

impl Operand {
    pub fn ident(name: impl Into<String>) -> Self {
        Operand::Identifier(name.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::Int(_) => "an integer",
            Operand::Float(_) => "a float",
            Operand::String(_) => "a string",
            Operand::Identifier(_) => "an identifier",
            Operand::SwitchCase(..) => "a switch case",
        }
    }
}

/// One assembly line: an optional label, then an optional instruction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsmStatement {
    pub label: Option<String>,
    pub mnemonic: Option<String>,
    pub operands: Vec<Operand>,
}

impl AsmStatement {
    pub fn new(mnemonic: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            label: None,
            mnemonic: Some(mnemonic.into()),
            operands,
        }
    }

    /// A statement that only defines a label.
    pub fn label(name: impl Into<String>) -> Self {
        Self {
            label: Some(name.into()),
            mnemonic: None,
            operands: Vec::new(),
        }
    }

    pub fn with_label(mut self, name: impl Into<String>) -> Self {
        self.label = Some(name.into());
        self
    }
}

/// A named, typed slot range: an argument or a local.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A function ready to be assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    name: String,
    id: SymbolId,
    flags: FunctionFlags,
    args: Vec<FieldDef>,
    locals: Vec<FieldDef>,
    return_type: Option<Type>,
    statements: Vec<AsmStatement>,
}

impl FunctionDefinition {
    /// Build a definition. A naked function may not declare arguments,
    /// locals or a return type.
    pub fn new(
        name: impl Into<String>,
        naked: bool,
        args: Vec<FieldDef>,
        locals: Vec<FieldDef>,
        return_type: Option<Type>,
        statements: Vec<AsmStatement>,
    ) -> Result<Self, DeclarationError> {
        let name = name.into();
        if naked && (!args.is_empty() || !locals.is_empty() || return_type.is_some()) {
            return Err(DeclarationError::MalformedNakedFunction { name });
        }

        let id = SymbolId::from_name(&name);
        let mut flags = FunctionFlags::empty();
        if id == SymbolId::from_name(ENTRY_POINT_NAME) {
            flags |= FunctionFlags::ENTRY_POINT;
        }
        if naked {
            flags |= FunctionFlags::NAKED;
        }

        Ok(Self {
            name,
            id,
            flags,
            args,
            locals,
            return_type,
            statements,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }

    #[inline]
    pub fn is_entry_point(&self) -> bool {
        self.flags.contains(FunctionFlags::ENTRY_POINT)
    }

    #[inline]
    pub fn is_naked(&self) -> bool {
        self.flags.contains(FunctionFlags::NAKED)
    }

    pub fn args(&self) -> &[FieldDef] {
        &self.args
    }

    pub fn locals(&self) -> &[FieldDef] {
        &self.locals
    }

    pub fn return_type(&self) -> Option<&Type> {
        self.return_type.as_ref()
    }

    pub fn statements(&self) -> &[AsmStatement] {
        &self.statements
    }

    pub fn arg_slots(&self) -> usize {
        self.args.iter().map(|a| a.ty.slot_count()).sum()
    }

    pub fn local_slots(&self) -> usize {
        self.locals.iter().map(|l| l.ty.slot_count()).sum()
    }

    pub fn return_slots(&self) -> usize {
        self.return_type.as_ref().map_or(0, Type::slot_count)
    }

    /// Arguments, two reserved slots (return address and frame pointer),
    /// then locals.
    pub fn frame_size(&self) -> usize {
        self.arg_slots() + 2 + self.local_slots()
    }
}

/// A static segment entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticField {
    pub name: String,
    pub id: SymbolId,
    pub ty: Type,
    pub initializer: Option<Literal>,
    /// Script arguments are statics laid out after the plain ones.
    pub is_arg: bool,
}

impl StaticField {
    pub fn new(name: impl Into<String>, ty: Type, initializer: Option<Literal>) -> Self {
        let name = name.into();
        Self {
            id: SymbolId::from_name(&name),
            name,
            ty,
            initializer,
            is_arg: false,
        }
    }

    pub fn arg(name: impl Into<String>, ty: Type, initializer: Option<Literal>) -> Self {
        Self {
            is_arg: true,
            ..Self::new(name, ty, initializer)
        }
    }
}
