//! The checked program handed to the code generator.
//!
//! Names are resolved: locals and arguments carry their frame slot, statics
//! and globals their name (slots are assigned when the data segments are
//! laid out),
//! enum members and `SIZE_OF` are folded to constants.

use sctools_core::{Literal, Span};
use sctools_registry::{Type, TypeRegistry};

use crate::ast::{BinaryOp, UnaryOp};
use crate::function_def::FieldDef;
use crate::symbols::GlobalSymbolTable;

/// Output of a successful check.
#[derive(Debug, Clone, Default)]
pub struct TypedProgram {
    /// Every type the program uses, interned.
    pub types: TypeRegistry,
    pub globals: GlobalSymbolTable,
    pub statics: Vec<TypedStatic>,
    /// Variables of the GLOBALS block, in declaration order.
    pub global_vars: Vec<TypedStatic>,
    pub natives: Vec<TypedNative>,
    pub functions: Vec<TypedFunction>,
}

impl TypedProgram {
    pub fn function(&self, name: &str) -> Option<&TypedFunction> {
        self.functions.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// A static, script argument or global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedStatic {
    pub name: String,
    pub ty: Type,
    pub is_arg: bool,
    pub initializer: Option<TypedExpr>,
    pub span: Span,
}

impl TypedStatic {
    /// The initializer when it can be written straight into the data
    /// segment.
    pub fn literal_initializer(&self) -> Option<Literal> {
        self.initializer.as_ref().and_then(TypedExpr::as_literal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedNative {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub name: String,
    pub args: Vec<FieldDef>,
    pub locals: Vec<FieldDef>,
    pub return_type: Option<Type>,
    pub body: Vec<TypedStmt>,
    pub span: Span,
}

impl TypedFunction {
    pub fn arg_slots(&self) -> usize {
        self.args.iter().map(|a| a.ty.slot_count()).sum()
    }

    pub fn return_slots(&self) -> usize {
        self.return_type.as_ref().map_or(0, Type::slot_count)
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TypedStmt {
    Assign {
        target: TypedExpr,
        value: TypedExpr,
    },
    /// Write the array counts and field initializers of a freshly declared
    /// local.
    DefaultInit {
        target: TypedExpr,
    },
    If {
        condition: TypedExpr,
        then_body: Vec<TypedStmt>,
        else_body: Vec<TypedStmt>,
    },
    While {
        condition: TypedExpr,
        body: Vec<TypedStmt>,
    },
    Repeat {
        limit: TypedExpr,
        counter: TypedExpr,
        body: Vec<TypedStmt>,
    },
    Switch {
        value: TypedExpr,
        cases: Vec<(i32, Vec<TypedStmt>)>,
        default: Option<Vec<TypedStmt>>,
    },
    Return(Option<TypedExpr>),
    /// A call whose results are discarded.
    Expr(TypedExpr),
    Label(String),
    Goto(String),
    Block(Vec<TypedStmt>),
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `I2F`
    IntToFloat,
    /// `F2V`
    FloatToVector,
    /// A text label passed where a `STRING` is expected: its address.
    TextLabelToString,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    /// Never a string; see [`TypedExprKind::String`].
    Const(Literal),
    String(String),
    /// First frame slot of an argument or local.
    Local(u32),
    Static(String),
    Global(String),
    /// A type used as a value; only meaningful under `SIZE_OF`.
    TypeName,
    Convert {
        conversion: Conversion,
        operand: Box<TypedExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    Field {
        target: Box<TypedExpr>,
        /// Offset from the start of `target`, in slots.
        offset: u32,
    },
    Index {
        target: Box<TypedExpr>,
        index: Box<TypedExpr>,
        item_slots: u32,
    },
    Call {
        name: String,
        args: Vec<TypedExpr>,
    },
    NativeCall {
        name: String,
        args: Vec<TypedExpr>,
        arg_slots: u32,
        return_slots: u32,
    },
    Vector(Box<[TypedExpr; 3]>),
}

impl TypedExpr {
    pub fn new(kind: TypedExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Whether the expression names storage with an address.
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            TypedExprKind::Local(_) | TypedExprKind::Static(_) | TypedExprKind::Global(_) => true,
            TypedExprKind::Field { target, .. } | TypedExprKind::Index { target, .. } => {
                target.is_lvalue()
            }
            _ => false,
        }
    }

    /// The compile-time value, if the expression is a literal.
    pub fn as_literal(&self) -> Option<Literal> {
        match &self.kind {
            TypedExprKind::Const(lit) => Some(lit.clone()),
            TypedExprKind::String(s) => Some(Literal::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_int_constant(&self) -> Option<i32> {
        match &self.kind {
            TypedExprKind::Const(Literal::Int(v)) => Some(*v),
            _ => None,
        }
    }
}
