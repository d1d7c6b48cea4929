//! Lowering of a checked program to assembler input.
//!
//! [`generate`] turns every [`TypedFunction`] into a [`FunctionDefinition`]
//! of [`AsmStatement`]s and every static and global into a [`StaticField`].
//!
//! # Frame layout
//!
//! Arguments start at slot 0, followed by the two slots reserved by `ENTER`,
//! then locals. Addresses are pushed with `LOCAL_n` for the first eight
//! slots and `PUSH_CONST n; LOCAL` past them, statics with
//! `PUSH_CONST n; STATIC` and globals with `PUSH_CONST n; GLOBAL`.
//!
//! # Labels
//!
//! Control flow jumps to generated labels prefixed with `$`, which cannot
//! collide with script labels. All labels are local to their function.

use rustc_hash::FxHashMap;
use tracing::debug;

use sctools_core::{EncodingError, Literal, Result};
use sctools_registry::{SLOT_SIZE, Type};

use crate::assembler::PUSH_CONST_PSEUDO;
use crate::ast::{BinaryOp, UnaryOp};
use crate::checker::{
    Conversion, TypedExpr, TypedExprKind, TypedFunction, TypedProgram, TypedStatic, TypedStmt,
    needs_default_init,
};
use crate::function_def::{AsmStatement, ENTRY_POINT_NAME, FunctionDefinition, Operand, StaticField};
use crate::static_init::static_layout;

/// Assembler input for a whole program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratedScript {
    pub functions: Vec<FunctionDefinition>,
    pub statics: Vec<StaticField>,
    pub globals: Vec<StaticField>,
}

/// Lower `program`. Statics and globals whose initializers are not literals
/// are assigned at the start of `main`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn generate(program: &TypedProgram) -> Result<GeneratedScript> {
    let mut deferred = Vec::new();
    let statics = lower_data(&program.statics, TypedExprKind::Static, &mut deferred);
    let globals = lower_data(&program.global_vars, TypedExprKind::Global, &mut deferred);
    let layout = DataLayout {
        statics: slot_map(&statics),
        globals: slot_map(&globals),
    };

    let has_main = program
        .functions
        .iter()
        .any(|f| f.name.eq_ignore_ascii_case(ENTRY_POINT_NAME));
    if !deferred.is_empty() && !has_main {
        return Err(EncodingError::UnsupportedExpression {
            what: "non-constant static or global initializers without a main function".into(),
        }
        .into());
    }

    let mut functions = Vec::with_capacity(program.functions.len());
    for function in &program.functions {
        let prologue: &[TypedStmt] = if function.name.eq_ignore_ascii_case(ENTRY_POINT_NAME) {
            &deferred
        } else {
            &[]
        };
        let statements = FunctionEmitter::new(function, &layout).emit(prologue)?;
        functions.push(FunctionDefinition::new(
            &function.name,
            false,
            function.args.clone(),
            function.locals.clone(),
            function.return_type.clone(),
            statements,
        )?);
    }

    debug!(
        functions = functions.len(),
        statics = statics.len(),
        globals = globals.len(),
        deferred = deferred.len(),
        "generated assembly"
    );

    Ok(GeneratedScript {
        functions,
        statics,
        globals,
    })
}

/// Segment fields of `vars`. Non-literal initializers become assignments
/// through `storage`, appended to `deferred`.
fn lower_data(
    vars: &[TypedStatic],
    storage: fn(String) -> TypedExprKind,
    deferred: &mut Vec<TypedStmt>,
) -> Vec<StaticField> {
    vars.iter()
        .map(|v| {
            let literal = v.literal_initializer();
            if let (None, Some(init)) = (&literal, &v.initializer) {
                deferred.push(TypedStmt::Assign {
                    target: TypedExpr::new(storage(v.name.clone()), v.ty.clone(), v.span),
                    value: init.clone(),
                });
            }
            if v.is_arg {
                StaticField::arg(&v.name, v.ty.clone(), literal)
            } else {
                StaticField::new(&v.name, v.ty.clone(), literal)
            }
        })
        .collect()
}

fn slot_map(fields: &[StaticField]) -> FxHashMap<String, usize> {
    static_layout(fields)
        .into_iter()
        .map(|(name, slot)| (name.to_ascii_lowercase(), slot))
        .collect()
}

/// First slot of every static and global, keyed by lowercase name.
struct DataLayout {
    statics: FxHashMap<String, usize>,
    globals: FxHashMap<String, usize>,
}

/// Emits the statements of one function.
struct FunctionEmitter<'a> {
    function: &'a TypedFunction,
    layout: &'a DataLayout,
    out: Vec<AsmStatement>,
    next_label: usize,
}

type EmitResult = std::result::Result<(), EncodingError>;

impl<'a> FunctionEmitter<'a> {
    fn new(function: &'a TypedFunction, layout: &'a DataLayout) -> Self {
        Self {
            function,
            layout,
            out: Vec::new(),
            next_label: 0,
        }
    }

    fn emit(mut self, prologue: &[TypedStmt]) -> std::result::Result<Vec<AsmStatement>, EncodingError> {
        let function = self.function;
        self.block(prologue)?;
        self.block(&function.body)?;
        if !matches!(function.body.last(), Some(TypedStmt::Return(_))) {
            self.leave();
        }
        Ok(self.out)
    }

    // ==========================================================================
    // Output helpers
    // ==========================================================================

    fn op(&mut self, mnemonic: &str) {
        self.out.push(AsmStatement::new(mnemonic, Vec::new()));
    }

    fn op_with(&mut self, mnemonic: &str, operands: Vec<Operand>) {
        self.out.push(AsmStatement::new(mnemonic, operands));
    }

    fn push_int(&mut self, v: i64) {
        self.op_with(PUSH_CONST_PSEUDO, vec![Operand::Int(v)]);
    }

    fn jump(&mut self, mnemonic: &str, label: &str) {
        self.op_with(mnemonic, vec![Operand::ident(label)]);
    }

    fn new_label(&mut self, kind: &str) -> String {
        let label = format!("${kind}_{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn place(&mut self, label: String) {
        self.out.push(AsmStatement::label(label));
    }

    fn leave(&mut self) {
        let args = self.function.arg_slots() as i64;
        let returns = self.function.return_slots() as i64;
        self.op_with("LEAVE", vec![Operand::Int(args), Operand::Int(returns)]);
    }

    /// Add `slots` to the address on top of the stack.
    fn offset(&mut self, slots: u32) {
        if slots != 0 {
            self.push_int(slots as i64);
            self.op("IADD");
        }
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn block(&mut self, body: &[TypedStmt]) -> EmitResult {
        for stmt in body {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &TypedStmt) -> EmitResult {
        match stmt {
            TypedStmt::Assign { target, value } => self.store(target, value),
            TypedStmt::DefaultInit { target } => {
                self.address(target)?;
                self.init_in_place(&target.ty);
                self.op("DROP");
                Ok(())
            }
            TypedStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                let end = self.new_label("if_end");
                self.value(condition)?;
                if else_body.is_empty() {
                    self.jump("JZ", &end);
                    self.block(then_body)?;
                } else {
                    let otherwise = self.new_label("if_else");
                    self.jump("JZ", &otherwise);
                    self.block(then_body)?;
                    self.jump("J", &end);
                    self.place(otherwise);
                    self.block(else_body)?;
                }
                self.place(end);
                Ok(())
            }
            TypedStmt::While { condition, body } => {
                let begin = self.new_label("while_begin");
                let end = self.new_label("while_end");
                self.place(begin.clone());
                self.value(condition)?;
                self.jump("JZ", &end);
                self.block(body)?;
                self.jump("J", &begin);
                self.place(end);
                Ok(())
            }
            TypedStmt::Repeat {
                limit,
                counter,
                body,
            } => {
                let begin = self.new_label("repeat_begin");
                let end = self.new_label("repeat_end");
                self.push_int(0);
                self.address(counter)?;
                self.op("STORE");
                self.place(begin.clone());
                self.load(counter)?;
                self.value(limit)?;
                self.op("ILT");
                self.jump("JZ", &end);
                self.block(body)?;
                self.load(counter)?;
                self.push_int(1);
                self.op("IADD");
                self.address(counter)?;
                self.op("STORE");
                self.jump("J", &begin);
                self.place(end);
                Ok(())
            }
            TypedStmt::Switch {
                value,
                cases,
                default,
            } => {
                let end = self.new_label("switch_end");
                let labels: Vec<String> = cases.iter().map(|_| self.new_label("case")).collect();
                self.value(value)?;
                let operands = cases
                    .iter()
                    .zip(&labels)
                    .map(|((v, _), label)| Operand::SwitchCase(*v as i64, label.clone()))
                    .collect();
                self.op_with("SWITCH", operands);
                let default_label = default.as_ref().map(|_| self.new_label("switch_default"));
                self.jump("J", default_label.as_deref().unwrap_or(&end));
                for ((_, body), label) in cases.iter().zip(labels) {
                    self.place(label);
                    self.block(body)?;
                    self.jump("J", &end);
                }
                if let (Some(body), Some(label)) = (default, default_label) {
                    self.place(label);
                    self.block(body)?;
                }
                self.place(end);
                Ok(())
            }
            TypedStmt::Return(value) => {
                if let Some(value) = value {
                    self.value(value)?;
                }
                self.leave();
                Ok(())
            }
            TypedStmt::Expr(expr) => {
                self.value(expr)?;
                for _ in 0..expr.ty.slot_count() {
                    self.op("DROP");
                }
                Ok(())
            }
            TypedStmt::Label(name) => {
                self.place(name.clone());
                Ok(())
            }
            TypedStmt::Goto(name) => {
                self.jump("J", name);
                Ok(())
            }
            TypedStmt::Block(body) => self.block(body),
        }
    }

    /// Write array counts and field initializers below the address on top of
    /// the stack, leaving the address in place.
    fn init_in_place(&mut self, ty: &Type) {
        match ty {
            Type::Array(array) => {
                self.push_int(array.length() as i64);
                self.op("STORE_REV");
                if needs_default_init(array.item()) {
                    let item_slots = array.item().slot_count() as u32;
                    self.op("DUP");
                    self.offset(1);
                    for _ in 0..array.length() {
                        self.init_in_place(array.item());
                        self.offset(item_slots);
                    }
                    self.op("DROP");
                }
            }
            Type::Struct(s) => {
                for field in s.fields() {
                    let nested = needs_default_init(&field.ty);
                    if field.initializer.is_none() && !nested {
                        continue;
                    }
                    self.op("DUP");
                    self.offset((field.offset / SLOT_SIZE) as u32);
                    match &field.initializer {
                        Some(lit) => {
                            self.literal(lit);
                            self.op("STORE_REV");
                        }
                        None => self.init_in_place(&field.ty),
                    }
                    self.op("DROP");
                }
            }
            _ => {}
        }
    }

    // ==========================================================================
    // Storage
    // ==========================================================================

    /// Push the address of an lvalue.
    fn address(&mut self, expr: &TypedExpr) -> EmitResult {
        match &expr.kind {
            TypedExprKind::Local(slot) if *slot <= 7 => self.op(&format!("LOCAL_{slot}")),
            TypedExprKind::Local(slot) => {
                self.push_int(*slot as i64);
                self.op("LOCAL");
            }
            TypedExprKind::Static(name) => {
                let slot = data_slot(&self.layout.statics, "static", name)?;
                self.push_int(slot as i64);
                self.op("STATIC");
            }
            TypedExprKind::Global(name) => {
                let slot = data_slot(&self.layout.globals, "global", name)?;
                self.push_int(slot as i64);
                self.op("GLOBAL");
            }
            TypedExprKind::Field { target, offset } => {
                self.address(target)?;
                self.offset(*offset);
            }
            TypedExprKind::Index {
                target,
                index,
                item_slots,
            } => {
                self.value(index)?;
                self.address(target)?;
                self.push_int(*item_slots as i64);
                self.op("ARRAY");
            }
            _ => {
                return Err(EncodingError::UnsupportedExpression {
                    what: format!("address of a '{}' value", expr.ty),
                });
            }
        }
        Ok(())
    }

    fn load(&mut self, expr: &TypedExpr) -> EmitResult {
        match expr.ty.slot_count() {
            1 => {
                self.address(expr)?;
                self.op("LOAD");
            }
            n => {
                self.push_int(n as i64);
                self.address(expr)?;
                self.op("LOAD_N");
            }
        }
        Ok(())
    }

    fn store(&mut self, target: &TypedExpr, value: &TypedExpr) -> EmitResult {
        if let Type::TextLabel(length) = target.ty {
            match value.ty {
                Type::String => {
                    self.value(value)?;
                    self.address(target)?;
                    self.op_with("TEXT_LABEL_ASSIGN_STRING", vec![Operand::Int(length as i64)]);
                    return Ok(());
                }
                Type::TextLabel(source) if source != length => {
                    self.value(value)?;
                    self.push_int(value.ty.slot_count() as i64);
                    self.push_int(target.ty.slot_count() as i64);
                    self.address(target)?;
                    self.op("TEXT_LABEL_COPY");
                    return Ok(());
                }
                _ => {}
            }
        }

        self.value(value)?;
        match target.ty.slot_count() {
            1 => {
                self.address(target)?;
                self.op("STORE");
            }
            n => {
                self.push_int(n as i64);
                self.address(target)?;
                self.op("STORE_N");
            }
        }
        Ok(())
    }

    // ==========================================================================
    // Values
    // ==========================================================================

    fn literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Int(v) => self.push_int(*v as i64),
            Literal::Float(v) => self.op_with(PUSH_CONST_PSEUDO, vec![Operand::Float(v.0)]),
            Literal::Bool(b) => self.push_int(*b as i64),
            Literal::String(s) => self.op_with("STRING", vec![Operand::String(s.clone())]),
            Literal::Null => self.op("NULL"),
        }
    }

    /// Push the value of `expr`.
    fn value(&mut self, expr: &TypedExpr) -> EmitResult {
        match &expr.kind {
            TypedExprKind::Const(lit) => self.literal(lit),
            TypedExprKind::String(s) => self.op_with("STRING", vec![Operand::String(s.clone())]),
            TypedExprKind::Local(_)
            | TypedExprKind::Static(_)
            | TypedExprKind::Global(_)
            | TypedExprKind::Field { .. }
            | TypedExprKind::Index { .. } => return self.load(expr),
            TypedExprKind::TypeName => {
                return Err(EncodingError::UnsupportedExpression {
                    what: format!("type name '{}' as a value", expr.ty),
                });
            }
            TypedExprKind::Convert {
                conversion,
                operand,
            } => match conversion {
                Conversion::IntToFloat => {
                    self.value(operand)?;
                    self.op("I2F");
                }
                Conversion::FloatToVector => {
                    self.value(operand)?;
                    self.op("F2V");
                }
                Conversion::TextLabelToString => self.address(operand)?,
            },
            TypedExprKind::Unary { op, operand } => {
                self.value(operand)?;
                let mnemonic = match (op, &operand.ty) {
                    (UnaryOp::Neg, Type::Float) => "FNEG",
                    (UnaryOp::Neg, Type::Vector) => "VNEG",
                    (UnaryOp::Neg, _) => "INEG",
                    (UnaryOp::Not, _) => "INOT",
                };
                self.op(mnemonic);
            }
            TypedExprKind::Binary { op, lhs, rhs } => {
                self.value(lhs)?;
                self.value(rhs)?;
                self.op(binary_mnemonic(*op, &lhs.ty)?);
            }
            TypedExprKind::Call { name, args } => {
                for arg in args {
                    self.value(arg)?;
                }
                self.jump("CALL", name);
            }
            TypedExprKind::NativeCall {
                name,
                args,
                arg_slots,
                return_slots,
            } => {
                for arg in args {
                    self.value(arg)?;
                }
                self.op_with(
                    "NATIVE",
                    vec![
                        Operand::Int(*arg_slots as i64),
                        Operand::Int(*return_slots as i64),
                        Operand::ident(name),
                    ],
                );
            }
            TypedExprKind::Vector(components) => {
                for component in components.iter() {
                    self.value(component)?;
                }
            }
        }
        Ok(())
    }
}

fn data_slot(layout: &FxHashMap<String, usize>, kind: &str, name: &str) -> std::result::Result<usize, EncodingError> {
    layout
        .get(&name.to_ascii_lowercase())
        .copied()
        .ok_or_else(|| EncodingError::UnsupportedExpression {
            what: format!("unknown {kind} '{name}'"),
        })
}

/// Opcode of a binary operator given its (converted) left operand type.
fn binary_mnemonic(op: BinaryOp, operand: &Type) -> std::result::Result<&'static str, EncodingError> {
    use BinaryOp::*;

    let mnemonic = match (operand, op) {
        (_, LogicalAnd) => "IAND",
        (_, LogicalOr) => "IOR",
        (Type::Float, _) => match op {
            Add => "FADD",
            Sub => "FSUB",
            Mul => "FMUL",
            Div => "FDIV",
            Mod => "FMOD",
            Eq => "FEQ",
            Ne => "FNE",
            Lt => "FLT",
            Le => "FLE",
            Gt => "FGT",
            Ge => "FGE",
            _ => return Err(unsupported(op, operand)),
        },
        (Type::Vector, _) => match op {
            Add => "VADD",
            Sub => "VSUB",
            Mul => "VMUL",
            Div => "VDIV",
            _ => return Err(unsupported(op, operand)),
        },
        (_, Add) => "IADD",
        (_, Sub) => "ISUB",
        (_, Mul) => "IMUL",
        (_, Div) => "IDIV",
        (_, Mod) => "IMOD",
        (_, BitAnd) => "IAND",
        (_, BitOr) => "IOR",
        (_, BitXor) => "IXOR",
        (_, Eq) => "IEQ",
        (_, Ne) => "INE",
        (_, Lt) => "ILT",
        (_, Le) => "ILE",
        (_, Gt) => "IGT",
        (_, Ge) => "IGE",
    };
    Ok(mnemonic)
}

fn unsupported(op: BinaryOp, operand: &Type) -> EncodingError {
    EncodingError::UnsupportedExpression {
        what: format!("operator '{}' on '{operand}'", op.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Expr, FunctionDecl, GlobalBlockDecl, GlobalDecl, Item, ParamDecl, Script, StaticDecl, Stmt, StmtKind,
        TypeRef,
    };
    use crate::checker::check;
    use sctools_core::Span;

    fn program(items: Vec<Item>) -> TypedProgram {
        let output = check(&Script { items });
        assert!(output.is_success(), "{:?}", output.diagnostics);
        output.program
    }

    fn main(body: Vec<Stmt>) -> Item {
        Item::Function(FunctionDecl {
            name: "main".into(),
            params: vec![],
            return_type: None,
            body,
            span: Span::default(),
        })
    }

    fn var(name: &str, ty: TypeRef, init: Option<Expr>) -> Stmt {
        Stmt::new(StmtKind::VarDecl {
            name: name.into(),
            ty,
            initializer: init,
        })
    }

    fn render(statement: &AsmStatement) -> String {
        let mut parts = Vec::new();
        if let Some(label) = &statement.label {
            parts.push(format!("{label}:"));
        }
        if let Some(mnemonic) = &statement.mnemonic {
            parts.push(mnemonic.clone());
        }
        for operand in &statement.operands {
            parts.push(match operand {
                Operand::Int(v) => v.to_string(),
                Operand::Float(v) => format!("{v:?}"),
                Operand::String(s) => format!("{s:?}"),
                Operand::Identifier(s) => s.clone(),
                Operand::SwitchCase(v, l) => format!("{v}:{l}"),
            });
        }
        parts.join(" ")
    }

    fn listing(script: &GeneratedScript, name: &str) -> Vec<String> {
        let function = script
            .functions
            .iter()
            .find(|f| f.name() == name)
            .expect("function not generated");
        function.statements().iter().map(render).collect()
    }

    #[test]
    fn locals_and_arithmetic() {
        let script = generate(&program(vec![main(vec![
            var("x", TypeRef::named("INT"), Some(Expr::int(200))),
            var(
                "f",
                TypeRef::named("FLOAT"),
                Some(Expr::binary(BinaryOp::Add, Expr::name("x"), Expr::float(0.5))),
            ),
        ])]))
        .unwrap();
        assert_eq!(
            listing(&script, "main"),
            [
                "PUSH_CONST 200",
                "LOCAL_2",
                "STORE",
                "LOCAL_2",
                "LOAD",
                "I2F",
                "PUSH_CONST 0.5",
                "FADD",
                "LOCAL_3",
                "STORE",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn far_locals_and_vectors() {
        let locals: Vec<Stmt> = (0..6)
            .map(|i| var(&format!("pad{i}"), TypeRef::named("INT"), None))
            .chain([var(
                "v",
                TypeRef::named("VECTOR"),
                Some(Expr::vector(Expr::float(1.0), Expr::float(2.0), Expr::float(3.0))),
            )])
            .chain([Stmt::new(StmtKind::Assign {
                target: Expr::field(Expr::name("v"), "z"),
                value: Expr::float(0.0),
            })])
            .collect();
        let script = generate(&program(vec![main(locals)])).unwrap();
        // v starts at slot 8
        assert_eq!(
            listing(&script, "main"),
            [
                "PUSH_CONST 1.0",
                "PUSH_CONST 2.0",
                "PUSH_CONST 3.0",
                "PUSH_CONST 3",
                "PUSH_CONST 8",
                "LOCAL",
                "STORE_N",
                "PUSH_CONST 0.0",
                "PUSH_CONST 8",
                "LOCAL",
                "PUSH_CONST 2",
                "IADD",
                "STORE",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn control_flow_uses_local_labels() {
        let script = generate(&program(vec![main(vec![
            var("i", TypeRef::named("INT"), None),
            Stmt::new(StmtKind::While {
                condition: Expr::binary(BinaryOp::Lt, Expr::name("i"), Expr::int(3)),
                body: vec![Stmt::new(StmtKind::If {
                    condition: Expr::bool(true),
                    then_body: vec![Stmt::new(StmtKind::Goto("out".into()))],
                    else_body: vec![],
                })],
            }),
            Stmt::new(StmtKind::Label("out".into())),
        ])]))
        .unwrap();
        assert_eq!(
            listing(&script, "main"),
            [
                "$while_begin_0:",
                "LOCAL_2",
                "LOAD",
                "PUSH_CONST 3",
                "ILT",
                "JZ $while_end_1",
                "PUSH_CONST 1",
                "JZ $if_end_2",
                "J out",
                "$if_end_2:",
                "J $while_begin_0",
                "$while_end_1:",
                "out:",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn switch_without_fallthrough() {
        use crate::ast::SwitchCase;
        let case = |v: i32| SwitchCase {
            value: Expr::int(v),
            body: vec![],
            span: Span::default(),
        };
        let script = generate(&program(vec![main(vec![Stmt::new(StmtKind::Switch {
            value: Expr::int(2),
            cases: vec![case(1), case(2)],
            default: Some(vec![]),
        })])]))
        .unwrap();
        assert_eq!(
            listing(&script, "main"),
            [
                "PUSH_CONST 2",
                "SWITCH 1:$case_1 2:$case_2",
                "J $switch_default_3",
                "$case_1:",
                "J $switch_end_0",
                "$case_2:",
                "J $switch_end_0",
                "$switch_default_3:",
                "$switch_end_0:",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn calls_drop_unused_results() {
        let param = ParamDecl {
            name: "n".into(),
            ty: TypeRef::named("INT"),
            span: Span::default(),
        };
        let script = generate(&program(vec![
            Item::Function(FunctionDecl {
                name: "twice".into(),
                params: vec![param],
                return_type: Some(TypeRef::named("INT")),
                body: vec![Stmt::new(StmtKind::Return(Some(Expr::binary(
                    BinaryOp::Mul,
                    Expr::name("n"),
                    Expr::int(2),
                ))))],
                span: Span::default(),
            }),
            main(vec![Stmt::new(StmtKind::Call(Expr::call("twice", vec![Expr::int(4)])))]),
        ]))
        .unwrap();
        assert_eq!(listing(&script, "main"), ["PUSH_CONST 4", "CALL twice", "DROP", "LEAVE 0 0"]);
        assert_eq!(
            listing(&script, "twice"),
            ["LOCAL_0", "LOAD", "PUSH_CONST 2", "IMUL", "LEAVE 1 1"]
        );
    }

    #[test]
    fn arrays_are_default_initialized() {
        let script = generate(&program(vec![main(vec![var(
            "grid",
            TypeRef {
                name: "INT".into(),
                array_lengths: vec![2, 2],
                span: Span::default(),
            },
            None,
        )])]))
        .unwrap();
        assert_eq!(
            listing(&script, "main"),
            [
                "LOCAL_2",
                "PUSH_CONST 2",
                "STORE_REV",
                "DUP",
                "PUSH_CONST 1",
                "IADD",
                "PUSH_CONST 2",
                "STORE_REV",
                "PUSH_CONST 3",
                "IADD",
                "PUSH_CONST 2",
                "STORE_REV",
                "PUSH_CONST 3",
                "IADD",
                "DROP",
                "DROP",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn non_literal_statics_are_assigned_in_main() {
        let static_decl = |name: &str, init: Expr| {
            Item::Static(StaticDecl {
                name: name.into(),
                ty: TypeRef::named("INT"),
                initializer: Some(init),
                is_arg: false,
                span: Span::default(),
            })
        };
        let script = generate(&program(vec![
            static_decl("base", Expr::int(5)),
            static_decl("derived", Expr::binary(BinaryOp::Add, Expr::name("base"), Expr::int(1))),
            main(vec![]),
        ]))
        .unwrap();
        assert_eq!(script.statics[0].initializer, Some(Literal::Int(5)));
        assert_eq!(script.statics[1].initializer, None);
        assert_eq!(
            listing(&script, "main"),
            [
                "PUSH_CONST 0",
                "STATIC",
                "LOAD",
                "PUSH_CONST 1",
                "IADD",
                "PUSH_CONST 1",
                "STATIC",
                "STORE",
                "LEAVE 0 0",
            ]
        );

        let without_main = program(vec![static_decl(
            "derived",
            Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(1)),
        )]);
        assert!(generate(&without_main).is_err());
    }

    #[test]
    fn globals_are_addressed_through_global() {
        let global = |name: &str, ty: &str, init: Option<Expr>| GlobalDecl {
            name: name.into(),
            ty: TypeRef::named(ty),
            initializer: init,
            span: Span::default(),
        };
        let script = generate(&program(vec![
            Item::Globals(GlobalBlockDecl {
                name: "shared".into(),
                vars: vec![
                    global("pos", "VECTOR", None),
                    global("base", "INT", Some(Expr::int(5))),
                    global("next", "INT", Some(Expr::binary(BinaryOp::Add, Expr::name("base"), Expr::int(1)))),
                ],
                span: Span::default(),
            }),
            main(vec![]),
        ]))
        .unwrap();
        assert!(script.statics.is_empty());
        assert_eq!(script.globals.len(), 3);
        assert_eq!(script.globals[1].initializer, Some(Literal::Int(5)));
        assert_eq!(script.globals[2].initializer, None);
        assert_eq!(
            listing(&script, "main"),
            [
                "PUSH_CONST 3",
                "GLOBAL",
                "LOAD",
                "PUSH_CONST 1",
                "IADD",
                "PUSH_CONST 4",
                "GLOBAL",
                "STORE",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn text_label_assignments() {
        let script = generate(&program(vec![main(vec![
            var("short", TypeRef::named("TEXT_LABEL_7"), Some(Expr::string("hi"))),
            var("long", TypeRef::named("TEXT_LABEL_15"), Some(Expr::name("short"))),
        ])]))
        .unwrap();
        assert_eq!(
            listing(&script, "main"),
            [
                "STRING \"hi\"",
                "LOCAL_2",
                "TEXT_LABEL_ASSIGN_STRING 8",
                "PUSH_CONST 2",
                "LOCAL_2",
                "LOAD_N",
                "PUSH_CONST 2",
                "PUSH_CONST 4",
                "LOCAL_4",
                "TEXT_LABEL_COPY",
                "LEAVE 0 0",
            ]
        );
    }

    #[test]
    fn binary_mnemonics() {
        assert_eq!(binary_mnemonic(BinaryOp::Ge, &Type::Int).unwrap(), "IGE");
        assert_eq!(binary_mnemonic(BinaryOp::Ne, &Type::Float).unwrap(), "FNE");
        assert_eq!(binary_mnemonic(BinaryOp::LogicalOr, &Type::Bool).unwrap(), "IOR");
        assert_eq!(binary_mnemonic(BinaryOp::Div, &Type::Vector).unwrap(), "VDIV");
        assert!(binary_mnemonic(BinaryOp::Lt, &Type::Vector).is_err());
    }
}
