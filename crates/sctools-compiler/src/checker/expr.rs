//! Expression typing.
//!
//! Every check returns `None` once the problem is reported, so one bad
//! sub-expression yields one diagnostic rather than a cascade.
//!
//! ## Operators
//!
//! | Operands | Operators | Result |
//! |---|---|---|
//! | `INT, INT` | `+ - * / % & \| ^` | `INT` |
//! | `FLOAT, FLOAT` | `+ - * / %` | `FLOAT` |
//! | `INT, FLOAT` | as `FLOAT, FLOAT`, the `INT` side converted | `FLOAT` |
//! | `VECTOR, VECTOR` | `+ - * /` | `VECTOR` |
//! | `VECTOR, FLOAT` | `* /`, the `FLOAT` side widened | `VECTOR` |
//! | `BOOL, BOOL` | `& \| ^` | `BOOL` |
//! | `INT`/`BOOL` | `AND OR` | `BOOL` |
//! | numbers | `== <> < <= > >=` | `BOOL` |
//! | same enum, handle or `BOOL` | `== <>` | `BOOL` |

use std::sync::Arc;

use sctools_core::{Literal, Span, TypeError};
use sctools_registry::{SLOT_SIZE, Type};

use super::bodies::BodyChecker;
use super::declarations::literal_type;
use super::typed::{Conversion, TypedExpr, TypedExprKind};
use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::symbols::{FunctionKind, Symbol};

impl BodyChecker<'_, '_> {
    /// Type an expression used as a value. Type names are rejected here.
    pub(super) fn check_expr(&mut self, expr: &Expr) -> Option<TypedExpr> {
        let value = self.check_value_or_type(expr)?;
        if let Type::TypeName(named) = &value.ty {
            self.diagnostics
                .error(value.span, TypeError::TypeAsValue { name: named.name() });
            return None;
        }
        Some(value)
    }

    fn check_value_or_type(&mut self, expr: &Expr) -> Option<TypedExpr> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(Literal::String(s)) => {
                Some(TypedExpr::new(TypedExprKind::String(s.clone()), Type::String, span))
            }
            ExprKind::Literal(lit) => Some(TypedExpr::new(TypedExprKind::Const(lit.clone()), literal_type(lit), span)),
            ExprKind::Name(name) => self.check_name(name, span),
            ExprKind::Unary { op, operand } => {
                let operand = self.check_expr(operand)?;
                self.check_unary(*op, operand, span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.check_expr(lhs);
                let rhs = self.check_expr(rhs);
                self.check_binary(*op, lhs?, rhs?, span)
            }
            ExprKind::Field { target, field } => {
                let target = self.check_expr(target)?;
                self.check_field(target, field, span)
            }
            ExprKind::Index { target, index } => {
                let target = self.check_expr(target);
                let index = self.check_expr(index);
                self.check_index(target?, index?, span)
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, span),
            ExprKind::Vector(components) => {
                let [x, y, z] = components.as_ref();
                let x = self.check_component(x);
                let y = self.check_component(y);
                let z = self.check_component(z);
                Some(TypedExpr::new(
                    TypedExprKind::Vector(Box::new([x?, y?, z?])),
                    Type::Vector,
                    span,
                ))
            }
            ExprKind::SizeOf(inner) => {
                let inner = self.check_value_or_type(inner)?;
                let ty = match &inner.ty {
                    Type::TypeName(named) => named.as_ref().clone(),
                    other => other.clone(),
                };
                Some(TypedExpr::new(
                    TypedExprKind::Const(Literal::Int(ty.slot_count() as i32)),
                    Type::Int,
                    span,
                ))
            }
        }
    }

    /// Convert `value` for storage into `target`. On failure returns the
    /// offending source type.
    pub(super) fn coerce(&self, value: TypedExpr, target: &Type) -> Result<TypedExpr, Type> {
        if !target.is_assignable_from(&value.ty) {
            return Err(value.ty);
        }
        match (target, &value.ty) {
            (Type::String, Type::TextLabel(_)) if value.is_lvalue() => {
                Ok(convert(Conversion::TextLabelToString, value, Type::String))
            }
            (Type::String, Type::TextLabel(_)) => Err(value.ty),
            _ => Ok(value),
        }
    }

    // ==========================================================================
    // Names
    // ==========================================================================

    fn check_name(&mut self, name: &str, span: Span) -> Option<TypedExpr> {
        let Some(symbol) = self.scope.find(name) else {
            self.diagnostics
                .error(span, TypeError::UnknownName { name: name.to_string() });
            return None;
        };
        let expr = match symbol {
            Symbol::Arg { slot, ty, .. } | Symbol::Local { slot, ty, .. } => {
                TypedExpr::new(TypedExprKind::Local(*slot), ty.clone(), span)
            }
            Symbol::StaticField { name, ty, .. } => TypedExpr::new(TypedExprKind::Static(name.clone()), ty.clone(), span),
            Symbol::GlobalField { name, ty, .. } => TypedExpr::new(TypedExprKind::Global(name.clone()), ty.clone(), span),
            Symbol::EnumMember { value, ty, .. } => {
                TypedExpr::new(TypedExprKind::Const(Literal::Int(*value)), ty.clone(), span)
            }
            Symbol::Type { ty, .. } => TypedExpr::new(TypedExprKind::TypeName, Type::TypeName(Arc::new(ty.clone())), span),
            Symbol::Function { name, .. } => {
                let name = name.clone();
                self.diagnostics.error(
                    span,
                    TypeError::RequiredType {
                        context: format!("'{name}'"),
                        expected: "a value".into(),
                        found: "function".into(),
                    },
                );
                return None;
            }
        };
        Some(expr)
    }

    // ==========================================================================
    // Operators
    // ==========================================================================

    fn check_unary(&mut self, op: UnaryOp, operand: TypedExpr, span: Span) -> Option<TypedExpr> {
        // fold literals so negative constants stay constants
        match (op, &operand.kind) {
            (UnaryOp::Neg, TypedExprKind::Const(Literal::Int(v))) if operand.ty == Type::Int => {
                return Some(TypedExpr::new(TypedExprKind::Const(Literal::Int(v.wrapping_neg())), Type::Int, span));
            }
            (UnaryOp::Neg, TypedExprKind::Const(Literal::Float(v))) => {
                return Some(TypedExpr::new(TypedExprKind::Const(Literal::float(-v.0)), Type::Float, span));
            }
            (UnaryOp::Not, TypedExprKind::Const(Literal::Bool(b))) => {
                return Some(TypedExpr::new(TypedExprKind::Const(Literal::Bool(!b)), Type::Bool, span));
            }
            _ => {}
        }

        let valid = match op {
            UnaryOp::Neg => matches!(operand.ty, Type::Int | Type::Float | Type::Vector),
            UnaryOp::Not => matches!(operand.ty, Type::Bool | Type::Int),
        };
        if !valid {
            self.diagnostics.error(
                span,
                TypeError::InvalidUnaryOperator {
                    op: op.as_str().into(),
                    operand: operand.ty.name(),
                },
            );
            return None;
        }
        let ty = operand.ty.clone();
        Some(TypedExpr::new(
            TypedExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        ))
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: TypedExpr, rhs: TypedExpr, span: Span) -> Option<TypedExpr> {
        let Some(rule) = binary_rule(op, &lhs.ty, &rhs.ty) else {
            self.diagnostics.error(
                span,
                TypeError::InvalidBinaryOperator {
                    op: op.as_str().into(),
                    lhs: lhs.ty.name(),
                    rhs: rhs.ty.name(),
                },
            );
            return None;
        };
        let lhs = apply(rule.lhs, lhs);
        let rhs = apply(rule.rhs, rhs);
        Some(TypedExpr::new(
            TypedExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            rule.result,
            span,
        ))
    }

    // ==========================================================================
    // Access
    // ==========================================================================

    fn check_field(&mut self, target: TypedExpr, name: &str, span: Span) -> Option<TypedExpr> {
        let Some(field) = target.ty.field(name) else {
            self.diagnostics.error(
                span,
                TypeError::UnknownField {
                    ty: target.ty.name(),
                    field: name.to_string(),
                },
            );
            return None;
        };
        if !target.is_lvalue() {
            self.diagnostics.error(target.span, TypeError::NotAnLValue);
            return None;
        }
        Some(TypedExpr::new(
            TypedExprKind::Field {
                target: Box::new(target),
                offset: (field.offset / SLOT_SIZE) as u32,
            },
            field.ty,
            span,
        ))
    }

    fn check_index(&mut self, target: TypedExpr, index: TypedExpr, span: Span) -> Option<TypedExpr> {
        let Some(array) = target.ty.as_array() else {
            self.diagnostics
                .error(span, TypeError::NotIndexable { ty: target.ty.name() });
            return None;
        };
        let item = array.item().clone();
        if index.ty != Type::Int {
            self.diagnostics.error(
                index.span,
                TypeError::RequiredType {
                    context: "array index".into(),
                    expected: "INT".into(),
                    found: index.ty.name(),
                },
            );
            return None;
        }
        if !target.is_lvalue() {
            self.diagnostics.error(target.span, TypeError::NotAnLValue);
            return None;
        }
        Some(TypedExpr::new(
            TypedExprKind::Index {
                target: Box::new(target),
                index: Box::new(index),
                item_slots: item.slot_count() as u32,
            },
            item,
            span,
        ))
    }

    fn check_component(&mut self, expr: &Expr) -> Option<TypedExpr> {
        let value = self.check_expr(expr)?;
        if value.ty == Type::Float {
            return Some(value);
        }
        self.diagnostics.error(
            expr.span,
            TypeError::RequiredType {
                context: "vector component".into(),
                expected: "FLOAT".into(),
                found: value.ty.name(),
            },
        );
        None
    }

    // ==========================================================================
    // Calls
    // ==========================================================================

    fn check_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Option<TypedExpr> {
        let ExprKind::Name(name) = &callee.kind else {
            self.diagnostics.error(
                callee.span,
                TypeError::NotCallable {
                    name: "expression".into(),
                },
            );
            return None;
        };
        let (name, signature, kind) = match self.scope.find(name) {
            Some(Symbol::Function { name, ty, kind, .. }) => match ty.as_function() {
                Some(f) => (name.clone(), f.clone(), *kind),
                None => {
                    self.diagnostics
                        .error(callee.span, TypeError::NotCallable { name: name.clone() });
                    return None;
                }
            },
            Some(_) => {
                self.diagnostics
                    .error(callee.span, TypeError::NotCallable { name: name.clone() });
                return None;
            }
            None => {
                self.diagnostics
                    .error(callee.span, TypeError::UnknownName { name: name.clone() });
                return None;
            }
        };

        let mut ok = true;
        if args.len() != signature.params.len() {
            self.diagnostics.error(
                span,
                TypeError::ArgumentCount {
                    expected: signature.params.len(),
                    found: args.len(),
                },
            );
            ok = false;
        }

        let mut typed = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let Some(value) = self.check_expr(arg) else {
                ok = false;
                continue;
            };
            let Some(param) = signature.params.get(index) else {
                continue;
            };
            match self.coerce(value, param) {
                Ok(value) => typed.push(value),
                Err(found) => {
                    self.diagnostics.error(
                        arg.span,
                        TypeError::ArgumentType {
                            index,
                            expected: param.name(),
                            found: found.name(),
                        },
                    );
                    ok = false;
                }
            }
        }
        if !ok {
            return None;
        }

        let ty = signature.return_type.clone().unwrap_or(Type::Void);
        let kind = match kind {
            FunctionKind::Script => TypedExprKind::Call { name, args: typed },
            FunctionKind::Native => TypedExprKind::NativeCall {
                name,
                args: typed,
                arg_slots: signature.param_slots() as u32,
                return_slots: signature.return_slots() as u32,
            },
        };
        Some(TypedExpr::new(kind, ty, span))
    }
}

/// Operand conversions and result type of a binary operator.
#[derive(Debug, Clone, PartialEq)]
struct BinaryRule {
    lhs: Option<Conversion>,
    rhs: Option<Conversion>,
    result: Type,
}

impl BinaryRule {
    fn plain(result: Type) -> Self {
        Self {
            lhs: None,
            rhs: None,
            result,
        }
    }
}

fn binary_rule(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<BinaryRule> {
    use BinaryOp::*;

    let arithmetic = matches!(op, Add | Sub | Mul | Div | Mod);
    let bitwise = matches!(op, BitAnd | BitOr | BitXor);
    let logical = matches!(op, LogicalAnd | LogicalOr);
    let equality = matches!(op, Eq | Ne);

    match (lhs, rhs) {
        (Type::Int, Type::Int) if arithmetic || bitwise => Some(BinaryRule::plain(Type::Int)),
        (Type::Int, Type::Int) if op.is_comparison() => Some(BinaryRule::plain(Type::Bool)),
        (Type::Float, Type::Float) if arithmetic => Some(BinaryRule::plain(Type::Float)),
        (Type::Float, Type::Float) if op.is_comparison() => Some(BinaryRule::plain(Type::Bool)),
        (Type::Int, Type::Float) | (Type::Float, Type::Int) if arithmetic || op.is_comparison() => {
            let promote = |t: &Type| (*t == Type::Int).then_some(Conversion::IntToFloat);
            Some(BinaryRule {
                lhs: promote(lhs),
                rhs: promote(rhs),
                result: if arithmetic { Type::Float } else { Type::Bool },
            })
        }
        (Type::Int | Type::Bool, Type::Int | Type::Bool) if logical => Some(BinaryRule::plain(Type::Bool)),
        (Type::Bool, Type::Bool) if bitwise || equality => Some(BinaryRule::plain(Type::Bool)),
        (Type::Vector, Type::Vector) if matches!(op, Add | Sub | Mul | Div) => Some(BinaryRule::plain(Type::Vector)),
        (Type::Vector, Type::Float) | (Type::Float, Type::Vector) if matches!(op, Mul | Div) => {
            let widen = |t: &Type| (*t == Type::Float).then_some(Conversion::FloatToVector);
            Some(BinaryRule {
                lhs: widen(lhs),
                rhs: widen(rhs),
                result: Type::Vector,
            })
        }
        (Type::Enum(a), Type::Enum(b)) if equality && a == b => Some(BinaryRule::plain(Type::Bool)),
        (Type::Handle(a), Type::Handle(b)) if equality && a == b => Some(BinaryRule::plain(Type::Bool)),
        (Type::Handle(_), Type::Null) | (Type::Null, Type::Handle(_)) if equality => Some(BinaryRule::plain(Type::Bool)),
        _ => None,
    }
}

fn convert(conversion: Conversion, operand: TypedExpr, ty: Type) -> TypedExpr {
    let span = operand.span;
    TypedExpr::new(
        TypedExprKind::Convert {
            conversion,
            operand: Box::new(operand),
        },
        ty,
        span,
    )
}

fn apply(conversion: Option<Conversion>, operand: TypedExpr) -> TypedExpr {
    match conversion {
        None => operand,
        Some(c @ Conversion::IntToFloat) => convert(c, operand, Type::Float),
        Some(c @ Conversion::FloatToVector) => convert(c, operand, Type::Vector),
        Some(c @ Conversion::TextLabelToString) => convert(c, operand, Type::String),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sctools_registry::HandleKind;

    #[test]
    fn int_float_promotion() {
        let rule = binary_rule(BinaryOp::Add, &Type::Int, &Type::Float).unwrap();
        assert_eq!(rule.lhs, Some(Conversion::IntToFloat));
        assert_eq!(rule.rhs, None);
        assert_eq!(rule.result, Type::Float);

        let cmp = binary_rule(BinaryOp::Lt, &Type::Float, &Type::Int).unwrap();
        assert_eq!(cmp.rhs, Some(Conversion::IntToFloat));
        assert_eq!(cmp.result, Type::Bool);
    }

    #[test]
    fn operator_table() {
        assert_eq!(binary_rule(BinaryOp::Mod, &Type::Int, &Type::Int).map(|r| r.result), Some(Type::Int));
        assert_eq!(binary_rule(BinaryOp::BitAnd, &Type::Float, &Type::Float), None);
        assert_eq!(
            binary_rule(BinaryOp::LogicalAnd, &Type::Bool, &Type::Int).map(|r| r.result),
            Some(Type::Bool)
        );
        assert_eq!(binary_rule(BinaryOp::Lt, &Type::Bool, &Type::Bool), None);
        assert_eq!(binary_rule(BinaryOp::Add, &Type::Vector, &Type::Float), None);
        assert_eq!(
            binary_rule(BinaryOp::Mul, &Type::Float, &Type::Vector).map(|r| r.lhs),
            Some(Some(Conversion::FloatToVector))
        );
        assert_eq!(binary_rule(BinaryOp::Add, &Type::String, &Type::String), None);
    }

    #[test]
    fn handle_equality() {
        let ped = Type::Handle(HandleKind::PedIndex);
        let car = Type::Handle(HandleKind::VehicleIndex);
        assert!(binary_rule(BinaryOp::Eq, &ped, &ped).is_some());
        assert!(binary_rule(BinaryOp::Ne, &ped, &Type::Null).is_some());
        assert!(binary_rule(BinaryOp::Eq, &ped, &car).is_none());
        assert!(binary_rule(BinaryOp::Lt, &ped, &ped).is_none());
    }
}
