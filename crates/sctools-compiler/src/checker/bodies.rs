//! Body Pass (Pass 2) - type check statics, globals and function bodies.
//!
//! Each function body gets a fresh [`ScopeSymbolTable`] over the global
//! table, with one scope per nested block. Labels are collected up front into
//! the function's [`LabelSymbolTable`] so `goto` can jump forward.

use rustc_hash::FxHashSet;

use sctools_core::{DeclarationError, Diagnostics, Span, TypeError};
use sctools_registry::{Type, TypeRegistry};

use super::Checker;
use super::declarations::{Declared, DeclaredFunction, DeclaredGlobal, DeclaredStatic};
use super::typed::{TypedExpr, TypedExprKind, TypedFunction, TypedStatic, TypedStmt};
use crate::ast::{Expr, ExprKind, Stmt, StmtKind, SwitchCase, TypeRef};
use crate::symbols::{LabelSymbolTable, ScopeSymbolTable};

impl Checker {
    pub(super) fn check_bodies(&mut self, declared: &Declared<'_>) -> CheckedBodies {
        let statics = declared
            .statics
            .iter()
            .map(|s| self.check_static(s))
            .collect();
        let globals = declared
            .globals
            .iter()
            .map(|g| self.check_global(g))
            .collect();
        let functions = declared
            .functions
            .iter()
            .map(|f| self.check_function(f))
            .collect();
        CheckedBodies {
            statics,
            globals,
            functions,
        }
    }

    fn check_static(&mut self, declared: &DeclaredStatic<'_>) -> TypedStatic {
        let decl = declared.decl;
        TypedStatic {
            name: decl.name.clone(),
            ty: declared.ty.clone(),
            is_arg: decl.is_arg,
            initializer: self.check_data_initializer("static", &decl.name, &declared.ty, decl.initializer.as_ref()),
            span: decl.span,
        }
    }

    fn check_global(&mut self, declared: &DeclaredGlobal<'_>) -> TypedStatic {
        let decl = declared.decl;
        TypedStatic {
            name: decl.name.clone(),
            ty: declared.ty.clone(),
            is_arg: false,
            initializer: self.check_data_initializer("global", &decl.name, &declared.ty, decl.initializer.as_ref()),
            span: decl.span,
        }
    }

    /// Initializer of a static or global. `kind` names the storage in
    /// diagnostics.
    fn check_data_initializer(
        &mut self,
        kind: &'static str,
        name: &str,
        ty: &Type,
        init: Option<&Expr>,
    ) -> Option<TypedExpr> {
        let init = init?;
        if *ty == Type::String {
            self.diagnostics.error(
                init.span,
                TypeError::InvalidStaticInitializer {
                    kind,
                    name: name.to_string(),
                    reason: format!("STRING {kind}s cannot be initialized"),
                },
            );
            return None;
        }

        let scope = ScopeSymbolTable::new(&self.globals);
        let mut body = BodyChecker::new(scope, None, &mut self.registry, &mut self.diagnostics);
        let value = body.check_expr(init)?;
        match body.coerce(value, ty) {
            Ok(value) => Some(value),
            Err(found) => {
                body.diagnostics.error(
                    init.span,
                    TypeError::InvalidStaticInitializer {
                        kind,
                        name: name.to_string(),
                        reason: TypeError::Mismatch {
                            expected: ty.name(),
                            found: found.name(),
                        }
                        .to_string(),
                    },
                );
                None
            }
        }
    }

    fn check_function(&mut self, declared: &DeclaredFunction<'_>) -> TypedFunction {
        let decl = declared.decl;
        let mut scope = ScopeSymbolTable::new(&self.globals);
        for (param, ty) in decl.params.iter().zip(&declared.params) {
            if let Err(e) = scope.declare_arg(&param.name, ty.clone(), param.span) {
                self.diagnostics.error(param.span, e);
            }
        }

        let mut body = BodyChecker::new(
            scope,
            declared.return_type.clone(),
            &mut self.registry,
            &mut self.diagnostics,
        );
        body.collect_labels(&decl.body);
        let statements = body.check_block(&decl.body);

        if let Some(ret) = &declared.return_type {
            if !all_paths_return(&statements) {
                body.diagnostics
                    .error(decl.span, TypeError::MissingReturnValue { expected: ret.name() });
            }
        }

        let (args, locals) = body.scope.into_frame();
        TypedFunction {
            name: decl.name.clone(),
            args,
            locals,
            return_type: declared.return_type.clone(),
            body: statements,
            span: decl.span,
        }
    }
}

/// Typed data initializers and function bodies.
pub(super) struct CheckedBodies {
    pub statics: Vec<TypedStatic>,
    pub globals: Vec<TypedStatic>,
    pub functions: Vec<TypedFunction>,
}

/// Whether control can never fall off the end of `body`.
pub(super) fn all_paths_return(body: &[TypedStmt]) -> bool {
    match body.last() {
        Some(TypedStmt::Return(_)) => true,
        Some(TypedStmt::Block(inner)) => all_paths_return(inner),
        Some(TypedStmt::If {
            then_body,
            else_body,
            ..
        }) => all_paths_return(then_body) && all_paths_return(else_body),
        Some(TypedStmt::Switch {
            cases,
            default: Some(default),
            ..
        }) => cases.iter().all(|(_, b)| all_paths_return(b)) && all_paths_return(default),
        _ => false,
    }
}

/// Checks one body: a function, or the initializer of a static or global.
pub(super) struct BodyChecker<'g, 'd> {
    pub(super) scope: ScopeSymbolTable<'g>,
    pub(super) labels: LabelSymbolTable,
    /// `None` for procedures and data initializers.
    return_type: Option<Type>,
    /// Array types of locals are interned here.
    registry: &'d mut TypeRegistry,
    pub(super) diagnostics: &'d mut Diagnostics,
}

impl<'g, 'd> BodyChecker<'g, 'd> {
    pub(super) fn new(
        scope: ScopeSymbolTable<'g>,
        return_type: Option<Type>,
        registry: &'d mut TypeRegistry,
        diagnostics: &'d mut Diagnostics,
    ) -> Self {
        Self {
            scope,
            labels: LabelSymbolTable::new(),
            return_type,
            registry,
            diagnostics,
        }
    }

    /// Labels are per function, whatever block they appear in.
    fn collect_labels(&mut self, body: &[Stmt]) {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Label(name) => {
                    if let Err(e) = self.labels.add(name, stmt.span) {
                        self.diagnostics.error(stmt.span, e);
                    }
                }
                StmtKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.collect_labels(then_body);
                    self.collect_labels(else_body);
                }
                StmtKind::While { body, .. } | StmtKind::Repeat { body, .. } | StmtKind::Block(body) => {
                    self.collect_labels(body)
                }
                StmtKind::Switch { cases, default, .. } => {
                    for case in cases {
                        self.collect_labels(&case.body);
                    }
                    if let Some(default) = default {
                        self.collect_labels(default);
                    }
                }
                _ => {}
            }
        }
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn check_block(&mut self, body: &[Stmt]) -> Vec<TypedStmt> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            self.check_stmt(stmt, &mut out);
        }
        out
    }

    /// A nested block with its own scope.
    fn check_scoped(&mut self, body: &[Stmt]) -> Vec<TypedStmt> {
        self.scope.push_scope();
        let out = self.check_block(body);
        self.scope.pop_scope();
        out
    }

    fn check_stmt(&mut self, stmt: &Stmt, out: &mut Vec<TypedStmt>) {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                ty,
                initializer,
            } => {
                let Some(declared) = self.resolve_local_type(ty) else {
                    return;
                };
                // the initializer cannot see the variable it initializes
                let checked = initializer.as_ref().map(|init| (init.span, self.check_expr(init)));
                let ty = match &checked {
                    Some((_, Some(v))) if declared == Type::Auto && v.ty != Type::Null => v.ty.clone(),
                    _ => declared,
                };
                let value = match checked {
                    Some((span, Some(v))) => self.coerce_or_report(v, &ty, span),
                    _ => None,
                };
                let slot = match self.scope.declare_local(name, ty.clone(), stmt.span) {
                    Ok(slot) => slot,
                    Err(e) => {
                        self.diagnostics.error(stmt.span, e);
                        return;
                    }
                };
                let target = TypedExpr::new(TypedExprKind::Local(slot), ty.clone(), stmt.span);
                match value {
                    Some(value) => out.push(TypedStmt::Assign { target, value }),
                    None if initializer.is_none() && needs_default_init(&ty) => {
                        out.push(TypedStmt::DefaultInit { target })
                    }
                    None => {}
                }
            }
            StmtKind::Assign { target, value } => {
                let target = self.check_expr(target);
                let value = self.check_expr(value);
                let (Some(target), Some(value)) = (target, value) else {
                    return;
                };
                if !target.is_lvalue() {
                    self.diagnostics.error(target.span, TypeError::NotAnLValue);
                    return;
                }
                let ty = target.ty.clone();
                if let Some(value) = self.coerce_or_report(value, &ty, stmt.span) {
                    out.push(TypedStmt::Assign { target, value });
                }
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.check_condition(condition, "IF statement condition");
                let then_body = self.check_scoped(then_body);
                let else_body = self.check_scoped(else_body);
                if let Some(condition) = condition {
                    out.push(TypedStmt::If {
                        condition,
                        then_body,
                        else_body,
                    });
                }
            }
            StmtKind::While { condition, body } => {
                let condition = self.check_condition(condition, "WHILE statement condition");
                let body = self.check_scoped(body);
                if let Some(condition) = condition {
                    out.push(TypedStmt::While { condition, body });
                }
            }
            StmtKind::Repeat {
                limit,
                counter,
                body,
            } => {
                let limit = self.check_required(limit, &Type::Int, "REPEAT statement limit");
                let counter = self.check_required(counter, &Type::Int, "REPEAT statement counter");
                let counter = counter.and_then(|c| {
                    if c.is_lvalue() {
                        Some(c)
                    } else {
                        self.diagnostics.error(c.span, TypeError::NotAnLValue);
                        None
                    }
                });
                let body = self.check_scoped(body);
                if let (Some(limit), Some(counter)) = (limit, counter) {
                    out.push(TypedStmt::Repeat {
                        limit,
                        counter,
                        body,
                    });
                }
            }
            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                let value = self.check_required(value, &Type::Int, "SWITCH statement value");
                let cases = self.check_cases(cases);
                let default = default.as_ref().map(|body| self.check_scoped(body));
                if let Some(value) = value {
                    out.push(TypedStmt::Switch {
                        value,
                        cases,
                        default,
                    });
                }
            }
            StmtKind::Return(value) => self.check_return(value.as_ref(), stmt.span, out),
            StmtKind::Call(expr) => {
                if !matches!(expr.kind, ExprKind::Call { .. }) {
                    self.diagnostics.error(
                        expr.span,
                        TypeError::RequiredType {
                            context: "statement".into(),
                            expected: "a call".into(),
                            found: "an expression".into(),
                        },
                    );
                    return;
                }
                if let Some(call) = self.check_expr(expr) {
                    out.push(TypedStmt::Expr(call));
                }
            }
            StmtKind::Label(name) => out.push(TypedStmt::Label(name.clone())),
            StmtKind::Goto(name) => match self.labels.find(name) {
                Some(label) => out.push(TypedStmt::Goto(label.name.clone())),
                None => self
                    .diagnostics
                    .error(stmt.span, TypeError::UnknownLabel { name: name.clone() }),
            },
            StmtKind::Block(body) => {
                let body = self.check_scoped(body);
                out.push(TypedStmt::Block(body));
            }
        }
    }

    fn check_cases(&mut self, cases: &[SwitchCase]) -> Vec<(i32, Vec<TypedStmt>)> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::with_capacity(cases.len());
        for case in cases {
            let value = self
                .check_required(&case.value, &Type::Int, "SWITCH case value")
                .and_then(|v| match v.as_int_constant() {
                    Some(n) => Some(n),
                    None => {
                        self.diagnostics.error(
                            case.value.span,
                            TypeError::RequiredType {
                                context: "SWITCH case value".into(),
                                expected: "a constant INT".into(),
                                found: "a non-constant expression".into(),
                            },
                        );
                        None
                    }
                });
            let body = self.check_scoped(&case.body);
            if let Some(value) = value {
                if !seen.insert(value) {
                    self.diagnostics.error(case.span, TypeError::DuplicateCase { value });
                    continue;
                }
                out.push((value, body));
            }
        }
        out
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span, out: &mut Vec<TypedStmt>) {
        match (value, self.return_type.clone()) {
            (None, None) => {}
            (Some(v), None) => self.diagnostics.error(v.span, TypeError::UnexpectedReturnValue),
            (None, Some(ret)) => self
                .diagnostics
                .error(span, TypeError::MissingReturnValue { expected: ret.name() }),
            (Some(v), Some(ret)) => {
                if let Some(value) = self.check_expr(v) {
                    match self.coerce(value, &ret) {
                        Ok(value) => return out.push(TypedStmt::Return(Some(value))),
                        Err(found) => self.diagnostics.error(
                            v.span,
                            TypeError::ReturnMismatch {
                                expected: ret.name(),
                                found: found.name(),
                            },
                        ),
                    }
                }
            }
        }
        // still a return for path analysis, so one bad RETURN is one error
        out.push(TypedStmt::Return(None));
    }

    // ==========================================================================
    // Helpers
    // ==========================================================================

    fn resolve_local_type(&mut self, ty: &TypeRef) -> Option<Type> {
        let base = match self.scope.find(&ty.name) {
            Some(sym) if sym.is_type() => sym.ty().clone(),
            Some(_) => {
                self.diagnostics
                    .error(ty.span, TypeError::NotAType { name: ty.name.clone() });
                return None;
            }
            None => {
                self.diagnostics
                    .error(ty.span, DeclarationError::UnknownType { name: ty.name.clone() });
                return None;
            }
        };
        let mut resolved = base;
        for &length in &ty.array_lengths {
            resolved = match self.registry.find_or_register_array(resolved, length) {
                Ok(array) => array,
                Err(e) => {
                    self.diagnostics.error(ty.span, e);
                    return None;
                }
            };
        }
        Some(resolved)
    }

    fn check_condition(&mut self, expr: &Expr, context: &str) -> Option<TypedExpr> {
        self.check_required(expr, &Type::Bool, context)
    }

    /// Check `expr` and require exactly type `ty`.
    fn check_required(&mut self, expr: &Expr, ty: &Type, context: &str) -> Option<TypedExpr> {
        let value = self.check_expr(expr)?;
        if value.ty == *ty {
            Some(value)
        } else {
            self.diagnostics.error(
                expr.span,
                TypeError::RequiredType {
                    context: context.into(),
                    expected: ty.name(),
                    found: value.ty.name(),
                },
            );
            None
        }
    }

    fn coerce_or_report(&mut self, value: TypedExpr, ty: &Type, span: Span) -> Option<TypedExpr> {
        match self.coerce(value, ty) {
            Ok(value) => Some(value),
            Err(found) => {
                self.diagnostics.error(
                    span,
                    TypeError::Mismatch {
                        expected: ty.name(),
                        found: found.name(),
                    },
                );
                None
            }
        }
    }
}

/// Arrays need their counts written; structs may have field defaults.
pub(crate) fn needs_default_init(ty: &Type) -> bool {
    match ty {
        Type::Array(_) => true,
        Type::Struct(s) => s
            .fields()
            .iter()
            .any(|f| f.initializer.is_some() || needs_default_init(&f.ty)),
        _ => false,
    }
}
