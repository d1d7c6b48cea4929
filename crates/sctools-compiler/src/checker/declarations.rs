//! Declaration Pass (Pass 1) - hoist top-level declarations.
//!
//! Order matters:
//!
//! 1. Enums and their members. Members without an explicit value take the
//!    previous value plus one, starting at 0.
//! 2. Structs, through a worklist. A struct is registered once every field
//!    type is known; otherwise it is re-queued. A full round without progress
//!    ends the loop and every struct still queued is reported in a single
//!    [`DeclarationError::UndefinedOrCircular`].
//! 3. Statics, globals, natives and function signatures. A script has one
//!    global segment, so a second GLOBALS block is an error.

use std::collections::VecDeque;

use tracing::trace;

use sctools_core::{DeclarationError, Literal, ScToolsError, Span, TypeError};
use sctools_registry::{EnumType, Field, StructType, Type};

use super::Checker;
use super::typed::TypedNative;
use crate::ast::{
    EnumDecl, FunctionDecl, GlobalBlockDecl, GlobalDecl, Item, NativeDecl, ParamDecl, Script, StaticDecl,
    StructDecl, TypeRef,
};
use crate::symbols::{FunctionKind, Symbol};

/// A static whose type is resolved.
#[derive(Debug)]
pub(super) struct DeclaredStatic<'a> {
    pub decl: &'a StaticDecl,
    pub ty: Type,
}

/// A global whose type is resolved.
#[derive(Debug)]
pub(super) struct DeclaredGlobal<'a> {
    pub decl: &'a GlobalDecl,
    pub ty: Type,
}

/// A function whose signature is resolved.
#[derive(Debug)]
pub(super) struct DeclaredFunction<'a> {
    pub decl: &'a FunctionDecl,
    pub params: Vec<Type>,
    pub return_type: Option<Type>,
}

/// Output of the declaration pass.
#[derive(Debug, Default)]
pub(super) struct Declared<'a> {
    pub statics: Vec<DeclaredStatic<'a>>,
    pub globals: Vec<DeclaredGlobal<'a>>,
    pub functions: Vec<DeclaredFunction<'a>>,
    pub natives: Vec<TypedNative>,
}

/// Outcome of one attempt at a queued struct.
enum StructAttempt {
    Ready(StructType),
    /// Field types not known yet.
    Pending(usize),
    /// Reported; drop from the queue.
    Failed,
}

impl Checker {
    pub(super) fn declare<'a>(&mut self, script: &'a Script) -> Declared<'a> {
        let mut declared = Declared::default();

        for item in &script.items {
            if let Item::Enum(decl) = item {
                self.declare_enum(decl);
            }
        }

        let structs: Vec<&StructDecl> = script
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Struct(decl) => Some(decl),
                _ => None,
            })
            .collect();
        self.declare_structs(structs);

        let mut global_block: Option<&GlobalBlockDecl> = None;
        for item in &script.items {
            match item {
                Item::Static(decl) => {
                    if let Some(s) = self.declare_static(decl) {
                        declared.statics.push(s);
                    }
                }
                Item::Globals(block) => {
                    if let Some(existing) = global_block {
                        self.diagnostics.error(
                            block.span,
                            DeclarationError::DuplicateGlobalBlock {
                                name: block.name.clone(),
                                existing: existing.name.clone(),
                            },
                        );
                        continue;
                    }
                    global_block = Some(block);
                    declared
                        .globals
                        .extend(block.vars.iter().filter_map(|decl| self.declare_global_var(decl)));
                }
                Item::Native(decl) => {
                    if let Some(n) = self.declare_native(decl) {
                        declared.natives.push(n);
                    }
                }
                Item::Function(decl) => {
                    if let Some(f) = self.declare_function(decl) {
                        declared.functions.push(f);
                    }
                }
                Item::Enum(_) | Item::Struct(_) => {}
            }
        }

        trace!(
            statics = declared.statics.len(),
            globals = declared.globals.len(),
            functions = declared.functions.len(),
            natives = declared.natives.len(),
            "declarations hoisted"
        );
        declared
    }

    // ==========================================================================
    // Enums
    // ==========================================================================

    fn declare_enum(&mut self, decl: &EnumDecl) {
        let mut members = Vec::with_capacity(decl.members.len());
        let mut next = 0i32;
        for member in &decl.members {
            let value = member.value.unwrap_or(next);
            next = value.wrapping_add(1);
            members.push((member.name.clone(), value));
        }

        let ty = match self.registry.register(Type::enumeration(EnumType::new(&decl.name, members.clone()))) {
            Ok(ty) => ty,
            Err(e) => {
                self.diagnostics.error(decl.span, e);
                return;
            }
        };
        self.add_global(Symbol::Type {
            name: decl.name.clone(),
            ty: ty.clone(),
            span: decl.span,
        });

        for (member, (name, value)) in decl.members.iter().zip(members) {
            self.add_global(Symbol::EnumMember {
                name,
                ty: ty.clone(),
                value,
                span: member.span,
            });
        }
    }

    // ==========================================================================
    // Structs
    // ==========================================================================

    fn declare_structs(&mut self, decls: Vec<&StructDecl>) {
        let mut queue: VecDeque<(&StructDecl, usize)> = decls.into_iter().map(|d| (d, 0)).collect();

        while !queue.is_empty() {
            let mut progress = false;
            for _ in 0..queue.len() {
                let Some((decl, _)) = queue.pop_front() else {
                    break;
                };
                match self.try_struct(decl) {
                    StructAttempt::Ready(s) => {
                        progress = true;
                        self.register_struct(decl, s);
                    }
                    StructAttempt::Pending(unresolved) => queue.push_back((decl, unresolved)),
                    StructAttempt::Failed => progress = true,
                }
            }

            if !progress {
                for (decl, unresolved) in &queue {
                    trace!(name = %decl.name, unresolved, "struct left unresolved");
                }
                let names = queue.iter().map(|(d, _)| d.name.clone()).collect();
                let span = queue.front().map_or(Span::default(), |(d, _)| d.span);
                self.diagnostics
                    .error(span, DeclarationError::UndefinedOrCircular { names });
                break;
            }
        }
    }

    fn try_struct(&mut self, decl: &StructDecl) -> StructAttempt {
        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut unresolved = 0;
        let mut errors = Vec::new();

        for field in &decl.fields {
            match self.resolve_type(&field.ty) {
                Ok(ty) => fields.push((field, ty)),
                Err(ScToolsError::Declaration(DeclarationError::UnknownType { .. })) => unresolved += 1,
                Err(e) => errors.push((field.ty.span, e)),
            }
        }
        if unresolved > 0 {
            return StructAttempt::Pending(unresolved);
        }
        if !errors.is_empty() {
            for (span, e) in errors {
                self.diagnostics.error(span, e);
            }
            return StructAttempt::Failed;
        }

        let mut seen: Vec<&str> = Vec::with_capacity(fields.len());
        let mut resolved = Vec::with_capacity(fields.len());
        for (field, ty) in fields {
            if seen.iter().any(|n| n.eq_ignore_ascii_case(&field.name)) {
                self.diagnostics.error(
                    field.span,
                    DeclarationError::DuplicateIdentity {
                        name: field.name.clone(),
                    },
                );
                continue;
            }
            seen.push(field.name.as_str());

            let mut f = Field::new(&field.name, ty);
            if let Some(init) = &field.initializer {
                match field_initializer_error(&f.ty, init) {
                    Some(e) => self.diagnostics.error(field.span, e),
                    None => f = f.with_initializer(init.clone()),
                }
            }
            resolved.push(f);
        }
        StructAttempt::Ready(StructType::new(&decl.name, resolved))
    }

    fn register_struct(&mut self, decl: &StructDecl, s: StructType) {
        match self.registry.register(Type::structure(s)) {
            Ok(ty) => {
                self.add_global(Symbol::Type {
                    name: decl.name.clone(),
                    ty,
                    span: decl.span,
                });
            }
            Err(e) => self.diagnostics.error(decl.span, e),
        }
    }

    // ==========================================================================
    // Statics, globals, natives and functions
    // ==========================================================================

    fn declare_static<'a>(&mut self, decl: &'a StaticDecl) -> Option<DeclaredStatic<'a>> {
        let ty = self.resolve_or_report(&decl.ty)?;
        let added = self.add_global(Symbol::StaticField {
            name: decl.name.clone(),
            ty: ty.clone(),
            is_arg: decl.is_arg,
            initializer: None,
            span: decl.span,
        });
        added.then_some(DeclaredStatic { decl, ty })
    }

    fn declare_global_var<'a>(&mut self, decl: &'a GlobalDecl) -> Option<DeclaredGlobal<'a>> {
        let ty = self.resolve_or_report(&decl.ty)?;
        let added = self.add_global(Symbol::GlobalField {
            name: decl.name.clone(),
            ty: ty.clone(),
            span: decl.span,
        });
        added.then_some(DeclaredGlobal { decl, ty })
    }

    fn declare_native(&mut self, decl: &NativeDecl) -> Option<TypedNative> {
        let (params, return_type) = self.resolve_signature(&decl.params, decl.return_type.as_ref())?;
        let ty = self.intern_signature(return_type.clone(), params.clone(), decl.span)?;
        let added = self.add_global(Symbol::Function {
            name: decl.name.clone(),
            ty,
            kind: FunctionKind::Native,
            span: decl.span,
        });
        added.then(|| TypedNative {
            name: decl.name.clone(),
            params,
            return_type,
        })
    }

    fn declare_function<'a>(&mut self, decl: &'a FunctionDecl) -> Option<DeclaredFunction<'a>> {
        let (params, return_type) = self.resolve_signature(&decl.params, decl.return_type.as_ref())?;
        let ty = self.intern_signature(return_type.clone(), params.clone(), decl.span)?;
        let added = self.add_global(Symbol::Function {
            name: decl.name.clone(),
            ty,
            kind: FunctionKind::Script,
            span: decl.span,
        });
        added.then_some(DeclaredFunction {
            decl,
            params,
            return_type,
        })
    }

    fn resolve_signature(
        &mut self,
        params: &[ParamDecl],
        return_type: Option<&TypeRef>,
    ) -> Option<(Vec<Type>, Option<Type>)> {
        let mut ok = true;
        let mut types = Vec::with_capacity(params.len());
        for p in params {
            match self.resolve_or_report(&p.ty) {
                Some(ty) => types.push(ty),
                None => ok = false,
            }
        }
        let ret = match return_type {
            Some(r) => match self.resolve_or_report(r) {
                Some(ty) => Some(ty),
                None => {
                    ok = false;
                    None
                }
            },
            None => None,
        };
        ok.then_some((types, ret))
    }

    fn intern_signature(&mut self, return_type: Option<Type>, params: Vec<Type>, span: Span) -> Option<Type> {
        match self.registry.register(Type::function(return_type, params)) {
            Ok(ty) => Some(ty),
            Err(e) => {
                self.diagnostics.error(span, e);
                None
            }
        }
    }

    // ==========================================================================
    // Helpers
    // ==========================================================================

    /// Resolve a written type. Array lengths wrap innermost first, each array
    /// interned in the registry.
    pub(super) fn resolve_type(&mut self, type_ref: &TypeRef) -> Result<Type, ScToolsError> {
        let base = match self.globals.find(&type_ref.name) {
            Some(Symbol::Type { ty, .. }) => ty.clone(),
            Some(_) => {
                return Err(TypeError::NotAType {
                    name: type_ref.name.clone(),
                }
                .into());
            }
            None => {
                return Err(DeclarationError::UnknownType {
                    name: type_ref.name.clone(),
                }
                .into());
            }
        };
        let mut ty = base;
        for &length in &type_ref.array_lengths {
            ty = self.registry.find_or_register_array(ty, length)?;
        }
        Ok(ty)
    }

    fn resolve_or_report(&mut self, type_ref: &TypeRef) -> Option<Type> {
        match self.resolve_type(type_ref) {
            Ok(ty) => Some(ty),
            Err(e) => {
                self.diagnostics.error(type_ref.span, e);
                None
            }
        }
    }

    /// Add to the global table, reporting a clash. Returns whether it was
    /// added.
    fn add_global(&mut self, symbol: Symbol) -> bool {
        let span = symbol.span();
        match self.globals.add(symbol) {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics.error(span, e);
                false
            }
        }
    }
}

/// Type of a literal on its own.
pub(super) fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::Int,
        Literal::Float(_) => Type::Float,
        Literal::Bool(_) => Type::Bool,
        Literal::String(_) => Type::String,
        Literal::Null => Type::Null,
    }
}

/// Struct field defaults are written in place when a local is declared, so
/// only single-slot scalars can carry one.
fn field_initializer_error(ty: &Type, init: &Literal) -> Option<TypeError> {
    if !matches!(ty, Type::Int | Type::Float | Type::Bool) {
        return Some(TypeError::RequiredType {
            context: "field initializer".into(),
            expected: "an INT, FLOAT or BOOL".into(),
            found: ty.name(),
        });
    }
    let found = literal_type(init);
    (!ty.is_assignable_from(&found)).then(|| TypeError::Mismatch {
        expected: ty.name(),
        found: found.name(),
    })
}
