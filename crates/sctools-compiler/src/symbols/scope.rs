//! Block-scoped symbols of the function being checked.
//!
//! `ScopeSymbolTable` tracks arguments and locals and hands out their frame
//! slots. The frame is laid out as arguments, two reserved slots (return
//! address and saved frame pointer), then locals. Every local gets its own
//! slots for the whole function; slots are never reused across blocks.
//!
//! Lookup walks the block stack innermost-first and falls back to the
//! [`GlobalSymbolTable`].

use rustc_hash::FxHashMap;

use sctools_core::{DeclarationError, Span, SymbolId};
use sctools_registry::Type;

use super::{GlobalSymbolTable, Symbol};
use crate::function_def::FieldDef;

/// Reserved frame slots between arguments and locals.
pub const RESERVED_FRAME_SLOTS: u32 = 2;

/// Symbol table for one function body.
#[derive(Debug)]
pub struct ScopeSymbolTable<'g> {
    global: &'g GlobalSymbolTable,

    /// One map per open block; index 0 is the function scope.
    scopes: Vec<FxHashMap<SymbolId, Symbol>>,

    args: Vec<FieldDef>,
    locals: Vec<FieldDef>,
    arg_slots: u32,
    local_slots: u32,
}

impl<'g> ScopeSymbolTable<'g> {
    pub fn new(global: &'g GlobalSymbolTable) -> Self {
        Self {
            global,
            scopes: vec![FxHashMap::default()],
            args: Vec::new(),
            locals: Vec::new(),
            arg_slots: 0,
            local_slots: 0,
        }
    }

    pub fn global(&self) -> &'g GlobalSymbolTable {
        self.global
    }

    // ==========================================================================
    // Scope Management
    // ==========================================================================

    /// Enter a nested block.
    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Leave the innermost block, dropping its symbols. The function scope
    /// itself is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Nesting depth; 0 is the function scope.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    // ==========================================================================
    // Declaration
    // ==========================================================================

    /// Declare an argument. Arguments must be declared before any local.
    ///
    /// Returns the argument's first frame slot.
    pub fn declare_arg(&mut self, name: &str, ty: Type, span: Span) -> Result<u32, DeclarationError> {
        let slot = self.arg_slots;
        self.insert(Symbol::Arg {
            name: name.to_string(),
            ty: ty.clone(),
            slot,
            span,
        })?;
        self.arg_slots += ty.slot_count() as u32;
        self.args.push(FieldDef::new(name, ty));
        Ok(slot)
    }

    /// Declare a local in the innermost block. A name may shadow one from an
    /// outer block but not one from the same block.
    ///
    /// Returns the local's first frame slot.
    pub fn declare_local(&mut self, name: &str, ty: Type, span: Span) -> Result<u32, DeclarationError> {
        let slot = self.arg_slots + RESERVED_FRAME_SLOTS + self.local_slots;
        self.insert(Symbol::Local {
            name: name.to_string(),
            ty: ty.clone(),
            slot,
            span,
        })?;
        self.local_slots += ty.slot_count() as u32;
        self.locals.push(FieldDef::new(name, ty));
        Ok(slot)
    }

    fn insert(&mut self, symbol: Symbol) -> Result<(), DeclarationError> {
        let id = symbol.id();
        let depth = self.depth();
        let scope = &mut self.scopes[depth];
        if let Some(existing) = scope.get(&id) {
            let name = symbol.name().to_string();
            return Err(if existing.name().eq_ignore_ascii_case(&name) {
                DeclarationError::DuplicateIdentity { name }
            } else {
                DeclarationError::HashCollision {
                    name,
                    existing: existing.name().to_string(),
                    id,
                }
            });
        }
        scope.insert(id, symbol);
        Ok(())
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Innermost block first, then the global table.
    pub fn find(&self, name: &str) -> Option<&Symbol> {
        let id = SymbolId::from_name(name);
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&id))
            .or_else(|| self.global.find_by_id(id))
    }

    /// Whether `name` is declared in the innermost block.
    pub fn is_declared_in_current_scope(&self, name: &str) -> bool {
        let id = SymbolId::from_name(name);
        self.scopes.last().is_some_and(|s| s.contains_key(&id))
    }

    // ==========================================================================
    // Frame
    // ==========================================================================

    pub fn arg_slots(&self) -> u32 {
        self.arg_slots
    }

    pub fn local_slots(&self) -> u32 {
        self.local_slots
    }

    pub fn frame_size(&self) -> u32 {
        self.arg_slots + RESERVED_FRAME_SLOTS + self.local_slots
    }

    /// Arguments and locals in declaration order.
    pub fn into_frame(self) -> (Vec<FieldDef>, Vec<FieldDef>) {
        (self.args, self.locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sctools_registry::TypeRegistry;

    #[test]
    fn frame_slots() {
        let global = GlobalSymbolTable::new();
        let mut scope = ScopeSymbolTable::new(&global);
        assert_eq!(scope.declare_arg("a", Type::Int, Span::default()), Ok(0));
        assert_eq!(scope.declare_arg("v", Type::Vector, Span::default()), Ok(1));
        assert_eq!(scope.declare_local("x", Type::Int, Span::default()), Ok(6));
        assert_eq!(scope.declare_local("t", Type::TextLabel(16), Span::default()), Ok(7));
        assert_eq!(scope.declare_local("y", Type::Float, Span::default()), Ok(11));
        assert_eq!(scope.frame_size(), 12);

        let (args, locals) = scope.into_frame();
        assert_eq!(args.len(), 2);
        assert_eq!(locals.len(), 3);
    }

    #[test]
    fn shadowing_and_restoration() {
        let global = GlobalSymbolTable::new();
        let mut scope = ScopeSymbolTable::new(&global);
        scope.declare_local("x", Type::Int, Span::default()).unwrap();

        scope.push_scope();
        assert_eq!(scope.depth(), 1);
        scope.declare_local("X", Type::Float, Span::default()).unwrap();
        assert_eq!(scope.find("x").map(Symbol::ty), Some(&Type::Float));
        scope.pop_scope();

        assert_eq!(scope.depth(), 0);
        assert_eq!(scope.find("x").map(Symbol::ty), Some(&Type::Int));
    }

    #[test]
    fn slots_are_not_reused() {
        let global = GlobalSymbolTable::new();
        let mut scope = ScopeSymbolTable::new(&global);
        scope.push_scope();
        let a = scope.declare_local("a", Type::Int, Span::default()).unwrap();
        scope.pop_scope();
        scope.push_scope();
        let b = scope.declare_local("b", Type::Int, Span::default()).unwrap();
        scope.pop_scope();
        assert_ne!(a, b);
    }

    #[test]
    fn redeclaration_in_same_block() {
        let global = GlobalSymbolTable::new();
        let mut scope = ScopeSymbolTable::new(&global);
        scope.declare_arg("a", Type::Int, Span::default()).unwrap();
        assert_eq!(
            scope.declare_local("A", Type::Int, Span::default()),
            Err(DeclarationError::DuplicateIdentity { name: "A".into() })
        );
    }

    #[test]
    fn falls_back_to_global() {
        let global = GlobalSymbolTable::with_types(&TypeRegistry::with_builtins());
        let mut scope = ScopeSymbolTable::new(&global);
        assert!(scope.find("VECTOR").is_some_and(Symbol::is_type));
        scope.declare_local("vector", Type::Int, Span::default()).unwrap();
        assert!(scope.find("VECTOR").is_some_and(Symbol::is_variable));
        assert!(scope.is_declared_in_current_scope("Vector"));
    }

    #[test]
    fn function_scope_is_never_popped() {
        let global = GlobalSymbolTable::new();
        let mut scope = ScopeSymbolTable::new(&global);
        scope.declare_local("x", Type::Int, Span::default()).unwrap();
        scope.pop_scope();
        assert!(scope.find("x").is_some());
    }
}
