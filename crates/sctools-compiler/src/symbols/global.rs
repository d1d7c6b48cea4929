//! Global symbol table.
//!
//! Holds the built-in types seeded from a [`TypeRegistry`] plus every
//! top-level declaration of one compilation unit. Symbols are keyed by their
//! identity hash, so two spellings of the same name are the same symbol, and
//! two names with the same hash are a collision.

use rustc_hash::FxHashMap;

use sctools_core::{DeclarationError, Span, SymbolId};
use sctools_registry::{Type, TypeRegistry};

use super::Symbol;

/// Top-level symbols of a compilation unit.
#[derive(Debug, Clone, Default)]
pub struct GlobalSymbolTable {
    symbols: FxHashMap<SymbolId, Symbol>,
    /// Insertion order, for deterministic iteration.
    order: Vec<SymbolId>,
}

impl GlobalSymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded with a type symbol for every registered type that can
    /// be named in source. Array types are named by their element type and
    /// are left out.
    pub fn with_types(registry: &TypeRegistry) -> Self {
        let mut table = Self::new();
        let mut types: Vec<_> = registry
            .iter()
            .filter(|(_, ty)| !matches!(ty, Type::Array(_) | Type::Function(_) | Type::TypeName(_)))
            .collect();
        types.sort_by_key(|(id, _)| *id);
        for (id, ty) in types {
            table.order.push(id);
            table.symbols.insert(
                id,
                Symbol::Type {
                    name: ty.name(),
                    ty: ty.clone(),
                    span: Span::default(),
                },
            );
        }
        table
    }

    /// Add a symbol.
    ///
    /// Fails with [`DeclarationError::DuplicateIdentity`] when the name is
    /// already declared, and [`DeclarationError::HashCollision`] when a
    /// different name has the same identity.
    pub fn add(&mut self, symbol: Symbol) -> Result<(), DeclarationError> {
        let id = symbol.id();
        if let Some(existing) = self.symbols.get(&id) {
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
        self.order.push(id);
        self.symbols.insert(id, symbol);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.find_by_id(SymbolId::from_name(name))
    }

    #[inline]
    pub fn find_by_id(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// The type named `name`, if `name` is a type symbol.
    pub fn find_type(&self, name: &str) -> Option<&Type> {
        match self.find(name)? {
            Symbol::Type { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(&SymbolId::from_name(name))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.order.iter().filter_map(|id| self.symbols.get(id))
    }
}
