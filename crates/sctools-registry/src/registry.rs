//! TypeRegistry - interning store for script types.
//!
//! Types are keyed by the identity hash of their canonical name. The registry
//! hands back the interned instance when an identical type is registered
//! again, and refuses a different type under an identity already in use.
//!
//! # Dependency Tracking
//!
//! Composite types (structs, arrays, function signatures) depend on the
//! registered types they are built from. Dependencies are edges of a
//! `petgraph` [`DiGraphMap`] from dependent to dependency, so removing a type
//! can either be refused while it has dependents, or cascade through them.
//!
//! # Example
//!
//! ```
//! use sctools_registry::{Type, TypeRegistry};
//!
//! let mut registry = TypeRegistry::with_builtins();
//! let int = registry.find("int").unwrap();
//! assert_eq!(int, Type::Int);
//!
//! let arr = registry.find_or_register_array(Type::Int, 4).unwrap();
//! assert_eq!(arr.name(), "INT[4]");
//! assert!(registry.find("INT[4]").is_some());
//! ```

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use sctools_core::{DeclarationError, SymbolId};

use crate::builtins::builtin_types;
use crate::types::Type;

/// Interning store for types, with dependency tracking.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: FxHashMap<SymbolId, Type>,
    /// Edge `a -> b`: registered type `a` is built from registered type `b`.
    dependencies: DiGraphMap<SymbolId, ()>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry holding only `AUTO`.
    pub fn new() -> Self {
        let mut registry = Self {
            types: FxHashMap::default(),
            dependencies: DiGraphMap::new(),
        };
        let auto = SymbolId::from_name(&Type::Auto.name());
        registry.types.insert(auto, Type::Auto);
        registry.dependencies.add_node(auto);
        registry
    }

    /// A registry holding `AUTO` and every built-in type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for ty in builtin_types() {
            let id = SymbolId::from_name(&ty.name());
            registry.types.insert(id, ty);
            registry.dependencies.add_node(id);
        }
        registry
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register a type, or return the interned instance of an identical one.
    pub fn register(&mut self, ty: Type) -> Result<Type, DeclarationError> {
        let name = ty.name();
        let id = SymbolId::from_name(&name);

        if let Some(existing) = self.types.get(&id) {
            if *existing == ty {
                return Ok(existing.clone());
            }
            let existing_name = existing.name();
            return Err(if existing_name.eq_ignore_ascii_case(&name) {
                DeclarationError::DuplicateIdentity { name }
            } else {
                DeclarationError::HashCollision {
                    name,
                    existing: existing_name,
                    id,
                }
            });
        }

        self.dependencies.add_node(id);
        for child in ty.children() {
            let child_id = SymbolId::from_name(&child.name());
            if child_id != id && self.types.contains_key(&child_id) {
                self.dependencies.add_edge(id, child_id, ());
            }
        }
        self.types.insert(id, ty.clone());
        Ok(ty)
    }

    /// Intern `ITEM[length]`.
    pub fn find_or_register_array(
        &mut self,
        item: Type,
        length: u32,
    ) -> Result<Type, DeclarationError> {
        let array = Type::array(item, length);
        match self.find_by_id(SymbolId::from_name(&array.name())) {
            Some(existing) if existing == array => Ok(existing),
            _ => self.register(array),
        }
    }

    /// Remove a type. Fails with [`DeclarationError::HasDependents`] when
    /// other registered types are built from it, unless `cascade` is set, in
    /// which case those are removed first, depth-first.
    pub fn unregister(&mut self, id: SymbolId, cascade: bool) -> Result<(), DeclarationError> {
        let Some(ty) = self.types.get(&id) else {
            return Err(DeclarationError::UnknownType {
                name: id.to_string(),
            });
        };
        if *ty == Type::Auto {
            return Err(DeclarationError::PermanentType { name: ty.name() });
        }

        let dependents = self.dependents_of(id);
        if !dependents.is_empty() {
            if !cascade {
                let mut names: Vec<String> = dependents
                    .iter()
                    .filter_map(|d| self.types.get(d).map(Type::name))
                    .collect();
                names.sort();
                return Err(DeclarationError::HasDependents {
                    name: ty.name(),
                    dependents: names,
                });
            }
            for dependent in dependents {
                // an earlier branch of the cascade may already have removed it
                if self.types.contains_key(&dependent) {
                    self.unregister(dependent, true)?;
                }
            }
        }

        if let Some(removed) = self.types.remove(&id) {
            debug!(ty = %removed, "unregistered type");
        }
        self.dependencies.remove_node(id);
        Ok(())
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Case-insensitive lookup by name.
    pub fn find(&self, name: &str) -> Option<Type> {
        self.find_by_id(SymbolId::from_name(name))
    }

    pub fn find_by_id(&self, id: SymbolId) -> Option<Type> {
        self.types.get(&id).cloned()
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.types.contains_key(&id)
    }

    /// Registered types built directly from `id`.
    pub fn dependents_of(&self, id: SymbolId) -> Vec<SymbolId> {
        if !self.dependencies.contains_node(id) {
            return Vec::new();
        }
        self.dependencies
            .neighbors_directed(id, Direction::Incoming)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Type)> {
        self.types.iter().map(|(id, ty)| (*id, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnumType, Field, StructType};

    fn point() -> Type {
        Type::structure(StructType::new(
            "POINT",
            vec![Field::new("x", Type::Int), Field::new("y", Type::Int)],
        ))
    }

    #[test]
    fn new_holds_only_auto() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("AUTO"), Some(Type::Auto));
        assert!(registry.find("INT").is_none());
    }

    #[test]
    fn builtins_are_seeded() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.find("vector"), Some(Type::Vector));
        assert_eq!(registry.find("TEXT_LABEL_63"), Some(Type::TextLabel(64)));
        assert!(registry.find("ped_index").is_some());
    }

    #[test]
    fn register_identical_returns_interned() {
        let mut registry = TypeRegistry::with_builtins();
        let a = registry.register(point()).unwrap();
        let b = registry.register(point()).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 46 + 1);
    }

    #[test]
    fn same_name_different_content_is_duplicate() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(point()).unwrap();
        let other = Type::structure(StructType::new("point", vec![Field::new("x", Type::Float)]));
        assert_eq!(
            registry.register(other),
            Err(DeclarationError::DuplicateIdentity { name: "point".into() })
        );
    }

    #[test]
    fn enum_reregistration_is_idempotent() {
        let mut registry = TypeRegistry::new();
        let e = Type::enumeration(EnumType::new("E", vec![("A".into(), 0)]));
        registry.register(e.clone()).unwrap();
        assert_eq!(registry.register(e.clone()).unwrap(), e);
    }

    #[test]
    fn array_interning() {
        let mut registry = TypeRegistry::with_builtins();
        let a = registry.find_or_register_array(Type::Int, 3).unwrap();
        let b = registry.find_or_register_array(Type::Int, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size_of(), 16);
        assert!(registry.find("int[3]").is_some());
    }

    #[test]
    fn unregister_refuses_with_dependents() {
        let mut registry = TypeRegistry::with_builtins();
        let p = registry.register(point()).unwrap();
        registry.find_or_register_array(p, 2).unwrap();

        let err = registry.unregister(SymbolId::from_name("POINT"), false);
        assert_eq!(
            err,
            Err(DeclarationError::HasDependents {
                name: "POINT".into(),
                dependents: vec!["POINT[2]".into()],
            })
        );
        assert!(registry.find("POINT").is_some());
    }

    #[test]
    fn unregister_cascades_depth_first() {
        let mut registry = TypeRegistry::with_builtins();
        let p = registry.register(point()).unwrap();
        let arr = registry.find_or_register_array(p, 2).unwrap();
        registry.find_or_register_array(arr, 5).unwrap();

        registry
            .unregister(SymbolId::from_name("POINT"), true)
            .unwrap();
        assert!(registry.find("POINT").is_none());
        assert!(registry.find("POINT[2]").is_none());
        assert!(registry.find("POINT[2][5]").is_none());
        assert!(registry.find("INT").is_some());
    }

    #[test]
    fn builtins_with_dependents_are_protected() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(point()).unwrap();
        assert!(matches!(
            registry.unregister(SymbolId::from_name("INT"), false),
            Err(DeclarationError::HasDependents { .. })
        ));
    }

    #[test]
    fn auto_is_permanent() {
        let mut registry = TypeRegistry::new();
        assert_eq!(
            registry.unregister(SymbolId::from_name("AUTO"), true),
            Err(DeclarationError::PermanentType { name: "AUTO".into() })
        );
    }

    #[test]
    fn unregister_unknown() {
        let mut registry = TypeRegistry::new();
        assert!(matches!(
            registry.unregister(SymbolId::from_name("NOPE"), false),
            Err(DeclarationError::UnknownType { .. })
        ));
    }
}
