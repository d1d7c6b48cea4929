//! Statement labels of one function.

use rustc_hash::FxHashMap;

use sctools_core::{DeclarationError, Span, SymbolId};

/// A labelled statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSymbol {
    pub name: String,
    pub span: Span,
}

/// Flat, per-function map of labels. Filled before the body is checked so
/// a `goto` may jump forward.
#[derive(Debug, Clone, Default)]
pub struct LabelSymbolTable {
    labels: FxHashMap<SymbolId, LabelSymbol>,
}

impl LabelSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, span: Span) -> Result<(), DeclarationError> {
        let id = SymbolId::from_name(name);
        if self.labels.contains_key(&id) {
            return Err(DeclarationError::DuplicateLabel { name: name.to_string() });
        }
        self.labels.insert(
            id,
            LabelSymbol {
                name: name.to_string(),
                span,
            },
        );
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&LabelSymbol> {
        self.labels.get(&SymbolId::from_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
