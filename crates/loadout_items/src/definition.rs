//! Immutable item definitions

use std::collections::HashMap;
use std::sync::Arc;

use crate::fragment::Fragment;

/// Immutable description of an item kind.
///
/// A definition is authored once, shared via `Arc` and never mutated at
/// runtime. All per-kind behavior hangs off its fragment list.
#[derive(Debug)]
pub struct ItemDefinition {
    id: Box<str>,
    name: Box<str>,
    max_stack: u32,
    fragments: Vec<Arc<dyn Fragment>>,
}

impl ItemDefinition {
    /// Create a new item definition
    pub fn new(id: impl Into<Box<str>>, name: impl Into<Box<str>>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_stack: 1,
            fragments: Vec::new(),
        }
    }

    /// Set max stack size (1 = not stackable)
    pub fn with_max_stack(mut self, max: u32) -> Self {
        self.max_stack = max.max(1);
        self
    }

    /// Add a fragment
    pub fn with_fragment(mut self, fragment: impl Fragment + 'static) -> Self {
        self.fragments.push(Arc::new(fragment));
        self
    }

    /// Stable definition identifier
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum stack size
    #[inline]
    pub fn max_stack(&self) -> u32 {
        self.max_stack
    }

    /// Check if stackable
    pub fn is_stackable(&self) -> bool {
        self.max_stack > 1
    }

    /// All fragments in authoring order
    pub fn fragments(&self) -> &[Arc<dyn Fragment>] {
        &self.fragments
    }

    /// Find the first fragment of a concrete type
    pub fn find_fragment<T: Fragment + 'static>(&self) -> Option<&T> {
        self.fragments
            .iter()
            .find_map(|f| f.as_any().downcast_ref::<T>())
    }
}

/// Lookup table of definitions by id, shared with replica endpoints
#[derive(Debug, Default)]
pub struct DefinitionSet {
    by_id: HashMap<Box<str>, Arc<ItemDefinition>>,
}

impl DefinitionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition, replacing any previous one with the same id
    pub fn insert(&mut self, definition: Arc<ItemDefinition>) {
        self.by_id.insert(definition.id().into(), definition);
    }

    /// Insert a definition, builder style
    pub fn with(mut self, definition: Arc<ItemDefinition>) -> Self {
        self.insert(definition);
        self
    }

    /// Look up a definition by id
    pub fn get(&self, id: &str) -> Option<&Arc<ItemDefinition>> {
        self.by_id.get(id)
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
