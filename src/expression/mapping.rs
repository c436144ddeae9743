//! Source-type to target-type mapping consumed by the rewriter.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ExpressionError, ExpressionResult};
use crate::model::{Entity, TypeDescriptor, TypeId};

/// Immutable `source type -> target descriptor` table.
///
/// Cloning is cheap; one mapping can be shared by any number of
/// repositories and threads.
#[derive(Clone, Debug, Default)]
pub struct TypeMapping {
    targets: Arc<HashMap<TypeId, Arc<TypeDescriptor>>>,
}

impl TypeMapping {
    pub fn builder() -> TypeMappingBuilder {
        TypeMappingBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Target descriptor for `source`, if `source` is mapped.
    pub fn target(&self, source: &TypeId) -> Option<&Arc<TypeDescriptor>> {
        self.targets.get(source)
    }

    /// Target type id for `source`, or `source` itself when unmapped.
    pub fn resolve(&self, source: &TypeId) -> TypeId {
        self.target(source)
            .map(|d| d.id.clone())
            .unwrap_or_else(|| source.clone())
    }

    pub fn is_mapped(&self, source: &TypeId) -> bool {
        self.targets.contains_key(source)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }
}

#[derive(Debug, Default)]
pub struct TypeMappingBuilder {
    entries: Vec<(TypeId, TypeDescriptor)>,
}

impl TypeMappingBuilder {
    /// Map entity type `S` onto entity type `T`.
    pub fn map<S: Entity, T: Entity>(self) -> Self {
        self.map_descriptor(TypeId::of::<S>(), T::descriptor())
    }

    pub fn map_descriptor(mut self, source: impl Into<TypeId>, target: TypeDescriptor) -> Self {
        self.entries.push((source.into(), target));
        self
    }

    /// Freeze the mapping. Mapping one source type twice is an error.
    pub fn build(self) -> ExpressionResult<TypeMapping> {
        let mut targets = HashMap::with_capacity(self.entries.len());
        for (source, target) in self.entries {
            if targets.contains_key(&source) {
                return Err(ExpressionError::DuplicateMapping {
                    type_id: source.to_string(),
                });
            }
            targets.insert(source, Arc::new(target));
        }
        Ok(TypeMapping {
            targets: Arc::new(targets),
        })
    }
}
