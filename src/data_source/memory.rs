//! In-memory data source.
//!
//! Stores fully populated entity graphs per type. Queries evaluate the
//! predicate with the closure compiler and then shape each result: every
//! navigation member not named by an include path is returned as `null`,
//! the same way an ORM with lazy loading disabled returns unloaded
//! relations. Writes are staged and applied atomically on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::errors::{DataSourceError, DataSourceResult};
use crate::expression::{CompiledLambda, IncludePath, Lambda};
use crate::model::{Entity, MemberKind, TypeDescriptor, TypeId, TypeRegistry};

use super::{DataSource, KeyValues};

/// A write staged for the next commit.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingChange {
    Add { ty: TypeId, record: Value },
    Remove { ty: TypeId, key: KeyValues },
}

#[derive(Debug, Default)]
struct MemoryState {
    committed: HashMap<TypeId, Vec<Value>>,
    pending: Vec<PendingChange>,
}

/// Data source over process memory.
#[derive(Debug)]
pub struct MemoryDataSource {
    registry: Arc<TypeRegistry>,
    state: RwLock<MemoryState>,
}

impl MemoryDataSource {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Seed committed records of entity type `T`.
    pub fn with_records<T: Entity>(mut self, records: Vec<T>) -> DataSourceResult<Self> {
        let ty = TypeId::of::<T>();
        let descriptor = self.descriptor(&ty)?;
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let row = serde_json::to_value(record)?;
            KeyValues::from_record(&descriptor, &row)?;
            rows.push(row);
        }
        self.state
            .get_mut()
            .committed
            .entry(ty)
            .or_default()
            .extend(rows);
        Ok(self)
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Changes staged since the last commit, in staging order.
    pub async fn pending_changes(&self) -> Vec<PendingChange> {
        self.state.read().await.pending.clone()
    }

    /// Committed rows of `ty`, fully populated.
    pub async fn records(&self, ty: &TypeId) -> Vec<Value> {
        self.state
            .read()
            .await
            .committed
            .get(ty)
            .cloned()
            .unwrap_or_default()
    }

    fn descriptor(&self, ty: &TypeId) -> DataSourceResult<Arc<TypeDescriptor>> {
        self.registry
            .get(ty)
            .cloned()
            .ok_or_else(|| DataSourceError::UnknownType {
                type_id: ty.to_string(),
            })
    }

    /// Check that every segment of `path` names a navigation member.
    fn validate_path(&self, root: &TypeDescriptor, path: &IncludePath) -> DataSourceResult<()> {
        let mut current = self.descriptor(&root.id)?;
        for segment in path.segments() {
            let invalid = |reason: String| DataSourceError::InvalidIncludePath {
                path: path.to_string(),
                type_id: root.id.to_string(),
                reason,
            };
            let member = current
                .member(segment)
                .ok_or_else(|| invalid(format!("{} has no member '{segment}'", current.id)))?;
            let target = member.kind.target().ok_or_else(|| {
                invalid(format!("{}.{segment} is not a navigation member", current.id))
            })?;
            current = self.descriptor(target)?;
        }
        Ok(())
    }

    /// Null every navigation member not covered by `includes`, recursively.
    fn shape(
        &self,
        descriptor: &TypeDescriptor,
        record: &mut Value,
        includes: &[IncludePath],
    ) -> DataSourceResult<()> {
        let Value::Object(object) = record else {
            return Ok(());
        };
        for member in descriptor.navigation_members() {
            let nested: Vec<IncludePath> = includes
                .iter()
                .filter_map(|path| path.split_first())
                .filter(|(head, _)| *head == member.name)
                .map(|(_, tail)| tail)
                .collect();
            let Some(value) = object.get_mut(&member.name) else {
                continue;
            };
            if nested.is_empty() {
                *value = Value::Null;
                continue;
            }
            let deeper: Vec<IncludePath> =
                nested.into_iter().filter(|p| !p.is_empty()).collect();
            let target = match &member.kind {
                MemberKind::Reference(t) | MemberKind::Collection(t) => self.descriptor(t)?,
                MemberKind::Scalar => continue,
            };
            if let Value::Array(items) = value {
                for item in items {
                    self.shape(&target, item, &deeper)?;
                }
            } else {
                self.shape(&target, value, &deeper)?;
            }
        }
        Ok(())
    }

    async fn matching(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>> {
        let descriptor = self.descriptor(ty)?;
        for path in include_paths {
            self.validate_path(&descriptor, path)?;
        }
        let filter = CompiledLambda::compile(predicate)?;

        let state = self.state.read().await;
        let rows = state.committed.get(ty).map(Vec::as_slice).unwrap_or(&[]);
        let mut results = Vec::new();
        for row in rows {
            if filter.call_predicate(row)? {
                let mut shaped = row.clone();
                self.shape(&descriptor, &mut shaped, include_paths)?;
                results.push(shaped);
            }
        }
        trace!(
            "[MEMORY_SOURCE] {} matched {}/{} row(s)",
            ty,
            results.len(),
            rows.len()
        );
        Ok(results)
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn resolve_by_key(
        &self,
        ty: &TypeId,
        key: &KeyValues,
    ) -> DataSourceResult<Option<Value>> {
        let descriptor = self.descriptor(ty)?;
        key.check_arity(&descriptor)?;
        let state = self.state.read().await;
        let found = state
            .committed
            .get(ty)
            .and_then(|rows| rows.iter().find(|row| key.matches(&descriptor, row)))
            .cloned();
        drop(state);
        match found {
            Some(mut row) => {
                self.shape(&descriptor, &mut row, &[])?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    async fn query_with_includes(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>> {
        self.matching(ty, predicate, include_paths).await
    }

    async fn project(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        projection: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>> {
        let projector = CompiledLambda::compile(projection)?;
        let rows = self.matching(ty, predicate, include_paths).await?;
        rows.iter()
            .map(|row| projector.call(row).map_err(DataSourceError::from))
            .collect()
    }

    async fn count(&self, ty: &TypeId, predicate: &Lambda) -> DataSourceResult<u64> {
        self.descriptor(ty)?;
        let filter = CompiledLambda::compile(predicate)?;
        let state = self.state.read().await;
        let mut count = 0u64;
        for row in state.committed.get(ty).map(Vec::as_slice).unwrap_or(&[]) {
            if filter.call_predicate(row)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn exists(&self, ty: &TypeId, predicate: &Lambda) -> DataSourceResult<bool> {
        self.descriptor(ty)?;
        let filter = CompiledLambda::compile(predicate)?;
        let state = self.state.read().await;
        for row in state.committed.get(ty).map(Vec::as_slice).unwrap_or(&[]) {
            if filter.call_predicate(row)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn add(&self, ty: &TypeId, record: Value) -> DataSourceResult<()> {
        let descriptor = self.descriptor(ty)?;
        KeyValues::from_record(&descriptor, &record)?;
        self.state.write().await.pending.push(PendingChange::Add {
            ty: ty.clone(),
            record,
        });
        Ok(())
    }

    async fn remove(&self, ty: &TypeId, record: &Value) -> DataSourceResult<()> {
        let descriptor = self.descriptor(ty)?;
        let key = KeyValues::from_record(&descriptor, record)?;
        self.state.write().await.pending.push(PendingChange::Remove {
            ty: ty.clone(),
            key,
        });
        Ok(())
    }

    /// Apply staged changes to a copy of the store and swap it in only when
    /// every change applies. On failure nothing is applied and the staged
    /// changes are kept.
    async fn commit(&self) -> DataSourceResult<()> {
        let mut state = self.state.write().await;
        let mut next = state.committed.clone();
        for change in &state.pending {
            match change {
                PendingChange::Add { ty, record } => {
                    let descriptor = self.descriptor(ty)?;
                    let key = KeyValues::from_record(&descriptor, record)?;
                    let rows = next.entry(ty.clone()).or_default();
                    if rows.iter().any(|row| key.matches(&descriptor, row)) {
                        return Err(DataSourceError::ConstraintViolation {
                            constraint: format!("{}_pkey", descriptor.table),
                            message: format!("duplicate key {:?} for {}", key.values(), ty),
                        });
                    }
                    rows.push(record.clone());
                }
                PendingChange::Remove { ty, key } => {
                    let descriptor = self.descriptor(ty)?;
                    let rows = next.entry(ty.clone()).or_default();
                    let position = rows
                        .iter()
                        .position(|row| key.matches(&descriptor, row))
                        .ok_or_else(|| DataSourceError::ConstraintViolation {
                            constraint: format!("{}_exists", descriptor.table),
                            message: format!("no {} with key {:?}", ty, key.values()),
                        })?;
                    rows.remove(position);
                }
            }
        }
        let applied = state.pending.len();
        state.committed = next;
        state.pending.clear();
        debug!("[MEMORY_SOURCE] committed {} change(s)", applied);
        Ok(())
    }

    async fn discard(&self) -> DataSourceResult<()> {
        let mut state = self.state.write().await;
        let dropped = state.pending.len();
        state.pending.clear();
        debug!("[MEMORY_SOURCE] discarded {} change(s)", dropped);
        Ok(())
    }
}
