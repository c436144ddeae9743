//! Repository over a [`DataSource`].
//!
//! Entities are converted to and from their record form with serde. Fused
//! projections (projection plus include factory) are handed to the data
//! source in a single `project` call together with their include paths.
//! Only when the data source refuses that call does the repository consider
//! materializing rows and projecting them in memory, and only if
//! [`RepositorySettings::allow_in_memory_projection`] is set.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::RepositoryConfig;
use crate::data_source::{DataSource, KeyValues};
use crate::errors::{DataSourceError, RepositoryError, RepositoryResult};
use crate::expression::{
    fuse, truncate_for_log, CompiledLambda, IncludeFactory, IncludePath, Lambda,
    ProjectionWithIncludes, Projection,
};
use crate::model::{Entity, TypeDescriptor, TypeId};
use crate::specification::QueryCommand;

use super::traits::{Repository, UnitOfWork};

/// Longest expression text written to the log.
const MAX_LOGGED_EXPRESSION: usize = 512;

/// Facade behaviour, usually taken from [`RepositoryConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySettings {
    pub allow_in_memory_projection: bool,
    pub log_rewrites: bool,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self::from(&RepositoryConfig::default())
    }
}

impl From<&RepositoryConfig> for RepositorySettings {
    fn from(config: &RepositoryConfig) -> Self {
        Self {
            allow_in_memory_projection: config.allow_in_memory_projection,
            log_rewrites: config.log_rewrites,
        }
    }
}

/// Repository for entity type `T` backed by data source `S`.
pub struct DataSourceRepository<T, S: ?Sized> {
    source: Arc<S>,
    descriptor: TypeDescriptor,
    settings: RepositorySettings,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, S: DataSource + ?Sized> DataSourceRepository<T, S> {
    pub fn new(source: Arc<S>, settings: RepositorySettings) -> Self {
        Self {
            source,
            descriptor: T::descriptor(),
            settings,
            _entity: PhantomData,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    fn ty(&self) -> &TypeId {
        &self.descriptor.id
    }

    /// Log `stage: before -> after` when rewrite logging is on.
    pub(crate) fn log_rewrite(&self, stage: &str, before: &Lambda, after: &Lambda) {
        if self.settings.log_rewrites {
            debug!(
                "{} {} -> {}",
                stage,
                truncate_for_log(&before.to_string(), MAX_LOGGED_EXPRESSION),
                truncate_for_log(&after.to_string(), MAX_LOGGED_EXPRESSION)
            );
        }
    }

    fn decode(record: Value) -> RepositoryResult<T> {
        Ok(serde_json::from_value(record)?)
    }

    fn decode_all(records: Vec<Value>) -> RepositoryResult<Vec<T>> {
        records.into_iter().map(Self::decode).collect()
    }

    /// Record carrying only the key members.
    fn key_record(&self, key: &KeyValues) -> RepositoryResult<Value> {
        key.check_arity(&self.descriptor)?;
        let members: Map<String, Value> = self
            .descriptor
            .keys
            .iter()
            .cloned()
            .zip(key.values().iter().cloned())
            .collect();
        Ok(Value::Object(members))
    }

    /// Push `projection` down, falling back to in-memory evaluation only
    /// when allowed.
    async fn project_values(
        &self,
        predicate: &Lambda,
        projection: &Lambda,
        include_paths: &[IncludePath],
    ) -> RepositoryResult<Vec<Value>> {
        let (operation, reason) = match self
            .source
            .project(self.ty(), predicate, projection, include_paths)
            .await
        {
            Ok(rows) => return Ok(rows),
            Err(DataSourceError::Unsupported { operation, reason }) => (operation, reason),
            Err(e) => return Err(e.into()),
        };

        if !self.settings.allow_in_memory_projection {
            return Err(RepositoryError::ProjectionNotPushedDown {
                type_id: self.ty().to_string(),
                reason: format!("{operation}: {reason}"),
            });
        }

        warn!(
            "[PROJECTION_FALLBACK] {} projection not pushed down ({}: {}); projecting in memory",
            self.ty(),
            operation,
            reason
        );
        let projector = CompiledLambda::compile(projection)?;
        let rows = self
            .source
            .query_with_includes(self.ty(), predicate, include_paths)
            .await?;
        rows.iter()
            .map(|row| projector.call(row).map_err(RepositoryError::from))
            .collect()
    }

    /// Project with or without includes, returning the raw projected values.
    async fn projected(
        &self,
        predicate: &Lambda,
        projection: &Lambda,
        includes: Option<&Lambda>,
    ) -> RepositoryResult<Vec<Value>> {
        let Some(includes) = includes else {
            return self.project_values(predicate, projection, &[]).await;
        };

        let fused = fuse(projection, includes)?;
        self.log_rewrite("[INCLUDE_FUSE]", projection, fused.lambda());
        let rows = self
            .project_values(predicate, fused.lambda(), fused.include_paths())
            .await?;
        rows.into_iter()
            .map(|row| -> RepositoryResult<Value> {
                Ok(ProjectionWithIncludes::from_value(row)?.into_data())
            })
            .collect()
    }
}

#[async_trait]
impl<T, S> Repository<T> for DataSourceRepository<T, S>
where
    T: Entity,
    S: DataSource + ?Sized,
{
    async fn find_by_key(&self, key: KeyValues) -> RepositoryResult<Option<T>> {
        match self.source.resolve_by_key(self.ty(), &key).await? {
            Some(record) => Ok(Some(Self::decode(record)?)),
            None => Ok(None),
        }
    }

    async fn find_by_key_with_includes(
        &self,
        key: KeyValues,
        includes: &IncludeFactory<T>,
    ) -> RepositoryResult<Option<T>> {
        let predicate = key.to_predicate(&self.descriptor)?;
        let paths = includes.paths()?;
        let rows = self
            .source
            .query_with_includes(self.ty(), &predicate, &paths)
            .await?;
        rows.into_iter().next().map(Self::decode).transpose()
    }

    async fn find_by_key_projected<R>(
        &self,
        key: KeyValues,
        projection: &Projection<T, R>,
        includes: Option<&IncludeFactory<T>>,
    ) -> RepositoryResult<Option<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let predicate = key.to_predicate(&self.descriptor)?;
        let values = self
            .projected(
                &predicate,
                projection.lambda(),
                includes.map(IncludeFactory::lambda),
            )
            .await?;
        match values.into_iter().next() {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn find_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<Vec<T>> {
        let rows = self
            .source
            .query(self.ty(), query.predicate().lambda())
            .await?;
        Self::decode_all(rows)
    }

    async fn find_by_projected<R>(
        &self,
        query: &dyn QueryCommand<T>,
        projection: &Projection<T, R>,
        includes: Option<&IncludeFactory<T>>,
    ) -> RepositoryResult<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let values = self
            .projected(
                query.predicate().lambda(),
                projection.lambda(),
                includes.map(IncludeFactory::lambda),
            )
            .await?;
        values
            .into_iter()
            .map(|value| -> RepositoryResult<R> { Ok(serde_json::from_value(value)?) })
            .collect()
    }

    async fn count_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<u64> {
        Ok(self
            .source
            .count(self.ty(), query.predicate().lambda())
            .await?)
    }

    async fn any_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<bool> {
        Ok(self
            .source
            .exists(self.ty(), query.predicate().lambda())
            .await?)
    }

    async fn add(&self, entity: T) -> RepositoryResult<()> {
        let record = serde_json::to_value(entity)?;
        Ok(self.source.add(self.ty(), record).await?)
    }

    async fn remove(&self, entity: &T) -> RepositoryResult<()> {
        let record = serde_json::to_value(entity)?;
        Ok(self.source.remove(self.ty(), &record).await?)
    }

    async fn remove_by_key(&self, key: KeyValues) -> RepositoryResult<()> {
        let record = self.key_record(&key)?;
        Ok(self.source.remove(self.ty(), &record).await?)
    }
}

#[async_trait]
impl<T, S> UnitOfWork for DataSourceRepository<T, S>
where
    T: Entity,
    S: DataSource + ?Sized,
{
    async fn commit(&self) -> RepositoryResult<()> {
        Ok(self.source.commit().await?)
    }

    async fn discard(&self) -> RepositoryResult<()> {
        Ok(self.source.discard().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::MemoryDataSource;
    use crate::expression::Expr;
    use crate::sample::{self, Customer, Employee, Order};
    use crate::specification::Specification;
    use serde::Deserialize;
    use tracing_test::traced_test;

    fn repository() -> DataSourceRepository<Order, MemoryDataSource> {
        let source = Arc::new(sample::memory_source().expect("seed"));
        DataSourceRepository::new(source, RepositorySettings::default())
    }

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Shipment {
        order_id: i64,
        contact: Option<String>,
    }

    fn shipment() -> Projection<Order, Shipment> {
        Projection::new(|x| {
            Expr::construct(
                "Shipment",
                [
                    ("OrderId", x.clone().field::<Order>("OrderId")),
                    (
                        "Contact",
                        x.field::<Order>("Customer").field::<Customer>("ContactName"),
                    ),
                ],
            )
        })
    }

    #[tokio::test]
    async fn find_by_accepts_predicates_and_specifications() {
        let repo = repository();
        let usa = repo.find_by(&sample::ships_to("USA")).await.expect("query");
        assert_eq!(usa.len(), 2);

        let spec = Specification::from(sample::ships_to("France"))
            & Specification::from(sample::freight_at_least(40.0));
        let heavy_france = repo.find_by(&spec).await.expect("query");
        assert_eq!(
            heavy_france.iter().map(|o| o.order_id).collect::<Vec<_>>(),
            vec![10251]
        );
        assert!(heavy_france.iter().all(|o| o.customer.is_none()));
    }

    #[tokio::test]
    async fn key_lookups() {
        let repo = repository();
        let order = repo.find_by_key(10248i64.into()).await.expect("lookup");
        assert_eq!(order.map(|o| o.ship_country).as_deref(), Some("France"));
        assert!(repo.find_by_key(1i64.into()).await.expect("lookup").is_none());

        let includes = IncludeFactory::<Order>::new(|x| x.field::<Order>("Employee"));
        let loaded = repo
            .find_by_key_with_includes(10248i64.into(), &includes)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(
            loaded.employee.map(|e: Employee| e.last_name).as_deref(),
            Some("Buchanan")
        );
        assert!(loaded.customer.is_none());
    }

    #[tokio::test]
    async fn projection_with_includes_loads_paths_first() {
        let repo = repository();
        let includes = IncludeFactory::<Order>::new(|x| x.field::<Order>("Customer"));

        let with = repo
            .find_by_key_projected(10262i64.into(), &shipment(), Some(&includes))
            .await
            .expect("project");
        assert_eq!(
            with,
            Some(Shipment {
                order_id: 10262,
                contact: Some("Paula Wilson".to_string()),
            })
        );

        // without includes the customer is not loaded and reads as null
        let without = repo
            .find_by_projected(&sample::ships_to("USA"), &shipment(), None)
            .await
            .expect("project");
        assert!(without.iter().all(|s| s.contact.is_none()));
    }

    #[tokio::test]
    async fn counts_and_existence() {
        let repo = repository();
        assert_eq!(repo.count_by(&sample::ships_to("France")).await.expect("count"), 2);
        // filters see navigation members even when they are not loaded
        assert!(repo.any_by(&sample::customer_in("USA")).await.expect("exists"));
        assert!(!repo.any_by(&sample::ships_to("Peru")).await.expect("exists"));
        assert_eq!(repo.get_all().await.expect("all").len(), 6);
    }

    #[tokio::test]
    async fn staged_writes_apply_on_commit() {
        let repo = repository();
        let mut order = sample::orders().remove(0);
        order.order_id = 11000;
        order.customer = None;
        order.employee = None;

        repo.add(order).await.expect("add");
        repo.remove_by_key(10249i64.into()).await.expect("remove");
        assert_eq!(repo.get_all().await.expect("all").len(), 6);

        repo.commit().await.expect("commit");
        let ids: Vec<i64> = repo
            .get_all()
            .await
            .expect("all")
            .into_iter()
            .map(|o| o.order_id)
            .collect();
        assert!(ids.contains(&11000));
        assert!(!ids.contains(&10249));
    }

    #[tokio::test]
    async fn remove_by_key_checks_arity() {
        let repo = repository();
        let err = repo
            .remove_by_key(KeyValues::new(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DataSource(DataSourceError::KeyArity { .. })
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn refused_projection_falls_back_only_when_allowed() {
        let source = Arc::new(
            sample::sqlite_source("sqlite::memory:")
                .await
                .expect("sqlite"),
        );

        let strict = DataSourceRepository::<Order, _>::new(source.clone(), RepositorySettings::default());
        let err = strict
            .find_by_projected(&sample::ships_to("USA"), &shipment(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ProjectionNotPushedDown { .. }));
        assert!(!logs_contain("[PROJECTION_FALLBACK]"));

        let lenient = DataSourceRepository::<Order, _>::new(
            source,
            RepositorySettings {
                allow_in_memory_projection: true,
                log_rewrites: true,
            },
        );
        let mut shipments = lenient
            .find_by_projected(&sample::ships_to("USA"), &shipment(), None)
            .await
            .expect("fallback");
        shipments.sort_by_key(|s| s.order_id);
        assert_eq!(
            shipments.iter().map(|s| s.order_id).collect::<Vec<_>>(),
            vec![10262, 10269]
        );
        assert!(shipments.iter().all(|s| s.contact.is_none()));
        assert!(logs_contain("[PROJECTION_FALLBACK]"));
    }

    #[tokio::test]
    #[traced_test]
    async fn fused_projection_is_logged_when_enabled() {
        let source = Arc::new(sample::memory_source().expect("seed"));
        let repo = DataSourceRepository::<Order, _>::new(
            source,
            RepositorySettings {
                allow_in_memory_projection: false,
                log_rewrites: true,
            },
        );
        let includes = IncludeFactory::<Order>::new(|x| x.field::<Order>("Customer"));
        repo.find_by_projected(&sample::ships_to("USA"), &shipment(), Some(&includes))
            .await
            .expect("project");
        assert!(logs_contain("[INCLUDE_FUSE]"));
        assert!(logs_contain("ProjectionWithIncludes"));
    }

    #[test]
    fn default_settings_match_default_config() {
        let settings = RepositorySettings::default();
        assert_eq!(settings, RepositorySettings::from(&RepositoryConfig::default()));
        assert!(settings.log_rewrites);
        assert!(!settings.allow_in_memory_projection);
    }
}
