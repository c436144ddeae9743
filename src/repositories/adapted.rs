//! Repository serving a domain type over a differently shaped data type.
//!
//! Callers write predicates, projections and include factories against the
//! domain type `D`. Each is rewritten onto the data type `T` through a
//! [`TypeMapping`] before it reaches the inner repository, and entities are
//! converted between the two types member by member via serde.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::data_source::{DataSource, KeyValues};
use crate::errors::{ExpressionError, RepositoryResult};
use crate::expression::{IncludeFactory, Predicate, Projection, TypeMapping};
use crate::model::{Entity, TypeId};
use crate::specification::QueryCommand;

use super::data_source::{DataSourceRepository, RepositorySettings};
use super::traits::{Repository, UnitOfWork};

/// Convert between two types whose serialized members line up by name.
fn convert<A: Serialize, B: DeserializeOwned>(value: &A) -> RepositoryResult<B> {
    let record = serde_json::to_value(value)?;
    Ok(serde_json::from_value(record)?)
}

/// Repository for domain type `D` stored as data type `T` in source `S`.
pub struct AdaptedRepository<D, T, S: ?Sized> {
    inner: DataSourceRepository<T, S>,
    mapping: TypeMapping,
    _domain: PhantomData<fn() -> D>,
}

impl<D, T, S> AdaptedRepository<D, T, S>
where
    D: Entity,
    T: Entity,
    S: DataSource + ?Sized,
{
    /// Fails with `KeyMismatch` unless `mapping` maps `D` onto `T`.
    pub fn new(
        source: Arc<S>,
        mapping: TypeMapping,
        settings: RepositorySettings,
    ) -> RepositoryResult<Self> {
        let resolved = mapping.resolve(&TypeId::of::<D>());
        if resolved != TypeId::of::<T>() {
            return Err(ExpressionError::KeyMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: resolved.to_string(),
            }
            .into());
        }
        Ok(Self {
            inner: DataSourceRepository::new(source, settings),
            mapping,
            _domain: PhantomData,
        })
    }

    pub fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    pub fn inner(&self) -> &DataSourceRepository<T, S> {
        &self.inner
    }

    fn predicate(&self, query: &dyn QueryCommand<D>) -> RepositoryResult<Predicate<T>> {
        let source = query.predicate();
        let rewritten = source.rewrite::<T>(&self.mapping)?;
        self.inner
            .log_rewrite("[EXPR_REWRITE]", source.lambda(), rewritten.lambda());
        Ok(rewritten)
    }

    fn projection<R: DeserializeOwned>(
        &self,
        projection: &Projection<D, R>,
    ) -> RepositoryResult<Projection<T, R>> {
        let rewritten = projection.rewrite::<T>(&self.mapping)?;
        self.inner
            .log_rewrite("[EXPR_REWRITE]", projection.lambda(), rewritten.lambda());
        Ok(rewritten)
    }

    fn include_factory(&self, factory: &IncludeFactory<D>) -> RepositoryResult<IncludeFactory<T>> {
        // validate the shape on the domain side before rewriting
        factory.paths()?;
        Ok(factory.rewrite::<T>(&self.mapping)?)
    }

    fn includes(
        &self,
        includes: Option<&IncludeFactory<D>>,
    ) -> RepositoryResult<Option<IncludeFactory<T>>> {
        includes
            .map(|factory| self.include_factory(factory))
            .transpose()
    }
}

#[async_trait]
impl<D, T, S> Repository<D> for AdaptedRepository<D, T, S>
where
    D: Entity,
    T: Entity,
    S: DataSource + ?Sized,
{
    async fn find_by_key(&self, key: KeyValues) -> RepositoryResult<Option<D>> {
        match self.inner.find_by_key(key).await? {
            Some(entity) => Ok(Some(convert(&entity)?)),
            None => Ok(None),
        }
    }

    async fn find_by_key_with_includes(
        &self,
        key: KeyValues,
        includes: &IncludeFactory<D>,
    ) -> RepositoryResult<Option<D>> {
        let includes = self.include_factory(includes)?;
        self.inner
            .find_by_key_with_includes(key, &includes)
            .await?
            .as_ref()
            .map(convert)
            .transpose()
    }

    async fn find_by_key_projected<R>(
        &self,
        key: KeyValues,
        projection: &Projection<D, R>,
        includes: Option<&IncludeFactory<D>>,
    ) -> RepositoryResult<Option<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let projection = self.projection(projection)?;
        let includes = self.includes(includes)?;
        self.inner
            .find_by_key_projected(key, &projection, includes.as_ref())
            .await
    }

    async fn find_by(&self, query: &dyn QueryCommand<D>) -> RepositoryResult<Vec<D>> {
        let predicate = self.predicate(query)?;
        self.inner
            .find_by(&predicate)
            .await?
            .iter()
            .map(convert)
            .collect()
    }

    async fn find_by_projected<R>(
        &self,
        query: &dyn QueryCommand<D>,
        projection: &Projection<D, R>,
        includes: Option<&IncludeFactory<D>>,
    ) -> RepositoryResult<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let predicate = self.predicate(query)?;
        let projection = self.projection(projection)?;
        let includes = self.includes(includes)?;
        self.inner
            .find_by_projected(&predicate, &projection, includes.as_ref())
            .await
    }

    async fn count_by(&self, query: &dyn QueryCommand<D>) -> RepositoryResult<u64> {
        let predicate = self.predicate(query)?;
        self.inner.count_by(&predicate).await
    }

    async fn any_by(&self, query: &dyn QueryCommand<D>) -> RepositoryResult<bool> {
        let predicate = self.predicate(query)?;
        self.inner.any_by(&predicate).await
    }

    async fn add(&self, entity: D) -> RepositoryResult<()> {
        let data: T = convert(&entity)?;
        self.inner.add(data).await
    }

    async fn remove(&self, entity: &D) -> RepositoryResult<()> {
        let data: T = convert(entity)?;
        self.inner.remove(&data).await
    }

    async fn remove_by_key(&self, key: KeyValues) -> RepositoryResult<()> {
        self.inner.remove_by_key(key).await
    }
}

#[async_trait]
impl<D, T, S> UnitOfWork for AdaptedRepository<D, T, S>
where
    D: Entity,
    T: Entity,
    S: DataSource + ?Sized,
{
    async fn commit(&self) -> RepositoryResult<()> {
        self.inner.commit().await
    }

    async fn discard(&self) -> RepositoryResult<()> {
        self.inner.discard().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::MemoryDataSource;
    use crate::errors::RepositoryError;
    use crate::expression::Expr;
    use crate::sample::{self, Customer, Employee, Order, OrderDto};
    use crate::specification::Specification;

    fn repository() -> AdaptedRepository<Order, OrderDto, MemoryDataSource> {
        let source = Arc::new(sample::memory_source().expect("seed"));
        AdaptedRepository::new(
            source,
            sample::dto_mapping().expect("mapping"),
            RepositorySettings::default(),
        )
        .expect("repository")
    }

    #[test]
    fn mapping_must_target_the_data_type() {
        let source = Arc::new(MemoryDataSource::new(sample::registry()));
        let err = AdaptedRepository::<Order, Customer, _>::new(
            source,
            sample::dto_mapping().expect("mapping"),
            RepositorySettings::default(),
        )
        .err()
        .expect("mismatch");
        assert!(matches!(
            err,
            RepositoryError::Expression(ExpressionError::KeyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn domain_queries_run_against_dto_rows() {
        let repo = repository();
        let usa = repo.find_by(&sample::ships_to("USA")).await.expect("query");
        let mut ids: Vec<i64> = usa.iter().map(|o| o.order_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10262, 10269]);

        let spec = !Specification::from(sample::ships_to("USA"));
        assert_eq!(repo.count_by(&spec).await.expect("count"), 4);
    }

    #[tokio::test]
    async fn nested_navigation_is_rewritten() {
        let repo = repository();
        let french_customers = repo
            .find_by(&sample::customer_in("France"))
            .await
            .expect("query");
        assert_eq!(french_customers.len(), 2);
    }

    #[tokio::test]
    async fn projection_and_includes_are_rewritten() {
        let repo = repository();
        let name = Projection::<Order, Option<String>>::new(|x| {
            x.field::<Order>("Employee").field::<Employee>("LastName")
        });
        let includes = IncludeFactory::<Order>::new(|x| {
            Expr::construct(
                "Anonymous",
                [
                    ("Customer", x.clone().field::<Order>("Customer")),
                    ("Employee", x.field::<Order>("Employee")),
                ],
            )
        });
        let found = repo
            .find_by_key_projected(10249i64.into(), &name, Some(&includes))
            .await
            .expect("project");
        assert_eq!(found, Some(Some("Suyama".to_string())));
    }

    #[tokio::test]
    async fn key_lookup_loads_rewritten_include_paths() {
        let repo = repository();
        let includes = IncludeFactory::<Order>::new(|x| x.field::<Order>("Customer"));
        let order = repo
            .find_by_key_with_includes(10248i64.into(), &includes)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(
            order.customer.map(|c| c.company_name),
            Some("Vins et alcools Chevalier".to_string())
        );
        assert!(order.employee.is_none());

        let bogus = IncludeFactory::<Order>::new(|x| x.field::<Order>("Customer").ne(1));
        assert!(matches!(
            repo.find_by_key_with_includes(10248i64.into(), &bogus).await,
            Err(RepositoryError::Expression(
                ExpressionError::UnsupportedIncludePathShape { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn member_missing_on_data_type_fails_loudly() {
        let repo = repository();
        let bogus = Predicate::<Order>::new(|x| x.field::<Order>("Discount").gt(0));
        let err = repo.find_by(&bogus).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Expression(ExpressionError::MemberNotFoundOnTarget { .. })
        ));
    }

    #[tokio::test]
    async fn writes_convert_domain_entities() {
        let repo = repository();
        let mut order = sample::orders().remove(0);
        order.order_id = 12000;
        repo.add(order.clone()).await.expect("add");
        repo.commit().await.expect("commit");

        let stored = repo
            .inner()
            .find_by_key(12000i64.into())
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(stored.ship_country, order.ship_country);

        repo.remove(&order).await.expect("remove");
        repo.commit().await.expect("commit");
        assert!(repo.find_by_key(12000i64.into()).await.expect("lookup").is_none());
    }
}
