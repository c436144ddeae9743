//! Repository trait definitions
//!
//! One operation per capability: plain predicate, predicate plus projection,
//! and predicate plus projection plus include paths. Queries are anything
//! implementing [`QueryCommand`], so a bare [`Predicate`] and a composed
//! [`Specification`](crate::specification::Specification) are
//! interchangeable.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::data_source::KeyValues;
use crate::errors::RepositoryResult;
use crate::expression::{IncludeFactory, Predicate, Projection};
use crate::model::Entity;
use crate::specification::QueryCommand;

/// Generic query and staging contract over one entity type.
///
/// Writes (`add`, `remove`, ...) are staged; they become visible once the
/// owning [`UnitOfWork`] commits.
///
/// # Examples
///
/// ```rust,ignore
/// use adapted_repo::repositories::Repository;
/// use adapted_repo::sample::{self, Order};
///
/// async fn example<R: Repository<Order>>(repo: R) -> Result<(), RepositoryError> {
///     let usa = repo.find_by(&sample::ships_to("USA")).await?;
///     let n = repo.count_by(&sample::freight_at_least(10.0)).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Every entity, navigation members unloaded.
    async fn get_all(&self) -> RepositoryResult<Vec<T>> {
        self.find_by(&Predicate::<T>::always()).await
    }

    /// Find an entity by its key values
    ///
    /// # Arguments
    ///
    /// * `key` - One value per key member, in descriptor key order
    ///
    /// # Returns
    ///
    /// * `Ok(Some(T))` - Entity found
    /// * `Ok(None)` - Entity not found
    /// * `Err(RepositoryError)` - Key arity or data source error
    async fn find_by_key(&self, key: KeyValues) -> RepositoryResult<Option<T>>;

    /// Find an entity by key with the given navigation paths loaded.
    async fn find_by_key_with_includes(
        &self,
        key: KeyValues,
        includes: &IncludeFactory<T>,
    ) -> RepositoryResult<Option<T>>;

    /// Project the entity with the given key
    ///
    /// # Arguments
    ///
    /// * `key` - Key values
    /// * `projection` - Projection applied to the entity
    /// * `includes` - Navigation paths the projection needs loaded
    ///
    /// # Returns
    ///
    /// * `Ok(Some(R))` - Projected value
    /// * `Ok(None)` - Entity not found
    /// * `Err(RepositoryError)` - Expression, evaluation or data source error
    async fn find_by_key_projected<R>(
        &self,
        key: KeyValues,
        projection: &Projection<T, R>,
        includes: Option<&IncludeFactory<T>>,
    ) -> RepositoryResult<Option<R>>
    where
        R: DeserializeOwned + Send + 'static;

    /// Entities matching `query`.
    async fn find_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<Vec<T>>;

    /// Project every entity matching `query`
    ///
    /// # Arguments
    ///
    /// * `query` - Filter
    /// * `projection` - Projection applied to each match
    /// * `includes` - Navigation paths the projection needs loaded
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<R>)` - Projected values (may be empty)
    /// * `Err(RepositoryError::ProjectionNotPushedDown)` - The data source
    ///   refused the projection and in-memory fallback is disabled
    async fn find_by_projected<R>(
        &self,
        query: &dyn QueryCommand<T>,
        projection: &Projection<T, R>,
        includes: Option<&IncludeFactory<T>>,
    ) -> RepositoryResult<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static;

    async fn count_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<u64>;

    async fn any_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<bool>;

    /// Stage an insert.
    async fn add(&self, entity: T) -> RepositoryResult<()>;

    async fn add_range(&self, entities: Vec<T>) -> RepositoryResult<()> {
        for entity in entities {
            self.add(entity).await?;
        }
        Ok(())
    }

    /// Stage a delete of `entity` (matched by key).
    async fn remove(&self, entity: &T) -> RepositoryResult<()>;

    async fn remove_by_key(&self, key: KeyValues) -> RepositoryResult<()>;

    async fn remove_range(&self, entities: &[T]) -> RepositoryResult<()> {
        for entity in entities {
            self.remove(entity).await?;
        }
        Ok(())
    }
}

/// Transactional boundary over staged writes.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Persist every staged change, or none of them.
    async fn commit(&self) -> RepositoryResult<()>;

    /// Drop every staged change.
    async fn discard(&self) -> RepositoryResult<()>;
}
