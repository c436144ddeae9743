//! Synchronous facade over an async [`Repository`].
//!
//! Owns a current-thread tokio runtime and blocks on each call. Must not be
//! used from inside another runtime.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};

use crate::data_source::KeyValues;
use crate::errors::RepositoryResult;
use crate::expression::{IncludeFactory, Projection};
use crate::model::Entity;
use crate::specification::QueryCommand;

use super::traits::{Repository, UnitOfWork};

pub struct BlockingRepository<T, R> {
    inner: R,
    runtime: Runtime,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, R: Repository<T>> BlockingRepository<T, R> {
    pub fn new(inner: R) -> RepositoryResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner,
            runtime,
            _entity: PhantomData,
        })
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn get_all(&self) -> RepositoryResult<Vec<T>> {
        self.runtime.block_on(self.inner.get_all())
    }

    pub fn find_by_key(&self, key: impl Into<KeyValues>) -> RepositoryResult<Option<T>> {
        self.runtime.block_on(self.inner.find_by_key(key.into()))
    }

    pub fn find_by_key_with_includes(
        &self,
        key: impl Into<KeyValues>,
        includes: &IncludeFactory<T>,
    ) -> RepositoryResult<Option<T>> {
        self.runtime
            .block_on(self.inner.find_by_key_with_includes(key.into(), includes))
    }

    pub fn find_by_key_projected<P>(
        &self,
        key: impl Into<KeyValues>,
        projection: &Projection<T, P>,
        includes: Option<&IncludeFactory<T>>,
    ) -> RepositoryResult<Option<P>>
    where
        P: DeserializeOwned + Send + 'static,
    {
        self.runtime.block_on(
            self.inner
                .find_by_key_projected(key.into(), projection, includes),
        )
    }

    pub fn find_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<Vec<T>> {
        self.runtime.block_on(self.inner.find_by(query))
    }

    pub fn find_by_projected<P>(
        &self,
        query: &dyn QueryCommand<T>,
        projection: &Projection<T, P>,
        includes: Option<&IncludeFactory<T>>,
    ) -> RepositoryResult<Vec<P>>
    where
        P: DeserializeOwned + Send + 'static,
    {
        self.runtime
            .block_on(self.inner.find_by_projected(query, projection, includes))
    }

    pub fn count_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<u64> {
        self.runtime.block_on(self.inner.count_by(query))
    }

    pub fn any_by(&self, query: &dyn QueryCommand<T>) -> RepositoryResult<bool> {
        self.runtime.block_on(self.inner.any_by(query))
    }

    pub fn add(&self, entity: T) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.add(entity))
    }

    pub fn add_range(&self, entities: Vec<T>) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.add_range(entities))
    }

    pub fn remove(&self, entity: &T) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.remove(entity))
    }

    pub fn remove_by_key(&self, key: impl Into<KeyValues>) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.remove_by_key(key.into()))
    }

    pub fn remove_range(&self, entities: &[T]) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.remove_range(entities))
    }
}

impl<T: Entity, R: Repository<T> + UnitOfWork> BlockingRepository<T, R> {
    pub fn commit(&self) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.commit())
    }

    pub fn discard(&self) -> RepositoryResult<()> {
        self.runtime.block_on(self.inner.discard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{DataSourceRepository, RepositorySettings};
    use crate::sample::{self, Employee};
    use std::sync::Arc;

    #[test]
    fn blocking_calls_round_trip_through_runtime() {
        let source = Arc::new(sample::memory_source().expect("seed"));
        let repo = BlockingRepository::<Employee, _>::new(DataSourceRepository::new(
            source,
            RepositorySettings::default(),
        ))
        .expect("runtime");

        assert_eq!(repo.get_all().expect("all").len(), 4);
        repo.remove_by_key(3i64).expect("remove");
        repo.discard().expect("discard");
        assert!(repo.find_by_key(3i64).expect("lookup").is_some());

        repo.remove_by_key(3i64).expect("remove");
        repo.commit().expect("commit");
        assert!(repo.find_by_key(3i64).expect("lookup").is_none());
    }
}
