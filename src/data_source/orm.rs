//! SeaORM-backed data source.
//!
//! Predicates and projections are translated to sea-query statements and
//! run as raw statements on the connection; rows come back as JSON objects.
//! Writes are buffered as statements and executed inside one database
//! transaction on commit.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    FromQueryResult, JsonValue, Statement, TransactionTrait,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, AppResult, DataSourceError, DataSourceResult};
use crate::expression::{Expr, IncludePath, Lambda};
use crate::model::{TypeDescriptor, TypeId, TypeRegistry};

use super::sql::{SqlTranslator, COUNT_COLUMN, VALUE_COLUMN};
use super::{DataSource, KeyValues};

/// A buffered write.
#[derive(Debug, Clone)]
struct PendingStatement {
    statement: Statement,
    /// Deletes must hit a row; a miss aborts the commit.
    must_affect_row: bool,
    description: String,
}

/// Data source over a SeaORM [`DatabaseConnection`].
pub struct SeaOrmDataSource {
    registry: Arc<TypeRegistry>,
    connection: Arc<DatabaseConnection>,
    pending: Mutex<Vec<PendingStatement>>,
}

impl SeaOrmDataSource {
    pub fn new(registry: Arc<TypeRegistry>, connection: Arc<DatabaseConnection>) -> Self {
        Self {
            registry,
            connection,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Open a connection from configuration.
    pub async fn connect(registry: Arc<TypeRegistry>, config: &DatabaseConfig) -> AppResult<Self> {
        let url = config.url.as_deref().ok_or_else(|| AppError::Configuration {
            message: "database.url is not set".to_string(),
        })?;
        let mut options = ConnectOptions::new(url.to_string());
        if let Some(max) = config.max_connections {
            options.max_connections(max);
        }
        options.sqlx_logging(false);

        let connection = Database::connect(options).await?;
        info!(
            "Connected to {:?} database",
            connection.get_database_backend()
        );
        Ok(Self::new(registry, Arc::new(connection)))
    }

    pub fn connection(&self) -> &Arc<DatabaseConnection> {
        &self.connection
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.connection.get_database_backend()
    }

    /// Number of buffered writes.
    pub async fn pending_statements(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn descriptor(&self, ty: &TypeId) -> DataSourceResult<Arc<TypeDescriptor>> {
        self.registry
            .get(ty)
            .cloned()
            .ok_or_else(|| DataSourceError::UnknownType {
                type_id: ty.to_string(),
            })
    }

    async fn fetch(&self, statement: Statement) -> DataSourceResult<Vec<Value>> {
        trace!("[SQL] {}", statement);
        Ok(JsonValue::find_by_statement(statement)
            .all(&*self.connection)
            .await?)
    }

    async fn stage(&self, pending: PendingStatement) {
        trace!("[SQL] staged {}", pending.statement);
        self.pending.lock().await.push(pending);
    }
}

/// SELECTs only carry scalar columns; navigation members read as unloaded.
fn unloaded_navigation(descriptor: &TypeDescriptor, mut rows: Vec<Value>) -> Vec<Value> {
    for row in &mut rows {
        if let Value::Object(members) = row {
            for navigation in descriptor.navigation_members() {
                members.entry(navigation.name.clone()).or_insert(Value::Null);
            }
        }
    }
    rows
}

fn no_includes(operation: &str, include_paths: &[IncludePath]) -> DataSourceResult<()> {
    if include_paths.is_empty() {
        return Ok(());
    }
    let paths: Vec<String> = include_paths.iter().map(ToString::to_string).collect();
    Err(DataSourceError::unsupported(
        operation,
        format!("eager loading of [{}] needs joins", paths.join(", ")),
    ))
}

#[async_trait]
impl DataSource for SeaOrmDataSource {
    async fn resolve_by_key(
        &self,
        ty: &TypeId,
        key: &KeyValues,
    ) -> DataSourceResult<Option<Value>> {
        let descriptor = self.descriptor(ty)?;
        let predicate = key.to_predicate(&descriptor)?;
        let select = SqlTranslator::new(&descriptor, self.backend()).select(&predicate)?;
        let rows = self.fetch(self.backend().build(&select)).await?;
        Ok(unloaded_navigation(&descriptor, rows).into_iter().next())
    }

    async fn query_with_includes(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>> {
        no_includes("query_with_includes", include_paths)?;
        let descriptor = self.descriptor(ty)?;
        let select = SqlTranslator::new(&descriptor, self.backend()).select(predicate)?;
        let rows = self.fetch(self.backend().build(&select)).await?;
        Ok(unloaded_navigation(&descriptor, rows))
    }

    async fn project(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        projection: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>> {
        no_includes("project", include_paths)?;
        let descriptor = self.descriptor(ty)?;
        let select = SqlTranslator::new(&descriptor, self.backend()).project(predicate, projection)?;
        let rows = self.fetch(self.backend().build(&select)).await?;
        if matches!(projection.body(), Expr::Construct { .. }) {
            return Ok(rows);
        }
        Ok(rows
            .into_iter()
            .map(|mut row| {
                row.get_mut(VALUE_COLUMN)
                    .map(Value::take)
                    .unwrap_or(Value::Null)
            })
            .collect())
    }

    async fn count(&self, ty: &TypeId, predicate: &Lambda) -> DataSourceResult<u64> {
        let descriptor = self.descriptor(ty)?;
        let select = SqlTranslator::new(&descriptor, self.backend()).count(predicate)?;
        let statement = self.backend().build(&select);
        trace!("[SQL] {}", statement);
        let count = match self.connection.query_one(statement).await? {
            Some(row) => row.try_get::<i64>("", COUNT_COLUMN)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn add(&self, ty: &TypeId, record: Value) -> DataSourceResult<()> {
        let descriptor = self.descriptor(ty)?;
        KeyValues::from_record(&descriptor, &record)?;
        let insert = SqlTranslator::new(&descriptor, self.backend()).insert(&record)?;
        self.stage(PendingStatement {
            statement: self.backend().build(&insert),
            must_affect_row: false,
            description: format!("insert {ty}"),
        })
        .await;
        Ok(())
    }

    async fn remove(&self, ty: &TypeId, record: &Value) -> DataSourceResult<()> {
        let descriptor = self.descriptor(ty)?;
        let key = KeyValues::from_record(&descriptor, record)?;
        let delete = SqlTranslator::new(&descriptor, self.backend()).delete(&key)?;
        self.stage(PendingStatement {
            statement: self.backend().build(&delete),
            must_affect_row: true,
            description: format!("delete {ty} {:?}", key.values()),
        })
        .await;
        Ok(())
    }

    /// Execute buffered writes in one transaction. On failure the
    /// transaction is rolled back and the buffer is kept.
    async fn commit(&self) -> DataSourceResult<()> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(());
        }

        let txn = self.connection.begin().await?;
        for change in pending.iter() {
            let result = txn.execute(change.statement.clone()).await?;
            if change.must_affect_row && result.rows_affected() == 0 {
                txn.rollback().await?;
                return Err(DataSourceError::ConstraintViolation {
                    constraint: "row_exists".to_string(),
                    message: format!("{} matched no rows", change.description),
                });
            }
        }
        txn.commit().await?;

        debug!("[SQL] committed {} statement(s)", pending.len());
        pending.clear();
        Ok(())
    }

    async fn discard(&self) -> DataSourceResult<()> {
        self.pending.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample;
    use sea_orm::{MockDatabase, MockExecResult};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn source(db: MockDatabase) -> SeaOrmDataSource {
        SeaOrmDataSource::new(sample::registry(), Arc::new(db.into_connection()))
    }

    #[tokio::test]
    async fn count_reads_aliased_column() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).append_query_results([vec![
            BTreeMap::from([(COUNT_COLUMN, sea_orm::Value::BigInt(Some(2)))]),
        ]]);
        let count = source(db)
            .count(&TypeId::from("Order"), sample::ships_to("USA").lambda())
            .await
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn includes_are_refused() {
        let source = source(MockDatabase::new(DatabaseBackend::Sqlite));
        let err = source
            .query_with_includes(
                &TypeId::from("Order"),
                &Lambda::always("Order"),
                &[IncludePath::from_dotted("Customer")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn writes_are_buffered_until_commit() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).append_exec_results([
            MockExecResult {
                last_insert_id: 9,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ]);
        let source = source(db);
        let employee = TypeId::from("Employee");
        source
            .add(
                &employee,
                json!({ "EmployeeId": 9, "FirstName": "Anne", "LastName": "Dodsworth", "Country": "UK" }),
            )
            .await
            .expect("add");
        source
            .remove(&employee, &json!({ "EmployeeId": 5 }))
            .await
            .expect("remove");
        assert_eq!(source.pending_statements().await, 2);

        source.commit().await.expect("commit");
        assert_eq!(source.pending_statements().await, 0);
    }

    #[tokio::test]
    async fn delete_of_missing_row_aborts_commit() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }]);
        let source = source(db);
        source
            .remove(&TypeId::from("Employee"), &json!({ "EmployeeId": 99 }))
            .await
            .expect("remove");
        let err = source.commit().await.unwrap_err();
        assert!(matches!(err, DataSourceError::ConstraintViolation { .. }));
        assert_eq!(source.pending_statements().await, 1);

        source.discard().await.expect("discard");
        assert_eq!(source.pending_statements().await, 0);
    }

    #[tokio::test]
    async fn connect_requires_url() {
        let err = SeaOrmDataSource::connect(sample::registry(), &DatabaseConfig::default())
            .await
            .err()
            .expect("missing url");
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
