//! Queryable data source abstraction.
//!
//! A data source executes queries built from expression trees. Repositories
//! only ever talk to this trait; the two implementations are an in-memory
//! store ([`memory::MemoryDataSource`]) and a SeaORM connection
//! ([`orm::SeaOrmDataSource`]).
//!
//! Records cross this boundary as `serde_json::Value` objects keyed by
//! member name. Writes are staged and only become visible on `commit`.

pub mod memory;
pub mod orm;
pub mod sql;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{DataSourceError, DataSourceResult};
use crate::expression::{eval, Expr, IncludePath, Lambda, Parameter};
use crate::model::{TypeDescriptor, TypeId};

pub use memory::{MemoryDataSource, PendingChange};
pub use orm::SeaOrmDataSource;

/// Key values of one entity, in the key order of its descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValues(Vec<Value>);

impl KeyValues {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail unless there is exactly one value per key member.
    pub fn check_arity(&self, descriptor: &TypeDescriptor) -> DataSourceResult<()> {
        if descriptor.keys.is_empty() || self.0.len() != descriptor.keys.len() {
            return Err(DataSourceError::KeyArity {
                type_id: descriptor.id.to_string(),
                expected: descriptor.keys.len(),
                found: self.0.len(),
            });
        }
        Ok(())
    }

    /// `x => x.K1 == v1 && x.K2 == v2 ...`
    pub fn to_predicate(&self, descriptor: &TypeDescriptor) -> DataSourceResult<Lambda> {
        self.check_arity(descriptor)?;
        let parameter = Parameter::new("x", descriptor.id.clone());
        let body = descriptor
            .keys
            .iter()
            .zip(&self.0)
            .map(|(key, value)| {
                Expr::param(&parameter)
                    .member(key.as_str(), descriptor.id.clone())
                    .eq(value.clone())
            })
            .reduce(Expr::and)
            .unwrap_or_else(|| Expr::constant(false));
        Ok(Lambda::new(parameter, body))
    }

    /// Read the key values out of a record.
    pub fn from_record(descriptor: &TypeDescriptor, record: &Value) -> DataSourceResult<Self> {
        let values = descriptor
            .keys
            .iter()
            .map(|key| record.get(key).cloned().unwrap_or(Value::Null))
            .collect::<Vec<_>>();
        let keys = Self(values);
        keys.check_arity(descriptor)?;
        if keys.0.iter().any(Value::is_null) {
            return Err(DataSourceError::KeyArity {
                type_id: descriptor.id.to_string(),
                expected: descriptor.keys.len(),
                found: keys.0.iter().filter(|v| !v.is_null()).count(),
            });
        }
        Ok(keys)
    }

    /// Whether `record` carries exactly these key values.
    pub fn matches(&self, descriptor: &TypeDescriptor, record: &Value) -> bool {
        descriptor
            .keys
            .iter()
            .zip(&self.0)
            .all(|(key, value)| {
                record
                    .get(key)
                    .is_some_and(|found| eval::values_equal(found, value))
            })
    }
}

impl From<Vec<Value>> for KeyValues {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl From<Value> for KeyValues {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl From<i64> for KeyValues {
    fn from(value: i64) -> Self {
        Self(vec![Value::from(value)])
    }
}

impl From<&str> for KeyValues {
    fn from(value: &str) -> Self {
        Self(vec![Value::from(value)])
    }
}

impl From<String> for KeyValues {
    fn from(value: String) -> Self {
        Self(vec![Value::from(value)])
    }
}

/// The external "queryable data source" collaborator.
///
/// Every query takes the entity type and a predicate lambda whose parameter
/// is of that type. Implementations may refuse work they cannot execute
/// natively with [`DataSourceError::Unsupported`]; callers decide whether a
/// fallback is acceptable.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Find one entity by key.
    ///
    /// # Arguments
    /// * `ty` - Entity type
    /// * `key` - Key values in descriptor key order
    ///
    /// # Returns
    /// The entity record if found, None otherwise
    async fn resolve_by_key(&self, ty: &TypeId, key: &KeyValues)
        -> DataSourceResult<Option<Value>>;

    /// Entities matching `predicate`, with no navigation members loaded.
    async fn query(&self, ty: &TypeId, predicate: &Lambda) -> DataSourceResult<Vec<Value>> {
        self.query_with_includes(ty, predicate, &[]).await
    }

    /// Entities matching `predicate` with the given navigation paths
    /// eagerly loaded.
    async fn query_with_includes(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>>;

    /// Apply `projection` to every entity matching `predicate`, natively.
    ///
    /// `include_paths` must be loaded before the projection runs.
    async fn project(
        &self,
        ty: &TypeId,
        predicate: &Lambda,
        projection: &Lambda,
        include_paths: &[IncludePath],
    ) -> DataSourceResult<Vec<Value>>;

    async fn count(&self, ty: &TypeId, predicate: &Lambda) -> DataSourceResult<u64>;

    async fn exists(&self, ty: &TypeId, predicate: &Lambda) -> DataSourceResult<bool> {
        Ok(self.count(ty, predicate).await? > 0)
    }

    /// Stage an insert.
    async fn add(&self, ty: &TypeId, record: Value) -> DataSourceResult<()>;

    /// Stage a delete of the entity identified by `record`'s key members.
    async fn remove(&self, ty: &TypeId, record: &Value) -> DataSourceResult<()>;

    /// Apply every staged change atomically.
    async fn commit(&self) -> DataSourceResult<()>;

    /// Drop every staged change.
    async fn discard(&self) -> DataSourceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::eval;
    use crate::model::Entity;
    use crate::sample::Order;
    use serde_json::json;

    #[test]
    fn key_predicate_matches_only_that_key() {
        let descriptor = Order::descriptor();
        let predicate = KeyValues::from(10248i64).to_predicate(&descriptor).expect("predicate");
        assert_eq!(predicate.to_string(), "x => (x.OrderId == 10248)");
        assert!(eval::evaluate_predicate(&predicate, &json!({ "OrderId": 10248 })).expect("eval"));
        assert!(!eval::evaluate_predicate(&predicate, &json!({ "OrderId": 10249 })).expect("eval"));
    }

    #[test]
    fn composite_keys_are_joined_with_and() {
        let descriptor = TypeDescriptor::new("OrderLine").with_keys(["OrderId", "ProductId"]);
        let keys = KeyValues::new(vec![json!(1), json!(7)]);
        let predicate = keys.to_predicate(&descriptor).expect("predicate");
        assert_eq!(
            predicate.to_string(),
            "x => ((x.OrderId == 1) && (x.ProductId == 7))"
        );
        assert!(keys.matches(&descriptor, &json!({ "OrderId": 1, "ProductId": 7 })));
    }

    #[test]
    fn key_matching_agrees_with_key_predicate() {
        let descriptor = Order::descriptor();
        let keys = KeyValues::from(json!(10248.0));
        let record = json!({ "OrderId": 10248 });
        assert!(keys.matches(&descriptor, &record));
        let predicate = keys.to_predicate(&descriptor).expect("predicate");
        assert!(eval::evaluate_predicate(&predicate, &record).expect("eval"));
        assert!(!keys.matches(&descriptor, &json!({ "OrderId": 10249 })));
        assert!(!keys.matches(&descriptor, &json!({ "ShipCountry": "USA" })));
    }

    #[test]
    fn arity_is_checked() {
        let descriptor = Order::descriptor();
        let err = KeyValues::new(vec![json!(1), json!(2)])
            .to_predicate(&descriptor)
            .unwrap_err();
        assert!(matches!(
            err,
            DataSourceError::KeyArity { expected: 1, found: 2, .. }
        ));
        assert!(KeyValues::new(vec![]).check_arity(&descriptor).is_err());
    }

    #[test]
    fn record_without_key_value_is_rejected() {
        let descriptor = Order::descriptor();
        assert!(KeyValues::from_record(&descriptor, &json!({ "ShipCountry": "USA" })).is_err());
        let keys = KeyValues::from_record(&descriptor, &json!({ "OrderId": 5 })).expect("keys");
        assert_eq!(keys.values(), &[json!(5)]);
    }
}
