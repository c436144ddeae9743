//! The in-memory and SQLite data sources must agree on every predicate and
//! projection the SQL translator accepts.

use std::sync::Arc;

use adapted_repo::data_source::{DataSource, MemoryDataSource, SeaOrmDataSource};
use adapted_repo::errors::RepositoryError;
use adapted_repo::expression::{Expr, Lambda, Predicate, Projection};
use adapted_repo::model::{Entity, TypeId};
use adapted_repo::repositories::{DataSourceRepository, Repository, RepositorySettings};
use adapted_repo::sample::{self, Employee, Order};
use rstest::rstest;
use serde_json::Value;

async fn sources() -> (MemoryDataSource, SeaOrmDataSource) {
    let memory = sample::memory_source().expect("seed");
    let sqlite = sample::sqlite_source("sqlite::memory:")
        .await
        .expect("sqlite");
    (memory, sqlite)
}

fn sorted(mut values: Vec<Value>) -> Vec<Value> {
    values.sort_by_key(|v| v.to_string());
    values
}

#[rstest]
#[case::prefix_other_case(Predicate::new(|x| x.field::<Order>("ShipCountry").starts_with("fr")), 0)]
#[case::prefix(Predicate::new(|x| x.field::<Order>("ShipCountry").starts_with("Fr")), 2)]
#[case::suffix_other_case(Predicate::new(|x| x.field::<Order>("ShipCountry").ends_with("CE")), 0)]
#[case::suffix(Predicate::new(|x| x.field::<Order>("ShipCountry").ends_with("ce")), 2)]
#[case::infix_other_case(Predicate::new(|x| x.field::<Order>("ShipCountry").contains("sa")), 0)]
#[case::infix(Predicate::new(|x| x.field::<Order>("ShipCountry").contains("SA")), 2)]
#[case::is_null(Predicate::new(|x| x.field::<Order>("ShipRegion").eq(Value::Null)), 4)]
#[case::equal_to_value(Predicate::new(|x| x.field::<Order>("ShipRegion").eq("WA")), 1)]
#[case::not_equal_keeps_nulls(Predicate::new(|x| x.field::<Order>("ShipRegion").ne("WA")), 5)]
#[case::negated_equality(Predicate::new(|x| x.field::<Order>("ShipRegion").eq("WA").not()), 5)]
#[case::negated_ordering(Predicate::new(|x| x.field::<Order>("Freight").gt(40.0).not()), 3)]
#[case::negated_ordering_over_nulls(Predicate::new(|x| x.field::<Order>("ShipRegion").gt("M").not()), 4)]
#[case::negated_match_over_nulls(Predicate::new(|x| x.field::<Order>("ShipRegion").starts_with("N").not()), 5)]
#[case::negated_contains_over_nulls(Predicate::new(|x| x.field::<Order>("ShipRegion").contains("A").not()), 5)]
#[case::disjunction_with_null(
    Predicate::new(|x| x.clone().field::<Order>("ShipRegion").eq("WA").or(x.field::<Order>("Freight").ge(50))),
    2
)]
#[tokio::test]
async fn predicates_count_the_same_rows(#[case] predicate: Predicate<Order>, #[case] expected: u64) {
    let (memory, sqlite) = sources().await;
    let ty = TypeId::of::<Order>();

    let in_memory = memory.count(&ty, predicate.lambda()).await.expect("memory count");
    let in_sqlite = sqlite.count(&ty, predicate.lambda()).await.expect("sqlite count");
    assert_eq!(in_memory, expected, "memory: {}", predicate.lambda());
    assert_eq!(in_sqlite, expected, "sqlite: {}", predicate.lambda());

    let memory_rows = memory.query(&ty, predicate.lambda()).await.expect("memory rows");
    let sqlite_rows = sqlite.query(&ty, predicate.lambda()).await.expect("sqlite rows");
    let ids = |rows: Vec<Value>| sorted(rows.into_iter().map(|r| r["OrderId"].clone()).collect());
    assert_eq!(ids(memory_rows), ids(sqlite_rows));
}

#[rstest]
#[case::full_name(
    Projection::<Employee, Option<String>>::new(|x| {
        x.clone()
            .field::<Employee>("FirstName")
            .add(" ")
            .add(x.field::<Employee>("LastName"))
    })
    .lambda()
    .clone()
)]
#[case::prefixed_country(
    Projection::<Employee, Option<String>>::new(|x| Expr::constant("#").add(x.field::<Employee>("Country")))
        .lambda()
        .clone()
)]
#[tokio::test]
async fn employee_projections_agree(#[case] projection: Lambda) {
    let (memory, sqlite) = sources().await;
    let ty = TypeId::of::<Employee>();
    let all = Lambda::always(Employee::TYPE_NAME);

    let in_memory = memory.project(&ty, &all, &projection, &[]).await.expect("memory");
    let in_sqlite = sqlite.project(&ty, &all, &projection, &[]).await.expect("sqlite");
    assert_eq!(sorted(in_memory), sorted(in_sqlite));
}

#[tokio::test]
async fn concatenation_propagates_nulls_on_both_sources() {
    let (memory, sqlite) = sources().await;
    let ty = TypeId::of::<Order>();
    let projection = Projection::<Order, Option<String>>::new(|x| {
        x.clone()
            .field::<Order>("ShipRegion")
            .add("/")
            .add(x.field::<Order>("ShipCountry"))
    });
    let all = Lambda::always(Order::TYPE_NAME);

    let in_memory = sorted(memory.project(&ty, &all, projection.lambda(), &[]).await.expect("memory"));
    let in_sqlite = sorted(sqlite.project(&ty, &all, projection.lambda(), &[]).await.expect("sqlite"));
    assert_eq!(in_memory, in_sqlite);
    assert_eq!(in_memory.iter().filter(|v| v.is_null()).count(), 4);
    assert!(in_memory.contains(&Value::from("NM/USA")));
}

#[tokio::test]
async fn ambiguous_plus_is_not_pushed_down() {
    let (_, sqlite) = sources().await;
    let source = Arc::new(sqlite);
    let glued = Projection::<Employee, String>::new(|x| {
        x.clone()
            .field::<Employee>("FirstName")
            .add(x.field::<Employee>("LastName"))
    });

    let strict = DataSourceRepository::<Employee, _>::new(source.clone(), RepositorySettings::default());
    let err = strict
        .find_by_projected(&Predicate::<Employee>::always(), &glued, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ProjectionNotPushedDown { .. }));

    let lenient = DataSourceRepository::<Employee, _>::new(
        source,
        RepositorySettings {
            allow_in_memory_projection: true,
            ..RepositorySettings::default()
        },
    );
    let mut names = lenient
        .find_by_projected(&Predicate::<Employee>::always(), &glued, None)
        .await
        .expect("fallback");
    names.sort();
    assert_eq!(
        names,
        vec!["JanetLeverling", "LauraCallahan", "MichaelSuyama", "StevenBuchanan"]
    );
}
