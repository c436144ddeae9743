//! Repositories over the in-memory and SQLite data sources.

use std::sync::Arc;

use adapted_repo::data_source::{DataSource, KeyValues, MemoryDataSource};
use adapted_repo::errors::{DataSourceError, RepositoryError};
use adapted_repo::expression::{Expr, IncludeFactory, Projection};
use adapted_repo::repositories::{
    AdaptedRepository, BlockingRepository, DataSourceRepository, Repository, RepositorySettings,
    UnitOfWork,
};
use adapted_repo::sample::{self, Customer, Employee, Order, OrderDto};
use adapted_repo::specification::Specification;
use serde::Deserialize;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Line {
    order_id: i64,
    ship_country: String,
}

fn line() -> Projection<Order, Line> {
    Projection::new(|x| {
        Expr::construct(
            "Line",
            [
                ("OrderId", x.clone().field::<Order>("OrderId")),
                ("ShipCountry", x.field::<Order>("ShipCountry")),
            ],
        )
    })
}

fn memory() -> Arc<MemoryDataSource> {
    Arc::new(sample::memory_source().expect("seed"))
}

#[tokio::test]
async fn specification_queries_through_memory_source() {
    let orders = DataSourceRepository::<Order, _>::new(memory(), RepositorySettings::default());
    let spec = (Specification::from(sample::ships_to("France"))
        | Specification::from(sample::ships_to("Belgium")))
        & !Specification::from(sample::freight_at_least(50.0));

    let mut ids: Vec<i64> = orders
        .find_by(&spec)
        .await
        .expect("query")
        .into_iter()
        .map(|o| o.order_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![10248, 10251]);

    let all = sample::orders();
    let expected = all
        .iter()
        .filter(|o| spec.is_satisfied_by(o).expect("evaluate"))
        .count() as u64;
    assert_eq!(orders.count_by(&spec).await.expect("count"), expected);
}

#[tokio::test]
async fn single_include_path_is_pushed_down_with_projection() {
    let orders = DataSourceRepository::<Order, _>::new(memory(), RepositorySettings::default());
    let company = Projection::<Order, String>::new(|x| {
        x.field::<Order>("Customer").field::<Customer>("CompanyName")
    });
    let includes = IncludeFactory::<Order>::new(|x| x.field::<Order>("Customer"));

    let mut companies = orders
        .find_by_projected(&sample::ships_to("USA"), &company, Some(&includes))
        .await
        .expect("project");
    companies.sort();
    assert_eq!(
        companies,
        vec!["Rattlesnake Canyon Grocery", "White Clover Markets"]
    );
}

#[tokio::test]
async fn adapted_repository_shares_a_unit_of_work() {
    let source = memory();
    let domain = AdaptedRepository::<Order, OrderDto, _>::new(
        source.clone(),
        sample::dto_mapping().expect("mapping"),
        RepositorySettings::default(),
    )
    .expect("repository");
    let dtos = DataSourceRepository::<OrderDto, _>::new(source.clone(), RepositorySettings::default());

    let mut order = sample::orders().remove(2);
    order.order_id = 10300;
    domain.add(order).await.expect("add");
    assert!(dtos.find_by_key(10300i64.into()).await.expect("lookup").is_none());

    dtos.commit().await.expect("commit");
    let stored = domain
        .find_by_key(KeyValues::from(10300i64))
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(stored.ship_country, "France");
    assert!(source.pending_changes().await.is_empty());
}

#[tokio::test]
async fn duplicate_key_rolls_back_the_whole_commit() {
    let employees = DataSourceRepository::<Employee, _>::new(memory(), RepositorySettings::default());
    let mut fresh = sample::employees().remove(0);
    fresh.employee_id = 9;
    let duplicate = sample::employees().remove(1);

    employees
        .add_range(vec![fresh, duplicate])
        .await
        .expect("stage");
    let err = employees.commit().await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::DataSource(DataSourceError::ConstraintViolation { .. })
    ));
    assert!(employees.find_by_key(9i64.into()).await.expect("lookup").is_none());

    employees.discard().await.expect("discard");
    assert_eq!(employees.get_all().await.expect("all").len(), 4);
}

#[test]
fn blocking_facade_serves_synchronous_callers() {
    let repo = BlockingRepository::<Order, _>::new(DataSourceRepository::new(
        memory(),
        RepositorySettings::default(),
    ))
    .expect("runtime");

    let lines = repo
        .find_by_projected(&sample::ships_to("Germany"), &line(), None)
        .expect("project");
    assert_eq!(
        lines,
        vec![Line {
            order_id: 10249,
            ship_country: "Germany".to_string(),
        }]
    );
    assert!(repo.any_by(&sample::customer_in("Belgium")).expect("exists"));
    assert_eq!(repo.count_by(&sample::freight_at_least(1000.0)).expect("count"), 0);
}

#[tokio::test]
async fn sqlite_source_pushes_scalar_queries_down() {
    let source = Arc::new(
        sample::sqlite_source("sqlite::memory:")
            .await
            .expect("sqlite"),
    );
    let orders = DataSourceRepository::<Order, _>::new(source.clone(), RepositorySettings::default());

    let heavy_usa = Specification::from(sample::ships_to("USA"))
        & Specification::from(sample::freight_at_least(10.0));
    let found = orders.find_by(&heavy_usa).await.expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].order_id, 10262);
    assert!(found[0].customer.is_none());

    assert_eq!(orders.count_by(&sample::ships_to("France")).await.expect("count"), 2);
    assert!(orders.any_by(&sample::ships_to("Belgium")).await.expect("exists"));

    let mut lines = orders
        .find_by_projected(&sample::ships_to("France"), &line(), None)
        .await
        .expect("project");
    lines.sort_by_key(|l| l.order_id);
    assert_eq!(
        lines.iter().map(|l| l.order_id).collect::<Vec<_>>(),
        vec![10248, 10251]
    );

    let freight = Projection::<Order, f64>::new(|x| x.field::<Order>("Freight"));
    let value = orders
        .find_by_key_projected(10269i64.into(), &freight, None)
        .await
        .expect("project");
    assert_eq!(value, Some(4.56));
}

#[tokio::test]
async fn sqlite_source_commits_in_one_transaction() {
    let source = Arc::new(
        sample::sqlite_source("sqlite::memory:")
            .await
            .expect("sqlite"),
    );
    let employees = DataSourceRepository::<Employee, _>::new(source.clone(), RepositorySettings::default());

    employees.remove_by_key(3i64.into()).await.expect("stage");
    employees.remove_by_key(42i64.into()).await.expect("stage");
    let err = employees.commit().await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::DataSource(DataSourceError::ConstraintViolation { .. })
    ));
    // the first delete was rolled back with the second
    assert!(employees.find_by_key(3i64.into()).await.expect("lookup").is_some());

    employees.discard().await.expect("discard");
    employees.remove_by_key(3i64.into()).await.expect("stage");
    employees.commit().await.expect("commit");
    assert!(employees.find_by_key(3i64.into()).await.expect("lookup").is_none());
}

#[tokio::test]
async fn sqlite_source_refuses_includes() {
    let source = Arc::new(
        sample::sqlite_source("sqlite::memory:")
            .await
            .expect("sqlite"),
    );
    let err = source
        .query_with_includes(
            &adapted_repo::model::TypeId::of::<Order>(),
            sample::ships_to("USA").lambda(),
            &[adapted_repo::expression::IncludePath::from_dotted("Customer")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::Unsupported { .. }));
}
