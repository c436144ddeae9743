//! Include-path flattening and projection fusion through the public API.

use adapted_repo::errors::ExpressionError;
use adapted_repo::expression::{flatten_include_paths, fuse, Expr, IncludeFactory, Lambda};
use adapted_repo::model::Entity;
use adapted_repo::sample::{Customer, Order};
use rstest::rstest;
use serde_json::json;

fn paths(lambda: &Lambda) -> Vec<String> {
    flatten_include_paths(lambda)
        .expect("flatten")
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn fused_projection_carries_data_and_paths() {
    let projection = Lambda::build("x", "Widget", |x| x.member("Name", "Widget"));
    let includes = Lambda::build("y", "Widget", |y| y.member("Related", "Widget"));
    let fused = fuse(&projection, &includes).expect("fuse");

    let paths: Vec<String> = fused.include_paths().iter().map(ToString::to_string).collect();
    assert_eq!(paths, vec!["Related"]);

    let widget = json!({ "Name": "sprocket", "Related": { "Name": "cog" } });
    let result = fused.evaluate(&widget).expect("evaluate");
    assert_eq!(result.data, json!("sprocket"));
    assert_eq!(result.includes, json!({ "Name": "cog" }));
    assert_eq!(result.into_data(), json!("sprocket"));
}

#[test]
fn anonymous_construction_flattens_in_binding_order() {
    let includes = IncludeFactory::<Order>::new(|x| {
        Expr::construct(
            "Anonymous",
            [
                ("Customer", x.clone().field::<Order>("Customer")),
                ("Employee", x.field::<Order>("Employee")),
            ],
        )
    });
    assert_eq!(paths(includes.lambda()), vec!["Customer", "Employee"]);
}

#[test]
fn nested_chains_become_dotted_paths() {
    let includes = Lambda::build("x", Order::TYPE_NAME, |x| {
        Expr::construct(
            "Anonymous",
            [
                ("Customer", x.clone().member("Customer", Order::TYPE_NAME)),
                (
                    "Demographics",
                    x.clone()
                        .member("Customer", Order::TYPE_NAME)
                        .member("CustomerDemographics", Customer::TYPE_NAME),
                ),
                ("Employee", x.member("Employee", Order::TYPE_NAME)),
            ],
        )
    });
    assert_eq!(
        paths(&includes),
        vec!["Customer", "Customer.CustomerDemographics", "Employee"]
    );
}

#[rstest]
#[case::computed_binding(Lambda::build("x", "Order", |x| {
    Expr::construct("Anonymous", [("Heavy", x.member("Freight", "Order").gt(10))])
}))]
#[case::constant(Lambda::build("x", "Order", |_| Expr::constant(1)))]
#[case::empty_construction(Lambda::build("x", "Order", |_| {
    Expr::construct("Anonymous", Vec::<(String, Expr)>::new())
}))]
fn malformed_include_factories_are_rejected(#[case] includes: Lambda) {
    assert!(matches!(
        flatten_include_paths(&includes),
        Err(ExpressionError::UnsupportedIncludePathShape { .. })
    ));
}

#[test]
fn projection_and_includes_must_share_a_type() {
    let projection = Lambda::build("x", Order::TYPE_NAME, |x| x.member("OrderId", Order::TYPE_NAME));
    let includes = Lambda::build("x", Customer::TYPE_NAME, |x| {
        x.member("CustomerDemographics", Customer::TYPE_NAME)
    });
    assert!(matches!(
        fuse(&projection, &includes),
        Err(ExpressionError::KeyMismatch { .. })
    ));
}
