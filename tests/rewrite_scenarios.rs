//! Rewriting predicates onto mapped types, end to end.

use adapted_repo::errors::ExpressionError;
use adapted_repo::expression::{eval, rewrite, Expr, Lambda, Predicate, TypeMapping};
use adapted_repo::model::{Entity, TypeDescriptor};
use adapted_repo::sample::{self, Customer, Order, OrderDto};
use proptest::prelude::*;
use serde_json::json;

fn usa() -> Predicate<Order> {
    Predicate::new(|x| x.field::<Order>("ShipCountry").eq("USA"))
}

#[test]
fn order_predicate_runs_on_order_dto() {
    let mapping = sample::dto_mapping().expect("mapping");
    let on_dto = usa().rewrite::<OrderDto>(&mapping).expect("rewrite");

    let mut dto = sample::order_dtos().remove(0);
    dto.ship_country = "USA".to_string();
    assert!(eval::evaluate_predicate(on_dto.lambda(), &serde_json::to_value(&dto).unwrap()).unwrap());

    dto.ship_country = "France".to_string();
    assert!(!eval::evaluate_predicate(on_dto.lambda(), &serde_json::to_value(&dto).unwrap()).unwrap());
}

#[test]
fn rewriting_leaves_the_input_untouched() {
    let mapping = sample::dto_mapping().expect("mapping");
    let original = sample::customer_in("USA");
    let before = original.lambda().clone();
    let rewritten = rewrite(original.lambda(), &mapping).expect("rewrite");

    assert_eq!(original.lambda(), &before);
    assert_eq!(rewritten.parameters()[0].ty().as_str(), OrderDto::TYPE_NAME);
    assert_eq!(
        rewritten.to_string(),
        "x => (x.Customer.Country == \"USA\")"
    );
}

#[test]
fn unresolvable_member_fails_without_partial_result() {
    let slim = TypeDescriptor::new("SlimOrder").with_keys(["OrderId"]).with_member(
        "OrderId",
        adapted_repo::model::MemberKind::Scalar,
    );
    let mapping = TypeMapping::builder()
        .map_descriptor(Order::TYPE_NAME, slim)
        .build()
        .expect("mapping");

    let err = rewrite(usa().lambda(), &mapping).unwrap_err();
    assert_eq!(
        err,
        ExpressionError::MemberNotFoundOnTarget {
            member: "ShipCountry".to_string(),
            source_type: Order::TYPE_NAME.to_string(),
            target_type: "SlimOrder".to_string(),
        }
    );
}

#[test]
fn multi_parameter_lambdas_are_rejected() {
    let a = adapted_repo::expression::Parameter::of::<Order>("a");
    let b = adapted_repo::expression::Parameter::of::<Customer>("b");
    let body = Expr::param(&a)
        .member("CustomerId", Order::TYPE_NAME)
        .eq(Expr::param(&b).member("CustomerId", Customer::TYPE_NAME));
    let lambda = Lambda::with_parameters(vec![a, b], body);
    assert!(matches!(
        rewrite(&lambda, &sample::dto_mapping().expect("mapping")),
        Err(ExpressionError::UnsupportedExpressionShape { .. })
    ));
}

fn order_predicate() -> impl Strategy<Value = Lambda> {
    prop_oneof![
        prop::sample::select(vec!["USA", "France", "Germany"]).prop_map(|c| {
            Lambda::build("x", Order::TYPE_NAME, |x| {
                x.member("ShipCountry", Order::TYPE_NAME).eq(c)
            })
        }),
        (0.0f64..60.0).prop_map(|f| {
            Lambda::build("x", Order::TYPE_NAME, |x| {
                x.member("Freight", Order::TYPE_NAME).lt(f)
            })
        }),
        prop::sample::select(vec!["USA", "France"]).prop_map(|c| {
            Lambda::build("x", Order::TYPE_NAME, |x| {
                x.clone()
                    .member("Customer", Order::TYPE_NAME)
                    .member("Country", Customer::TYPE_NAME)
                    .eq(c)
                    .or(x.member("EmployeeId", Order::TYPE_NAME).gt(4))
            })
        }),
    ]
}

proptest! {
    #[test]
    fn empty_mapping_is_identity(lambda in order_predicate()) {
        let rewritten = rewrite(&lambda, &TypeMapping::empty()).unwrap();
        prop_assert!(rewritten.structurally_eq(&lambda));
    }

    #[test]
    fn rewritten_predicate_agrees_on_mapped_rows(
        lambda in order_predicate(),
        index in 0usize..6,
    ) {
        let mapping = sample::dto_mapping().unwrap();
        let rewritten = rewrite(&lambda, &mapping).unwrap();
        let order = serde_json::to_value(&sample::orders()[index]).unwrap();
        let dto = serde_json::to_value(&sample::order_dtos()[index]).unwrap();
        prop_assert_eq!(
            eval::evaluate_predicate(&lambda, &order).unwrap(),
            eval::evaluate_predicate(&rewritten, &dto).unwrap()
        );
    }
}

#[test]
fn passthrough_members_keep_their_declaring_type() {
    // `Tag` is declared on an unmapped type and survives untouched
    let lambda = Lambda::build("x", Order::TYPE_NAME, |x| {
        x.member("Customer", Order::TYPE_NAME)
            .member("Tag", "Annotation")
            .eq(json!("vip"))
    });
    let rewritten = rewrite(&lambda, &sample::dto_mapping().unwrap()).expect("rewrite");
    match rewritten.body() {
        Expr::Binary { left, .. } => match left.as_ref() {
            Expr::Member { declaring_type, base, .. } => {
                assert_eq!(declaring_type.as_str(), "Annotation");
                assert!(matches!(
                    base.as_ref(),
                    Expr::Member { declaring_type, .. } if declaring_type.as_str() == OrderDto::TYPE_NAME
                ));
            }
            other => panic!("unexpected {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}
