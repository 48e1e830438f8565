use pretty_assertions::assert_eq;
use query_shape_model::{
    TypeId,
    expr::{Expr, Proc},
    order::Direction,
    request::RequestNode,
};
use query_shape_planner::{ErrorClass, PlanError};
use query_shape_test_utils::shop::{CUSTOMERS, ORDERS, PARTIES};

use crate::{TestPlanner, order_key};

#[test]
fn expanding_an_open_property_is_a_bad_request() {
    let test = TestPlanner::new();
    let error = test
        .plan(
            &RequestNode::new(PARTIES, test.shop.party)
                .expand("Nickname", RequestNode::new(PARTIES, test.shop.party)),
        )
        .unwrap_err();

    assert_eq!(
        PlanError::OpenPropertyExpansion {
            type_name: "Shop.Party".into(),
            name: "Nickname".into()
        },
        error
    );
    assert_eq!(ErrorClass::BadRequest, error.class());
}

#[test]
fn expanding_a_primitive_is_a_bad_request() {
    let test = TestPlanner::new();
    let error = test
        .plan(
            &RequestNode::new(ORDERS, test.shop.order)
                .expand("Total", RequestNode::new(ORDERS, test.shop.order)),
        )
        .unwrap_err();

    assert_eq!(
        "`Total` on `Shop.Order` is not a relationship and cannot be expanded",
        error.to_string()
    );
    assert_eq!(ErrorClass::BadRequest, error.class());
}

#[test]
fn unknown_names_are_bad_requests() {
    let test = TestPlanner::new();
    let error = test
        .plan(
            &RequestNode::new(ORDERS, test.shop.order)
                .expand("Invoice", RequestNode::new(ORDERS, test.shop.order)),
        )
        .unwrap_err();
    assert!(matches!(error, PlanError::PropertyNotFound { .. }));

    let error = test
        .plan(&RequestNode::new(ORDERS, test.shop.order).select(["Discount"]))
        .unwrap_err();
    assert_eq!(
        PlanError::PropertyNotFound {
            type_name: "Shop.Order".into(),
            name: "Discount".into()
        },
        error
    );

    let error = test
        .plan(&RequestNode::new(ORDERS, TypeId(1000)))
        .unwrap_err();
    assert_eq!(PlanError::UnknownType(TypeId(1000)), error);
    assert_eq!(ErrorClass::BadRequest, error.class());
}

#[test]
fn too_wide_expansion_wrapper_is_unsupported() {
    let test = TestPlanner::new().config(|config| config.max_wrapper_breadth = 2);
    let error = test
        .plan(
            &RequestNode::new(ORDERS, test.shop.order)
                .expand("Customer", RequestNode::new(CUSTOMERS, test.shop.customer))
                .expand("Lines", RequestNode::new("OrderLines", test.shop.order_line)),
        )
        .unwrap_err();

    assert_eq!(
        PlanError::WrapperTooWide {
            path: "Orders".into(),
            required: 3,
            limit: 2
        },
        error
    );
    assert_eq!(ErrorClass::Unsupported, error.class());
}

#[test]
fn breadth_limit_reports_nested_path() {
    let test = TestPlanner::new().config(|config| config.max_wrapper_breadth = 2);
    let error = test
        .plan(
            &RequestNode::new(CUSTOMERS, test.shop.customer).expand(
                "Orders",
                RequestNode::new(ORDERS, test.shop.order)
                    .expand("Customer", RequestNode::new(CUSTOMERS, test.shop.customer))
                    .expand("Lines", RequestNode::new("OrderLines", test.shop.order_line)),
            ),
        )
        .unwrap_err();

    assert_eq!(
        "wrapper for `Customers/Orders` needs 3 slots, at most 2 are supported",
        error.to_string()
    );
}

#[test]
fn uninferable_paged_ordering_key_is_a_bad_request() {
    let test = TestPlanner::new();
    let error = test
        .plan(&RequestNode::new(ORDERS, test.shop.order).order_by(
            vec![order_key(Direction::Ascending, |order| {
                Expr::call(Proc::ToObject, [Expr::field(order, test.shop.order_total)])
            })],
            true,
        ))
        .unwrap_err();

    assert_eq!(
        PlanError::UninferableOrderKey {
            path: "Orders".into(),
            index: 0
        },
        error
    );
    assert_eq!(ErrorClass::BadRequest, error.class());
}
