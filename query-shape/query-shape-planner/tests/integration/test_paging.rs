use pretty_assertions::assert_eq;
use query_shape_model::{
    expr::{Expr, OrderKey, QueryOp},
    order::Direction,
    request::RequestNode,
    types::PrimitiveKind,
};
use query_shape_planner::{expand_tree::ExpandFlags, wrapper::Slot};
use query_shape_test_utils::shop::{CUSTOMERS, ORDERS, PARTIES};

use crate::{TestPlanner, order_key};

fn order_keys(test: &TestPlanner) -> Vec<OrderKey> {
    let shop = &test.shop;
    vec![
        order_key(Direction::Ascending, |order| {
            Expr::field(order, shop.order_key1)
        }),
        order_key(Direction::Descending, |order| {
            Expr::field(order, shop.order_key2)
        }),
    ]
}

#[test]
fn paged_root_gets_continuation_token() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(
        &RequestNode::new(ORDERS, test.shop.order)
            .select(["Id", "Total"])
            .order_by(order_keys(&test), true),
    );

    let root = plan.tree.root();
    assert!(root.needs_continuation_token());
    assert_eq!(Some(20), root.page_size());
    assert_eq!(
        &[Slot::Element, Slot::ContinuationToken],
        root.wrapper().slots()
    );
    assert_eq!(
        vec!["Id", "Total", "OrderKey1", "OrderKey2"],
        test.projected_names(root)
    );

    let continuation = root.continuation().unwrap();
    assert_eq!("OrderKey1,OrderKey2", continuation.key_names().as_str());
    assert_eq!(
        &[
            Some(test.shop.table.primitive(PrimitiveKind::Int32)),
            Some(test.shop.table.primitive(PrimitiveKind::String)),
        ],
        continuation.key_types()
    );
    assert_eq!(3, continuation.slot_count());

    assert_eq!(
        "(take (order-by (select (source Orders) (fn ($1) (expanded (projected (. $1 Id) (. $1 Total) (. $1 OrderKey1) (. $1 OrderKey2) 'Shop.Order' 'Id,Total,OrderKey1,OrderKey2') (token (. $1 OrderKey1) (. $1 OrderKey2) 'OrderKey1,OrderKey2')))) (asc (fn ($0) (slot (slot $0 0) 2))) (desc (fn ($0) (slot (slot $0 0) 3)))) 20)",
        test.show(&plan)
    );
}

#[test]
fn paged_child_is_ordered_and_capped_before_projection() {
    let test = TestPlanner::new().config(|config| {
        config.page_sizes.insert(ORDERS.into(), 5);
    });
    let plan = test.plan_ok(
        &RequestNode::new(CUSTOMERS, test.shop.customer)
            .select(["Name"])
            .expand(
                "Orders",
                RequestNode::new(ORDERS, test.shop.order)
                    .select(["Id"])
                    .order_by(order_keys(&test), true),
            ),
    );

    let orders = plan.tree.child(plan.tree.root(), "Orders").unwrap();
    assert_eq!(Some(5), orders.page_size());
    assert_eq!(
        vec!["Id", "OrderKey1", "OrderKey2"],
        test.projected_names(orders)
    );

    assert_eq!(
        "(select (source Customers) (fn ($1) (expanded (projected (. $1 Name) (. $1 Id) 'Shop.Customer' 'Name,Id') (select (take (order-by (. $1 Orders) (asc (fn ($0) (. $0 OrderKey1))) (desc (fn ($0) (. $0 OrderKey2)))) 5) (fn ($2) (expanded (projected (. $2 Id) (. $2 OrderKey1) (. $2 OrderKey2) 'Shop.Order' 'Id,OrderKey1,OrderKey2') (token (. $2 OrderKey1) (. $2 OrderKey2) 'OrderKey1,OrderKey2')))))))",
        test.show(&plan)
    );
}

#[test]
fn soft_limit_requests_one_extra_element() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(ORDERS, test.shop.order).max_results(5));
    assert_eq!("(take (source Orders) 6)", test.show(&plan));

    let plan = test.plan_ok(
        &RequestNode::new(CUSTOMERS, test.shop.customer).expand(
            "Orders",
            RequestNode::new(ORDERS, test.shop.order).max_results(5),
        ),
    );
    assert_eq!(
        "(select (source Customers) (fn ($0) (expanded $0 (take (. $0 Orders) 6))))",
        test.show(&plan)
    );
}

#[test]
fn soft_limit_falls_back_to_configuration() {
    let test = TestPlanner::new().config(|config| config.max_results_per_collection = Some(10));
    let plan = test.plan_ok(
        &RequestNode::new(CUSTOMERS, test.shop.customer)
            .expand("Orders", RequestNode::new(ORDERS, test.shop.order)),
    );

    assert_eq!(
        "(take (select (source Customers) (fn ($0) (expanded $0 (take (. $0 Orders) 11)))) 11)",
        test.show(&plan)
    );
}

#[test]
fn page_size_takes_precedence_over_soft_limit() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(
        &RequestNode::new(ORDERS, test.shop.order)
            .order_by(order_keys(&test), true)
            .max_results(100),
    );

    let ops: Vec<_> = plan.query.query_ops().into_iter().cloned().collect();
    assert!(matches!(ops.last(), Some(QueryOp::Take(20))));
    assert!(!ops.iter().any(|op| matches!(op, QueryOp::Take(101))));
}

#[test]
fn skip_and_take_run_between_ordering_and_page_cap() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(
        &RequestNode::new(CUSTOMERS, test.shop.customer).expand(
            "Orders",
            RequestNode::new(ORDERS, test.shop.order)
                .order_by(order_keys(&test), false)
                .skip(10)
                .take(3),
        ),
    );

    let orders = plan.tree.child(plan.tree.root(), "Orders").unwrap();
    assert!(!orders.needs_continuation_token());
    assert!(!orders.flags().contains(ExpandFlags::BACK_COMPATIBLE));
    assert_eq!(
        "(select (source Customers) (fn ($1) (expanded $1 (take (skip (order-by (. $1 Orders) (asc (fn ($0) (. $0 OrderKey1))) (desc (fn ($0) (. $0 OrderKey2)))) 10) 3))))",
        test.show(&plan)
    );
}

#[test]
fn root_ordering_is_rebased_onto_wrapper_slots() {
    let test = TestPlanner::new();
    let shop = &test.shop;
    let plan = test.plan_ok(
        &RequestNode::new(ORDERS, shop.order)
            .select(["Id"])
            .expand(
                "Customer",
                RequestNode::new(CUSTOMERS, shop.customer).select(["Name"]),
            )
            .order_by(
                vec![order_key(Direction::Ascending, |order| {
                    Expr::field(Expr::field(order, shop.order_customer), shop.customer_name)
                })],
                false,
            ),
    );

    let customer = plan.tree.child(plan.tree.root(), "Customer").unwrap();
    assert_eq!(vec!["Name", "Id"], test.projected_names(customer));
    assert_eq!(vec!["Id"], test.projected_names(plan.tree.root()));

    assert_eq!(
        "(order-by (select (source Orders) (fn ($1) (expanded (projected (. $1 Id) 'Shop.Order' 'Id') (if (is-null (. $1 Customer)) null (projected (. (. $1 Customer) Name) (. (. $1 Customer) Id) 'Shop.Customer' 'Name,Id'))))) (asc (fn ($0) (slot (slot $0 1) 0))))",
        test.show(&plan)
    );
}

#[test]
fn root_ordering_on_whole_records_reads_fields_directly() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(
        &RequestNode::new(ORDERS, test.shop.order)
            .order_by(order_keys(&test), false)
            .take(10),
    );

    assert_eq!(
        "(take (order-by (source Orders) (asc (fn ($0) (. $0 OrderKey1))) (desc (fn ($0) (. $0 OrderKey2)))) 10)",
        test.show(&plan)
    );
}

#[test]
fn continuation_key_names_follow_navigation() {
    let test = TestPlanner::new();
    let shop = &test.shop;
    let plan = test.plan_ok(
        &RequestNode::new(ORDERS, shop.order)
            .expand("Customer", RequestNode::new(CUSTOMERS, shop.customer))
            .order_by(
                vec![
                    order_key(Direction::Ascending, |order| {
                        Expr::field(Expr::field(order, shop.order_customer), shop.customer_name)
                    }),
                    order_key(Direction::Ascending, |order| {
                        Expr::field(order, shop.order_id)
                    }),
                ],
                true,
            ),
    );

    let continuation = plan.tree.root().continuation().unwrap();
    assert_eq!("Customer/Name,Id", continuation.key_names().as_str());
}

#[test]
fn open_ordering_key_has_dynamic_type() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(PARTIES, test.shop.party).order_by(
        vec![order_key(Direction::Ascending, |party| {
            Expr::open_field(party, "Nickname")
        })],
        true,
    ));

    let root = plan.tree.root();
    let continuation = root.continuation().unwrap();
    assert_eq!(1, continuation.key_types().len());
    assert!(continuation.key_types()[0].is_none());
    assert_eq!("Nickname", continuation.key_names().as_str());
}

#[test]
fn open_ordering_key_reads_every_same_named_slot() {
    let test = TestPlanner::new();
    let ordered_by = |name: &'static str| {
        RequestNode::new(PARTIES, test.shop.party)
            .select(["Name"])
            .order_by(
                vec![order_key(Direction::Ascending, |party| {
                    Expr::open_field(party, name)
                })],
                false,
            )
    };

    let plan = test.plan_ok(&ordered_by("Code"));
    let projected = plan.tree.root().projected().unwrap();
    assert_eq!(vec![4, 5], projected.indexes_named("Code").collect::<Vec<_>>());
    let query = test.show(&plan);
    assert!(
        query.ends_with("(asc (fn ($0) (if (is-null (slot $0 4)) (slot $0 5) (slot $0 4)))))"),
        "{query}"
    );

    // the generic slot is populated for the types not declaring it
    let plan = test.plan_ok(&ordered_by("License"));
    let projected = plan.tree.root().projected().unwrap();
    assert_eq!(Some(2), projected.index_of("License", None));
    assert_eq!(Some(5), projected.index_of("License", Some(test.shop.agency)));
    let query = test.show(&plan);
    assert!(
        query.ends_with("(asc (fn ($0) (if (is-null (slot $0 2)) (slot $0 5) (slot $0 2)))))"),
        "{query}"
    );
}

#[test]
fn unbounded_soft_limit_saturates() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(ORDERS, test.shop.order).max_results(u64::MAX));

    assert_eq!(
        format!("(take (source Orders) {})", u64::MAX),
        test.show(&plan)
    );

    let test = test.config(|config| config.max_results_per_collection = Some(u64::MAX));
    let plan = test.plan_ok(
        &RequestNode::new(CUSTOMERS, test.shop.customer)
            .expand("Orders", RequestNode::new(ORDERS, test.shop.order)),
    );
    assert!(
        plan.query
            .query_ops()
            .iter()
            .all(|op| matches!(op, QueryOp::Select(_) | QueryOp::Take(u64::MAX))),
        "{}",
        test.show(&plan)
    );
}
