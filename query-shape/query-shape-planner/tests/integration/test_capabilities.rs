use pretty_assertions::assert_eq;
use query_shape_model::request::RequestNode;
use query_shape_planner::TypeDispatchStrategy;
use query_shape_test_utils::shop::{ORDERS, PARTIES};

use crate::TestPlanner;

#[test]
fn single_result_uses_empty_marker_without_typed_null() {
    let request = |test: &TestPlanner| {
        RequestNode::new(ORDERS, test.shop.order)
            .select(["Id"])
            .single_result()
    };

    let test = TestPlanner::new();
    let plan = test.plan_ok(&request(&test));
    assert!(!plan.unwrap_null_marker);
    assert_eq!(
        "(select (source Orders) (fn ($0) (projected (. $0 Id) 'Shop.Order' 'Id')))",
        test.show(&plan)
    );

    let test = TestPlanner::new().capabilities(|caps| caps.can_express_typed_null = false);
    let plan = test.plan_ok(&request(&test));
    assert!(plan.unwrap_null_marker);
    assert_eq!(
        "(select (source Orders) (fn ($0) (if (is-null $0) (empty) (projected (. $0 Id) 'Shop.Order' 'Id'))))",
        test.show(&plan)
    );
}

#[test]
fn unpopulated_slots_are_untyped_without_typed_null() {
    let test = TestPlanner::new().capabilities(|caps| caps.can_express_typed_null = false);
    let plan = test.plan_ok(&RequestNode::new(PARTIES, test.shop.party).select(["Code"]));

    let query = test.show(&plan);
    assert!(!query.contains("null:"), "{query}");
    assert!(
        query.contains("(projected (. $0 Id) (. $0 Version) null (. (as $0 Shop.Person) Code) null 'Shop.Person' 'Id,Version,Code')"),
        "{query}"
    );
}

#[test]
fn explicit_object_cast_wraps_slot_values() {
    let test = TestPlanner::new().capabilities(|caps| caps.requires_explicit_object_cast = true);
    let plan = test.plan_ok(&RequestNode::new(ORDERS, test.shop.order).select(["Id"]));

    assert_eq!(
        "(select (source Orders) (fn ($0) (projected (to-object (. $0 Id)) 'Shop.Order' 'Id')))",
        test.show(&plan)
    );
}

#[test]
fn provider_callback_type_dispatch() {
    let test = TestPlanner::new().capabilities(|caps| {
        caps.type_dispatch_strategy = TypeDispatchStrategy::ProviderCallback
    });
    let plan = test.plan_ok(&RequestNode::new(PARTIES, test.shop.party).select(["Name"]));

    let query = test.show(&plan);
    assert!(
        query.starts_with("(select (source Parties) (fn ($0) (if (provider-is-of-type Shop.Agency $0) "),
        "{query}"
    );
    assert!(query.contains("(provider-is-of-type Shop.Company $0)"), "{query}");
    assert!(query.contains("(provider-is-of-type Shop.Person $0)"), "{query}");
    assert!(!query.contains("(is $0"), "{query}");
}

#[test]
fn narrowed_navigation_is_null_guarded() {
    let request = |test: &TestPlanner| {
        RequestNode::new(PARTIES, test.shop.party)
            .expand("Employer", RequestNode::new(PARTIES, test.shop.party))
    };

    let test = TestPlanner::new()
        .capabilities(|caps| caps.requires_null_guards_for_polymorphic_access = true);
    let plan = test.plan_ok(&request(&test));
    assert_eq!(
        "(select (source Parties) (fn ($0) (expanded $0 (if (is $0 Shop.Person) (. (as $0 Shop.Person) Employer) null))))",
        test.show(&plan)
    );

    let test = test.capabilities(|caps| {
        caps.type_dispatch_strategy = TypeDispatchStrategy::ProviderCallback
    });
    let plan = test.plan_ok(&request(&test));
    assert_eq!(
        "(select (source Parties) (fn ($0) (expanded $0 (if (provider-is-of-type Shop.Person $0) (. (as $0 Shop.Person) Employer) null))))",
        test.show(&plan)
    );
}
