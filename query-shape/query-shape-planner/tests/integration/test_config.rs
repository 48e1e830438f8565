use pretty_assertions::assert_eq;
use query_shape_planner::{Capabilities, PlannerConfig, TypeDispatchStrategy};

#[test]
fn config_defaults() {
    let config = PlannerConfig::default();

    assert!(!config.expand_by_default);
    assert_eq!(12, config.max_wrapper_breadth);
    assert_eq!(20, config.page_size("Orders"));
    assert_eq!(None, config.max_results_per_collection);
}

#[test]
fn config_from_json_fills_in_defaults() {
    let config: PlannerConfig = serde_json::from_str(
        r#"{
            "expand_by_default": true,
            "page_sizes": { "Orders": 5 }
        }"#,
    )
    .unwrap();

    assert!(config.expand_by_default);
    assert_eq!(12, config.max_wrapper_breadth);
    assert_eq!(5, config.page_size("Orders"));
    assert_eq!(20, config.page_size("Customers"));
}

#[test]
fn capabilities_from_json() {
    let capabilities: Capabilities = serde_json::from_str(
        r#"{
            "requires_null_guards_for_polymorphic_access": true,
            "type_dispatch_strategy": "ProviderCallback"
        }"#,
    )
    .unwrap();

    assert!(capabilities.requires_null_guards_for_polymorphic_access);
    assert!(!capabilities.requires_explicit_object_cast);
    assert!(capabilities.can_express_typed_null);
    assert_eq!(
        TypeDispatchStrategy::ProviderCallback,
        capabilities.type_dispatch_strategy
    );
}
