use pretty_assertions::assert_eq;
use query_shape_model::request::RequestNode;
use query_shape_planner::wrapper::{Slot, WrapperKind};
use query_shape_test_utils::shop::{DOCUMENTS, ORDERS, PARTIES, PRODUCTS};

use crate::TestPlanner;

#[test]
fn selected_fields_are_projected() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(ORDERS, test.shop.order).select(["Id", "Total"]));

    let root = plan.tree.root();
    assert_eq!(WrapperKind::ProjectionOnly, root.wrapper().kind());
    assert_eq!(
        &[
            Slot::Field(0),
            Slot::Field(1),
            Slot::TypeName,
            Slot::PopulatedNames
        ],
        root.wrapper().slots()
    );
    assert_eq!(vec!["Id", "Total"], test.projected_names(root));
    assert_eq!(
        "(select (source Orders) (fn ($0) (projected (. $0 Id) (. $0 Total) 'Shop.Order' 'Id,Total')))",
        test.show(&plan)
    );
    assert!(!plan.root_is_expansion);
    assert!(!plan.unwrap_null_marker);
}

#[test]
fn key_fields_are_always_projected() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(ORDERS, test.shop.order).select(["Total"]));

    assert_eq!(vec!["Total", "Id"], test.projected_names(plan.tree.root()));
}

#[test]
fn no_selection_means_no_wrapper() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(ORDERS, test.shop.order));

    let root = plan.tree.root();
    assert_eq!(WrapperKind::None, root.wrapper().kind());
    assert!(root.projected().is_none());
    assert!(root.wrapper().slots().is_empty());
    assert_eq!("(source Orders)", test.show(&plan));
}

#[test]
fn same_name_on_sibling_subtypes_gets_one_slot_each() {
    let test = TestPlanner::new();
    let shop = &test.shop;
    let plan = test.plan_ok(&RequestNode::new(PARTIES, shop.party).select(["Code"]));

    let projected = plan.tree.root().projected().unwrap();
    let slots: Vec<_> = projected
        .iter()
        .map(|prop| (prop.name.as_str(), prop.declaring_type))
        .collect();
    assert_eq!(
        vec![
            ("Id", Some(shop.party)),
            ("Version", Some(shop.party)),
            ("Rating", Some(shop.company)),
            ("Code", Some(shop.person)),
            ("Code", Some(shop.company)),
        ],
        slots
    );
    assert_eq!(Some(3), projected.index_of("Code", Some(shop.person)));
    assert_eq!(Some(4), projected.index_of("Code", Some(shop.company)));
    assert_eq!(None, projected.index_of("Code", None));

    let company_fields = "(. $0 Id) (. $0 Version) (. (as $0 Shop.Company) Rating) null:Core.Int32 (. (as $0 Shop.Company) Code)";
    let agency = format!("(projected {company_fields} 'Shop.Agency' 'Id,Version,Rating,Code')");
    let company = format!("(projected {company_fields} 'Shop.Company' 'Id,Version,Rating,Code')");
    let person = "(projected (. $0 Id) (. $0 Version) null:Core.Int32 (. (as $0 Shop.Person) Code) null:Core.String 'Shop.Person' 'Id,Version,Code')";

    assert_eq!(
        format!(
            "(select (source Parties) (fn ($0) (if (is $0 Shop.Agency) {agency} (if (is $0 Shop.Company) {company} (if (is $0 Shop.Person) {person} null)))))"
        ),
        test.show(&plan)
    );
}

#[test]
fn inherited_fields_are_read_from_the_record_itself() {
    let test = TestPlanner::new();
    let shop = &test.shop;
    let plan = test.plan_ok(&RequestNode::new(PARTIES, shop.company).select(["Name", "License"]));

    let projected = plan.tree.root().projected().unwrap();
    let slots: Vec<_> = projected
        .iter()
        .map(|prop| (prop.name.as_str(), prop.target_type))
        .collect();
    assert_eq!(
        vec![
            ("Name", shop.company),
            ("License", shop.agency),
            ("Id", shop.company),
            ("Version", shop.company),
            ("Rating", shop.company),
        ],
        slots
    );
}

#[test]
fn open_field_keeps_generic_slot_when_some_type_lacks_it() {
    let test = TestPlanner::new();
    let shop = &test.shop;
    let plan = test.plan_ok(&RequestNode::new(PARTIES, shop.party).select(["License", "Nickname"]));

    let projected = plan.tree.root().projected().unwrap();
    let slots: Vec<_> = projected
        .iter()
        .map(|prop| (prop.name.as_str(), prop.declaring_type))
        .collect();
    assert_eq!(
        vec![
            ("License", None),
            ("Nickname", None),
            ("Id", Some(shop.party)),
            ("Version", Some(shop.party)),
            ("Rating", Some(shop.company)),
            ("License", Some(shop.agency)),
        ],
        slots
    );
    assert!(projected.get(1).unwrap().is_open());
}

#[test]
fn selected_stream_projects_every_declared_field() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(PRODUCTS, test.shop.product).select_all_with(["Photo"]));

    let root = plan.tree.root();
    assert_eq!(WrapperKind::ProjectionOnly, root.wrapper().kind());
    assert_eq!(vec!["Id", "Name", "Photo"], test.projected_names(root));
}

#[test]
fn type_with_attached_stream_is_fetched_whole() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(&RequestNode::new(DOCUMENTS, test.shop.document).select(["Title"]));

    assert!(plan.tree.root().projected().is_none());
    assert_eq!("(source Documents)", test.show(&plan));
}

#[test]
fn slots_are_stable_within_a_plan() {
    let test = TestPlanner::new();
    let plan = test.plan_ok(
        &RequestNode::new(PARTIES, test.shop.party).select(["Code", "Name", "License"]),
    );

    let projected = plan.tree.root().projected().unwrap();
    for (index, prop) in projected.iter().enumerate() {
        assert_eq!(Some(index), projected.index_of(&prop.name, prop.declaring_type));
    }
}

#[test]
fn planning_is_deterministic() {
    let test = TestPlanner::new();
    let request = RequestNode::new(PARTIES, test.shop.party)
        .select(["Code", "Name"])
        .expand("Employer", RequestNode::new(PARTIES, test.shop.party).select(["Name"]));

    let first = test.plan_ok(&request);
    let second = test.plan_ok(&request);

    assert_eq!(first.query, second.query);
    for (a, b) in first.tree.nodes().zip(second.tree.nodes()) {
        assert_eq!(a.wrapper(), b.wrapper());
        assert_eq!(test.projected_names(a), test.projected_names(b));
    }
}
