//! Property schema behaviour through the public entity API.

mod common;

use common::Component;
use proptest::prelude::*;
use serde_json::{json, Value};
use xtypes::{EntityClass, ErrorKind, PropertySchema, ValueKind, XTypeError};

#[test]
fn direction_is_restricted() {
    let mut component = Component::construct();
    assert_eq!(component.get_property("direction").ok(), Some(&json!("out")));
    let err = component
        .set_property("direction", json!("left"), true)
        .expect_err("left is not allowed");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    component
        .set_property("direction", json!("in"), true)
        .expect("in is allowed");
    assert_eq!(component.get_property("direction").ok(), Some(&json!("in")));
}

#[test]
fn nested_paths_address_the_value_tree() {
    let mut component = Component::construct();
    assert_eq!(component.get_property("/limits/max").ok(), Some(&json!(10)));
    component
        .set_property("limits/max", json!(25), true)
        .expect("integer");
    assert_eq!(component.get_properties()["limits"], json!({"max": 25}));
    // an unsigned value satisfies an integer slot
    component
        .set_property("limits/max", json!(7_u64), true)
        .expect("unsigned");
}

#[test]
fn redefinition_requires_override() {
    let mut component = Component::construct();
    let err = component
        .define_property("mass", ValueKind::Integer, vec![], json!(0), false)
        .expect_err("already defined");
    assert!(matches!(err, XTypeError::PropertyAlreadyDefined { ref classname, .. } if classname == Component::CLASSNAME));
    component
        .define_property("mass", ValueKind::Integer, vec![], json!(3), true)
        .expect("override");
    assert_eq!(component.property_kind("mass").ok(), Some(ValueKind::Integer));
    assert_eq!(component.get_property("mass").ok(), Some(&json!(3)));
}

#[test]
fn invalid_default_is_rejected() {
    let err = PropertySchema::new()
        .with("mode", ValueKind::String, vec![json!("a")], json!("b"))
        .expect_err("default outside allowed set");
    assert!(matches!(err, XTypeError::InvalidDefault { .. }));
}

#[test]
fn set_properties_applies_known_keys_only() {
    let mut component = Component::construct();
    component
        .set_properties(
            &json!({"name": "wrist", "mass": 1.5, "limits": {"max": 3}, "unknown": true}),
            true,
        )
        .expect("import");
    assert_eq!(
        component.get_properties(),
        &json!({"name": "wrist", "direction": "out", "mass": 1.5, "limits": {"max": 3}})
    );
}

#[test]
fn silent_bulk_assignment_skips_bad_values() {
    let mut component = Component::construct();
    component
        .set_properties(&json!({"name": 5, "direction": "in"}), false)
        .expect("silent");
    assert_eq!(component.get_property("name").ok(), Some(&json!("")));
    assert_eq!(component.get_property("direction").ok(), Some(&json!("in")));
}

proptest! {
    #[test]
    fn valid_integers_round_trip(v in any::<i64>()) {
        let mut component = Component::construct();
        component.set_property("limits/max", json!(v), true).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(component.get_property("limits/max").ok(), Some(&json!(v)));
    }

    #[test]
    fn invalid_values_leave_prior_value(prior in any::<i32>(), text in "[a-z]{1,8}") {
        let mut component = Component::construct();
        component.set_property("limits/max", json!(prior), true).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let rejected = component.set_property("limits/max", Value::String(text), true);
        prop_assert!(
            matches!(rejected, Err(XTypeError::TypeMismatch { .. })),
            "expected a type mismatch"
        );
        prop_assert_eq!(component.get_property("limits/max").ok(), Some(&json!(prior)));
    }

    #[test]
    fn restricted_values_only(choice in "(in|out|left|right|up)") {
        let mut component = Component::construct();
        let allowed = choice == "in" || choice == "out";
        let result = component.set_property("direction", json!(choice.clone()), true);
        prop_assert_eq!(result.is_ok(), allowed);
        let expected = if allowed { json!(choice) } else { json!("out") };
        prop_assert_eq!(component.get_property("direction").ok(), Some(&expected));
    }
}
