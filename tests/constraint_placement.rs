//! Constraint Placement Tests
//!
//! Placement and validation enforced while building graphs against the
//! default providers.

use std::sync::Arc;

use metaobjects::constraint::STRUCTURAL_PLACEMENT_ID;
use metaobjects::registry::Bootstrap;
use metaobjects::{
    Constraint, ConstraintRegistry, MetaData, MetaDataContext, MetaDataError, MetaDataServices,
    MetaDataTypeId,
};
use serde_json::json;

fn id(type_name: &str, sub_type: &str) -> MetaDataTypeId {
    MetaDataTypeId::new(type_name, sub_type)
}

fn services() -> MetaDataServices {
    Bootstrap::with_default_providers().run().unwrap()
}

fn violation_id(result: metaobjects::Result<Arc<MetaData>>) -> String {
    match result {
        Err(MetaDataError::ConstraintViolation { constraint_id, .. }) => constraint_id,
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
}

// =============================================================================
// Structural Placement
// =============================================================================

#[test]
fn test_validator_allowed_under_string_field() {
    let ctx = services().context();
    let field = MetaData::new(id("field", "string"), "username");

    let validator = ctx
        .add_child(&field, MetaData::new(id("validator", "required"), "required"))
        .unwrap();

    assert_eq!(validator.path(), "username.required");
    assert!(field.has_child("validator", "required"));
}

#[test]
fn test_validator_rejected_under_string_attribute() {
    let ctx = services().context();
    let attr = MetaData::attribute("string", "pattern", json!("^[a-z]+$"));

    let result = ctx.add_child(&attr, MetaData::new(id("validator", "required"), "required"));
    match result {
        Err(MetaDataError::ConstraintViolation { path, node_type, .. }) => {
            assert_eq!(path, "pattern.required");
            assert_eq!(node_type, "validator.required");
        }
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
    assert!(attr.children().is_empty());
}

#[test]
fn test_structural_rejection_without_constraints() {
    let base = services();
    let ctx = MetaDataContext::new(Arc::clone(&base.registry), Arc::new(ConstraintRegistry::new()));
    let attr = MetaData::attribute("string", "pattern", json!("^[a-z]+$"));

    let result = ctx.add_child(&attr, MetaData::new(id("validator", "required"), "required"));
    assert_eq!(violation_id(result), STRUCTURAL_PLACEMENT_ID);
}

#[test]
fn test_failed_placement_leaves_child_detached() {
    let ctx = services().context();
    let attr = MetaData::attribute("string", "pattern", json!("x"));
    let validator = MetaData::new(id("validator", "required"), "required");

    assert!(ctx.add_child(&attr, Arc::clone(&validator)).is_err());
    assert!(validator.parent().is_none());
}

#[test]
fn test_duplicate_sibling_rejected() {
    let ctx = services().context();
    let object = MetaData::new(id("object", "pojo"), "acme::User");
    ctx.add_child(&object, MetaData::new(id("field", "string"), "email")).unwrap();

    match ctx.add_child(&object, MetaData::new(id("field", "int"), "email")) {
        Err(MetaDataError::DuplicateChild { path, .. }) => assert_eq!(path, "acme::User.email"),
        other => panic!("Expected DuplicateChild, got {:?}", other),
    }
}

#[test]
fn test_duplicate_under_loader_root_omits_root_name() {
    let ctx = services().context();
    let root = MetaData::new(id("loader", "manual"), "catalog");
    ctx.add_child(&root, MetaData::new(id("object", "pojo"), "acme::User")).unwrap();

    match ctx.add_child(&root, MetaData::new(id("object", "pojo"), "acme::User")) {
        Err(MetaDataError::DuplicateChild { path, .. }) => assert_eq!(path, "acme::User"),
        other => panic!("Expected DuplicateChild, got {:?}", other),
    }
}

#[test]
fn test_unknown_child_type_fails_with_type_not_found() {
    let ctx = services().context();
    let object = MetaData::new(id("object", "pojo"), "acme::User");

    match ctx.add_child(&object, MetaData::new(id("field", "uuid"), "id")) {
        Err(MetaDataError::TypeNotFound { type_id, .. }) => assert_eq!(type_id, "field.uuid"),
        other => panic!("Expected TypeNotFound, got {:?}", other),
    }
}

// =============================================================================
// Constraint-Driven Placement
// =============================================================================

#[test]
fn test_allow_constraint_widens_placement() {
    let ctx = services().context();
    let view = MetaData::new(id("view", "text"), "editor");

    // view.base declares no attributes; xmlName is allowed on any node
    ctx.add_child(&view, MetaData::attribute("string", "xmlName", json!("editor")))
        .unwrap();

    let result = ctx.add_child(&view, MetaData::attribute("string", "colour", json!("red")));
    assert!(matches!(result, Err(MetaDataError::ConstraintViolation { .. })));
}

#[test]
fn test_forbid_constraint_vetoes_structural_acceptance() {
    let services = services();
    services
        .constraints
        .add(
            Constraint::forbid(
                "ids.noViews",
                "Identifier fields are never rendered",
                "field.*[id]",
                "view.*",
            )
            .unwrap(),
        )
        .unwrap();
    let ctx = services.context();

    let id_field = MetaData::new(id("field", "long"), "id");
    let result = ctx.add_child(&id_field, MetaData::new(id("view", "text"), "text"));
    assert_eq!(violation_id(result), "ids.noViews");

    let name_field = MetaData::new(id("field", "string"), "name");
    ctx.add_child(&name_field, MetaData::new(id("view", "text"), "text")).unwrap();
}

// =============================================================================
// Value Validation
// =============================================================================

#[test]
fn test_html_input_type_enumeration() {
    let ctx = services().context();
    let field = MetaData::new(id("field", "string"), "email");

    ctx.add_child(&field, MetaData::attribute("string", "htmlInputType", json!("EMAIL")))
        .unwrap();

    let other = MetaData::new(id("field", "string"), "nickname");
    let result = ctx.add_child(&other, MetaData::attribute("string", "htmlInputType", json!("fancy")));
    assert_eq!(violation_id(result), "web.htmlInputType.validation");
}

#[test]
fn test_string_field_pattern_must_compile() {
    let ctx = services().context();
    let field = MetaData::new(id("field", "string"), "code");

    let result = ctx.add_child(&field, MetaData::attribute("string", "pattern", json!("[unclosed")));
    assert_eq!(violation_id(result), "stringfield.pattern.validation");
    assert!(!field.has_attr("pattern"));
}

#[test]
fn test_set_value_checks_cardinality_and_constraints() {
    let ctx = services().context();
    let field = MetaData::new(id("field", "string"), "title");
    let label = ctx
        .add_child(&field, MetaData::attribute("string", "formLabel", json!("Title")))
        .unwrap();

    match ctx.set_value(&label, json!("")) {
        Err(MetaDataError::ConstraintViolation { constraint_id, path, .. }) => {
            assert_eq!(constraint_id, "web.formLabel.validation");
            assert_eq!(path, "title.formLabel");
        }
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
    assert_eq!(label.value(), Some(json!("Title")));

    let key = MetaData::new(id("key", "primary"), "pk");
    let keys = ctx
        .add_child(&key, MetaData::attribute("stringarray", "keys", json!(["id"])))
        .unwrap();
    match ctx.set_value(&keys, json!("id")) {
        Err(MetaDataError::ConstraintViolation { constraint_id, .. }) => {
            assert_eq!(constraint_id, "key.primary.keys.array");
        }
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
}

#[test]
fn test_validate_reports_bad_names_and_missing_requirements() {
    let ctx = services().context();
    let object = MetaData::new(id("object", "pojo"), "acme::Order");
    ctx.add_child(&object, MetaData::new(id("field", "string"), "1total"))
        .unwrap();

    match ctx.validate(&object) {
        Err(MetaDataError::ConstraintViolation { constraint_id, path, .. }) => {
            assert_eq!(constraint_id, "field.naming.pattern");
            assert_eq!(path, "acme::Order.1total");
        }
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }

    let key = MetaData::new(id("key", "foreign"), "customerRef");
    ctx.add_child(&key, MetaData::attribute("stringarray", "keys", json!(["customerId"])))
        .unwrap();
    match ctx.validate(&key) {
        Err(MetaDataError::ConstraintViolation { constraint_id, description, .. }) => {
            assert_eq!(constraint_id, "key.foreign.required");
            assert!(description.contains("foreignObjectRef"));
        }
        other => panic!("Expected ConstraintViolation, got {:?}", other),
    }
}
