//! Built-in constraint catalogue
//!
//! Naming rules for fields, objects and attributes, the string-field
//! attribute placements, and the XML/web presentation attributes.

use std::collections::BTreeSet;

use crate::constraint::{Constraint, NodeMatcher, ValueCheck};
use crate::error::Result;

const HTML_INPUT_TYPES: &[&str] = &[
    "text",
    "password",
    "email",
    "url",
    "tel",
    "search",
    "number",
    "range",
    "date",
    "datetime-local",
    "time",
    "month",
    "week",
    "color",
    "file",
    "image",
    "hidden",
    "checkbox",
    "radio",
    "submit",
    "button",
    "reset",
];

/// Every built-in constraint, in registration order
pub fn core_constraints() -> Result<Vec<Constraint>> {
    let mut constraints = naming_constraints()?;
    constraints.extend(field_constraints()?);
    constraints.extend(presentation_constraints()?);
    Ok(constraints)
}

fn naming_constraints() -> Result<Vec<Constraint>> {
    Ok(vec![
        Constraint::identifier(
            "field.naming.pattern",
            "Field names must follow identifier pattern or be package-qualified",
            "field.*",
            true,
        )?,
        Constraint::identifier(
            "object.naming.pattern",
            "Object names must follow identifier pattern or be package-qualified",
            "object.*",
            true,
        )?,
        Constraint::identifier(
            "attribute.naming.pattern",
            "Attribute names must follow identifier pattern",
            "attr.*",
            false,
        )?,
    ])
}

fn field_constraints() -> Result<Vec<Constraint>> {
    Ok(vec![
        Constraint::placement(
            "field.required.placement",
            "Fields can optionally have required attribute",
            "field.*",
            "attr.boolean[required]",
        )?,
        Constraint::placement(
            "object.fields.placement",
            "Objects can contain fields",
            "object.*",
            "field.*",
        )?,
        Constraint::placement(
            "stringfield.maxlength.placement",
            "StringField can optionally have maxLength attribute",
            "field.string",
            "attr.int[maxLength]",
        )?,
        Constraint::placement(
            "stringfield.minlength.placement",
            "StringField can optionally have minLength attribute",
            "field.string",
            "attr.int[minLength]",
        )?,
        Constraint::placement(
            "stringfield.pattern.placement",
            "StringField can optionally have pattern attribute",
            "field.string",
            "attr.string[pattern]",
        )?,
        Constraint::value_check(
            "stringfield.pattern.validation",
            "StringField pattern attribute must be valid regex",
            NodeMatcher::custom(|node| {
                node.is_type("attr")
                    && node.name() == "pattern"
                    && node
                        .parent()
                        .map(|p| p.type_id().qualified_name() == "field.string")
                        .unwrap_or(false)
            }),
            ValueCheck::CompilesAsRegex,
        ),
    ])
}

fn presentation_constraints() -> Result<Vec<Constraint>> {
    Ok(vec![
        Constraint::placement(
            "coreio.xmlName.placement",
            "xmlName attribute can be placed on any MetaData for XML element naming",
            "*.*",
            "attr.*[xmlName]",
        )?,
        Constraint::regex(
            "coreio.xmlName.validation",
            "xmlName must be a valid XML element name",
            "attr.*[xmlName]",
            "^[a-zA-Z_][a-zA-Z0-9_.-]{0,99}$",
        )?,
        Constraint::placement(
            "web.cssClass.placement",
            "cssClass attribute can be placed on any MetaData for styling",
            "*.*",
            "attr.*[cssClass]",
        )?,
        Constraint::regex(
            "web.cssClass.validation",
            "CSS class names must follow valid CSS identifier pattern",
            "attr.*[cssClass]",
            "^[a-zA-Z][a-zA-Z0-9_-]{0,49}$",
        )?,
        Constraint::placement(
            "web.htmlId.placement",
            "htmlId attribute can be placed on any MetaData for DOM identification",
            "*.*",
            "attr.*[htmlId]",
        )?,
        Constraint::regex(
            "web.htmlId.validation",
            "HTML ID must follow valid HTML identifier pattern",
            "attr.*[htmlId]",
            "^[a-zA-Z][a-zA-Z0-9_-]*$",
        )?,
        Constraint::placement(
            "web.formLabel.placement",
            "formLabel attribute can be placed on fields for form generation",
            "field.*",
            "attr.*[formLabel]",
        )?,
        Constraint::length(
            "web.formLabel.validation",
            "Form labels must be non-empty and within 1-100 characters",
            "attr.*[formLabel]",
            Some(1),
            Some(100),
        )?,
        Constraint::placement(
            "web.placeholder.placement",
            "placeholder attribute can be placed on fields for form generation",
            "field.*",
            "attr.*[placeholder]",
        )?,
        Constraint::length(
            "web.placeholder.validation",
            "Placeholder text must be at most 200 characters",
            "attr.*[placeholder]",
            None,
            Some(200),
        )?,
        Constraint::placement(
            "web.htmlInputType.placement",
            "htmlInputType attribute can be placed on string fields for form generation",
            "field.string",
            "attr.*[htmlInputType]",
        )?,
        Constraint::value_check(
            "web.htmlInputType.validation",
            "htmlInputType must be a valid HTML input type",
            NodeMatcher::pattern("attr.*[htmlInputType]")?,
            ValueCheck::Enumeration {
                values: HTML_INPUT_TYPES.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
                ignore_case: true,
            },
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintRegistry;
    use crate::metadata::MetaData;
    use crate::type_id::MetaDataTypeId;
    use serde_json::json;

    fn registry() -> ConstraintRegistry {
        let registry = ConstraintRegistry::new();
        for constraint in core_constraints().unwrap() {
            registry.add(constraint).unwrap();
        }
        registry
    }

    #[test]
    fn test_catalogue_ids_are_unique() {
        let registry = registry();
        assert_eq!(registry.len(), core_constraints().unwrap().len());
        assert!(registry.get("field.naming.pattern").is_some());
        assert!(registry.get("stringfield.pattern.validation").is_some());
    }

    #[test]
    fn test_html_input_type_is_case_insensitive() {
        let registry = registry();
        let attr = MetaData::new(MetaDataTypeId::new("attr", "string"), "htmlInputType");
        assert!(registry.validate_value(&attr, &json!("EMAIL")).is_ok());
        let err = registry.validate_value(&attr, &json!("fancy")).unwrap_err();
        assert_eq!(err.constraint_id(), Some("web.htmlInputType.validation"));
    }

    #[test]
    fn test_form_label_length() {
        let registry = registry();
        let attr = MetaData::new(MetaDataTypeId::new("attr", "string"), "formLabel");
        assert!(registry.validate_value(&attr, &json!("User name")).is_ok());
        assert!(registry.validate_value(&attr, &json!("")).is_err());
        assert!(registry.validate_value(&attr, &json!("x".repeat(101))).is_err());
    }

    #[test]
    fn test_attribute_names_reject_packages() {
        let registry = registry();
        let attr = MetaData::new(MetaDataTypeId::new("attr", "string"), "acme::label");
        let err = registry.validate_name(&attr).unwrap_err();
        assert_eq!(err.constraint_id(), Some("attribute.naming.pattern"));
    }
}
