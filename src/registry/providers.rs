//! Built-in type providers

use crate::constraint::builtin::core_constraints;
use crate::constraint::ConstraintRegistry;
use crate::error::Result;
use crate::registry::provider::TypeProvider;
use crate::registry::{Cardinality, MetaDataRegistry};
use crate::type_id::MetaDataTypeId;

const SUBTYPE_BASE: &str = "base";

/// Base types every registry is expected to have
pub fn core_type_ids() -> Vec<MetaDataTypeId> {
    ["field", "object", "attr", "validator", "key"]
        .iter()
        .map(|t| MetaDataTypeId::new(t, SUBTYPE_BASE))
        .collect()
}

fn id(type_name: &str, sub_type: &str) -> MetaDataTypeId {
    MetaDataTypeId::new(type_name, sub_type)
}

/// attr, field, object, validator, key, view and loader families
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreTypesProvider;

impl CoreTypesProvider {
    fn register_attributes(registry: &MetaDataRegistry) {
        registry.register_type(id("attr", SUBTYPE_BASE), |t| {
            t.description("Base attribute type")
        });
        for (sub_type, description) in [
            ("string", "String attribute"),
            ("int", "Integer attribute"),
            ("long", "Long attribute"),
            ("double", "Double attribute"),
            ("boolean", "Boolean attribute"),
            ("class", "Class reference attribute"),
            ("stringarray", "String array attribute"),
            ("properties", "Key/value properties attribute"),
        ] {
            registry.register_type(id("attr", sub_type), |t| {
                t.description(description).inherits_from_base()
            });
        }
    }

    fn register_fields(registry: &MetaDataRegistry) {
        registry.register_type(id("field", SUBTYPE_BASE), |t| {
            t.description("Base field type")
                .optional_attribute("required", "boolean")
                .optional_attribute("defaultValue", "string")
                .optional_attribute("defaultView", "string")
                .optional_attribute("isAbstract", "boolean")
                .optional_child("validator", "*", "*")
                .optional_child("view", "*", "*")
        });
        registry.register_type(id("field", "string"), |t| {
            t.description("String field type with length and pattern validation")
                .inherits_from_base()
                .optional_attribute("pattern", "string")
                .optional_attribute("maxLength", "int")
                .optional_attribute("minLength", "int")
        });
        for sub_type in ["int", "long", "double"] {
            registry.register_type(id("field", sub_type), |t| {
                t.description(format!("{} field type with range validation", sub_type))
                    .inherits_from_base()
                    .optional_attribute("minValue", sub_type)
                    .optional_attribute("maxValue", sub_type)
            });
        }
        for sub_type in ["boolean", "date", "timestamp", "byte", "short", "float"] {
            registry.register_type(id("field", sub_type), |t| {
                t.description(format!("{} field type", sub_type)).inherits_from_base()
            });
        }
        registry.register_type(id("field", "object"), |t| {
            t.description("Field holding a nested object")
                .inherits_from_base()
                .optional_attribute("objectRef", "string")
        });
        registry.register_type(id("field", "stringarray"), |t| {
            t.description("String array field type").inherits_from_base()
        });
    }

    fn register_objects(registry: &MetaDataRegistry) {
        registry.register_type(id("object", SUBTYPE_BASE), |t| {
            t.description("Base object metadata with common object attributes")
                .optional_attribute("isAbstract", "boolean")
                .optional_attribute("extends", "string")
                .attribute("implements", "stringarray", false, Cardinality::Array)
                .optional_attribute("isInterface", "boolean")
                .optional_attribute("description", "string")
                .optional_attribute("object", "string")
                .optional_child("field", "*", "*")
                .optional_child("key", "*", "*")
                .optional_child("attr", "*", "*")
        });
        for (sub_type, description) in [
            ("pojo", "Plain object backed by a generated class"),
            ("map", "Object backed by a map of values"),
            ("proxy", "Object backed by a dynamic proxy"),
        ] {
            registry.register_type(id("object", sub_type), |t| {
                t.description(description).inherits_from_base()
            });
        }
    }

    fn register_validators(registry: &MetaDataRegistry) {
        registry.register_type(id("validator", SUBTYPE_BASE), |t| {
            t.description("Base validator type")
                .optional_attribute("msg", "string")
        });
        registry.register_type(id("validator", "required"), |t| {
            t.description("Value must be present").inherits_from_base()
        });
        registry.register_type(id("validator", "length"), |t| {
            t.description("Value length must be within bounds")
                .inherits_from_base()
                .optional_attribute("min", "int")
                .optional_attribute("max", "int")
        });
        registry.register_type(id("validator", "regex"), |t| {
            t.description("Value must match a mask")
                .inherits_from_base()
                .required_attribute("mask", "string")
        });
        registry.register_type(id("validator", "numeric"), |t| {
            t.description("Value must be numeric").inherits_from_base()
        });
    }

    fn register_keys(registry: &MetaDataRegistry) {
        registry.register_type(id("key", SUBTYPE_BASE), |t| {
            t.description("Base key type")
                .attribute("keys", "stringarray", true, Cardinality::Array)
        });
        registry.register_type(id("key", "primary"), |t| {
            t.description("Primary key").inherits_from_base()
        });
        registry.register_type(id("key", "secondary"), |t| {
            t.description("Secondary key").inherits_from_base()
        });
        registry.register_type(id("key", "foreign"), |t| {
            t.description("Foreign key")
                .inherits_from_base()
                .required_attribute("foreignObjectRef", "string")
        });
    }

    fn register_views(registry: &MetaDataRegistry) {
        registry.register_type(id("view", SUBTYPE_BASE), |t| {
            t.description("Base view type")
                .optional_attribute("validation", "string")
        });
        for sub_type in ["text", "textarea", "date", "month", "hotlink"] {
            registry.register_type(id("view", sub_type), |t| {
                t.description(format!("{} view", sub_type)).inherits_from_base()
            });
        }
    }

    fn register_loaders(registry: &MetaDataRegistry) {
        registry.register_type(id("loader", SUBTYPE_BASE), |t| {
            t.description("Root of a loaded metadata graph")
                .optional_child("object", "*", "*")
                .optional_child("field", "*", "*")
                .optional_child("attr", "*", "*")
                .optional_child("validator", "*", "*")
                .optional_child("view", "*", "*")
                .optional_child("key", "*", "*")
        });
        for sub_type in ["manual", "simple", "file"] {
            registry.register_type(id("loader", sub_type), |t| {
                t.description(format!("{} loader", sub_type)).inherits_from_base()
            });
        }
    }
}

impl TypeProvider for CoreTypesProvider {
    fn id(&self) -> &str {
        "core-types"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn description(&self) -> String {
        "Core attribute, field, object, validator, key, view and loader types".to_string()
    }

    fn register_types(&self, registry: &MetaDataRegistry) -> Result<()> {
        Self::register_attributes(registry);
        Self::register_fields(registry);
        Self::register_objects(registry);
        Self::register_validators(registry);
        Self::register_keys(registry);
        Self::register_views(registry);
        Self::register_loaders(registry);
        Ok(())
    }
}

/// Database mapping attributes layered onto the core types
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseTypesProvider;

impl TypeProvider for DatabaseTypesProvider {
    fn id(&self) -> &str {
        "database-extensions"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["core-types".to_string()]
    }

    fn description(&self) -> String {
        "Common database attributes for persistence layers".to_string()
    }

    fn register_types(&self, registry: &MetaDataRegistry) -> Result<()> {
        registry.extend_type(&id("object", SUBTYPE_BASE), |t| {
            t.optional_attribute("dbTable", "string")
                .optional_attribute("dbIndex", "string")
                .optional_attribute("dbUnique", "string")
        })?;
        registry.extend_type(&id("field", SUBTYPE_BASE), |t| {
            t.optional_attribute("dbColumn", "string")
                .optional_attribute("dbNullable", "boolean")
                .optional_attribute("dbForeignKey", "string")
                .optional_attribute("dbIndex", "string")
                .optional_attribute("dbUnique", "boolean")
                .optional_attribute("dbLength", "int")
                .optional_attribute("dbPrecision", "int")
                .optional_attribute("dbScale", "int")
        })?;
        registry.extend_type(&id("key", "primary"), |t| {
            t.optional_attribute("dbSequenceName", "string")
                .optional_attribute("dbIndexName", "string")
        })?;
        Ok(())
    }
}

/// The built-in constraint catalogue
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreConstraintsProvider;

impl TypeProvider for CoreConstraintsProvider {
    fn id(&self) -> &str {
        "core-constraints"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["core-types".to_string()]
    }

    fn register_types(&self, _registry: &MetaDataRegistry) -> Result<()> {
        Ok(())
    }

    fn register_constraints(&self, constraints: &ConstraintRegistry) -> Result<()> {
        for constraint in core_constraints()? {
            constraints.add(constraint)?;
        }
        Ok(())
    }
}
