//! End-to-End Tests
//!
//! Registries built by hand and by the default bootstrap, filled by a loader
//! and queried afterwards.

use std::sync::Arc;

use metaobjects::registry::Bootstrap;
use metaobjects::{
    LoaderOptions, MetaData, MetaDataContext, MetaDataLoader, MetaDataServices, MetaDataTypeId,
    MetaObjectsConfig, Phase,
};
use serde_json::json;

fn id(type_name: &str, sub_type: &str) -> MetaDataTypeId {
    MetaDataTypeId::new(type_name, sub_type)
}

fn username_source(ctx: &MetaDataContext, root: &Arc<MetaData>) -> metaobjects::Result<()> {
    let field = ctx.add_child(root, MetaData::new(id("field", "string"), "username"))?;
    ctx.add_child(&field, MetaData::attribute("string", "pattern", json!("^[a-z]+$")))?;
    Ok(())
}

#[test]
fn test_attribute_on_field_scenario() {
    let services = MetaDataServices::empty();
    let registry = &services.registry;

    registry.register_type(id("attr", "base"), |t| t);
    registry.register_type(id("attr", "string"), |t| t.inherits_from_base());
    registry.register_type(id("field", "base"), |t| t.optional_child("attr", "string", "*"));
    registry.register_type(id("field", "string"), |t| t.inherits_from_base());
    registry.register_type(id("loader", "manual"), |t| t.optional_child("field", "*", "*"));

    let loader = MetaDataLoader::builder("manual", "scenario")
        .source(username_source)
        .build(&services);
    loader.init().unwrap();

    assert_eq!(loader.state().phase(), Phase::Initialized);
    let username = loader.meta_data_by_name("field", "username").unwrap();
    assert_eq!(username.attr_value("pattern"), Some(json!("^[a-z]+$")));
    assert_eq!(username.attr("pattern").unwrap().path(), "username.pattern");

    let effective = registry.resolve_effective(&id("field", "string")).unwrap();
    let requirement = effective
        .child_requirement_for(&id("attr", "string"), "pattern")
        .unwrap();
    assert!(!requirement.required);
    assert!(effective.accepts_child(&id("attr", "string"), "pattern"));
}

#[test]
fn test_default_bootstrap_object_model() {
    let services = MetaDataServices::from_config(&MetaObjectsConfig::default()).unwrap();

    let source = |ctx: &MetaDataContext, root: &Arc<MetaData>| -> metaobjects::Result<()> {
        let person = ctx.add_child(root, MetaData::new(id("object", "pojo"), "acme::Person"))?;
        let name = ctx.add_child(&person, MetaData::new(id("field", "string"), "name"))?;
        ctx.add_child(&name, MetaData::attribute("int", "maxLength", json!(80)))?;
        ctx.add_child(&name, MetaData::attribute("string", "dbColumn", json!("NAME")))?;
        ctx.add_child(&name, MetaData::new(id("validator", "required"), "required"))?;
        let pk = ctx.add_child(&person, MetaData::new(id("key", "primary"), "pk"))?;
        ctx.add_child(&pk, MetaData::attribute("stringarray", "keys", json!(["name"])))?;

        let employee = ctx.add_child(root, person.derive("acme::Employee"))?;
        ctx.add_child(&employee, MetaData::new(id("field", "long"), "salary"))?;
        ctx.add_child(root, employee.derive("acme::Manager"))?;
        Ok(())
    };

    let loader = MetaDataLoader::builder("manual", "people")
        .options(MetaObjectsConfig::default().loader_options().with_register(true))
        .source(source)
        .build(&services);
    loader.init().unwrap();
    assert_eq!(loader.state().phase(), Phase::Registered);

    let manager = loader.meta_data_by_name("object", "acme::Manager").unwrap();
    let fields: Vec<String> = manager
        .children_of_type("field", true)
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    assert!(fields.contains(&"name".to_string()));
    assert!(fields.contains(&"salary".to_string()));

    let mut derived: Vec<String> = loader
        .meta_data_by_super("acme::Person")
        .unwrap()
        .iter()
        .map(|o| o.name().to_string())
        .collect();
    derived.sort();
    assert_eq!(derived, vec!["acme::Employee", "acme::Manager"]);

    let found = services.loaders.find_meta_object("acme::Employee").unwrap();
    assert!(found.has_super_data());

    loader.shutdown();
    assert!(services.loaders.is_empty());
}

#[test]
fn test_disabled_provider_from_settings() {
    let mut config = MetaObjectsConfig::default();
    config.registry.disabled_providers = vec!["database-extensions".to_string()];
    let services = MetaDataServices::from_config(&config).unwrap();

    let source = |ctx: &MetaDataContext, root: &Arc<MetaData>| -> metaobjects::Result<()> {
        let field = ctx.add_child(root, MetaData::new(id("field", "string"), "name"))?;
        ctx.add_child(&field, MetaData::attribute("string", "dbColumn", json!("NAME")))?;
        Ok(())
    };
    let loader = MetaDataLoader::builder("manual", "nodb")
        .options(LoaderOptions::new())
        .source(source)
        .build(&services);

    let err = loader.init().unwrap_err();
    assert!(err.root_cause().constraint_id().is_some());
    assert_eq!(loader.state().phase(), Phase::Uninitialized);
}

#[test]
fn test_registry_reports_after_bootstrap() {
    let services = Bootstrap::with_default_providers().run().unwrap();

    let stats = services.registry.stats();
    assert_eq!(stats.total_types, services.registry.len());
    assert!(stats.types_by_family.contains_key("loader"));

    let dot = services.registry.to_dot();
    assert!(dot.starts_with("digraph TypeRegistry {"));
    assert!(dot.contains("\"field.string\" -> \"field.base\";"));

    let summary = services.constraints.summary();
    assert_eq!(summary.total(), services.constraints.len());
    assert!(summary.placement > 0 && summary.validation > 0);
}
