//! MetaData Registry Inspector
//!
//! Bootstraps the default type providers and reports on the resulting
//! registry.
//!
//! Usage:
//!   metadata-inspect types --pattern "field.*"
//!   metadata-inspect effective field.string --format json
//!   metadata-inspect health
//!   metadata-inspect dot --output types.dot

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use metaobjects::registry::providers::core_type_ids;
use metaobjects::{MetaDataServices, MetaDataTypeId, MetaObjectsConfig, TypePattern};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "metadata-inspect")]
#[command(about = "Inspect the metadata type registry and constraint catalogue")]
struct Cli {
    /// Config file (defaults to metaobjects.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered types
    Types {
        /// Only types matching this pattern (e.g. "field.*")
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Show the flattened definition of a type
    Effective {
        /// Qualified type such as "field.string"
        type_id: String,
    },

    /// List registered constraints
    Constraints,

    /// Check registry consistency
    Health,

    /// Export the inheritance graph to DOT format
    Dot {
        /// Output file (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = match MetaObjectsConfig::load_from(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    if let Err(e) = run(cli, &config) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: &MetaObjectsConfig) -> anyhow::Result<()> {
    let services = MetaDataServices::from_config(config).context("Bootstrap failed")?;
    let json = match cli.format.as_str() {
        "json" => true,
        "text" => false,
        other => bail!("Invalid format '{}'. Use 'text' or 'json'", other),
    };

    match cli.command {
        Commands::Types { pattern } => {
            let pattern = match pattern {
                Some(p) => TypePattern::parse(&p)?,
                None => TypePattern::any(),
            };
            let types: Vec<MetaDataTypeId> = services
                .registry
                .registered_types()
                .into_iter()
                .filter(|id| pattern.matches_type(id))
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&types)?);
            } else {
                println!("📚 {} types matching {}:", types.len(), pattern);
                for id in &types {
                    let definition = services.registry.get(id)?;
                    match definition.parent() {
                        Some(parent) => println!("  {} -> {}", id, parent),
                        None => println!("  {}", id),
                    }
                }
            }
        }

        Commands::Effective { type_id } => {
            let id = MetaDataTypeId::parse(&type_id)?;
            let effective = services.registry.resolve_effective(&id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(effective.as_ref())?);
            } else {
                let lineage: Vec<String> = effective.lineage().iter().map(|t| t.to_string()).collect();
                println!("📦 Type: {}", effective.id());
                println!("🧬 Lineage: {}", lineage.join(" -> "));
                if !effective.description().is_empty() {
                    println!("📝 {}", effective.description());
                }
                println!();
                println!("Attributes:");
                for attr in effective.attributes() {
                    let marker = if attr.required { "required" } else { "optional" };
                    println!(
                        "  {} ({}, {}, {})",
                        attr.name,
                        attr.sub_type,
                        attr.cardinality.as_str(),
                        marker
                    );
                }
                println!("Children:");
                for child in effective.children() {
                    println!("  {}", child.description());
                }
            }
        }

        Commands::Constraints => {
            let descriptors: Vec<_> = services
                .constraints
                .all()
                .iter()
                .map(|c| c.descriptor())
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&descriptors)?);
            } else {
                let summary = services.constraints.summary();
                println!(
                    "🔒 {} constraints ({} placement, {} forbid, {} validation)",
                    summary.total(),
                    summary.placement,
                    summary.forbid,
                    summary.validation
                );
                for descriptor in &descriptors {
                    println!("  [{}] {} - {}", descriptor.kind, descriptor.id, descriptor.description);
                }
            }
        }

        Commands::Health => {
            let report = services.registry.health_report(&core_type_ids());

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
                for error in &report.errors {
                    println!("  ❌ {}", error);
                }
                for warning in &report.warnings {
                    println!("  ⚠️  {}", warning);
                }
                for recommendation in &report.recommendations {
                    println!("  💡 {}", recommendation);
                }
            }

            if !report.is_healthy() {
                std::process::exit(2);
            }
            if !json {
                println!("✅ Registry is healthy");
            }
        }

        Commands::Dot { output } => {
            let dot_content = services.registry.to_dot();
            match output {
                Some(path) => {
                    std::fs::write(&path, &dot_content)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("✅ Exported DOT to: {:?}", path);
                }
                None => print!("{}", dot_content),
            }
        }
    }

    Ok(())
}
