use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use nginxlog_metrics::logging::{self, LogOptions};
use nginxlog_metrics::{build_all, Config, NamespaceSet, StandardRelabelings};

#[derive(Parser)]
#[command(name = "nginxlog-metrics")]
#[command(about = "Compile log namespace configuration into metric instruments")]
#[command(version)]
struct Cli {
    /// Namespace configuration file (TOML)
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Also write JSON logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and build every namespace, reporting failures
    Check,
    /// List the instruments of every namespace
    Inventory {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the text exposition of freshly built instruments
    Render {
        /// Only this namespace
        #[arg(long)]
        namespace: Option<String>,
    },
}

fn print_inventory(set: &NamespaceSet, json: bool) -> anyhow::Result<()> {
    if json {
        let inventory: Vec<_> = set
            .collections
            .iter()
            .map(|c| serde_json::json!({ "namespace": c.namespace, "instruments": c.inventory() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&inventory)?);
        return Ok(());
    }

    for collection in &set.collections {
        println!("{}", collection.namespace);
        for info in collection.inventory() {
            println!(
                "  {:<32} {:<8} {:<48} [{}]",
                info.key,
                info.kind,
                info.name,
                info.label_names.join(", ")
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(&LogOptions {
        log_dir: cli.log_dir.clone(),
    })?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!("Loaded {} namespace(s) from {}", config.namespaces.len(), cli.config.display());

    let set = build_all(config, &StandardRelabelings);

    match cli.command {
        Commands::Check => {
            for collection in &set.collections {
                println!("✅ {}: {} instruments", collection.namespace, collection.others_metrics.len() + 2);
            }
        }
        Commands::Inventory { json } => print_inventory(&set, json)?,
        Commands::Render { namespace } => match namespace {
            Some(name) => {
                let collection = set
                    .get(&name)
                    .with_context(|| format!("namespace '{}' is not available", name))?;
                print!("{}", collection.render()?);
            }
            None => {
                for collection in &set.collections {
                    print!("{}", collection.render()?);
                }
            }
        },
    }

    for failure in &set.failures {
        eprintln!("❌ {}: {}", failure.namespace, failure.error);
    }
    if !set.is_complete() {
        bail!("{} namespace(s) failed to build", set.failures.len());
    }
    Ok(())
}
