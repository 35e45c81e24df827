//! Command-line interface for Fathom.

pub mod cli;
mod output;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fathom_config::{default_config_path, FathomConfig, TraversalSettings};
use fathom_index::{
    GraphStorage, ResolverConfig, StructuralSearch, SymbolGraphStore, TraversalConfig,
};
use serde_json::json;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cli::{Cli, Command, ConfigCommand};

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Config init must work even when the existing config is unreadable.
    let config = match cli.command {
        Command::Config { .. } => FathomConfig::default(),
        _ => FathomConfig::load(cli.config.as_deref())?,
    };
    init_logging(cli.verbose, &config.logging.level);
    debug!("Loaded configuration: {:?}", config);

    execute(cli, &config, &mut io::stdout()).await
}

/// `-v` forces debug; otherwise `RUST_LOG` wins over the configured level.
fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn init_config(path: Option<std::path::PathBuf>, out: &mut dyn Write) -> Result<()> {
    let path = match path.or_else(default_config_path) {
        Some(path) => path,
        None => bail!("No config directory available; pass a path to `config init`"),
    };
    FathomConfig::write_default(&path)?;
    writeln!(out, "Wrote default configuration to {}", path.display())?;
    Ok(())
}

fn traversal_config(settings: &TraversalSettings) -> TraversalConfig {
    let mut config = TraversalConfig::new().with_depth_ceiling(settings.depth_ceiling);
    if let Some(ms) = settings.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    if let Some(max_nodes) = settings.max_nodes {
        config = config.with_max_nodes(max_nodes);
    }
    config
}

fn open_search(config: &FathomConfig) -> Result<StructuralSearch> {
    let store = if config.store.persist {
        let dir = config.store.data_dir()?;
        let storage = GraphStorage::init(&dir)?;
        SymbolGraphStore::open(storage)
            .with_context(|| format!("Failed to load graphs from {:?}", dir))?
    } else {
        warn!("Persistence is disabled; graphs live only for this process");
        SymbolGraphStore::new()
    };

    Ok(StructuralSearch::new(store)
        .with_resolver_config(ResolverConfig {
            max_results: config.resolver.max_results,
        })
        .with_traversal_config(traversal_config(&config.traversal)))
}

/// Run one parsed command against the configured store, writing results to `out`.
pub async fn execute(cli: Cli, config: &FathomConfig, out: &mut dyn Write) -> Result<()> {
    if let Command::Config {
        action: ConfigCommand::Init { path },
    } = cli.command
    {
        return init_config(path, out);
    }

    let search = open_search(config)?;

    match cli.command {
        Command::Ingest { project, index } => {
            let graph = search.ingest_file(&project, &index).await?;
            if cli.json {
                output::json(
                    out,
                    &json!({
                        "project": project,
                        "generation": graph.generation(),
                        "source_digest": graph.source_digest(),
                        "report": graph.report(),
                    }),
                )?;
            } else {
                output::ingest_report(out, &project, graph.report())?;
            }
        }

        Command::Resolve { project, query } => {
            let symbols = search.resolve_symbol(&project, &query)?;
            if cli.json {
                output::json(out, &symbols)?;
            } else {
                output::symbols(out, &symbols)?;
            }
        }

        Command::Occurrences { project, symbol } => {
            let Some(found) = search.find_symbol(&project, &symbol)? else {
                bail!("No symbol matching {:?} in project {}", symbol, project);
            };
            let occurrences = search.find_occurrences(&project, &found.id)?;
            if cli.json {
                output::json(out, &json!({ "symbol": found.id, "occurrences": occurrences }))?;
            } else {
                writeln!(out, "{}", found.id)?;
                output::occurrences(out, &occurrences)?;
            }
        }

        Command::Traverse {
            project,
            symbol,
            edge,
            direction,
            depth,
        } => {
            let Some(found) = search.find_symbol(&project, &symbol)? else {
                bail!("No symbol matching {:?} in project {}", symbol, project);
            };
            let depth = depth.unwrap_or(config.traversal.default_depth);
            let tree = search
                .traverse_graph(&project, &found.id, edge, direction, depth)?
                .with_context(|| format!("Symbol {} vanished from project {}", found.id, project))?;
            if cli.json {
                output::json(
                    out,
                    &json!({
                        "edge_kind": tree.edge_kind,
                        "direction": tree.direction,
                        "max_depth": tree.max_depth,
                        "root": tree.to_nested(),
                        "cycles": tree.cycles,
                    }),
                )?;
            } else {
                output::tree(out, &tree)?;
            }
        }

        Command::Projects => {
            let projects = search.projects();
            if cli.json {
                output::json(out, &projects)?;
            } else {
                for project in &projects {
                    writeln!(out, "{}", project)?;
                }
            }
        }

        Command::Remove { project } => {
            let removed = search.remove_project(&project)?;
            if cli.json {
                output::json(out, &json!({ "project": project, "removed": removed }))?;
            } else if removed {
                writeln!(out, "Removed {}", project)?;
            } else {
                writeln!(out, "No graph for {}", project)?;
            }
        }

        // Handled before the store is opened.
        Command::Config { .. } => {}
    }

    Ok(())
}
