use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fathom_index::{Direction, EdgeKind};

/// fathom: structural code intelligence over SCIP indexes
#[derive(Parser, Debug)]
#[command(name = "fathom", version)]
#[command(about = "Resolve symbols and walk call and type graphs from SCIP indexes", long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/fathom/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a SCIP index, replacing the project's graph
    Ingest {
        project: String,
        index: PathBuf,
    },

    /// Resolve a dotted name or descriptor suffix to symbols
    Resolve {
        project: String,
        query: String,
    },

    /// List occurrences of a symbol
    Occurrences {
        project: String,
        /// Symbol id or resolvable query
        symbol: String,
    },

    /// Walk callers, callees or the type hierarchy from a symbol
    Traverse {
        project: String,
        /// Symbol id or resolvable query
        symbol: String,

        /// Edge kind to follow: call, inheritance or reference
        #[arg(long, default_value = "call")]
        edge: EdgeKind,

        /// outgoing (callees, supertypes) or incoming (callers, subtypes)
        #[arg(long, default_value = "outgoing")]
        direction: Direction,

        /// Maximum depth (default: traversal.default_depth)
        #[arg(long)]
        depth: Option<usize>,
    },

    /// List indexed projects
    Projects,

    /// Remove a project's graph
    Remove { project: String },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration file
    Init {
        /// Target path (default: <config dir>/fathom/config.toml)
        path: Option<PathBuf>,
    },
}
