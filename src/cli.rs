// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// forage - Multimodal food catalog search
///
/// Indexes food items under text and image vector spaces and answers
/// similarity queries by text or by image.
#[derive(Parser, Debug)]
#[command(name = "forage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Query modality for explicit targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliModality {
    Text,
    Image,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or check the catalog collection schema
    Schema {
        /// Catalog root (defaults to current directory)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Ingest food records from a JSON file
    #[command(alias = "i")]
    Ingest {
        /// JSON file containing an array of records
        file: String,

        /// Catalog root (defaults to current directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Maximum records processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Disable the progress spinner
        #[arg(long)]
        no_progress: bool,
    },

    /// Search the catalog by text or image
    #[command(alias = "s")]
    Search {
        /// Text query (omit when searching by image)
        query: Option<String>,

        /// Image file to search with
        #[arg(short, long)]
        image: Option<String>,

        /// Catalog root (defaults to the nearest .forage directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Maximum number of results
        #[arg(short = 'm', long = "limit", visible_alias = "max-results")]
        limit: Option<usize>,

        /// Per-search timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Explicit target modality (must match the query payload)
        #[arg(long, value_enum)]
        target: Option<CliModality>,
    },

    /// Show catalog item counts per vector space
    Stats {
        /// Catalog root (defaults to the nearest .forage directory)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
