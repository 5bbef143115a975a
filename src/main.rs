// SPDX-License-Identifier: MIT OR Apache-2.0

//! forage - Multimodal food catalog search tool
//!
//! Indexes food items under two vector spaces (text and image embeddings)
//! against a local catalog store and answers similarity queries routed by
//! input modality.

mod cli;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, CliModality, Commands, OutputFormat};
use forage::catalog::{open_catalog, Catalog, FoodRecord, Modality, SearchQuery};
use forage::config::Config;
use forage::output;
use forage::store::SchemaOutcome;
use forage::utils;

/// One entry in an ingestion file.
#[derive(Debug, Deserialize)]
struct RecordSpec {
    name: String,
    #[serde(default)]
    description: String,
    category: String,
    #[serde(default)]
    price: Option<f64>,
    /// Path to the item image, relative to the records file
    #[serde(default)]
    image_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with FORAGE_LOG env var (e.g., FORAGE_LOG=debug forage search "query")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FORAGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format.unwrap_or(OutputFormat::Text);
    let compact = cli.compact;

    match cli.command {
        Commands::Schema { path } => {
            let root = resolve_root(path.as_deref(), false);
            let catalog = open(&root, None)?;
            let outcome = catalog.ensure_schema().await?;
            match format {
                OutputFormat::Text => match outcome {
                    SchemaOutcome::Created => println!("Collection created"),
                    SchemaOutcome::AlreadyExists => println!("Collection already exists"),
                },
                OutputFormat::Json => {
                    let outcome = match outcome {
                        SchemaOutcome::Created => "created",
                        SchemaOutcome::AlreadyExists => "already_exists",
                    };
                    print_json(&serde_json::json!({ "outcome": outcome }), compact)?;
                }
            }
            Ok(())
        }

        Commands::Ingest {
            file,
            path,
            concurrency,
            no_progress,
        } => {
            let root = resolve_root(path.as_deref(), false);
            let catalog = open(&root, concurrency)?;
            let records = load_records(Path::new(&file))?;
            if records.is_empty() {
                bail!("No records found in {}", file);
            }

            catalog.ensure_schema().await?;

            let spinner = if no_progress || format == OutputFormat::Json {
                None
            } else {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner} Ingesting {msg}")
                        .expect("valid progress template"),
                );
                pb.set_message(format!("{} records", records.len()));
                pb.enable_steady_tick(Duration::from_millis(100));
                Some(pb)
            };

            let report = catalog.ingest(records).await;
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }

            match format {
                OutputFormat::Text => {
                    println!("{}", output::format_report(&report, output::use_colors()));
                }
                OutputFormat::Json => print_json(&report, compact)?,
            }

            if report.succeeded.is_empty() && !report.failed.is_empty() {
                bail!("All {} records failed to ingest", report.failed.len());
            }
            Ok(())
        }

        Commands::Search {
            query,
            image,
            path,
            limit,
            timeout_ms,
            target,
        } => {
            let root = resolve_root(path.as_deref(), true);
            let config = Config::load_for(&root);
            let catalog = open_catalog(&root, &config)?;
            catalog.ensure_schema().await?;

            let mut search_query = match (query, image) {
                (Some(_), Some(_)) => {
                    bail!("Provide either a text query or --image, not both")
                }
                (Some(text), None) => SearchQuery::text(text),
                (None, Some(image_path)) => {
                    let bytes = std::fs::read(&image_path)
                        .with_context(|| format!("Failed to read image: {}", image_path))?;
                    SearchQuery::image(bytes)
                }
                (None, None) => bail!("Provide a text query or --image"),
            };

            search_query = search_query
                .with_top_k(limit.unwrap_or_else(|| config.search().default_limit()));
            if let Some(ms) = timeout_ms {
                search_query = search_query.with_timeout(Duration::from_millis(ms));
            }
            if let Some(target) = target {
                search_query = search_query.with_target(match target {
                    CliModality::Text => Modality::Text,
                    CliModality::Image => Modality::Image,
                });
            }

            let results = catalog.search(&search_query).await?;

            match format {
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results found");
                    } else {
                        let use_color = output::use_colors();
                        for result in &results {
                            println!("{}", output::format_result_line(result, use_color));
                        }
                    }
                }
                OutputFormat::Json => print_json(&results, compact)?,
            }
            Ok(())
        }

        Commands::Stats { path } => {
            let root = resolve_root(path.as_deref(), true);
            let catalog = open(&root, None)?;
            catalog.ensure_schema().await?;
            let stats = catalog.stats().await?;
            match format {
                OutputFormat::Text => {
                    println!("items: {}", stats.items);
                    println!("text-indexed: {}", stats.text_indexed);
                    println!("image-indexed: {}", stats.image_indexed);
                }
                OutputFormat::Json => print_json(&stats, compact)?,
            }
            Ok(())
        }

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "forage", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Resolves the catalog root: explicit --path, or (for read commands) the
/// nearest ancestor carrying a .forage directory.
fn resolve_root(path: Option<&str>, discover: bool) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None if discover => utils::get_root_with_catalog("."),
        None => PathBuf::from("."),
    }
}

/// Opens the catalog at `root`, optionally overriding ingest concurrency.
fn open(root: &Path, concurrency: Option<usize>) -> Result<Catalog> {
    let mut config = Config::load_for(root);
    if let Some(concurrency) = concurrency {
        config.ingest.concurrency = Some(concurrency);
    }
    open_catalog(root, &config)
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Loads ingestion records from a JSON file, resolving image paths relative
/// to the file's directory.
fn load_records(file: &Path) -> Result<Vec<FoodRecord>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read records file: {}", file.display()))?;
    let specs: Vec<RecordSpec> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records file: {}", file.display()))?;

    let base = file.parent().unwrap_or(Path::new("."));
    let mut records = Vec::with_capacity(specs.len());
    for spec in specs {
        let image = match spec.image_path {
            Some(image_path) => {
                let resolved = if image_path.is_absolute() {
                    image_path
                } else {
                    base.join(image_path)
                };
                Some(std::fs::read(&resolved).with_context(|| {
                    format!("Failed to read image for '{}': {}", spec.name, resolved.display())
                })?)
            }
            None => None,
        };
        records.push(FoodRecord {
            name: spec.name,
            description: spec.description,
            category: spec.category,
            price: spec.price,
            image,
        });
    }
    Ok(records)
}
