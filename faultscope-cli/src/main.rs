//! faultscope — operator CLI for the PLC fault diagnosis assistant
//!
//! Wraps `WorkflowOrchestrator` from `faultscope-core`. One-shot subcommands
//! run a single workflow step; `session` keeps the state machine alive
//! between commands.
//!
//! # Subcommands
//! - `files`                                       — list uploaded logs
//! - `upload <path>`                               — store, preview and index a log
//! - `preview <file>`                              — show a log's preview table
//! - `diagnose [--file F] [--row N | --query Q]`   — run a diagnosis
//! - `history [--file F]`                          — show stored queries
//! - `faults <file>`                               — list fault codes in a log
//! - `kb [path] [--reindex]`                       — browse / index the knowledge base
//! - `kb-upload <path>`                            — add a reference document
//! - `session`                                     — interactive session

mod render;
mod repl;

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use faultscope_core::models::FeedbackRating;
use faultscope_core::{DiagnosisApi, FaultscopeConfig, FaultscopeError, HttpDiagnosisClient, WorkflowOrchestrator};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "faultscope",
    version,
    about = "PLC fault diagnosis assistant: upload logs, query, rate diagnoses"
)]
struct Cli {
    /// Config file (optional; FAULTSCOPE__* env vars override it)
    #[arg(short, long, default_value = "faultscope.toml")]
    config: String,

    /// Backend URL (overrides api.base_url)
    #[arg(long, env = "FAULTSCOPE_SERVER")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List uploaded log files
    Files,

    /// Upload a log file, then preview and index it
    Upload {
        path: String,
    },

    /// Show the preview table of an uploaded log
    Preview {
        file: String,
    },

    /// Run a diagnosis from a log row or free-text question
    Diagnose {
        /// Uploaded log to work against
        #[arg(short, long)]
        file: Option<String>,

        /// Preview row to use as the query (1 = first data row)
        #[arg(short, long, requires = "file", conflicts_with = "query")]
        row: Option<usize>,

        /// Free-text query
        #[arg(short, long)]
        query: Option<String>,

        /// Rate the diagnosis right away (good, can_be_better, bad)
        #[arg(long)]
        rate: Option<FeedbackRating>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored queries
    History {
        /// Only entries for this log
        #[arg(short, long)]
        file: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List fault codes found in an uploaded log
    Faults {
        file: String,
    },

    /// Browse the knowledge base, optionally re-indexing the path
    Kb {
        /// Path to list (defaults to knowledge_base.default_path)
        path: Option<String>,

        /// Index the documents under the path
        #[arg(long)]
        reindex: bool,
    },

    /// Add a reference document to the knowledge base
    KbUpload {
        path: String,
    },

    /// Interactive session
    Session,
}

// ============================================================================
// Helpers
// ============================================================================

/// Read a file for upload, returning its base name and contents.
pub(crate) fn read_upload(path: &str) -> Result<(String, Vec<u8>), FaultscopeError> {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| FaultscopeError::Other(format!("'{}' is not a file path", path)))?;
    let contents = std::fs::read(path)?;
    Ok((name, contents))
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run(cli: Cli, config: FaultscopeConfig) -> anyhow::Result<()> {
    let client = HttpDiagnosisClient::from_config(&config)?;
    let api: Arc<dyn DiagnosisApi> = Arc::new(client);
    tracing::debug!(backend = api.name(), base_url = %config.api.base_url, "Diagnosis client ready");

    let mut flow = WorkflowOrchestrator::new(Arc::clone(&api), &config);

    let result = dispatch(cli.command, &api, &mut flow).await;
    flow.drain_background().await;
    result
}

async fn dispatch(
    command: Commands,
    api: &Arc<dyn DiagnosisApi>,
    flow: &mut WorkflowOrchestrator,
) -> anyhow::Result<()> {
    match command {
        Commands::Files => {
            flow.refresh_files().await?;
            print!("{}", render::files(flow.session().files()));
        }

        Commands::Upload { path } => {
            let (name, contents) = read_upload(&path)?;
            let stored = flow.upload(&name, contents).await?;
            if stored != name {
                println!("Stored as {}", stored);
            }
            print!("{}", render::preview(flow.session().preview()));
            println!("{}", flow.session().status());
        }

        Commands::Preview { file } => {
            let table = api.preview(&file).await?;
            print!("{}", render::preview(&table));
        }

        Commands::Diagnose {
            file,
            row,
            query,
            rate,
            json,
        } => {
            if let Some(file) = &file {
                flow.select_file(file).await?;
            }
            if let Some(row) = row {
                flow.select_row(row)?;
            }
            if let Some(query) = query {
                flow.set_query(query);
            }

            flow.query().await?;
            if let Some(rating) = rate {
                flow.submit_feedback(rating).await?;
            }

            if let Some(result) = flow.session().result() {
                if json {
                    print_json(result)?;
                } else {
                    print!("{}", render::diagnosis(result));
                }
            }
        }

        Commands::History { file, json } => {
            let entries = api.fetch_history(file.as_deref()).await?;
            if json {
                print_json(&entries)?;
            } else {
                print!("{}", render::history(&entries));
            }
        }

        Commands::Faults { file } => {
            let codes = api.list_faults(&file).await?;
            print!("{}", render::faults(&file, &codes));
        }

        Commands::Kb { path, reindex } => {
            match path {
                Some(path) => {
                    flow.edit_kb_path(&path);
                    flow.commit_kb_path().await;
                }
                None => {
                    flow.toggle_browser().await;
                }
            }
            if reindex {
                flow.reindex_knowledge_base().await?;
                println!("{}", flow.session().status());
            }
            print!("{}", render::browser(flow.browser()));
        }

        Commands::KbUpload { path } => {
            let (name, contents) = read_upload(&path)?;
            let ack = api.upload_kb_document(&name, contents).await?;
            println!(
                "{}",
                ack.message
                    .unwrap_or_else(|| format!("Uploaded {} to the knowledge base", ack.filename))
            );
        }

        Commands::Session => repl::run(flow).await?,
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match FaultscopeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("faultscope: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };
    if let Some(server) = &cli.server {
        config.api.base_url = server.trim_end_matches('/').to_string();
    }

    init_logging(&config.service.log_level);

    if let Err(e) = run(cli, config).await {
        eprintln!("faultscope: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
