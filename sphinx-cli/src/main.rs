//! sphinx-cli - Command-line client for Sphinx searchd
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use sphinx_client::{Client, ClientConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sphinx-cli")]
#[command(about = "Command-line client for the Sphinx searchd protocol")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "SPHINX_CONFIG")]
    config: Option<PathBuf>,

    /// Server host, or a Unix socket path
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect and read timeout in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Run a full-text query
    Query(QueryArgs),

    /// Build highlighted excerpts for documents
    Excerpts {
        /// Index whose tokenizer settings are used
        #[arg(short, long)]
        index: String,

        /// Words to highlight
        #[arg(short, long)]
        words: String,

        /// Documents (or @file.txt to read from file)
        #[arg(required = true)]
        docs: Vec<String>,

        /// Maximum snippet size in characters
        #[arg(long, default_value = "256")]
        limit: u32,

        /// Words kept around each match
        #[arg(long, default_value = "5")]
        around: u32,

        /// Highlight only exact phrase matches
        #[arg(long)]
        exact_phrase: bool,

        /// Marker inserted before each match
        #[arg(long, default_value = "<b>")]
        before: String,

        /// Marker inserted after each match
        #[arg(long, default_value = "</b>")]
        after: String,
    },

    /// Tokenize a query the way an index would
    Keywords {
        /// Query text
        query: String,

        /// Index name
        #[arg(short, long)]
        index: String,

        /// Include per-keyword document and hit counts
        #[arg(long)]
        hits: bool,
    },

    /// Overwrite attribute values
    Update {
        /// Index name
        #[arg(short, long)]
        index: String,

        /// Attribute names, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        attrs: Vec<String>,

        /// Values JSON keyed by document id (or @file.json), e.g. {"2":[22,33]}
        values: String,

        /// Attributes are multi-valued; each value is a list, e.g. {"2":[[1,2],[3]]}
        #[arg(long)]
        multi: bool,
    },

    /// Show the server status table
    Status,
}

#[derive(Args)]
struct QueryArgs {
    /// Query text
    query: String,

    /// Indexes to search
    #[arg(short, long, default_value = "*")]
    index: String,

    /// Matches to skip
    #[arg(long, default_value = "0")]
    offset: u32,

    /// Matches to return
    #[arg(short, long, default_value = "20")]
    limit: u32,

    /// Match mode (all, any, phrase, boolean, extended, fullscan, extended2)
    #[arg(short, long)]
    mode: Option<String>,

    /// Ranking mode (proximity_bm25, bm25, none, wordcount, ...)
    #[arg(long)]
    ranker: Option<String>,

    /// Sort mode (relevance, attr_desc, attr_asc, time_segments, extended, expr)
    #[arg(long)]
    sort: Option<String>,

    /// Sort clause for non-relevance sort modes
    #[arg(long, default_value = "")]
    sort_by: String,

    /// Keep only matching values: attr=v1,v2 (repeatable)
    #[arg(short, long)]
    filter: Vec<String>,

    /// Drop matching values: attr=v1,v2 (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Keep an inclusive range: attr=min..max (repeatable)
    #[arg(long)]
    range: Vec<String>,

    /// Field weights: field=weight (repeatable)
    #[arg(short, long)]
    weight: Vec<String>,

    /// Group results by this attribute
    #[arg(long)]
    group_by: Option<String>,

    /// Select list, e.g. "*, group_id*1000 AS q"
    #[arg(long)]
    select: Option<String>,

    /// Server-side time budget in milliseconds
    #[arg(long)]
    max_query_time: Option<u32>,

    /// Escape query syntax characters so the text matches literally
    #[arg(long)]
    literal: bool,
}

fn load_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = ClientConfig::load_from(cli.config.as_ref())?;
    if let Some(ref host) = cli.host {
        config = config.with_host(host);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(timeout);
    }
    tracing::debug!("Using searchd at {}:{}", config.host, config.port);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let client = load_config(&cli)
        .and_then(|config| Ok(Client::with_config(config)?));
    let mut client = match client {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, cli.json).await?;
        }
        Some(cmd) => match commands::execute(&mut client, cmd, cli.json).await {
            Ok(output) => {
                println!("{}", output);
                if !client.last_warning().is_empty() {
                    eprintln!("{}: {}", "Warning".yellow(), client.last_warning());
                }
            }
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
