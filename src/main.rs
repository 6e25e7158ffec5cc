//! Tailship CLI - tail files into an event-log server and query it back.
//!
//! This is the main binary entry point. See the `tailship` library for the
//! core functionality.

// Rust guideline compliant 2026-02

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tailship::{commands, output, Client, Config, Order};

#[derive(Parser)]
#[command(name = "tailship")]
#[command(version)]
#[command(about = "Ship appended log lines to an event-log server and query them back")]
struct Cli {
    /// Server base URL (ws://, wss://, http:// or https://)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail files and publish every append as an event
    Watch {
        /// File to tail (repeatable)
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Tag attached to published events (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Print events matching a filter
    Query {
        /// Lower time bound, seconds since the epoch
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        /// Upper time bound, seconds since the epoch (0 = open)
        #[arg(long)]
        end: Option<f64>,
        /// Tag pattern (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Content pattern
        #[arg(short, long)]
        content: Option<String>,
        /// Result order: asc or desc
        #[arg(long)]
        order: Option<Order>,
        /// Follow new events instead of querying history
        #[arg(long)]
        live: bool,
        /// Output template: full, short, default, or a custom template
        #[arg(long)]
        format: Option<String>,
    },
    /// Publish a single event
    Event {
        /// Event source name
        #[arg(short, long)]
        source: String,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Event content; read from stdin when omitted
        #[arg(short, long)]
        content: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    // Configuration errors surface before anything connects.
    let client = Client::new(config.validated_server_url()?);

    match cli.command {
        Commands::Watch { files, tags } => {
            let tags = merge_tags(&config.tags, tags);
            commands::watch::run(&client, &files, &tags, commands::shutdown_signal()).await?;
        }
        Commands::Query {
            start,
            end,
            tags,
            content,
            order,
            live,
            format,
        } => {
            let filter = commands::query::build_filter(start, end, tags, content, order)?;
            let format = format.unwrap_or(config.format);
            let template = output::template(&format);
            let mut stdout = std::io::stdout().lock();
            if live {
                commands::query::follow(
                    &client,
                    &filter,
                    template,
                    &mut stdout,
                    commands::shutdown_signal(),
                )
                .await?;
            } else {
                commands::query::find(&client, &filter, template, &mut stdout).await?;
            }
        }
        Commands::Event {
            source,
            tags,
            content,
        } => {
            let tags = merge_tags(&config.tags, tags);
            let event = commands::publish::run(&client, &source, &tags, content).await?;
            println!("{}", event.id);
        }
    }

    Ok(())
}

/// Configured tags followed by command-line ones, without repeats.
fn merge_tags(configured: &[String], extra: Vec<String>) -> Vec<String> {
    let mut tags = configured.to_vec();
    for tag in extra {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
