//! Command line front end for the book generation service.
//!
//! ```bash
//! # Generate a book end to end in this process
//! fable generate --request request.json
//!
//! # Inspect a book recorded by an earlier run
//! fable status 0b5e0d53-7d43-4a0c-9a0e-1f0b8e0f7a61
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fable::queue::InMemoryJobQueue;
use fable::storage::FilesystemBookStore;
use fable::{App, BookId, BookService, BookStatus, Config, CreationRequest, StatusReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "fable")]
#[command(about = "Generate illustrated children's books", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "FABLE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a book from a creation request and wait for the result
    Generate {
        /// Path to a JSON creation request, or the JSON itself
        #[arg(long)]
        request: String,
    },

    /// Print the status report of a book
    Status {
        book_id: BookId,
    },
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,fable=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn read_request(arg: &str) -> anyhow::Result<CreationRequest> {
    let json = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read request file {}", arg))?
    };
    serde_json::from_str(&json).context("Invalid creation request JSON")
}

fn print_report(report: &StatusReport) {
    println!(
        "[{:>3}%] {:<18} {} (about {} left)",
        report.progress, report.status, report.message, report.estimated_time_remaining
    );
}

async fn generate(config: &Config, request: CreationRequest) -> anyhow::Result<()> {
    let app = App::start(config).await?;
    let mut events = app.subscribe();
    let book = app.service().create_book(request).await?;
    println!("Accepted \"{}\" as book {}", book.title(), book.id);

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let mut last: Option<StatusReport> = None;
    let outcome = loop {
        tokio::select! {
            event = App::wait_for(&mut events, book.id) => break event,
            _ = ticker.tick() => {
                let report = app.service().status(book.id).await?;
                if last.as_ref() != Some(&report) {
                    print_report(&report);
                    last = Some(report);
                }
            }
        }
    };
    tracing::debug!(?outcome, "Job finished");

    let store = app.store();
    app.shutdown().await;

    let book = store
        .find_by_id(book.id)
        .await?
        .with_context(|| format!("Book {} disappeared from the store", book.id))?;
    let report = StatusReport::from_book(&book);
    print_report(&report);
    println!("{}", serde_json::to_string_pretty(&report)?);

    match book.status {
        BookStatus::Completed => {
            if let Some(location) = &book.pdf_location {
                println!("PDF written to {}", location);
            }
            Ok(())
        }
        status => anyhow::bail!(
            "Book {} ended as {}: {}",
            book.id,
            status,
            book.metadata.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn status(config: &Config, book_id: BookId) -> anyhow::Result<()> {
    let store = Arc::new(FilesystemBookStore::new(config.storage.books_dir()).await?);
    let service = BookService::new(store, Arc::new(InMemoryJobQueue::new()), config.job_options());
    let report = service.status(book_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Generate { request } => generate(&config, read_request(&request)?).await,
        Commands::Status { book_id } => status(&config, book_id).await,
    }
}
