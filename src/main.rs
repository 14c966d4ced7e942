mod classifier;
mod config;
mod dom;
mod extractor;
mod models;
mod page;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scraper::Html;
use serde::Serialize;
use tracing::info;
use url::Url;

use config::ExtractorConfig;
use models::{ExportBundle, ExtractResponse};
use page::{DomSource, FilePage, HttpPage};

#[derive(Parser)]
#[command(name = "weread_export", about = "Export highlights and thoughts from WeRead pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report what kind of WeRead page a URL is and whether it can be exported
    Classify {
        /// Page URL (decides the page type)
        url: String,
        /// Saved HTML of the page (default: fetch the URL)
        #[arg(long)]
        html: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Classify the page, then extract its notes as an export bundle
    Export {
        /// Page URL (decides the page type)
        url: String,
        /// Saved HTML of the page, re-read while waiting for notes (default: fetch the URL)
        #[arg(long)]
        html: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { url, html, pretty } => {
            let location = parse_url(&url)?;
            let verdict = match html {
                Some(path) => classify(&FilePage::new(location, path)).await?,
                None => classify(&HttpPage::new(location)?).await?,
            };
            print_json(&verdict, pretty)?;
        }
        Commands::Export { url, html, pretty } => {
            let config = ExtractorConfig::load()?;
            let location = parse_url(&url)?;
            let response = match html {
                Some(path) => export(&FilePage::new(location, path), &config).await?,
                None => export(&HttpPage::new(location)?, &config).await?,
            };
            print_json(&response, pretty)?;
        }
    }

    info!(elapsed_ms = t0.elapsed().as_millis() as u64, "done");
    Ok(())
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("Invalid page URL: {}", raw))
}

async fn classify<S: DomSource>(source: &S) -> Result<models::PageVerdict> {
    let html = source.snapshot().await?;
    Ok(classifier::classify(source.location(), &Html::parse_document(&html)))
}

/// Classify first; only supported pages with readable book info go on to extraction.
async fn export<S: DomSource>(source: &S, config: &ExtractorConfig) -> Result<ExtractResponse> {
    let verdict = classify(source).await?;
    info!(page_type = ?verdict.page_type, supported = verdict.is_supported, "classified page");

    if !verdict.is_supported {
        return Ok(ExtractResponse::failed(verdict.message));
    }
    let Some(book) = verdict.book_info else {
        return Ok(ExtractResponse::failed(
            "Could not read the book's id and title from this page",
        ));
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Waiting for notes of 《{}》...", book.title));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = extractor::extract_notes(source, &book, config).await;
    spinner.finish_and_clear();

    Ok(match result {
        Ok(notes) => ExtractResponse::ok(ExportBundle::new(book, notes)),
        Err(e) => ExtractResponse::failed(e.to_string()),
    })
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
