use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tally_cache::{CacheStore, Reconciler};
use tally_core::Period;
use tally_extract::OpenAiExtractor;
use tally_match::Matcher;
use tally_paperless::PaperlessClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::AppConfig;
use report::{console_line, note_text, Summary, AUDIT_NOTE_PREFIX};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Reconcile a month of bank statements against the documents in Paperless-ngx")]
#[command(version)]
struct Args {
    /// Statement year, e.g. 2025
    year: i32,

    /// Statement month, 1-12
    month: u32,

    /// TOML config file; environment variables override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write an [AUDIT] note to each statement document
    #[arg(long)]
    write_notes: bool,

    /// Discard the cached record for this month before running
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let period = Period::new(args.year, args.month).context("Invalid statement period")?;
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let write_notes = args.write_notes || config.write_notes;

    let paperless = PaperlessClient::new(
        &config.paperless_url,
        &config.paperless_token,
        config.request_timeout,
    )?;
    let extractor = OpenAiExtractor::new(
        &config.openai_api_key,
        config.openai_model.clone(),
        config.request_timeout,
    )?;
    let matcher = Matcher::new(&paperless, config.statement_tag).with_windows(config.windows.clone());
    let store = CacheStore::new(&config.cache_dir);

    if args.reset && store.delete(period).await? {
        info!(%period, "cached record discarded");
    }

    let statements = paperless
        .list_statements(config.statement_tag, period)
        .await
        .context("Failed to list bank statements")?;

    println!("Auditing bank statements for {period}");
    println!();
    if statements.is_empty() {
        println!("No bank statements found for this month.");
        return Ok(());
    }
    println!("Found {} statement(s)", statements.len());
    println!();

    let reconciler = Reconciler::new(&store, &paperless, &extractor, &matcher);
    let mut record = reconciler.load(period).await.with_context(|| {
        format!("Failed to load cached record for {period}; rerun with --reset to discard it")
    })?;
    let mut summary = Summary::default();

    for statement in &statements {
        println!("── {} (#{}) ──", statement.title, statement.document_id);

        let run = match reconciler.run_statement(&mut record, statement).await {
            Ok(run) => run,
            Err(e) => {
                warn!(document = %statement.document_id, error = %e, "skipping statement");
                println!("  ERROR extracting transactions: {e}");
                println!();
                continue;
            }
        };

        if !run.extracted {
            println!("  Using cached transactions ({} items)", run.results.len());
        }
        for result in &run.results {
            println!("  {}", console_line(result));
        }
        summary.add(&run.results);

        if write_notes {
            match paperless
                .replace_note(statement.document_id, AUDIT_NOTE_PREFIX, &note_text(&run.results))
                .await
            {
                Ok(()) => println!("  Note updated on #{}", statement.document_id),
                Err(e) => warn!(document = %statement.document_id, error = %e, "could not write audit note"),
            }
        }
        println!();
    }

    println!("{summary}");
    Ok(())
}
