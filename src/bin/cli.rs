//! Gazette Scanner CLI
//!
//! Scheduled-job entry point: one invocation performs one run.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use gazette::{
    error::Result,
    models::{Config, RunReport, ScanBackReport, Selection},
    pipeline::{self, RunCoordinator},
    services::{
        HttpBrowser, MailCredentials, MailTransport, PdfTextExtractor, SmtpMailer, StdoutTransport,
    },
};

/// Exit status when scan-back finds no matching publication.
const EXIT_NOT_FOUND: u8 = 2;

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// gazette - Official Gazette Scanner
#[derive(Parser, Debug)]
#[command(
    name = "gazette",
    version,
    about = "Scans the official gazette for search terms and mails a summary"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the day's publications and send the summary
    Run {
        /// Publication date (YYYY-MM-DD), defaults to today
        #[arg(long, conflicts_with = "latest")]
        date: Option<NaiveDate>,

        /// Scan only the most recent publication on the index
        #[arg(long)]
        latest: bool,

        /// Print the notification instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the publications a run would scan
    List {
        /// Publication date (YYYY-MM-DD), defaults to today
        #[arg(long, conflicts_with = "latest")]
        date: Option<NaiveDate>,

        /// Only the most recent publication on the index
        #[arg(long)]
        latest: bool,
    },

    /// Find the most recent publication that satisfies a section rule,
    /// searching back year by year
    ScanBack {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration and mail credentials
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn selection(date: Option<NaiveDate>, latest: bool) -> Selection {
    if latest {
        Selection::Latest
    } else {
        Selection::ByDate(date.unwrap_or_else(|| Local::now().date_naive()))
    }
}

/// Read the config file, or defaults when it does not exist. The fallback
/// notice is handed back so it can be logged once logging is set up.
fn read_config(path: &Path) -> Result<(Config, Option<String>)> {
    if path.exists() {
        Ok((Config::load(path)?, None))
    } else {
        let notice = format!("Config file {} not found, using defaults", path.display());
        Ok((Config::default(), Some(notice)))
    }
}

fn finish_config(mut config: Config) -> Result<Config> {
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn coordinator(config: &Config, dry_run: bool) -> Result<RunCoordinator> {
    let transport: Arc<dyn MailTransport> = if dry_run {
        Arc::new(StdoutTransport)
    } else {
        let credentials = MailCredentials::from_env(&config.mail)?;
        Arc::new(SmtpMailer::new(&config.mail, credentials)?)
    };
    RunCoordinator::new(
        config,
        Arc::new(HttpBrowser::new(config.fetcher.clone())),
        Arc::new(PdfTextExtractor::new()),
        transport,
    )
}

async fn execute(command: Command, config: Config) -> Result<ExitCode> {
    match command {
        Command::Run {
            date,
            latest,
            dry_run,
            json,
        } => {
            let coordinator = coordinator(&config, dry_run)?;
            let report = coordinator.run(selection(date, latest)).await?;
            print_report(&report, json)?;

            if pipeline::is_failure(&report) {
                log::error!("{}", pipeline::describe_outcome(&report));
                Ok(ExitCode::FAILURE)
            } else {
                log::info!("{}", pipeline::describe_outcome(&report));
                Ok(ExitCode::SUCCESS)
            }
        }

        Command::List { date, latest } => {
            let coordinator = coordinator(&config, true)?;
            let references = coordinator.list(selection(date, latest)).await?;
            if references.is_empty() {
                println!("No publications found.");
            }
            for reference in &references {
                println!("{}  {}", reference.date, reference);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::ScanBack { json } => {
            let coordinator = coordinator(&config, true)?;
            let report = coordinator.scan_back().await?;
            print_scan_back(&report, json)?;
            if report.found.is_some() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_NOT_FOUND))
            }
        }

        Command::Validate => {
            let credentials = MailCredentials::from_env(&config.mail)?;
            SmtpMailer::new(&config.mail, credentials)?;
            println!("Configuration is valid.");
            println!("  Index:        {}", config.index.url);
            println!("  Search terms: {}", config.matcher.search_terms.join(", "));
            println!("  Sections:     {}", config.matcher.sections.len());
            println!("  Recipients:   {}", config.mail.to.join(", "));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if let Some(result) = &report.result {
        for document in &result.documents {
            println!(
                "{}  {} pages  sha256:{}",
                document.reference.title, document.page_count, document.digest
            );
        }
        for record in &result.matches {
            println!("  {}: {}", record.term, record.context_snippet.trim());
        }
    }
    Ok(())
}

fn print_scan_back(report: &ScanBackReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let Some(found) = &report.found else {
        println!(
            "No publication satisfies a section rule in the years searched ({}).",
            report.years.len()
        );
        return Ok(());
    };
    println!("[{}] {}", found.rule, found.reference.title);
    println!("  Date:  {}", found.reference.date);
    println!("  PDF:   {}", found.reference.source_url);
    println!("  Page:  {}", found.page_number);
    if !found.names.is_empty() {
        println!("  Names: {}", found.names.join(", "));
    }
    println!();
    println!("{}", found.text);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = read_config(&cli.config);
    let level = match &loaded {
        Ok((config, _)) => config.logging.level.clone(),
        Err(_) => "info".to_string(),
    };
    init_logging(cli.verbose, &level);

    let config = match loaded.and_then(|(config, notice)| {
        if let Some(notice) = notice {
            log::warn!("{}", notice);
        }
        finish_config(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Loaded configuration from {}", cli.config.display());

    tokio::select! {
        outcome = execute(cli.command, config) => match outcome {
            Ok(code) => code,
            Err(e) => {
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, run discarded");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
