//! sharecrawl: run crawl passes over a local directory tree and inspect
//! version tokens and inclusion rules.
//!
//! Usage:
//!     sharecrawl crawl --root /srv/share --config job.toml --state state.json
//!     sharecrawl decode '---file:////docs/a.pdf+1700000000000+42+I'
//!     sharecrawl check --path /docs/a.pdf --length 42

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sharecrawl::config::{default_config_path, JobConfig};
use sharecrawl::crawl::{
    ActivityKind, ActivityRecord, CrawlDriver, CrawlPass, IngestRequest, JobSink, PassReport,
    SkipReason,
};
use sharecrawl::fault::Retrier;
use sharecrawl::logging::{init_logging, LogConfig};
use sharecrawl::rules::{covering_scopes, Rule, RuleTree, Scope};
use sharecrawl::store::{ContentStream, Entry, LocalStore, StoreAdapter};
use sharecrawl::version::decode_version;

#[derive(Parser, Debug)]
#[command(name = "sharecrawl", version, about = "Crawl decision engine for file shares")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one crawl pass over a local directory
    Crawl {
        /// Directory that identifiers are relative to
        #[arg(long)]
        root: PathBuf,

        /// Job file (defaults to <config dir>/sharecrawl/job.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Identifiers to start from
        #[arg(long = "seed", default_value = "/")]
        seeds: Vec<String>,

        /// Version map from the previous pass; rewritten afterwards
        #[arg(long)]
        state: Option<PathBuf>,

        /// JSON lines instead of colored output
        #[arg(long)]
        json: bool,
    },
    /// Print the contents of a version token
    Decode { token: String },
    /// Evaluate the inclusion rules for an identifier
    Check {
        #[arg(long)]
        path: String,

        #[arg(long, value_enum, default_value = "file")]
        kind: KindArg,

        #[arg(long, default_value_t = 0)]
        length: u64,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    File,
    Directory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = matches!(cli.command, Command::Crawl { json: true, .. });
    init_logging(LogConfig {
        verbose: cli.verbose,
        json,
    })?;

    match cli.command {
        Command::Crawl {
            root,
            config,
            seeds,
            state,
            json,
        } => crawl(root, config, seeds, state, json).await,
        Command::Decode { token } => {
            println!("{}", serde_json::to_string_pretty(&decode_version(&token))?);
            Ok(())
        }
        Command::Check {
            path,
            kind,
            length,
            config,
        } => check(&path, kind, length, config),
    }
}

/// Explicit path, else the default location if present, else include
/// everything.
fn load_config(explicit: Option<PathBuf>) -> Result<JobConfig> {
    if let Some(path) = explicit {
        return JobConfig::load(&path);
    }
    match default_config_path() {
        Some(path) if path.exists() => JobConfig::load(&path),
        _ => {
            info!("No job config found, including everything");
            let mut config = JobConfig::default();
            config.rules = RuleTree::new().scope(Scope::new("/").rule(Rule::include("*")));
            Ok(config)
        }
    }
}

fn load_state(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid state file {}", path.display()))
}

fn save_state(path: &Path, versions: &BTreeMap<String, String>) -> Result<()> {
    let text = serde_json::to_string_pretty(versions)?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write state file {}", path.display()))
}

async fn crawl(
    root: PathBuf,
    config: Option<PathBuf>,
    seeds: Vec<String>,
    state: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let previous = match &state {
        Some(path) => load_state(path)?,
        None => BTreeMap::new(),
    };

    let store: Arc<dyn StoreAdapter> = Arc::new(LocalStore::new(&root));
    let sink = Arc::new(ConsoleSink { json });
    let cancel = CancellationToken::new();
    let driver = CrawlDriver::new(store, Arc::new(config.rules.clone()), config.encoder()?, sink)
        .with_retrier(Retrier::new(config.retry, cancel.clone()))
        .with_scratch_dir(config.crawl.scratch_dir());
    let pass = CrawlPass::new(Arc::new(driver), config.crawl.workers());

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling crawl");
            interrupt.cancel();
        }
    });

    let report = pass.run(&seeds, &previous).await?;
    if let Some(path) = &state {
        save_state(path, &report.versions)?;
    }
    print_summary(&report, json)
}

fn print_summary(report: &PassReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!();
    println!("{}", "Crawl pass complete".bold());
    println!("  Ingested:  {}", report.ingested.to_string().green());
    println!("  Deleted:   {}", report.deleted.to_string().red());
    println!("  Skipped:   {}", report.skipped);
    println!("  Unchanged: {}", report.unchanged);
    println!(
        "  Bytes:     {}",
        humansize::format_size(report.bytes, humansize::BINARY)
    );
    println!("  Duration:  {:.2}s", report.duration.as_secs_f64());
    if !report.deferred.is_empty() {
        println!("  Deferred:  {}", report.deferred.len().to_string().yellow());
        for deferred in &report.deferred {
            println!(
                "    {} {} (retry after {})",
                deferred.id,
                deferred.message.dimmed(),
                deferred.retry_after.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

fn check(path: &str, kind: KindArg, length: u64, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let rules = &config.rules;
    let entry = match kind {
        KindArg::File => Entry::leaf(path, length, 0),
        KindArg::Directory => Entry::container(path, 0),
    };

    let scopes: Vec<&str> = covering_scopes(rules, path).map(|scope| scope.path.as_str()).collect();
    let verdict = |value: bool| if value { "yes".green() } else { "no".red() };

    println!("{}", path.bold());
    println!("  Scopes:                  {}", scopes.join(", "));
    println!("  Included (metadata):     {}", verdict(rules.check_include(&entry)));
    println!(
        "  Included if indexable:   {}",
        verdict(rules.would_be_included(&entry, true))
    );
    println!(
        "  Included if unindexable: {}",
        verdict(rules.would_be_included(&entry, false))
    );
    Ok(())
}

/// Job sink for the CLI: drains content and prints one line per activity.
struct ConsoleSink {
    json: bool,
}

#[async_trait]
impl JobSink for ConsoleSink {
    async fn ingest(&self, _request: &IngestRequest, content: &mut ContentStream) -> Result<u64> {
        let bytes = tokio::io::copy(content, &mut tokio::io::sink()).await?;
        Ok(bytes)
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn skip(&self, _id: &str, _reason: &SkipReason) -> Result<()> {
        Ok(())
    }

    fn record_activity(&self, record: ActivityRecord) {
        if self.json {
            if let Ok(line) = serde_json::to_string(&record) {
                println!("{}", line);
            }
            return;
        }

        let label = match record.outcome {
            ActivityKind::Ingest => "INGEST ".green(),
            ActivityKind::Delete => "DELETE ".red(),
            ActivityKind::Skip => "SKIP   ".dimmed(),
            ActivityKind::Deferred => "DEFER  ".yellow(),
            ActivityKind::Failed => "FAILED ".red().bold(),
        };
        match (&record.error, record.bytes) {
            (Some(error), _) => println!("{} {} {}", label, record.id, error.dimmed()),
            (None, 0) => println!("{} {}", label, record.id),
            (None, bytes) => println!(
                "{} {} ({})",
                label,
                record.id,
                humansize::format_size(bytes, humansize::BINARY)
            ),
        }
    }
}
