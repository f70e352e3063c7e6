use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prospect_common::observability::{LogConfig, init_logging};
use prospect_config::{ProspectConfig, ProspectConfigLoader};
use prospect_pipeline::{CompanyRecord, Pipeline};
use prospect_runtime::{ProspectRuntime, run_every};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

mod filters;
mod wiring;

const DEFAULT_CONFIG: &str = "prospect.yaml";

/// Find companies matching free-text filters.
#[derive(Debug, Parser)]
#[command(name = "prospect", version)]
struct Cli {
    /// Config file; `prospect.yaml` is used when present.
    #[arg(long, short, env = "PROSPECT_CONFIG")]
    config: Option<PathBuf>,

    /// Filter such as "funded $1M" (repeatable). Read from stdin when absent.
    #[arg(long = "filter", short = 'f', global = true)]
    filters: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interpret, search, extract, save.
    Run,
    /// Search+extract and streamed answer search, merged and enriched.
    Ensemble {
        /// Extra role to look up besides CEO and CTO (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Ask the search-grounded answer model directly.
    Answer,
    /// Fetch model-proposed listing pages and extract from them.
    Scrape,
    /// Poll periodically and mail new companies.
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ProspectConfig> {
    let loader = match path {
        Some(p) => ProspectConfigLoader::new().with_file(p),
        None => ProspectConfigLoader::new().with_optional_file(DEFAULT_CONFIG),
    };
    Ok(loader.load()?.validated()?)
}

fn prompt_entries(prompt: &str) -> Result<Vec<String>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprintln!("{prompt} One per line, type '{}' when finished.", filters::SENTINEL);
        io::stderr().flush()?;
    }
    Ok(filters::read_entries(stdin.lock())?)
}

fn print_records(records: &[CompanyRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_ref()).context("loading configuration")?;
    init_logging(LogConfig {
        app_name: "prospect",
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.emit_stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;

    // Stdin is read before the runtime starts.
    let interactive = cli.filters.is_empty() && !matches!(cli.command, Command::Watch { .. });
    let filters = if interactive {
        prompt_entries("Enter search filters (e.g. 'funded $1M', 'employee size 50').")?
    } else if cli.filters.is_empty() {
        cfg.watch.filters.clone()
    } else {
        cli.filters.clone()
    };
    let roles = match &cli.command {
        Command::Ensemble { roles } if roles.is_empty() && interactive => {
            prompt_entries("Other roles to look up besides CEO and CTO (e.g. CFO, Founder)?")?
        }
        Command::Ensemble { roles } => roles.clone(),
        _ => Vec::new(),
    };
    tracing::info!(target: "app", command = ?cli.command, filters = ?filters, "app.start");

    let runtime = ProspectRuntime::build("prospect-worker", None)?;
    let outcome = runtime.block_on(async {
        let pipeline = wiring::build_pipeline(&cfg).await?;
        match cli.command {
            Command::Run => print_records(&pipeline.run(&filters).await?),
            Command::Ensemble { .. } => print_records(&pipeline.ensemble(&filters, &roles).await?),
            Command::Answer => print_records(&pipeline.answer(&filters).await?),
            Command::Scrape => print_records(&pipeline.scrape(&filters).await?),
            Command::Watch { interval_secs, once } => {
                let period = Duration::from_secs(interval_secs.unwrap_or(cfg.watch.interval_secs));
                watch(&runtime, &pipeline, &cfg, &filters, period, once).await
            }
        }
    });
    runtime.shutdown(Duration::from_secs(2));
    outcome
}

async fn watch(
    runtime: &ProspectRuntime,
    pipeline: &Pipeline,
    cfg: &ProspectConfig,
    filters: &[String],
    period: Duration,
    once: bool,
) -> Result<()> {
    let notifier = wiring::build_notifier(cfg)?;
    if once {
        let summary = pipeline.poll_once(filters, &notifier).await?;
        tracing::info!(target: "app", ?summary, "watch.once");
        return Ok(());
    }

    let handle = runtime.handle();
    let cancel = handle.cancellation();
    let _signal = handle.cancel_on_ctrl_c();
    let notifier = &notifier;
    let cycles = run_every(period, &cancel, move |_| async move {
        pipeline.poll_once(filters, notifier).await?;
        Ok::<(), anyhow::Error>(())
    })
    .await;
    tracing::info!(target: "app", cycles, "watch.exit");
    Ok(())
}
