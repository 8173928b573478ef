use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hostwatch::app::{Agent, RunOutcome};
use hostwatch::config::{self, AgentConfig};
use hostwatch::controller::{DynamicCollector, StaticCollector};
use hostwatch::logging;
use hostwatch::model::MetricPayload;
use hostwatch::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "hostwatch", version, about = "Host telemetry agent")]
struct Cli {
    /// KEY=VALUE file consulted for settings the environment does not set.
    #[arg(long, global = true, default_value = config::DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    #[arg(long, global = true)]
    server_url: Option<String>,

    #[arg(long, global = true)]
    debug: bool,

    /// Also write logs to a daily-rolling file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the agent until stopped (default).
    Run,
    /// Sample for a few ticks and print one payload instead of sending it.
    Collect {
        #[arg(long, default_value_t = 3)]
        ticks: u32,
    },
    Version,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("hostwatch: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Cmd::Run);
    if matches!(command, Cmd::Version) {
        println!("hostwatch {}", config::VERSION);
        return Ok(ExitCode::SUCCESS);
    }

    let mut cfg = AgentConfig::load(&cli.env_file)?;
    if let Some(url) = cli.server_url {
        cfg.server_url = url;
    }
    cfg.debug |= cli.debug;
    if cli.log_dir.is_some() {
        cfg.log_dir = cli.log_dir;
    }
    let _log_guard = logging::init(cfg.debug, cfg.log_dir.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    match command {
        Cmd::Run => runtime.block_on(run(cfg)),
        Cmd::Collect { ticks } => runtime
            .block_on(collect_once(&cfg, ticks))
            .map(|()| ExitCode::SUCCESS),
        Cmd::Version => Ok(ExitCode::SUCCESS),
    }
}

async fn run(cfg: AgentConfig) -> Result<ExitCode> {
    let token = cfg.require_token()?.to_string();
    let transport = HttpTransport::new(&cfg.server_url, Some(token), cfg.tuning.cycle_deadline)
        .context("building HTTP transport")?;
    let dynamic = DynamicCollector::from_host(&cfg.tuning);
    let statics = StaticCollector::from_host(&cfg.tuning).context("building static collector")?;
    let agent = Agent::new(&cfg, dynamic, statics, Arc::new(transport));

    let shutdown = CancellationToken::new();
    watch_signals(shutdown.clone())?;
    tracing::info!(server = %cfg.server_url, "reporting to collector");

    match agent.run(shutdown).await? {
        RunOutcome::Stopped => Ok(ExitCode::SUCCESS),
        RunOutcome::AuthFailed => Ok(ExitCode::from(config::AUTH_FAILED_EXIT_CODE)),
    }
}

/// SIGINT and SIGTERM cancel `shutdown`; SIGHUP is acknowledged and ignored.
fn watch_signals(shutdown: CancellationToken) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("installing signal handlers")?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                if signal == SIGHUP {
                    tracing::info!("received SIGHUP; reload not supported");
                    continue;
                }
                tracing::info!(signal, "shutdown requested");
                shutdown.cancel();
                break;
            }
        })
        .context("spawning signal thread")?;
    Ok(())
}

async fn collect_once(cfg: &AgentConfig, ticks: u32) -> Result<()> {
    let tuning = cfg.tuning;
    let dynamic = DynamicCollector::from_host(&tuning);
    let statics = StaticCollector::from_host(&tuning).context("building static collector")?;

    dynamic.start();
    tokio::time::sleep(tuning.sample_period * ticks + tuning.sample_period / 2).await;

    let deadline = Instant::now() + tuning.cycle_deadline;
    let (facts, metrics) = tokio::join!(
        statics.collect(deadline),
        dynamic.collect(deadline),
    );
    dynamic.stop();

    let facts = match facts {
        Ok(facts) => Some(facts),
        Err(e) => {
            tracing::warn!(error = %e, "static facts unavailable");
            None
        }
    };
    let payload = MetricPayload {
        hostname: facts
            .as_deref()
            .and_then(|f| f.hostname())
            .unwrap_or("unknown")
            .to_string(),
        timestamp: Utc::now(),
        static_metrics: facts.as_deref().cloned(),
        dynamic_metrics: metrics,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("encoding payload")?
    );
    Ok(())
}
