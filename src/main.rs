use std::path::PathBuf;
use std::time::Duration;

use edge_rank_rs::config::{self, ProbeConfig, RankConfig};
use edge_rank_rs::engine;
use edge_rank_rs::report::{self, Format, ReportStyle};
use edge_rank_rs::server::{self, AppState, RunRequest};
use edge_rank_rs::sources::{self, CandidateSource, CidrSource, FileSource, StaticSource};
use edge_rank_rs::types::{ProbeOutcome, RunResult, RunStatus};

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// edge-rank-rs — probe candidate endpoints over TCP and keep the fastest.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "edge-rank-rs",
    version,
    about = "Probe candidate endpoints over TCP and rank them by connect latency.",
    long_about = None
)]
struct Cli {
    /// Endpoints (IPs or domain names) given directly on the command line.
    hosts: Vec<String>,

    /// File with one endpoint per line (repeatable).
    #[arg(long = "candidates")]
    candidate_files: Vec<PathBuf>,

    /// CIDR range to sample hosts from (repeatable).
    #[arg(long = "cidr")]
    cidrs: Vec<String>,

    /// Hosts sampled from each CIDR range.
    #[arg(long = "per-range", default_value_t = sources::DEFAULT_PER_RANGE)]
    per_range: usize,

    /// Target TCP port.
    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Connect timeout per trial in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = config::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Trials per candidate; the best one counts.
    #[arg(long, default_value_t = config::DEFAULT_ATTEMPTS)]
    attempts: u32,

    /// Max concurrent probes.
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Number of ranked entries to keep.
    #[arg(long, default_value_t = config::DEFAULT_TOP)]
    top: usize,

    /// Label written after each endpoint in the text output.
    #[arg(long, default_value = report::DEFAULT_LABEL)]
    label: String,

    /// Write the ranking to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format for --output.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Line template for --output, e.g. 'vless://id@{host}:{port}#{label} | {latency}'.
    /// Placeholders: {host} {port} {label} {rank} {latency}. Implies --format template.
    #[arg(long)]
    template: Option<String>,

    /// Serve the HTTP API on this address instead of exiting after one run.
    #[arg(long)]
    serve: Option<String>,

    /// With --serve, re-run the ranking every N seconds (0 disables).
    #[arg(long = "refresh-secs", default_value_t = 0)]
    refresh_secs: u64,
}

impl Cli {
    fn rank_config(&self) -> RankConfig {
        RankConfig {
            probe: ProbeConfig {
                port: self.port,
                timeout_ms: self.timeout_ms,
                attempts: self.attempts,
                concurrency: self.concurrency,
            },
            top: self.top,
        }
    }

    fn report_style(&self) -> ReportStyle {
        let format = match self.template {
            Some(_) => Format::Template,
            None => self.format,
        };
        ReportStyle {
            format,
            label: self.label.clone(),
            template: self
                .template
                .clone()
                .unwrap_or_else(|| report::DEFAULT_TEMPLATE.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = cli.rank_config();
    cfg.validate()?;

    println!("edge-rank-rs configuration:");
    println!("  hosts        : {}", cli.hosts.len());
    println!("  files        : {}", cli.candidate_files.len());
    println!("  cidrs        : {}", cli.cidrs.len());
    println!("  port         : {}", cfg.probe.port);
    println!("  timeout_ms   : {}", cfg.probe.timeout_ms);
    println!("  attempts     : {}", cfg.probe.attempts);
    println!("  concurrency  : {}", cfg.probe.effective_concurrency());
    println!("  top          : {}", cfg.top);

    if let Some(bind) = cli.serve.as_deref() {
        return serve(&cli, bind, cfg).await;
    }

    let listed = StaticSource::new("command line", cli.hosts.clone());
    let cidrs = CidrSource::parse(&cli.cidrs, cli.per_range)?;
    let files: Vec<FileSource> = cli
        .candidate_files
        .iter()
        .map(|p| FileSource::new(p.clone()))
        .collect();
    let mut all: Vec<&dyn CandidateSource> = Vec::new();
    all.push(&listed);
    all.push(&cidrs);
    all.extend(files.iter().map(|f| f as &dyn CandidateSource));

    let results = engine::run_sources(&all, &cfg).await?;
    print_results_table(&results);

    if let Some(path) = cli.output.as_deref() {
        report::write_report(path, &results, &cli.report_style())?;
        println!("Wrote {} entries to {}", results.entries.len(), path.display());
    }
    Ok(())
}

async fn serve(cli: &Cli, bind: &str, cfg: RankConfig) -> Result<()> {
    let seed = RunRequest {
        candidates: cli.hosts.clone(),
        cidrs: cli.cidrs.clone(),
        per_range: Some(cli.per_range),
        files: cli.candidate_files.clone(),
        config: cfg,
    };
    let mut state = AppState::new().with_request(seed).await;
    if let Some(path) = cli.output.clone() {
        info!(path = %path.display(), "each finished run rewrites the output file");
        state = state.with_output(path, cli.report_style()).await;
    }
    let refresh = (cli.refresh_secs > 0).then(|| Duration::from_secs(cli.refresh_secs));
    if refresh.is_none() {
        info!("no --refresh-secs given; runs start only via POST /api/run");
    }

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    server::spawn_server(bind, state, refresh, cancel).await
}

fn print_results_table(results: &RunResult) {
    match results.status() {
        RunStatus::NoCandidates => {
            warn!("no valid candidates were given");
            return;
        }
        RunStatus::NoneReachable => println!(
            "\n0 of {} candidates reachable on port {}",
            results.total_candidates, results.port
        ),
        RunStatus::Ranked => println!(
            "\nReachable: {} of {} (port {}), showing top {}",
            results.reachable,
            results.total_candidates,
            results.port,
            results.entries.len()
        ),
    }

    let host_w = results
        .entries
        .iter()
        .map(|e| e.candidate.host.len())
        .max()
        .unwrap_or(0)
        .max("host".len());
    let rank_w = 4usize;
    let lat_w = "latency_ms".len();

    println!("{:>rank_w$}  {:<host_w$}  {:>lat_w$}", "rank", "host", "latency_ms");
    println!("{:-<rank_w$}  {:-<host_w$}  {:-<lat_w$}", "", "", "");
    for e in &results.entries {
        let status = match e.outcome {
            ProbeOutcome::Reachable { latency } => format!("{:.2}", latency.as_secs_f64() * 1000.0),
            ProbeOutcome::Unreachable { reason } => reason.as_str().to_string(),
        };
        println!("{:>rank_w$}  {:<host_w$}  {:>lat_w$}", e.rank, e.candidate.host, status);
    }
}
