use crate::candidate;
use crate::config::{ConfigError, RankConfig};
use crate::rank;
use crate::scanner::{self, SharedProgress};
use crate::sources::CandidateSource;
use crate::types::{RunResult, RunStatus};
use tokio::time::Instant;
use tracing::{info, warn};

/// Normalize, probe, merge and rank one batch of raw endpoints.
pub async fn run<I, S>(raw: I, cfg: &RankConfig) -> Result<RunResult, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    run_with_progress(raw, cfg, SharedProgress::new()).await
}

pub async fn run_with_progress<I, S>(
    raw: I,
    cfg: &RankConfig,
    progress: SharedProgress,
) -> Result<RunResult, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cfg.validate()?;

    let candidates = candidate::normalize(raw);
    let total_candidates = candidates.len();
    info!(
        candidates = total_candidates,
        port = cfg.probe.port,
        concurrency = cfg.probe.effective_concurrency(),
        attempts = cfg.probe.attempts,
        timeout_ms = cfg.probe.timeout_ms,
        "probing candidates"
    );

    let started = Instant::now();
    let outcomes = scanner::probe_all_with_progress(candidates, &cfg.probe, progress).await;
    let ranked = rank::rank(rank::merge(outcomes));
    let reachable = ranked.iter().filter(|e| e.outcome.is_reachable()).count();

    let result = RunResult {
        port: cfg.probe.port,
        total_candidates,
        reachable,
        entries: rank::top_n(ranked, cfg.top),
    };

    match result.status() {
        RunStatus::Ranked => info!(
            reachable,
            total = total_candidates,
            elapsed = ?started.elapsed(),
            "ranking complete"
        ),
        RunStatus::NoCandidates => warn!("no valid candidates to probe"),
        RunStatus::NoneReachable => warn!(total = total_candidates, "no candidate was reachable"),
    }
    Ok(result)
}

/// Gather raw endpoints from every source in order, skipping sources that fail.
pub fn collect_sources(sources: &[&dyn CandidateSource]) -> Vec<String> {
    let mut raw = Vec::new();
    for source in sources {
        match source.candidates() {
            Ok(items) => {
                info!(source = source.name(), entries = items.len(), "loaded candidates");
                raw.extend(items);
            }
            Err(e) => warn!(source = source.name(), error = %e, "skipping candidate source"),
        }
    }
    raw
}

/// Run over the merged output of several candidate sources.
pub async fn run_sources(
    sources: &[&dyn CandidateSource],
    cfg: &RankConfig,
) -> Result<RunResult, ConfigError> {
    run(collect_sources(sources), cfg).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticSource;

    #[tokio::test]
    async fn invalid_config_is_rejected_before_probing() {
        let cfg = RankConfig {
            top: 0,
            ..RankConfig::default()
        };
        let err = run(["127.0.0.1"], &cfg).await.unwrap_err();
        assert_eq!(err, ConfigError::ZeroTop);
    }

    #[tokio::test]
    async fn nothing_valid_reports_no_candidates() {
        let res = run(["https://x.example", "bad..domain"], &RankConfig::default())
            .await
            .unwrap();
        assert_eq!(res.status(), RunStatus::NoCandidates);
        assert!(res.entries.is_empty());
    }

    struct Broken;

    impl CandidateSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn candidates(&self) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("feed unavailable")
        }
    }

    #[test]
    fn failing_source_is_skipped() {
        let a = StaticSource::new("a", ["a.example.com", "b.example.com"]);
        let b = StaticSource::new("b", ["b.example.com"]);
        let sources: [&dyn CandidateSource; 3] = [&a, &Broken, &b];
        let raw = collect_sources(&sources);
        assert_eq!(raw, vec!["a.example.com", "b.example.com", "b.example.com"]);
    }
}
