use crate::config::ProbeConfig;
use crate::prober;
use crate::types::{Candidate, FailureReason, ProbeOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, warn};

/// Progress counters that can be observed while a run is in flight.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub total: Arc<AtomicU64>,
    pub done: Arc<AtomicU64>,
    pub reachable: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            done: Arc::new(AtomicU64::new(0)),
            reachable: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `(total, done, reachable)` at this instant.
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.done.load(Ordering::Relaxed),
            self.reachable.load(Ordering::Relaxed),
        )
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe every candidate using asynchronous TCP connects with a concurrency limit.
///
/// - Limits in-flight probes using a `Semaphore`; a permit is taken before each
///   task is spawned and held until the probe returns.
/// - Returns exactly one outcome per candidate, in completion order.
/// - A probe task that panics is recorded as unreachable instead of being lost.
pub async fn probe_all(
    candidates: Vec<Candidate>,
    cfg: &ProbeConfig,
) -> Vec<(Candidate, ProbeOutcome)> {
    probe_all_with_progress(candidates, cfg, SharedProgress::new()).await
}

/// Variant that reports progress through caller-owned counters.
pub async fn probe_all_with_progress(
    candidates: Vec<Candidate>,
    cfg: &ProbeConfig,
    progress: SharedProgress,
) -> Vec<(Candidate, ProbeOutcome)> {
    let total = candidates.len();
    progress.total.store(total as u64, Ordering::Relaxed);
    progress.done.store(0, Ordering::Relaxed);
    progress.reachable.store(0, Ordering::Relaxed);

    let sem = Arc::new(Semaphore::new(cfg.effective_concurrency()));
    let mut set = JoinSet::new();
    let mut in_flight: HashMap<Id, Candidate> = HashMap::with_capacity(total);
    let mut results = Vec::with_capacity(total);
    let (port, timeout, attempts) = (cfg.port, cfg.timeout(), cfg.attempts);

    for candidate in candidates {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore in scope");
        let progress = progress.clone();
        let tracked = candidate.clone();

        let handle = set.spawn(async move {
            let _permit = permit; // keep permit until the probe completes
            let outcome = prober::probe(&candidate, port, timeout, attempts).await;
            match outcome {
                ProbeOutcome::Reachable { latency } => {
                    progress.reachable.fetch_add(1, Ordering::Relaxed);
                    debug!(host = %candidate, ?latency, "reachable");
                }
                ProbeOutcome::Unreachable { reason } => {
                    debug!(host = %candidate, reason = reason.as_str(), "unreachable");
                }
            }
            progress.done.fetch_add(1, Ordering::Relaxed);
            (candidate, outcome)
        });
        in_flight.insert(handle.id(), tracked);
    }

    while let Some(res) = set.join_next_with_id().await {
        match res {
            Ok((id, pair)) => {
                in_flight.remove(&id);
                results.push(pair);
            }
            Err(err) => {
                if let Some(candidate) = in_flight.remove(&err.id()) {
                    warn!(host = %candidate, error = %err, "probe task failed");
                    progress.done.fetch_add(1, Ordering::Relaxed);
                    results.push((candidate, lost()));
                }
            }
        }
    }

    results
}

fn lost() -> ProbeOutcome {
    ProbeOutcome::Unreachable {
        reason: FailureReason::Network,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::normalize;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn every_candidate_yields_one_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let candidates = normalize(["127.0.0.1", "127.0.0.2", "127.0.0.3", "localhost"]);
        let cfg = ProbeConfig {
            port,
            timeout_ms: 500,
            attempts: 1,
            concurrency: 2,
        };

        let progress = SharedProgress::new();
        let results = probe_all_with_progress(candidates, &cfg, progress.clone()).await;
        assert_eq!(results.len(), 4);
        let (total, done, _) = progress.snapshot();
        assert_eq!((total, done), (4, 4));
        assert!(results
            .iter()
            .any(|(c, o)| c.host == "127.0.0.1" && o.is_reachable()));
    }

    #[tokio::test]
    async fn empty_input_returns_empty() {
        let results = probe_all(Vec::new(), &ProbeConfig::default()).await;
        assert!(results.is_empty());
    }
}
