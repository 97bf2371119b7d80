use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    config::RankConfig,
    engine,
    report::{self, Report, ReportStyle},
    scanner::SharedProgress,
    sources::{CandidateSource, CidrSource, FileSource, StaticSource, DEFAULT_PER_RANGE},
    types::RunResult,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug, Default)]
struct ServerState {
    state: RunState,
    results: Option<RunResult>,
    progress: Option<SharedProgress>,
    last_request: Option<RunRequest>,
    output: Option<(PathBuf, ReportStyle)>,
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Status {
    pub state: RunState,
    pub total: u64,
    pub probed: u64,
    pub reachable: u64,
}

/// Body of `POST /api/run`: candidate inputs plus optional config overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RunRequest {
    pub candidates: Vec<String>,
    pub cidrs: Vec<String>,
    pub per_range: Option<usize>,
    /// Candidate files re-read on every run. Only the startup seed sets these.
    #[serde(skip)]
    pub files: Vec<PathBuf>,
    #[serde(flatten)]
    pub config: RankConfig,
}

impl RunRequest {
    fn raw_candidates(&self) -> Result<Vec<String>> {
        let per_range = self.per_range.unwrap_or(DEFAULT_PER_RANGE);
        let listed = StaticSource::new("request", self.candidates.clone());
        let cidrs = CidrSource::parse(&self.cidrs, per_range)?;
        let files: Vec<FileSource> = self
            .files
            .iter()
            .map(|p| FileSource::new(p.clone()))
            .collect();

        let mut sources: Vec<&dyn CandidateSource> = Vec::new();
        sources.push(&listed);
        sources.push(&cidrs);
        sources.extend(files.iter().map(|f| f as &dyn CandidateSource));
        Ok(engine::collect_sources(&sources))
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
        }
    }

    /// Seed the configuration that periodic refreshes re-run.
    pub async fn with_request(self, req: RunRequest) -> Self {
        self.inner.write().await.last_request = Some(req);
        self
    }

    /// Write every successful run's ranking to `path`.
    pub async fn with_output(self, path: impl Into<PathBuf>, style: ReportStyle) -> Self {
        self.inner.write().await.output = Some((path.into(), style));
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/run", post(post_run))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `cancel` fires, refreshing every `refresh` if set.
pub async fn spawn_server(
    bind: &str,
    state: AppState,
    refresh: Option<Duration>,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(every) = refresh {
        tokio::spawn(refresh_loop(state.clone(), every, cancel.clone()));
    }

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("serving API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

/// Re-run the last accepted request on a fixed interval.
pub async fn refresh_loop(state: AppState, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let req = {
            let s = state.inner.read().await;
            if s.state == RunState::Running {
                continue;
            }
            s.last_request.clone()
        };
        if let Some(req) = req {
            info!("periodic refresh");
            if let Err(e) = start_run(&state, req).await {
                error!("refresh skipped: {e}");
            }
        }
    }
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let out = match (s.progress.as_ref(), s.results.as_ref()) {
        (Some(p), _) => {
            let (total, probed, reachable) = p.snapshot();
            Status {
                state: s.state,
                total,
                probed,
                reachable,
            }
        }
        (None, Some(r)) => Status {
            state: s.state,
            total: r.total_candidates as u64,
            probed: r.total_candidates as u64,
            reachable: r.reachable as u64,
        },
        (None, None) => Status {
            state: s.state,
            ..Status::default()
        },
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(res) = s.results.as_ref() {
        (StatusCode::OK, Json(Report::from_result(res))).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_run(State(app): State<AppState>, Json(req): Json<RunRequest>) -> impl IntoResponse {
    match start_run(&app, req).await {
        Ok(()) => {
            let running = Status {
                state: RunState::Running,
                ..Status::default()
            };
            (StatusCode::ACCEPTED, Json(running)).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Validate a request and start a background run for it.
async fn start_run(app: &AppState, req: RunRequest) -> Result<()> {
    req.config.validate()?;
    let raw = req.raw_candidates()?;
    let progress = SharedProgress::new();

    {
        let mut s = app.inner.write().await;
        if s.state == RunState::Running {
            anyhow::bail!("a run is already in progress");
        }
        s.state = RunState::Running;
        s.progress = Some(progress.clone());
        s.last_request = Some(req.clone());
    }

    let app2 = app.clone();
    tokio::spawn(async move {
        let res = engine::run_with_progress(raw, &req.config, progress).await;

        let output = app2.inner.read().await.output.clone();
        if let (Ok(results), Some((path, style))) = (&res, output.as_ref()) {
            match report::write_report(path, results, style) {
                Ok(()) => info!(
                    path = %path.display(),
                    entries = results.entries.len(),
                    "wrote report"
                ),
                Err(e) => error!("failed to write report: {e:#}"),
            }
        }

        let mut s = app2.inner.write().await;
        s.progress = None;
        match res {
            Ok(results) => {
                s.state = RunState::Done;
                s.results = Some(results);
            }
            Err(e) => {
                s.state = RunState::Idle;
                error!("run error: {e}");
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_defaults_and_overrides() {
        let req: RunRequest = serde_json::from_value(serde_json::json!({
            "candidates": ["a.example.com"],
            "cidrs": ["10.0.0.0/30"],
            "top": 5,
            "port": 8443,
        }))
        .unwrap();
        assert_eq!(req.config.top, 5);
        assert_eq!(req.config.probe.port, 8443);
        assert_eq!(
            req.raw_candidates().unwrap(),
            vec!["a.example.com", "10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn candidate_files_are_reread() {
        let name = format!("edge-rank-seed-{}.txt", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, "a.example.com\n").unwrap();
        let req = RunRequest {
            files: vec![path.clone()],
            ..RunRequest::default()
        };
        assert_eq!(req.raw_candidates().unwrap(), vec!["a.example.com"]);

        std::fs::write(&path, "b.example.com\n10.0.0.7:443\n").unwrap();
        let second = req.raw_candidates().unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(second, vec!["b.example.com", "10.0.0.7"]);
    }

    #[test]
    fn files_cannot_come_from_the_request_body() {
        let req: RunRequest =
            serde_json::from_str(r#"{"candidates": ["a.example.com"], "files": ["/etc/hosts"]}"#)
                .unwrap();
        assert!(req.files.is_empty());
    }

    #[test]
    fn bad_cidr_rejected() {
        let req = RunRequest {
            cidrs: vec!["nope".into()],
            ..RunRequest::default()
        };
        assert!(req.raw_candidates().is_err());
    }
}
