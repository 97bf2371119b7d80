use crate::types::{FailureReason, HostKind, ProbeOutcome, RankedEntry, RunResult};
use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Label appended to each endpoint line in the text format.
pub const DEFAULT_LABEL: &str = "preferred";

/// Line template used by [`Format::Template`] when none is given.
pub const DEFAULT_TEMPLATE: &str = "{host}:{port}#{label} {latency}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
    /// One line per entry rendered from a user template (subscription lines).
    Template,
}

/// Format plus the settings the line-based formats need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStyle {
    pub format: Format,
    pub label: String,
    pub template: String,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            format: Format::Text,
            label: DEFAULT_LABEL.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Serializable view of one ranked entry.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub rank: usize,
    pub host: String,
    pub port: u16,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub reason: Option<FailureReason>,
}

/// Serializable view of a run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Report {
    pub generated_at: String,
    pub port: u16,
    pub total_candidates: usize,
    pub reachable: usize,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn from_result(result: &RunResult) -> Self {
        Self {
            generated_at: now_rfc3339(),
            port: result.port,
            total_candidates: result.total_candidates,
            reachable: result.reachable,
            entries: result
                .entries
                .iter()
                .map(|e| entry_view(e, result.port))
                .collect(),
        }
    }
}

fn entry_view(e: &RankedEntry, port: u16) -> ReportEntry {
    let (latency_ms, reason) = match e.outcome {
        ProbeOutcome::Reachable { latency } => (Some(round2(latency.as_secs_f64() * 1000.0)), None),
        ProbeOutcome::Unreachable { reason } => (None, Some(reason)),
    };
    ReportEntry {
        rank: e.rank,
        host: e.candidate.host.clone(),
        port,
        reachable: e.outcome.is_reachable(),
        latency_ms,
        reason,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `host:port` with IPv6 hosts bracketed.
pub fn endpoint(entry: &RankedEntry, port: u16) -> String {
    format!("{}:{port}", uri_host(entry))
}

fn uri_host(entry: &RankedEntry) -> String {
    match entry.candidate.kind {
        HostKind::Ip(ip) if ip.is_ipv6() => format!("[{}]", entry.candidate.host),
        _ => entry.candidate.host.clone(),
    }
}

/// One line per entry, `host:port#label 12.34ms` or `host:port#label timeout`.
pub fn render_lines(result: &RunResult, label: &str) -> Vec<String> {
    result
        .entries
        .iter()
        .map(|e| {
            let status = match e.outcome {
                ProbeOutcome::Reachable { latency } => {
                    format!("{:.2}ms", latency.as_secs_f64() * 1000.0)
                }
                ProbeOutcome::Unreachable { reason } => reason.as_str().to_string(),
            };
            format!("{}#{label} {status}", endpoint(e, result.port))
        })
        .collect()
}

/// One line per entry from `template`.
///
/// Placeholders: `{host}` (IPv6 bracketed), `{port}`, `{label}`, `{rank}` and
/// `{latency}`, which is whole milliseconds such as `12ms` or the failure
/// reason. Any other text is copied verbatim.
pub fn render_template(result: &RunResult, template: &str, label: &str) -> Vec<String> {
    result
        .entries
        .iter()
        .map(|e| {
            let latency = match e.outcome {
                ProbeOutcome::Reachable { latency } => {
                    format!("{}ms", (latency.as_secs_f64() * 1000.0).round())
                }
                ProbeOutcome::Unreachable { reason } => reason.as_str().to_string(),
            };
            template
                .replace("{host}", &uri_host(e))
                .replace("{port}", &result.port.to_string())
                .replace("{label}", label)
                .replace("{rank}", &e.rank.to_string())
                .replace("{latency}", &latency)
        })
        .collect()
}

/// Full text report: summary header followed by the ranked lines.
pub fn render_text(result: &RunResult, label: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# generated: {}", now_rfc3339());
    let _ = writeln!(out, "# port: {}", result.port);
    let _ = writeln!(
        out,
        "# reachable: {} of {} candidates",
        result.reachable, result.total_candidates
    );
    let _ = writeln!(out, "# listed: {}", result.entries.len());
    for line in render_lines(result, label) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn to_json(result: &RunResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Report::from_result(result))?)
}

/// Write the report to `path` in the requested style.
pub fn write_report(path: &Path, result: &RunResult, style: &ReportStyle) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    match style.format {
        Format::Text => file.write_all(render_text(result, &style.label).as_bytes())?,
        Format::Json => serde_json::to_writer_pretty(&mut file, &Report::from_result(result))?,
        Format::Template => {
            for line in render_template(result, &style.template, &style.label) {
                writeln!(file, "{line}")?;
            }
        }
    }
    Ok(())
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::normalize;
    use std::time::Duration;

    fn sample() -> RunResult {
        let cs = normalize(["104.16.0.1", "2606:4700::1", "cf.example.com"]);
        RunResult {
            port: 443,
            total_candidates: 3,
            reachable: 2,
            entries: vec![
                RankedEntry {
                    rank: 1,
                    candidate: cs[0].clone(),
                    outcome: ProbeOutcome::Reachable {
                        latency: Duration::from_micros(12_346),
                    },
                },
                RankedEntry {
                    rank: 2,
                    candidate: cs[1].clone(),
                    outcome: ProbeOutcome::Reachable {
                        latency: Duration::from_millis(40),
                    },
                },
                RankedEntry {
                    rank: 3,
                    candidate: cs[2].clone(),
                    outcome: ProbeOutcome::Unreachable {
                        reason: FailureReason::Timeout,
                    },
                },
            ],
        }
    }

    #[test]
    fn lines_use_endpoint_label_and_latency() {
        let lines = render_lines(&sample(), "cf");
        assert_eq!(
            lines,
            vec![
                "104.16.0.1:443#cf 12.35ms",
                "[2606:4700::1]:443#cf 40.00ms",
                "cf.example.com:443#cf timeout",
            ]
        );
    }

    #[test]
    fn template_fills_every_placeholder() {
        let template = "vless://id@{host}:{port}?security=tls#{label}-{rank} | {latency}";
        let lines = render_template(&sample(), template, "cf");
        assert_eq!(
            lines,
            vec![
                "vless://id@104.16.0.1:443?security=tls#cf-1 | 12ms",
                "vless://id@[2606:4700::1]:443?security=tls#cf-2 | 40ms",
                "vless://id@cf.example.com:443?security=tls#cf-3 | timeout",
            ]
        );
    }

    #[test]
    fn default_template_matches_plain_lines() {
        let lines = render_template(&sample(), DEFAULT_TEMPLATE, "cf");
        assert_eq!(lines[0], "104.16.0.1:443#cf 12ms");
        assert_eq!(lines[1], "[2606:4700::1]:443#cf 40ms");
    }

    #[test]
    fn template_report_is_written_line_per_entry() {
        let path = std::env::temp_dir().join(format!("edge-rank-tpl-{}.txt", std::process::id()));
        let style = ReportStyle {
            format: Format::Template,
            template: "{host} {latency}".into(),
            ..ReportStyle::default()
        };
        write_report(&path, &sample(), &style).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(
            written,
            "104.16.0.1 12ms\n[2606:4700::1] 40ms\ncf.example.com timeout\n"
        );
    }

    #[test]
    fn text_has_summary_header() {
        let text = render_text(&sample(), DEFAULT_LABEL);
        assert!(text.contains("# reachable: 2 of 3 candidates"));
        assert!(text.ends_with("cf.example.com:443#preferred timeout\n"));
    }

    #[test]
    fn json_view() {
        let json = to_json(&sample()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["entries"][0]["latency_ms"], 12.35);
        assert_eq!(v["entries"][2]["reason"], "timeout");
        assert_eq!(v["entries"][2]["reachable"], false);
    }
}
