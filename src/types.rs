use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// What kind of endpoint a candidate names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Ip(IpAddr),
    Domain,
}

/// One normalized endpoint considered for probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    /// Display form: first-seen casing for names, canonical text for IP literals.
    pub host: String,
    /// Identity used for deduplication and merging.
    pub key: String,
    pub kind: HostKind,
    /// Position in the normalized sequence the candidate was first observed at.
    pub seq: usize,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

/// Why every trial against a candidate failed.
///
/// Variant order doubles as the merge preference between two failures.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    Refused,
    Resolution,
    Network,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Refused => "refused",
            FailureReason::Resolution => "unresolved",
            FailureReason::Network => "unreachable",
        }
    }
}

/// Result of probing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { latency: Duration },
    Unreachable { reason: FailureReason },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Reachable { latency } => Some(*latency),
            ProbeOutcome::Unreachable { .. } => None,
        }
    }
}

/// A candidate with its best outcome and its 1-based position in the ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub rank: usize,
    pub candidate: Candidate,
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ranked,
    NoCandidates,
    NoneReachable,
}

/// Outcome of one full run, truncated to the configured top-N.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub port: u16,
    pub total_candidates: usize,
    pub reachable: usize,
    pub entries: Vec<RankedEntry>,
}

impl RunResult {
    pub fn status(&self) -> RunStatus {
        if self.total_candidates == 0 {
            RunStatus::NoCandidates
        } else if self.reachable == 0 {
            RunStatus::NoneReachable
        } else {
            RunStatus::Ranked
        }
    }
}
