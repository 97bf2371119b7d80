use crate::types::{Candidate, ProbeOutcome, RankedEntry};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Best known outcome per candidate identity.
pub type Merged = HashMap<String, (Candidate, ProbeOutcome)>;

/// Merge outcomes keyed by candidate identity, keeping the better result.
///
/// Reachable beats unreachable, lower latency beats higher, and between two
/// failures the lower reason wins. The kept candidate metadata is the
/// earliest-seen one. The result does not depend on input order.
pub fn merge<I>(outcomes: I) -> Merged
where
    I: IntoIterator<Item = (Candidate, ProbeOutcome)>,
{
    let mut merged = Merged::new();
    for (candidate, outcome) in outcomes {
        match merged.get_mut(&candidate.key) {
            Some((kept, best)) => {
                if compare_outcomes(&outcome, best) == Ordering::Less {
                    *best = outcome;
                }
                if (candidate.seq, &candidate.host) < (kept.seq, &kept.host) {
                    *kept = candidate;
                }
            }
            None => {
                merged.insert(candidate.key.clone(), (candidate, outcome));
            }
        }
    }
    merged
}

/// Order outcomes best first: reachable by latency, then failures by reason.
pub fn compare_outcomes(a: &ProbeOutcome, b: &ProbeOutcome) -> Ordering {
    use ProbeOutcome::*;
    match (a, b) {
        (Reachable { latency: x }, Reachable { latency: y }) => x.cmp(y),
        (Reachable { .. }, Unreachable { .. }) => Ordering::Less,
        (Unreachable { .. }, Reachable { .. }) => Ordering::Greater,
        (Unreachable { reason: x }, Unreachable { reason: y }) => x.cmp(y),
    }
}

/// Rank merged outcomes: reachable first by ascending latency, ties and all
/// unreachable entries in first-seen order.
pub fn rank(merged: Merged) -> Vec<RankedEntry> {
    let mut pairs: Vec<(Candidate, ProbeOutcome)> = merged.into_values().collect();
    pairs.sort_by(|(ca, oa), (cb, ob)| {
        oa.is_reachable()
            .cmp(&ob.is_reachable())
            .reverse()
            .then_with(|| oa.latency().cmp(&ob.latency()))
            .then_with(|| ca.seq.cmp(&cb.seq))
            .then_with(|| ca.key.cmp(&cb.key))
    });
    pairs
        .into_iter()
        .enumerate()
        .map(|(i, (candidate, outcome))| RankedEntry {
            rank: i + 1,
            candidate,
            outcome,
        })
        .collect()
}

/// The first `n` entries of a ranking, or all of them if there are fewer.
pub fn top_n(mut ranked: Vec<RankedEntry>, n: usize) -> Vec<RankedEntry> {
    ranked.truncate(n);
    ranked
}
