mod model;
pub mod manual;
pub mod memory;
pub mod session;
pub mod store;

use log::{debug, info};

use std::cmp::Ordering;
use std::collections::HashMap;

pub use crate::memory::MemoryStore;
pub use crate::model::*;
pub use crate::session::{tally_session, SessionManager};
pub use crate::store::VotingStore;

/// Computes the ranked results of a session.
///
/// Arguments:
/// * `candidates` the candidate-flagged parents of the session. Candidates without
/// any vote are still reported, with a count of zero.
/// * `vote_counts` the number of votes received by each candidate id
/// * `total_votes` the number of votes cast in the session (skipped voters excluded)
/// * `total_parents` the number of parents registered in the session
///
/// Candidates are ranked by decreasing number of votes. Equal counts are ordered
/// by name and then by id. Ties are reported but never resolved.
pub fn run_tally(
    candidates: &[Parent],
    vote_counts: &HashMap<ParentId, u64>,
    total_votes: u64,
    total_parents: u64,
) -> TallyResult {
    info!(
        "Tallying {} votes for {} candidates ({} parents)",
        total_votes,
        candidates.len(),
        total_parents
    );

    let mut ranked: Vec<CandidateResult> = candidates
        .iter()
        .map(|c| {
            let votes = vote_counts.get(&c.id).cloned().unwrap_or(0);
            CandidateResult {
                candidate_id: c.id,
                name: c.name.clone(),
                votes,
                percentage: percentage(votes, total_votes),
            }
        })
        .collect();
    ranked.sort_by(compare_results);
    debug!("run_tally: ranked: {:?}", ranked);

    let winner = placement(&ranked, 0);
    let deputy = placement(&ranked, 1);
    let turnout = percentage(total_votes, total_parents);

    if let Some(w) = &winner {
        info!(
            "Winner: {} ({} votes, {}%){}",
            w.result.name,
            w.result.votes,
            w.result.percentage,
            if w.tied { " - TIE" } else { "" }
        );
    }
    if let Some(d) = &deputy {
        info!(
            "Deputy: {} ({} votes, {}%){}",
            d.result.name,
            d.result.votes,
            d.result.percentage,
            if d.tied { " - TIE" } else { "" }
        );
    }

    TallyResult {
        ranked,
        winner,
        deputy,
        total_votes,
        total_parents,
        turnout,
    }
}

fn compare_results(a: &CandidateResult, b: &CandidateResult) -> Ordering {
    b.votes
        .cmp(&a.votes)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

// Only the next rank is looked at for ties.
fn placement(ranked: &[CandidateResult], rank: usize) -> Option<Placement> {
    let result = ranked.get(rank)?.clone();
    let tied = ranked
        .get(rank + 1)
        .map(|next| next.votes == result.votes)
        .unwrap_or(false);
    Some(Placement { result, tied })
}

/// `part / whole` as a percentage rounded to one decimal, or 0 if `whole` is 0.
///
/// Halves round to the even neighbour: 1 of 16 is 6.2%, 3 of 16 is 18.8%.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    round_half_even(pct * 10.0) / 10.0
}

fn round_half_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    }
}
