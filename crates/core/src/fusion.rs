use crate::{Candidate, FusedCandidate, SearchType};
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct ResultFuser;

impl ResultFuser {
    /// Overlapping ids take the mean of both stage scores, unnormalized.
    /// Equal scores keep first-seen order: lexical input first, then vector-only.
    pub fn fuse(
        &self,
        lexical: Vec<Candidate>,
        vector: Vec<Candidate>,
        limit: usize,
    ) -> Vec<FusedCandidate> {
        let mut fused: Vec<FusedCandidate> = Vec::with_capacity(lexical.len() + vector.len());
        let mut positions = HashMap::<String, usize>::new();

        for candidate in lexical {
            if positions.contains_key(&candidate.id) {
                continue;
            }
            positions.insert(candidate.id.clone(), fused.len());
            fused.push(FusedCandidate {
                combined_score: finite_or_zero(candidate.score),
                vector_score: None,
                candidate,
            });
        }

        let mut vector_seen = HashSet::<String>::new();
        for candidate in vector {
            if !vector_seen.insert(candidate.id.clone()) {
                continue;
            }

            let vector_score = finite_or_zero(candidate.score);
            match positions.get(&candidate.id) {
                Some(&position) => {
                    let entry = &mut fused[position];
                    entry.combined_score =
                        (finite_or_zero(entry.candidate.score) + vector_score) / 2.0;
                    entry.vector_score = Some(vector_score);
                    entry.candidate.search_type = SearchType::Hybrid;
                }
                None => {
                    positions.insert(candidate.id.clone(), fused.len());
                    fused.push(FusedCandidate {
                        combined_score: vector_score,
                        vector_score: None,
                        candidate,
                    });
                }
            }
        }

        // `sort_by` is stable, which is what keeps the first-seen tie order.
        fused.sort_by(|left, right| right.combined_score.total_cmp(&left.combined_score));
        fused.truncate(limit);

        info!(count = fused.len(), "fused candidate lists");
        fused
    }
}

fn finite_or_zero(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
