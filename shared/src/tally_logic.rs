use std::collections::HashMap;
use thiserror::Error;

use crate::models::{Candidate, CandidateTally, IdentityKey, RoundId, TallySnapshot, Vote};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("Candidate {0} is not on the ballot")]
    UnknownCandidate(Candidate),
    #[error("Vote belongs to round {found}, expected {expected}")]
    WrongRound { expected: RoundId, found: RoundId },
}

/// Percentages per candidate. Nobody voting yet yields the equal split.
pub fn shares(counts: &[u64]) -> Vec<f64> {
    if counts.is_empty() {
        return Vec::new();
    }
    let total: u64 = counts.iter().sum();
    if total == 0 {
        let even = 100.0 / counts.len() as f64;
        return vec![even; counts.len()];
    }
    counts.iter()
        .map(|&votes| votes as f64 * 100.0 / total as f64)
        .collect()
}

/// Counts for one round, remembering who has been counted so that
/// recording the same voter twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    round_id: RoundId,
    candidates: Vec<Candidate>,
    counts: Vec<u64>,
    voters: HashMap<IdentityKey, usize>,
}

impl Tally {
    pub fn new(round_id: RoundId, candidates: Vec<Candidate>) -> Self {
        let counts = vec![0; candidates.len()];
        Self { round_id, candidates, counts, voters: HashMap::new() }
    }

    /// Full recount of `votes`. Votes for other rounds are skipped.
    pub fn from_votes<'a>(
        round_id: RoundId,
        candidates: Vec<Candidate>,
        votes: impl IntoIterator<Item = &'a Vote>,
    ) -> Result<Self, TallyError> {
        let mut tally = Self::new(round_id.clone(), candidates);
        for vote in votes.into_iter().filter(|v| v.round_id == round_id) {
            tally.record(vote)?;
        }
        Ok(tally)
    }

    /// Returns `false` when the voter was already counted.
    pub fn record(&mut self, vote: &Vote) -> Result<bool, TallyError> {
        if vote.round_id != self.round_id {
            return Err(TallyError::WrongRound {
                expected: self.round_id.clone(),
                found: vote.round_id.clone(),
            });
        }
        self.record_choice(vote.identity, &vote.candidate)
    }

    fn record_choice(&mut self, voter: IdentityKey, candidate: &Candidate) -> Result<bool, TallyError> {
        let idx = self.candidates.iter()
            .position(|c| c == candidate)
            .ok_or_else(|| TallyError::UnknownCandidate(candidate.clone()))?;
        if self.voters.contains_key(&voter) {
            return Ok(false);
        }
        self.voters.insert(voter, idx);
        self.counts[idx] += 1;
        Ok(true)
    }

    /// Adds every voter counted in `other` but missing here; returns how many.
    pub fn absorb(&mut self, other: &Tally) -> usize {
        let mut added = 0;
        for (&voter, &idx) in &other.voters {
            let Some(candidate) = other.candidates.get(idx) else { continue };
            if let Ok(true) = self.record_choice(voter, candidate) {
                added += 1;
            }
        }
        added
    }

    pub fn has_voted(&self, voter: IdentityKey) -> bool {
        self.voters.contains_key(&voter)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn round_id(&self) -> &RoundId {
        &self.round_id
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let shares = shares(&self.counts);
        TallySnapshot {
            round_id: self.round_id.clone(),
            candidates: self.candidates.iter()
                .zip(&self.counts)
                .zip(shares)
                .map(|((candidate, &votes), share)| CandidateTally {
                    candidate: candidate.clone(),
                    votes,
                    share,
                })
                .collect(),
            total: self.total(),
        }
    }
}
