use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use shared::models::*;
use shared::{Tally, TallyError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::fanout::Fanout;
use crate::store::{StoreError, VoteStore};

#[derive(Debug, Error)]
pub enum ResyncError {
    #[error("Unknown round {0}")]
    UnknownRound(RoundId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Ledger holds an uncountable vote: {0}")]
    Tally(#[from] TallyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecountReport {
    pub round_id: RoundId,
    /// Votes present in the ledger that the cache had missed.
    pub drift: u64,
    pub total: u64,
}

struct RoundTally {
    candidates: Vec<Candidate>,
    tally: Mutex<Tally>,
    /// Serialises recounts of this round.
    recount: tokio::sync::Mutex<()>,
}

/// In-memory per-round counts derived from the ledger.
pub struct TallyAggregator {
    rounds: HashMap<RoundId, RoundTally>,
    fanout: Arc<Fanout>,
}

fn lock(tally: &Mutex<Tally>) -> MutexGuard<'_, Tally> {
    tally.lock().unwrap_or_else(|poisoned| {
        error!("Tally lock poisoned, continuing with last state");
        poisoned.into_inner()
    })
}

impl TallyAggregator {
    pub fn new(rounds: &[VotingRound]) -> Self {
        let rounds: HashMap<_, _> = rounds.iter()
            .map(|round| {
                let entry = RoundTally {
                    candidates: round.candidates.clone(),
                    tally: Mutex::new(Tally::new(round.id.clone(), round.candidates.clone())),
                    recount: tokio::sync::Mutex::new(()),
                };
                (round.id.clone(), entry)
            })
            .collect();
        let fanout = Fanout::new(rounds.values().map(|entry| lock(&entry.tally).snapshot()));
        Self { rounds, fanout: Arc::new(fanout) }
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    /// Counts a vote the ledger has just stored. Repeated notifications for
    /// the same voter are ignored. Returns the snapshot including the vote.
    pub fn on_vote_accepted(&self, vote: &Vote) -> Option<TallySnapshot> {
        let Some(entry) = self.rounds.get(&vote.round_id) else {
            error!("Accepted vote {} for unknown round {}", vote.id, vote.round_id);
            return None;
        };

        let mut tally = lock(&entry.tally);
        match tally.record(vote) {
            Ok(changed) => {
                let snapshot = tally.snapshot();
                if changed {
                    // Published under the lock so subscribers see totals in order.
                    self.fanout.publish(snapshot.clone());
                }
                Some(snapshot)
            }
            Err(e) => {
                error!("Could not count vote {}: {}", vote.id, e);
                None
            }
        }
    }

    /// Served from memory, never waits on storage.
    pub fn snapshot(&self, round_id: &RoundId) -> Option<TallySnapshot> {
        self.rounds.get(round_id).map(|entry| lock(&entry.tally).snapshot())
    }

    pub fn has_counted(&self, round_id: &RoundId, identity: IdentityKey) -> bool {
        self.rounds.get(round_id).is_some_and(|entry| lock(&entry.tally).has_voted(identity))
    }

    /// Pure recount from the ledger, leaving the cache untouched.
    pub async fn recount(&self, round_id: &RoundId, store: &dyn VoteStore) -> Result<TallySnapshot, ResyncError> {
        let entry = self.rounds.get(round_id).ok_or_else(|| ResyncError::UnknownRound(round_id.clone()))?;
        let votes = store.round_votes(round_id).await?;
        Ok(Tally::from_votes(round_id.clone(), entry.candidates.clone(), &votes)?.snapshot())
    }

    /// Rebuilds the cache from a full ledger scan. Votes counted after the
    /// scan started are carried over, so the total never shrinks.
    pub async fn resync(&self, round_id: &RoundId, store: &dyn VoteStore) -> Result<RecountReport, ResyncError> {
        let entry = self.rounds.get(round_id).ok_or_else(|| ResyncError::UnknownRound(round_id.clone()))?;
        let _serial = entry.recount.lock().await;

        let votes = store.round_votes(round_id).await?;
        let mut rebuilt = Tally::from_votes(round_id.clone(), entry.candidates.clone(), &votes)?;

        let mut tally = lock(&entry.tally);
        let before = tally.total();
        rebuilt.absorb(&tally);
        let drift = rebuilt.total() - before;
        *tally = rebuilt;

        if drift > 0 {
            warn!("Recount of round {} found {} uncounted vote(s)", round_id, drift);
            self.fanout.publish(tally.snapshot());
        }

        Ok(RecountReport { round_id: round_id.clone(), drift, total: tally.total() })
    }

    pub async fn resync_all(&self, store: &dyn VoteStore) -> Vec<Result<RecountReport, ResyncError>> {
        let mut reports = Vec::with_capacity(self.rounds.len());
        for round_id in self.rounds.keys() {
            reports.push(self.resync(round_id, store).await);
        }
        reports
    }

    /// Compares ledger counts with the cache and recounts rounds that disagree.
    pub async fn reconcile(&self, store: &dyn VoteStore) -> Vec<RecountReport> {
        let mut reports = Vec::new();
        for round_id in self.rounds.keys() {
            let stored = match store.count_round_votes(round_id).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Skipping reconcile of round {}: {}", round_id, e);
                    continue;
                }
            };
            let cached = self.snapshot(round_id).map_or(0, |s| s.total);
            if stored == cached {
                continue;
            }

            info!("Round {} ledger has {} vote(s), cache {}; recounting", round_id, stored, cached);
            match self.resync(round_id, store).await {
                Ok(report) => reports.push(report),
                Err(e) => error!("Recount of round {} failed: {}", round_id, e),
            }
        }
        reports
    }
}
