use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shared::models::*;
use shared::{normalize_ballot, parse_candidate, RejectReason};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::store::{InsertOutcome, StoreError, VoteStore};
use crate::tally::TallyAggregator;

/// Bounded retry of transient storage failures. Safe for inserts because the
/// store refuses a second vote for the same (round, identity).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, backoff: Duration::from_millis(50) }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!("{} failed (attempt {}/{}): {}", operation, attempt, attempts, e);
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub vote: Vote,
    pub snapshot: Option<TallySnapshot>,
}

fn storage_rejection(e: &StoreError) -> RejectReason {
    if e.is_transient() {
        RejectReason::Unavailable
    } else {
        RejectReason::Internal
    }
}

/// Append-only record of votes, at most one per (round, identity).
pub struct VoteLedger {
    store: Arc<dyn VoteStore>,
    rounds: HashMap<RoundId, VotingRound>,
    order: Vec<RoundId>,
    tally: Arc<TallyAggregator>,
    retry: RetryPolicy,
}

impl VoteLedger {
    pub fn new(
        rounds: Vec<VotingRound>,
        store: Arc<dyn VoteStore>,
        tally: Arc<TallyAggregator>,
        retry: RetryPolicy,
    ) -> Self {
        let order = rounds.iter().map(|r| r.id.clone()).collect();
        let rounds = rounds.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self { store, rounds, order, tally, retry }
    }

    pub fn round(&self, round_id: &RoundId) -> Option<&VotingRound> {
        self.rounds.get(round_id)
    }

    /// Rounds in configuration order.
    pub fn rounds(&self) -> impl Iterator<Item = &VotingRound> {
        self.order.iter().filter_map(|id| self.rounds.get(id))
    }

    pub fn store(&self) -> &Arc<dyn VoteStore> {
        &self.store
    }

    pub async fn cast_vote(
        &self,
        round_id: &RoundId,
        identity: &VerifiedIdentity,
        candidate: &str,
        ballot: &BallotMeta,
    ) -> Result<Accepted, RejectReason> {
        self.cast_vote_at(round_id, identity, candidate, ballot, OffsetDateTime::now_utc()).await
    }

    pub async fn cast_vote_at(
        &self,
        round_id: &RoundId,
        identity: &VerifiedIdentity,
        candidate: &str,
        ballot: &BallotMeta,
        now: OffsetDateTime,
    ) -> Result<Accepted, RejectReason> {
        let round = self.rounds.get(round_id).ok_or(RejectReason::NoSuchRound)?;
        round.check_open(now)?;

        let candidate = parse_candidate(candidate).map_err(|_| RejectReason::InvalidCandidate)?;
        if !round.contains(&candidate) {
            return Err(RejectReason::InvalidCandidate);
        }
        let ballot = normalize_ballot(ballot).map_err(|e| {
            debug!("Rejecting ballot from {}: {}", identity.key, e);
            RejectReason::Malformed
        })?;

        let vote = Vote {
            id: Uuid::new_v4(),
            round_id: round.id.clone(),
            identity: identity.key,
            candidate,
            cast_at: now,
            wallet_address: ballot.wallet_address,
            signature: ballot.signature,
            profile: identity.profile.clone(),
        };

        let mut attempts = 0;
        let mut outcome = self.retry
            .run("vote insert", || {
                attempts += 1;
                self.store.insert_if_absent(&vote)
            })
            .await
            .map_err(|e| {
                error!("Failed to store vote for {} in round {}: {}", vote.identity, round.id, e);
                storage_rejection(&e)
            })?;

        // An earlier attempt may have committed before its reply was lost.
        if outcome == InsertOutcome::Duplicate && attempts > 1 && self.is_own_vote(&vote).await? {
            warn!("Vote {} was stored by an attempt that reported failure", vote.id);
            outcome = InsertOutcome::Inserted;
        }

        match outcome {
            InsertOutcome::Duplicate => {
                debug!("{} already voted in round {}", vote.identity, round.id);
                Err(RejectReason::AlreadyVoted)
            }
            InsertOutcome::Inserted => {
                let snapshot = self.tally.on_vote_accepted(&vote);
                info!("Accepted vote {} for {} in round {}", vote.id, vote.candidate, round.id);
                Ok(Accepted { vote, snapshot })
            }
        }
    }

    async fn is_own_vote(&self, vote: &Vote) -> Result<bool, RejectReason> {
        let stored = self.retry
            .run("vote lookup", || self.store.find_vote(&vote.round_id, vote.identity))
            .await
            .map_err(|e| {
                error!("Failed to confirm vote {} in round {}: {}", vote.id, vote.round_id, e);
                storage_rejection(&e)
            })?;
        Ok(stored.is_some_and(|stored| stored.id == vote.id))
    }

    pub async fn find_vote(&self, round_id: &RoundId, identity: IdentityKey) -> Result<Option<Vote>, RejectReason> {
        if !self.rounds.contains_key(round_id) {
            return Err(RejectReason::NoSuchRound);
        }
        self.retry
            .run("vote lookup", || self.store.find_vote(round_id, identity))
            .await
            .map_err(|e| {
                error!("Failed to look up vote of {} in round {}: {}", identity, round_id, e);
                storage_rejection(&e)
            })
    }

    /// Snapshot recomputed from the ledger alone.
    pub async fn recount(&self, round_id: &RoundId) -> Result<TallySnapshot, RejectReason> {
        self.tally.recount(round_id, self.store.as_ref()).await.map_err(|e| {
            error!("Recount of round {} failed: {}", round_id, e);
            RejectReason::Internal
        })
    }
}
