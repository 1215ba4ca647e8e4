use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use shared::models::*;
use shared::RejectReason;
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::{error, warn};

use crate::config::Config;
use crate::fanout::Fanout;
use crate::ledger::{RetryPolicy, VoteLedger};
use crate::store::VoteStore;
use crate::tally::{RecountReport, TallyAggregator};
use crate::verifier::IdentityVerifier;

/// Process-wide handle tying the verifier, ledger, tally and fan-out together.
/// Built once at startup and shared by reference.
#[derive(Clone)]
pub struct VoteService {
    verifier: Arc<IdentityVerifier>,
    ledger: Arc<VoteLedger>,
    tally: Arc<TallyAggregator>,
    step_timeout: Duration,
}

impl VoteService {
    pub fn new(
        rounds: Vec<VotingRound>,
        verifier: IdentityVerifier,
        store: Arc<dyn VoteStore>,
        retry: RetryPolicy,
        step_timeout: Duration,
    ) -> Self {
        let tally = Arc::new(TallyAggregator::new(&rounds));
        let ledger = Arc::new(VoteLedger::new(rounds, store, tally.clone(), retry));
        Self { verifier: Arc::new(verifier), ledger, tally, step_timeout }
    }

    pub fn from_config(config: &Config, store: Arc<dyn VoteStore>) -> Self {
        Self::new(
            config.rounds.clone(),
            IdentityVerifier::from_mode(&config.identity),
            store,
            RetryPolicy { attempts: config.retry_attempts, backoff: config.retry_backoff },
            config.submit_timeout,
        )
    }

    pub fn verifier(&self) -> &IdentityVerifier {
        &self.verifier
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        self.tally.fanout()
    }

    pub fn rounds(&self) -> impl Iterator<Item = &VotingRound> {
        self.ledger.rounds()
    }

    pub fn round(&self, round_id: &RoundId) -> Option<&VotingRound> {
        self.ledger.round(round_id)
    }

    pub fn snapshot(&self, round_id: &RoundId) -> Option<TallySnapshot> {
        self.tally.snapshot(round_id)
    }

    pub fn subscribe(&self, round_id: &RoundId) -> Option<BoxStream<'static, TallySnapshot>> {
        self.tally.fanout().subscribe(round_id)
    }

    /// Verifies the claim, then records the vote. Repeating a submission is
    /// safe: the second one is rejected as `already-voted`.
    pub async fn submit(&self, round_id: &RoundId, request: SubmitVoteRequest) -> VoteResult {
        let SubmitVoteRequest { claim, candidate, ballot } = request;

        // Round state is answered before identity: a closed round is closed for everyone.
        let Some(round) = self.ledger.round(round_id) else {
            return VoteResult::rejected(RejectReason::NoSuchRound, None);
        };
        if let Err(reason) = round.check_open(OffsetDateTime::now_utc()) {
            return self.rejected(round_id, reason);
        }

        let identity = match timeout(self.step_timeout, self.verifier.verify(&claim)).await {
            Ok(Ok(identity)) => identity,
            Ok(Err(reason)) => return self.rejected(round_id, reason),
            Err(_) => {
                warn!("Identity verification timed out after {:?}", self.step_timeout);
                return self.rejected(round_id, RejectReason::Timeout);
            }
        };

        // The ledger step runs in its own task so a vote that reaches the store
        // after the caller gave up is still counted.
        let ledger = self.ledger.clone();
        let task_round = round_id.clone();
        let cast = tokio::spawn(async move {
            ledger.cast_vote(&task_round, &identity, &candidate, &ballot).await
        });

        match timeout(self.step_timeout, cast).await {
            Ok(Ok(Ok(accepted))) => VoteResult::accepted(accepted.vote, accepted.snapshot),
            Ok(Ok(Err(reason))) => self.rejected(round_id, reason),
            Ok(Err(join_error)) => {
                error!("Vote task failed: {}", join_error);
                self.rejected(round_id, RejectReason::Internal)
            }
            Err(_) => {
                warn!("Vote in round {} timed out after {:?}", round_id, self.step_timeout);
                self.rejected(round_id, RejectReason::Timeout)
            }
        }
    }

    fn rejected(&self, round_id: &RoundId, reason: RejectReason) -> VoteResult {
        VoteResult::rejected(reason, self.tally.snapshot(round_id))
    }

    pub async fn find_vote(&self, round_id: &RoundId, identity: IdentityKey) -> Result<Option<Vote>, RejectReason> {
        match timeout(self.step_timeout, self.ledger.find_vote(round_id, identity)).await {
            Ok(result) => result,
            Err(_) => Err(RejectReason::Timeout),
        }
    }

    /// Startup recovery: rebuild every round's counts from the ledger.
    pub async fn recover(&self) -> Vec<RecountReport> {
        let mut reports = Vec::new();
        for result in self.tally.resync_all(self.ledger.store().as_ref()).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("Tally recovery failed: {}", e),
            }
        }
        reports
    }

    pub async fn reconcile(&self) -> Vec<RecountReport> {
        self.tally.reconcile(self.ledger.store().as_ref()).await
    }

    pub async fn recount(&self, round_id: &RoundId) -> Result<TallySnapshot, RejectReason> {
        self.ledger.recount(round_id).await
    }
}
