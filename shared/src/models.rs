use serde::{Serialize, Deserialize};
use std::fmt;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::RejectReason;

pub const PLEDGE_SUFFIX: &str = "Participate in Meme vs Meme to earn rewards at https://memevsmeme.fun";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(String);

impl RoundId {
    /// Callers are expected to have validated `id` with [`crate::validation::parse_round_id`].
    pub(crate) fn new_unchecked(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A token symbol, upper case and without the `$` sigil.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(String);

impl Candidate {
    pub(crate) fn new_unchecked(symbol: String) -> Self {
        Self(symbol)
    }

    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Farcaster id of a voter. The only field used for uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(u64);

impl IdentityKey {
    pub(crate) const fn new_unchecked(fid: u64) -> Self {
        Self(fid)
    }

    pub const fn fid(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fid:{}", self.0)
    }
}

/// Display attributes supplied by the frame host. Never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfp_url: Option<String>,
}

/// Untrusted identity assertion as produced by the frame host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    #[serde(default)]
    pub fid: Option<u64>,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default)]
    pub proof: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    pub key: IdentityKey,
    pub profile: Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Upcoming,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingRound {
    pub id: RoundId,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    pub candidates: Vec<Candidate>,
}

impl VotingRound {
    /// Voting is open on `[starts_at, ends_at)`.
    pub fn phase_at(&self, now: OffsetDateTime) -> RoundPhase {
        if now < self.starts_at {
            RoundPhase::Upcoming
        } else if now < self.ends_at {
            RoundPhase::Open
        } else {
            RoundPhase::Closed
        }
    }

    pub fn check_open(&self, now: OffsetDateTime) -> Result<(), RejectReason> {
        match self.phase_at(now) {
            RoundPhase::Open => Ok(()),
            RoundPhase::Upcoming => Err(RejectReason::RoundNotOpen),
            RoundPhase::Closed => Err(RejectReason::RoundClosed),
        }
    }

    pub fn position(&self, candidate: &Candidate) -> Option<usize> {
        self.candidates.iter().position(|c| c == candidate)
    }

    pub fn contains(&self, candidate: &Candidate) -> bool {
        self.position(candidate).is_some()
    }

    /// The canonical text a voter signs with their wallet.
    pub fn pledge_message(&self, candidate: &Candidate) -> Option<String> {
        self.position(candidate)?;
        let rivals = self.candidates.iter()
            .filter(|c| *c != candidate)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" and ");
        Some(format!("I voted for {candidate} to outperform {rivals}. {PLEDGE_SUFFIX}"))
    }

    pub fn view_at(&self, now: OffsetDateTime) -> RoundView {
        RoundView {
            id: self.id.clone(),
            title: self.title.clone(),
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            phase: self.phase_at(now),
            countdown: Countdown::until(self.ends_at, now),
            pledges: self.candidates.iter()
                .filter_map(|candidate| Some(Pledge {
                    candidate: candidate.clone(),
                    message: self.pledge_message(candidate)?,
                }))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn until(target: OffsetDateTime, now: OffsetDateTime) -> Self {
        let remaining = target - now;
        if remaining <= Duration::ZERO {
            return Self::default();
        }
        let total = remaining.whole_seconds();
        Self {
            days: total / 86_400,
            hours: total % 86_400 / 3_600,
            minutes: total % 3_600 / 60,
            seconds: total % 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pledge {
    pub candidate: Candidate,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub id: RoundId,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    pub phase: RoundPhase,
    pub countdown: Countdown,
    pub pledges: Vec<Pledge>,
}

/// Wallet-side data attached to a vote. Stored, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Uuid,
    pub round_id: RoundId,
    pub identity: IdentityKey,
    pub candidate: Candidate,
    #[serde(with = "time::serde::rfc3339")]
    pub cast_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVoteRequest {
    pub claim: IdentityClaim,
    pub candidate: String,
    #[serde(flatten)]
    pub ballot: BallotMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTally {
    pub candidate: Candidate,
    pub votes: u64,
    /// Percentage of the round total; the equal split when nobody voted yet.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallySnapshot {
    pub round_id: RoundId,
    pub candidates: Vec<CandidateTally>,
    pub total: u64,
}

impl TallySnapshot {
    pub fn votes_for(&self, candidate: &Candidate) -> Option<u64> {
        self.candidates.iter()
            .find(|t| &t.candidate == candidate)
            .map(|t| t.votes)
    }

    pub fn share_of(&self, candidate: &Candidate) -> Option<f64> {
        self.candidates.iter()
            .find(|t| &t.candidate == candidate)
            .map(|t| t.share)
    }

    pub fn is_neutral(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    pub status: VoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<Vote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TallySnapshot>,
}

impl VoteResult {
    pub fn accepted(vote: Vote, snapshot: Option<TallySnapshot>) -> Self {
        Self {
            status: VoteStatus::Accepted,
            reason: None,
            retryable: false,
            vote: Some(vote),
            snapshot,
        }
    }

    pub fn rejected(reason: RejectReason, snapshot: Option<TallySnapshot>) -> Self {
        Self {
            status: VoteStatus::Rejected,
            reason: Some(reason),
            retryable: reason.is_retryable(),
            vote: None,
            snapshot,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == VoteStatus::Accepted
    }
}
