use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use shared::models::*;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Worth retrying: the store could not be reached or timed out.
    #[error("Vote store unavailable: {0}")]
    Unavailable(String),
    #[error("Vote store failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A vote for the same (round, identity) already exists.
    Duplicate,
}

/// Authoritative vote storage. `insert_if_absent` must be atomic with respect
/// to the (round, identity) uniqueness constraint.
#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    async fn insert_if_absent(&self, vote: &Vote) -> Result<InsertOutcome, StoreError>;

    async fn find_vote(&self, round_id: &RoundId, identity: IdentityKey) -> Result<Option<Vote>, StoreError>;

    /// Every vote of the round, oldest first.
    async fn round_votes(&self, round_id: &RoundId) -> Result<Vec<Vote>, StoreError>;

    async fn count_round_votes(&self, round_id: &RoundId) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryVotes {
    votes: Vec<Vote>,
    index: HashMap<(RoundId, IdentityKey), usize>,
}

/// Process-local store used by tests and local runs. Latency and transient
/// failures can be injected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    votes: Mutex<MemoryVotes>,
    latency: Mutex<Option<Duration>>,
    failures: AtomicU32,
    lost_replies: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// The next `count` operations fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` inserts commit but report [`StoreError::Unavailable`],
    /// like a connection dropped after the database committed.
    pub fn lose_next_replies(&self, count: u32) {
        self.lost_replies.store(count, Ordering::SeqCst);
    }

    /// Writes a vote bypassing the ledger, as another process sharing the
    /// store would.
    pub fn insert_external(&self, vote: Vote) -> Result<InsertOutcome, StoreError> {
        let mut guard = self.lock()?;
        Ok(Self::insert_locked(&mut guard, vote))
    }

    pub fn len(&self) -> usize {
        self.votes.lock().map(|g| g.votes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn before_operation(&self) -> Result<(), StoreError> {
        let latency = self.latency.lock().ok().and_then(|g| *g);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryVotes>, StoreError> {
        self.votes.lock().map_err(|e| StoreError::Internal(format!("vote lock poisoned: {}", e)))
    }

    fn insert_locked(guard: &mut MemoryVotes, vote: Vote) -> InsertOutcome {
        let key = (vote.round_id.clone(), vote.identity);
        if guard.index.contains_key(&key) {
            return InsertOutcome::Duplicate;
        }
        guard.index.insert(key, guard.votes.len());
        guard.votes.push(vote);
        InsertOutcome::Inserted
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn insert_if_absent(&self, vote: &Vote) -> Result<InsertOutcome, StoreError> {
        self.before_operation().await?;
        let outcome = {
            let mut guard = self.lock()?;
            Self::insert_locked(&mut guard, vote.clone())
        };
        let lost = self.lost_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Err(StoreError::Unavailable("connection reset after commit".into()));
        }
        Ok(outcome)
    }

    async fn find_vote(&self, round_id: &RoundId, identity: IdentityKey) -> Result<Option<Vote>, StoreError> {
        self.before_operation().await?;
        let guard = self.lock()?;
        Ok(guard.index
            .get(&(round_id.clone(), identity))
            .and_then(|&idx| guard.votes.get(idx))
            .cloned())
    }

    async fn round_votes(&self, round_id: &RoundId) -> Result<Vec<Vote>, StoreError> {
        self.before_operation().await?;
        let guard = self.lock()?;
        Ok(guard.votes.iter().filter(|v| &v.round_id == round_id).cloned().collect())
    }

    async fn count_round_votes(&self, round_id: &RoundId) -> Result<u64, StoreError> {
        self.before_operation().await?;
        let guard = self.lock()?;
        Ok(guard.votes.iter().filter(|v| &v.round_id == round_id).count() as u64)
    }
}
