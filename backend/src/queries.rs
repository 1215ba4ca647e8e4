use sqlx::{postgres::PgRow, PgPool, Row};
use shared::{identity_key, parse_candidate, parse_round_id};
use shared::models::*;

use crate::store::{InsertOutcome, StoreError, VoteStore};

const VOTE_COLUMNS: &str =
    "id, round_id, fid, choice, cast_at, wallet_address, signature, username, display_name, pfp_url";

/// Postgres-backed vote store. Uniqueness is the `unique_round_voter` constraint.
#[derive(Clone)]
pub struct PgVoteStore {
    pool: PgPool,
}

impl PgVoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Internal(other.to_string()),
    }
}

fn vote_from_row(row: &PgRow) -> Result<Vote, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Internal(format!("undecodable vote row: {}", e));
    let corrupt = |e: shared::ValidationError| StoreError::Internal(format!("corrupt vote row: {}", e));

    let round_id: String = row.try_get("round_id").map_err(decode)?;
    let fid: i64 = row.try_get("fid").map_err(decode)?;
    let choice: String = row.try_get("choice").map_err(decode)?;

    Ok(Vote {
        id: row.try_get("id").map_err(decode)?,
        round_id: parse_round_id(&round_id).map_err(corrupt)?,
        identity: identity_key(u64::try_from(fid).unwrap_or(0)).map_err(corrupt)?,
        candidate: parse_candidate(&choice).map_err(corrupt)?,
        cast_at: row.try_get("cast_at").map_err(decode)?,
        wallet_address: row.try_get("wallet_address").map_err(decode)?,
        signature: row.try_get("signature").map_err(decode)?,
        profile: Profile {
            username: row.try_get("username").map_err(decode)?,
            display_name: row.try_get("display_name").map_err(decode)?,
            pfp_url: row.try_get("pfp_url").map_err(decode)?,
        },
    })
}

#[rocket::async_trait]
impl VoteStore for PgVoteStore {
    async fn insert_if_absent(&self, vote: &Vote) -> Result<InsertOutcome, StoreError> {
        // identity_key() caps fids at i64::MAX.
        let fid = i64::try_from(vote.identity.fid())
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let inserted = sqlx::query(
            "INSERT INTO votes
             (id, round_id, fid, choice, cast_at, wallet_address, signature, username, display_name, pfp_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT ON CONSTRAINT unique_round_voter DO NOTHING
             RETURNING id",
        )
        .bind(vote.id)
        .bind(vote.round_id.as_str())
        .bind(fid)
        .bind(vote.candidate.symbol())
        .bind(vote.cast_at)
        .bind(vote.wallet_address.as_deref())
        .bind(vote.signature.as_deref())
        .bind(vote.profile.username.as_deref())
        .bind(vote.profile.display_name.as_deref())
        .bind(vote.profile.pfp_url.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(match inserted {
            Some(_) => InsertOutcome::Inserted,
            None => InsertOutcome::Duplicate,
        })
    }

    async fn find_vote(&self, round_id: &RoundId, identity: IdentityKey) -> Result<Option<Vote>, StoreError> {
        let fid = i64::try_from(identity.fid())
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let row = sqlx::query(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE round_id = $1 AND fid = $2"
        ))
        .bind(round_id.as_str())
        .bind(fid)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(vote_from_row).transpose()
    }

    async fn round_votes(&self, round_id: &RoundId) -> Result<Vec<Vote>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE round_id = $1 ORDER BY cast_at, id"
        ))
        .bind(round_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn count_round_votes(&self, round_id: &RoundId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE round_id = $1")
            .bind(round_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}
