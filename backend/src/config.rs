use std::{fmt::Display, str::FromStr, time::Duration};

use shared::{parse_candidate, parse_round_id, validate_round, ValidationError, VotingRound};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

pub const DEFAULT_ROUND_ID: &str = "popcat-vs-brett";
pub const DEFAULT_ROUND_TITLE: &str = "$POPCAT vs $BRETT";
pub const DEFAULT_CANDIDATES: &str = "POPCAT,BRETT";
pub const DEFAULT_STARTS_AT: &str = "2024-11-29T12:30:00Z";
pub const DEFAULT_ENDS_AT: &str = "2024-12-06T12:30:00Z";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "https://warpcast.com,http://localhost";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
    #[error("Invalid round: {0}")]
    Round(#[from] ValidationError),
    #[error("FRAME_TRUST_KEY is required unless IDENTITY_MODE=unverified")]
    MissingTrustKey,
    #[error("Duplicate round id {0}")]
    DuplicateRound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    Verified { trust_key: String },
    /// Accepts well-formed claims without proof. Never the default.
    Unverified,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rounds: Vec<VotingRound>,
    pub identity: IdentityMode,
    pub submit_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub reconcile_interval: Duration,
    pub submit_rate_limit: u32,
    pub submit_rate_window_minutes: i64,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Reads settings through `lookup`, which is the runtime's secret store in
    /// production and a plain map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rounds = match lookup("VOTE_ROUNDS") {
            Some(json) => parse_rounds_json(&json)?,
            None => vec![single_round(&lookup)?],
        };

        let identity = match lookup("IDENTITY_MODE").as_deref().map(str::trim) {
            None | Some("verified") => match lookup("FRAME_TRUST_KEY") {
                Some(key) if !key.trim().is_empty() => IdentityMode::Verified { trust_key: key },
                _ => return Err(ConfigError::MissingTrustKey),
            },
            Some("unverified") => {
                warn!("IDENTITY_MODE=unverified - identity claims will be accepted without proof");
                IdentityMode::Unverified
            }
            Some(other) => return Err(ConfigError::Invalid {
                key: "IDENTITY_MODE",
                value: other.to_string(),
                reason: "expected `verified` or `unverified`".into(),
            }),
        };

        let config = Self {
            rounds,
            identity,
            submit_timeout: Duration::from_millis(try_load(&lookup, "SUBMIT_TIMEOUT_MS", "5000")?),
            retry_attempts: try_load::<u32, _>(&lookup, "STORE_RETRY_ATTEMPTS", "3")?.max(1),
            retry_backoff: Duration::from_millis(try_load(&lookup, "STORE_RETRY_BACKOFF_MS", "50")?),
            reconcile_interval: Duration::from_secs(try_load::<u64, _>(&lookup, "RECONCILE_INTERVAL_SECS", "60")?.max(1)),
            submit_rate_limit: try_load(&lookup, "SUBMIT_RATE_LIMIT", "10")?,
            submit_rate_window_minutes: try_load(&lookup, "SUBMIT_RATE_WINDOW_MINUTES", "1")?,
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        };

        info!(
            "Loaded {} round(s), submit timeout {:?}, {} store attempt(s)",
            config.rounds.len(),
            config.submit_timeout,
            config.retry_attempts
        );
        Ok(config)
    }
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })
}

fn load_time<F>(lookup: &F, key: &'static str, default: &str) -> Result<OffsetDateTime, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    OffsetDateTime::parse(value.trim(), &Rfc3339).map_err(|e| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })
}

fn single_round<F>(lookup: &F) -> Result<VotingRound, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let id = lookup("ROUND_ID").unwrap_or_else(|| DEFAULT_ROUND_ID.to_string());
    let candidates = lookup("ROUND_CANDIDATES")
        .unwrap_or_else(|| DEFAULT_CANDIDATES.to_string())
        .split(',')
        .map(parse_candidate)
        .collect::<Result<Vec<_>, _>>()?;

    let round = VotingRound {
        id: parse_round_id(id.trim())?,
        title: lookup("ROUND_TITLE").unwrap_or_else(|| DEFAULT_ROUND_TITLE.to_string()),
        starts_at: load_time(lookup, "ROUND_STARTS_AT", DEFAULT_STARTS_AT)?,
        ends_at: load_time(lookup, "ROUND_ENDS_AT", DEFAULT_ENDS_AT)?,
        candidates,
    };
    validate_round(&round)?;
    Ok(round)
}

fn parse_rounds_json(json: &str) -> Result<Vec<VotingRound>, ConfigError> {
    let rounds: Vec<VotingRound> = serde_json::from_str(json).map_err(|e| ConfigError::Invalid {
        key: "VOTE_ROUNDS",
        value: json.to_string(),
        reason: e.to_string(),
    })?;
    if rounds.is_empty() {
        return Err(ConfigError::Invalid {
            key: "VOTE_ROUNDS",
            value: json.to_string(),
            reason: "at least one round is required".into(),
        });
    }

    let mut ids = std::collections::HashSet::new();
    for round in &rounds {
        validate_round(round)?;
        if !ids.insert(round.id.clone()) {
            return Err(ConfigError::DuplicateRound(round.id.to_string()));
        }
    }
    Ok(rounds)
}
