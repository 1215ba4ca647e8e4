use std::collections::HashSet;
use crate::models::{BallotMeta, Candidate, IdentityClaim, IdentityKey, Profile, RoundId, VotingRound};

pub const MAX_ROUND_ID_LENGTH: usize = 64;
pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_SYMBOL_LENGTH: usize = 16;
pub const MIN_CANDIDATES: usize = 2;
pub const MAX_CANDIDATES: usize = 8;
pub const MAX_PROFILE_FIELD_LENGTH: usize = 256;
pub const MAX_SIGNATURE_LENGTH: usize = 1024;
pub const WALLET_ADDRESS_HEX_DIGITS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid round id: {0:?}")]
    InvalidRoundId(String),
    #[error("Title exceeds maximum length of {MAX_TITLE_LENGTH}")]
    TitleTooLong,
    #[error("Invalid candidate symbol: {0:?}")]
    InvalidSymbol(String),
    #[error("Too few candidates (minimum {MIN_CANDIDATES})")]
    TooFewCandidates,
    #[error("Too many candidates (maximum {MAX_CANDIDATES})")]
    TooManyCandidates,
    #[error("Duplicate candidate: {0}")]
    DuplicateCandidate(Candidate),
    #[error("Round must end after it starts")]
    EmptyWindow,
    #[error("Missing identity")]
    MissingIdentity,
    #[error("Identity {0} is out of range")]
    IdentityOutOfRange(u64),
    #[error("Profile field exceeds maximum length of {MAX_PROFILE_FIELD_LENGTH}")]
    ProfileFieldTooLong,
    #[error("Invalid wallet address: {0:?}")]
    InvalidWalletAddress(String),
    #[error("Signature exceeds maximum length of {MAX_SIGNATURE_LENGTH}")]
    SignatureTooLong,
}

pub fn parse_round_id(raw: &str) -> Result<RoundId, ValidationError> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_ROUND_ID_LENGTH
        && raw.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !valid {
        return Err(ValidationError::InvalidRoundId(raw.to_string()));
    }
    Ok(RoundId::new_unchecked(raw.to_string()))
}

/// Accepts `brett`, `BRETT` or `$BRETT`.
pub fn parse_candidate(raw: &str) -> Result<Candidate, ValidationError> {
    let trimmed = raw.trim();
    let symbol = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LENGTH
        && symbol.bytes().all(|b| b.is_ascii_alphanumeric());
    if !valid {
        return Err(ValidationError::InvalidSymbol(raw.to_string()));
    }
    Ok(Candidate::new_unchecked(symbol.to_ascii_uppercase()))
}

/// Identities are stored in signed 64-bit columns, so the upper half is refused.
pub fn identity_key(fid: u64) -> Result<IdentityKey, ValidationError> {
    if fid == 0 {
        return Err(ValidationError::MissingIdentity);
    }
    if fid > i64::MAX as u64 {
        return Err(ValidationError::IdentityOutOfRange(fid));
    }
    Ok(IdentityKey::new_unchecked(fid))
}

pub fn validate_profile(profile: &Profile) -> Result<(), ValidationError> {
    let fields = [&profile.username, &profile.display_name, &profile.pfp_url];
    if fields.iter().filter_map(|f| f.as_deref()).any(|f| f.len() > MAX_PROFILE_FIELD_LENGTH) {
        return Err(ValidationError::ProfileFieldTooLong);
    }
    Ok(())
}

/// Shape checks only; whether the claim is trustworthy is decided elsewhere.
pub fn validate_claim(claim: &IdentityClaim) -> Result<IdentityKey, ValidationError> {
    let fid = claim.fid.ok_or(ValidationError::MissingIdentity)?;
    let key = identity_key(fid)?;
    validate_profile(&claim.profile)?;
    Ok(key)
}

pub fn normalize_wallet_address(raw: &str) -> Result<String, ValidationError> {
    let hex = raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| ValidationError::InvalidWalletAddress(raw.to_string()))?;
    if hex.len() != WALLET_ADDRESS_HEX_DIGITS || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidWalletAddress(raw.to_string()));
    }
    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

pub fn normalize_ballot(ballot: &BallotMeta) -> Result<BallotMeta, ValidationError> {
    let wallet_address = ballot.wallet_address.as_deref()
        .map(normalize_wallet_address)
        .transpose()?;
    if ballot.signature.as_ref().is_some_and(|s| s.len() > MAX_SIGNATURE_LENGTH) {
        return Err(ValidationError::SignatureTooLong);
    }
    Ok(BallotMeta {
        wallet_address,
        signature: ballot.signature.clone(),
    })
}

pub fn validate_round(round: &VotingRound) -> Result<(), ValidationError> {
    parse_round_id(round.id.as_str())?;
    if round.title.len() > MAX_TITLE_LENGTH { return Err(ValidationError::TitleTooLong); }
    if round.candidates.len() < MIN_CANDIDATES { return Err(ValidationError::TooFewCandidates); }
    if round.candidates.len() > MAX_CANDIDATES { return Err(ValidationError::TooManyCandidates); }
    if round.starts_at >= round.ends_at { return Err(ValidationError::EmptyWindow); }

    let mut seen = HashSet::new();
    for candidate in &round.candidates {
        let normalized = parse_candidate(candidate.symbol())?;
        if &normalized != candidate {
            return Err(ValidationError::InvalidSymbol(candidate.symbol().to_string()));
        }
        if !seen.insert(candidate) {
            return Err(ValidationError::DuplicateCandidate(candidate.clone()));
        }
    }

    Ok(())
}
