use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// Broad class of a failure, deciding how callers should react to it.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    #[error("Invalid input provided")]
    Validation,
    #[error("Identity could not be verified")]
    Authorization,
    #[error("Resource conflict")]
    Conflict,
    #[error("Operation not allowed in the current state")]
    State,
    #[error("Temporarily unavailable")]
    Transient,
    #[error("Internal system error")]
    Internal,
}

/// Why a submission was turned down. Every variant is an expected outcome.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    #[error("Malformed request")]
    Malformed,
    #[error("Identity proof was not issued by a trusted frame host")]
    UntrustedIssuer,
    #[error("Identity proof has expired")]
    Expired,
    #[error("No such voting round")]
    NoSuchRound,
    #[error("Voting has not opened yet")]
    RoundNotOpen,
    #[error("Voting closed")]
    RoundClosed,
    #[error("Candidate is not part of this round")]
    InvalidCandidate,
    #[error("You already voted")]
    AlreadyVoted,
    #[error("Too many submissions, slow down")]
    RateLimited,
    #[error("Timed out, please retry")]
    Timeout,
    #[error("Vote storage unavailable, please retry")]
    Unavailable,
    #[error("Something went wrong")]
    Internal,
}

impl RejectReason {
    pub const fn category(self) -> ErrorCategory {
        match self {
            RejectReason::Malformed | RejectReason::InvalidCandidate => ErrorCategory::Validation,
            RejectReason::UntrustedIssuer | RejectReason::Expired => ErrorCategory::Authorization,
            RejectReason::AlreadyVoted => ErrorCategory::Conflict,
            RejectReason::NoSuchRound | RejectReason::RoundNotOpen | RejectReason::RoundClosed => {
                ErrorCategory::State
            }
            RejectReason::RateLimited | RejectReason::Timeout | RejectReason::Unavailable => {
                ErrorCategory::Transient
            }
            RejectReason::Internal => ErrorCategory::Internal,
        }
    }

    /// Retrying is always safe, but only transient failures can change outcome.
    pub const fn is_retryable(self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    /// Stable wire code, identical to the serialized form.
    pub const fn code(self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::UntrustedIssuer => "untrusted-issuer",
            RejectReason::Expired => "expired",
            RejectReason::NoSuchRound => "no-such-round",
            RejectReason::RoundNotOpen => "round-not-open",
            RejectReason::RoundClosed => "round-closed",
            RejectReason::InvalidCandidate => "invalid-candidate",
            RejectReason::AlreadyVoted => "already-voted",
            RejectReason::RateLimited => "rate-limited",
            RejectReason::Timeout => "timeout",
            RejectReason::Unavailable => "unavailable",
            RejectReason::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(details) = &self.details {
            write!(f, "{}: {} ({})", self.code, self.message, details)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCategory, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self {
        Self::with_details(reason.category(), reason.to_string(), reason.code())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
