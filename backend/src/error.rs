use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use shared::{Error, ErrorCategory, RejectReason, VoteResult, VoteStatus};
use thiserror::Error;

/// Failures of the read-only endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Round not found")]
    NotFound,
    #[error("Invalid round id")]
    InvalidId,
    #[error("Invalid identity")]
    InvalidIdentity,
    #[error("{0}")]
    Rejected(RejectReason),
}

impl ApiError {
    fn status(&self) -> Status {
        match self {
            ApiError::NotFound => Status::NotFound,
            ApiError::InvalidId | ApiError::InvalidIdentity => Status::BadRequest,
            ApiError::Rejected(reason) => status_for_reason(*reason),
        }
    }

    fn body(&self) -> Error {
        match self {
            ApiError::Rejected(reason) => Error::from(*reason),
            ApiError::NotFound => Error::new(ErrorCategory::State, self.to_string()),
            other => Error::new(ErrorCategory::Validation, other.to_string()),
        }
    }
}

impl From<RejectReason> for ApiError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::NoSuchRound => ApiError::NotFound,
            other => ApiError::Rejected(other),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        rocket::Response::build_from(Json(self.body()).respond_to(req)?)
            .status(status)
            .ok()
    }
}

pub fn status_for_reason(reason: RejectReason) -> Status {
    match reason {
        RejectReason::Malformed | RejectReason::InvalidCandidate => Status::BadRequest,
        RejectReason::UntrustedIssuer | RejectReason::Expired => Status::Unauthorized,
        RejectReason::RoundNotOpen | RejectReason::RoundClosed => Status::Forbidden,
        RejectReason::NoSuchRound => Status::NotFound,
        RejectReason::AlreadyVoted => Status::Conflict,
        RejectReason::RateLimited => Status::TooManyRequests,
        RejectReason::Timeout | RejectReason::Unavailable => Status::ServiceUnavailable,
        RejectReason::Internal => Status::InternalServerError,
    }
}

pub fn status_for_result(result: &VoteResult) -> Status {
    match (result.status, result.reason) {
        (VoteStatus::Accepted, _) => Status::Created,
        (VoteStatus::Rejected, Some(reason)) => status_for_reason(reason),
        (VoteStatus::Rejected, None) => Status::InternalServerError,
    }
}
