use crate::error::ApiError;
use shared::{identity_key, parse_round_id, IdentityKey, RoundId};

pub fn parse_round(id: &str) -> Result<RoundId, ApiError> {
    parse_round_id(id).map_err(|_| ApiError::InvalidId)
}

pub fn parse_identity(fid: u64) -> Result<IdentityKey, ApiError> {
    identity_key(fid).map_err(|_| ApiError::InvalidIdentity)
}

/// Makes sure tracing output shows up in tests; harmless when called twice.
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
