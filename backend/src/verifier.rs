use ring::hmac;
use shared::{
    encode_proof, parse_proof, validate_claim, IdentityClaim, ProofClaims, RejectReason,
    VerifiedIdentity,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::config::IdentityMode;

enum TrustRoot {
    Hmac(hmac::Key),
    None,
}

/// Checks identity claims coming from the frame host.
pub struct IdentityVerifier {
    root: TrustRoot,
}

impl IdentityVerifier {
    pub fn new_with_key(trust_key: impl AsRef<[u8]>) -> Self {
        Self { root: TrustRoot::Hmac(hmac::Key::new(hmac::HMAC_SHA256, trust_key.as_ref())) }
    }

    pub fn unverified() -> Self {
        warn!("IdentityVerifier running unverified - claims are accepted without proof");
        Self { root: TrustRoot::None }
    }

    pub fn from_mode(mode: &IdentityMode) -> Self {
        match mode {
            IdentityMode::Verified { trust_key } => Self::new_with_key(trust_key.as_bytes()),
            IdentityMode::Unverified => Self::unverified(),
        }
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self.root, TrustRoot::Hmac(_))
    }

    /// Signs a proof for `fid`; only meaningful with a trust root.
    pub fn issue(&self, fid: u64, issued_at: OffsetDateTime, lifetime: Duration) -> Option<String> {
        let TrustRoot::Hmac(key) = &self.root else { return None };
        let claims = ProofClaims {
            fid,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + lifetime).unix_timestamp(),
        };
        Some(encode_proof(&claims, |payload| hmac::sign(key, payload).as_ref().to_vec()))
    }

    pub async fn verify(&self, claim: &IdentityClaim) -> Result<VerifiedIdentity, RejectReason> {
        self.verify_at(claim, OffsetDateTime::now_utc())
    }

    pub fn verify_at(&self, claim: &IdentityClaim, now: OffsetDateTime) -> Result<VerifiedIdentity, RejectReason> {
        let key = validate_claim(claim).map_err(|e| {
            debug!("Malformed identity claim: {}", e);
            RejectReason::Malformed
        })?;

        let root = match &self.root {
            TrustRoot::Hmac(root) => root,
            TrustRoot::None => {
                warn!("Accepting unverified claim for {}", key);
                return Ok(VerifiedIdentity { key, profile: claim.profile.clone() });
            }
        };

        let Some(token) = claim.proof.as_deref() else {
            debug!("Claim for {} carries no proof", key);
            return Err(RejectReason::Malformed);
        };

        let proof = parse_proof(token).map_err(|e| {
            debug!("Unreadable proof for {}: {}", key, e);
            RejectReason::Malformed
        })?;

        if hmac::verify(root, proof.signed, &proof.mac).is_err() {
            warn!("Proof signature mismatch for {}", key);
            return Err(RejectReason::UntrustedIssuer);
        }

        if proof.claims.fid != key.fid() {
            warn!("Proof issued for fid {} presented by {}", proof.claims.fid, key);
            return Err(RejectReason::UntrustedIssuer);
        }

        if proof.claims.exp <= now.unix_timestamp() {
            debug!("Expired proof for {}", key);
            return Err(RejectReason::Expired);
        }

        Ok(VerifiedIdentity { key, profile: claim.profile.clone() })
    }
}
