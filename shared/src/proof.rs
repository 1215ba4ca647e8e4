//! Wire format of identity proofs issued by the frame host.
//!
//! A proof is `base64url(payload) "." base64url(mac)` where the payload is a
//! small JSON document naming the identity and its validity window. The MAC
//! algorithm is up to the verifier; this module only splits and joins.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Serialize, Deserialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    pub fid: u64,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofFormatError {
    #[error("Proof is not of the form payload.mac")]
    MissingSeparator,
    #[error("Proof segment is not valid base64")]
    Encoding,
    #[error("Proof payload is not valid JSON: {0}")]
    Payload(String),
}

/// A proof split into the bytes the MAC covers, the decoded claims and the MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProof<'a> {
    pub signed: &'a [u8],
    pub claims: ProofClaims,
    pub mac: Vec<u8>,
}

pub fn parse_proof(token: &str) -> Result<ParsedProof<'_>, ProofFormatError> {
    let (payload, mac) = token.trim()
        .split_once('.')
        .ok_or(ProofFormatError::MissingSeparator)?;
    if payload.is_empty() || mac.is_empty() || mac.contains('.') {
        return Err(ProofFormatError::MissingSeparator);
    }
    let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| ProofFormatError::Encoding)?;
    let mac = URL_SAFE_NO_PAD.decode(mac).map_err(|_| ProofFormatError::Encoding)?;
    let claims = serde_json::from_slice(&json).map_err(|e| ProofFormatError::Payload(e.to_string()))?;
    Ok(ParsedProof { signed: payload.as_bytes(), claims, mac })
}

/// Builds a proof, letting `sign` compute the MAC over the encoded payload.
pub fn encode_proof(claims: &ProofClaims, sign: impl FnOnce(&[u8]) -> Vec<u8>) -> String {
    // Serializing three integers cannot fail.
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let mac = sign(payload.as_bytes());
    format!("{payload}.{}", URL_SAFE_NO_PAD.encode(mac))
}
