pub mod error;
pub mod models;
pub mod validation;
pub mod client_info;
pub mod proof;
pub mod tally_logic;

pub use error::{Error, ErrorCategory, RejectReason, Result};
pub use models::*;
pub use validation::*;
pub use client_info::*;
pub use proof::{ProofClaims, ProofFormatError, ParsedProof, parse_proof, encode_proof};
pub use tally_logic::{Tally, TallyError, shares};
