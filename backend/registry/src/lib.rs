//! # Admin Code Registry
//!
//! Typed model of the persisted mapping from admin activation codes to their claim state.
//!
//! ## Document
//!
//! - One store key holds the whole registry as a single JSON document
//! - `{"codes": {"<code>": {"claimedBy": "<account>" | null, "createdAt": "<rfc3339>"}}}`
//! - Created lazily from [`SEED_CODES`] the first time anyone attempts a claim
//!
//! ## Lifecycle
//!
//! Every entry starts unclaimed and moves to claimed-by exactly one account. That transition is
//! terminal: nothing in this crate can clear or reassign `claimedBy`.

use thiserror::Error;

pub mod claims;
pub mod codes;

pub use claims::{AdminCodeRegistry, ClaimOutcome, ClaimState};
pub use codes::{AccountId, AdminCode, SEED_CODES};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Corrupt registry document: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Failed to encode registry document: {0}")]
    Encode(#[source] serde_json::Error),
}
