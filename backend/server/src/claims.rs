//! # Admin Code Claims
//!
//! Grants admin privilege to the first account presenting a valid activation code.
//!
//! ## Guarantees
//!
//! - Each code is claimed by at most one account, once, even with claims racing from several
//!   server instances
//! - The owner presenting its code again is granted again and nothing changes
//! - Storage faults are errors, never a silent denial
//!
//! ## Flow
//!
//! One optimistic transaction over the registry document:
//! 1. Read the registry, seed it from the fixed code set if it does not exist yet
//! 2. Apply the claim to whatever was read or seeded
//! 3. Write back only if the registry was seeded or the claim was granted
//!
//! A concurrent commit between 1 and 3 aborts the write and the whole sequence reruns, so a
//! loser rereads the winner's claim instead of overwriting it.
use chrono::Utc;
use registry::{AccountId, AdminCode, AdminCodeRegistry, ClaimOutcome};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::RetryPolicy,
    database::{DocumentStore, StoreError, TxPlan, run_transaction},
};

#[derive(Error, Debug)]
pub enum ClaimError {
    /// Outcome unknown, the caller should try again.
    #[error("Storage unavailable: {0}")]
    TransientStorageFailure(#[source] StoreError),

    #[error("Admin code registry is corrupt: {0}")]
    CorruptRegistry(#[source] StoreError),

    /// Retrying will not help, e.g. a wrong key type or rejected credentials.
    #[error("Storage fault: {0}")]
    StorageFault(#[source] StoreError),
}

impl From<StoreError> for ClaimError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Document(_) => ClaimError::CorruptRegistry(e),
            StoreError::Redis(_) if !e.is_retryable() => ClaimError::StorageFault(e),
            _ => ClaimError::TransientStorageFailure(e),
        }
    }
}

pub struct AdminCodeClaimService<S> {
    store: S,
    registry_key: String,
    retry: RetryPolicy,
}

impl<S: DocumentStore> AdminCodeClaimService<S> {
    pub fn new(store: S, registry_key: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            store,
            registry_key: registry_key.into(),
            retry,
        }
    }

    pub async fn claim(&self, account: &AccountId, code: &str) -> Result<bool, ClaimError> {
        Ok(self.claim_outcome(account, code).await?.is_granted())
    }

    pub async fn claim_outcome(
        &self,
        account: &AccountId,
        code: &str,
    ) -> Result<ClaimOutcome, ClaimError> {
        // Malformed input can't match a seed key, but still counts as a first attempt.
        let code = AdminCode::parse(code);
        let masked = code
            .as_ref()
            .map_or_else(|| "<malformed>".to_string(), AdminCode::masked);

        let now = Utc::now();
        let result = run_transaction(
            &self.store,
            &self.registry_key,
            &self.retry,
            |current: Option<AdminCodeRegistry>| {
                let seeded = current.is_none();
                let mut registry = current.unwrap_or_else(|| AdminCodeRegistry::seeded(now));

                let outcome = match &code {
                    Some(code) => registry.claim(account, code),
                    None => ClaimOutcome::UnknownCode,
                };

                if seeded || outcome == ClaimOutcome::Granted {
                    TxPlan::write(registry, outcome)
                } else {
                    TxPlan::read_only(outcome)
                }
            },
        )
        .await;

        match result {
            Ok(outcome) => {
                info!(
                    %account,
                    code = %masked,
                    outcome = outcome.as_str(),
                    "admin code claim"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(%account, code = %masked, error = %e, "admin code claim failed");
                Err(e.into())
            }
        }
    }

    /// Whether `account` holds any claimed code. Read-only.
    pub async fn is_admin(&self, account: &AccountId) -> Result<bool, ClaimError> {
        Ok(self
            .snapshot()
            .await?
            .is_some_and(|registry| registry.is_claimed_by(account)))
    }

    /// Current registry, `None` if no claim was ever attempted.
    pub async fn snapshot(&self) -> Result<Option<AdminCodeRegistry>, ClaimError> {
        let Some(raw) = self.store.get(&self.registry_key).await? else {
            return Ok(None);
        };

        let registry = AdminCodeRegistry::decode(&raw).map_err(StoreError::from)?;

        Ok(Some(registry))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use registry::SEED_CODES;

    use super::*;
    use crate::{database::StoreTransaction, memory::MemoryStore};

    const CODE: &str = "bl00m-adm-8c2e";

    fn service(store: &MemoryStore) -> AdminCodeClaimService<MemoryStore> {
        AdminCodeClaimService::new(
            store.clone(),
            "test:admin_codes",
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        )
    }

    #[tokio::test]
    async fn test_first_claim_seeds_registry() {
        let store = MemoryStore::new();
        let claims = service(&store);
        let u1 = AccountId::new("u1");

        assert!(claims.claim(&u1, CODE).await.unwrap());

        let registry = claims.snapshot().await.unwrap().unwrap();
        assert_eq!(registry.len(), SEED_CODES.len());
        assert_eq!(
            registry.claimant(&AdminCode::parse(CODE).unwrap()),
            Some(&u1)
        );
    }

    #[tokio::test]
    async fn test_unknown_code_still_seeds() {
        let store = MemoryStore::new();
        let claims = service(&store);

        let outcome = claims
            .claim_outcome(&AccountId::new("u1"), "bl00m-adm-ffff")
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::UnknownCode);
        let registry = claims.snapshot().await.unwrap().unwrap();
        assert!(registry.iter().all(|(_, state)| state.claimed_by.is_none()));
    }

    #[tokio::test]
    async fn test_malformed_first_attempt_seeds_registry() {
        let store = MemoryStore::new();
        let claims = service(&store);

        assert!(!claims.claim(&AccountId::new("u1"), "NOT-A-CODE").await.unwrap());

        let registry = claims.snapshot().await.unwrap().unwrap();
        assert_eq!(registry.len(), SEED_CODES.len());
        assert!(registry.iter().all(|(_, state)| state.claimed_by.is_none()));
    }

    #[tokio::test]
    async fn test_padded_code_is_not_a_seed_code() {
        let store = MemoryStore::new();
        let claims = service(&store);
        let u1 = AccountId::new("u1");

        for padded in [" bl00m-adm-8c2e\n", "bl00m-adm-8c2e ", "\tbl00m-adm-8c2e"] {
            assert!(!claims.claim(&u1, padded).await.unwrap());
        }

        let registry = claims.snapshot().await.unwrap().unwrap();
        assert!(!registry.is_claimed_by(&u1));
    }

    #[test]
    fn test_storage_error_classification() {
        let wrong_type = StoreError::Redis(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "WRONGTYPE",
        )));
        assert!(matches!(
            ClaimError::from(wrong_type),
            ClaimError::StorageFault(_)
        ));

        let reset = StoreError::Redis(redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(matches!(
            ClaimError::from(reset),
            ClaimError::TransientStorageFailure(_)
        ));

        let exhausted = StoreError::RetryExhausted {
            attempts: 3,
            last_error: "conflict".to_string(),
        };
        assert!(matches!(
            ClaimError::from(exhausted),
            ClaimError::TransientStorageFailure(_)
        ));
    }

    #[tokio::test]
    async fn test_outcomes() {
        let store = MemoryStore::new();
        let claims = service(&store);
        let u1 = AccountId::new("u1");
        let u2 = AccountId::new("u2");

        assert_eq!(
            claims.claim_outcome(&u1, CODE).await.unwrap(),
            ClaimOutcome::Granted
        );
        assert_eq!(
            claims.claim_outcome(&u1, CODE).await.unwrap(),
            ClaimOutcome::AlreadyOwned
        );
        assert_eq!(
            claims.claim_outcome(&u2, CODE).await.unwrap(),
            ClaimOutcome::AlreadyClaimed
        );
    }

    #[tokio::test]
    async fn test_is_admin() {
        let store = MemoryStore::new();
        let claims = service(&store);
        let u1 = AccountId::new("u1");

        assert!(!claims.is_admin(&u1).await.unwrap());

        claims.claim(&u1, CODE).await.unwrap();

        assert!(claims.is_admin(&u1).await.unwrap());
        assert!(!claims.is_admin(&AccountId::new("u2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_failure_is_an_error_not_a_denial() {
        let store = MemoryStore::new();
        store.fail_next_commits(3);
        let claims = service(&store);

        let err = claims.claim(&AccountId::new("u1"), CODE).await.unwrap_err();

        assert!(matches!(err, ClaimError::TransientStorageFailure(_)));
        assert!(claims.snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_registry() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.get("test:admin_codes").await.unwrap();
        tx.set("test:admin_codes", "{\"codes\": 42}".to_string());
        assert!(tx.commit().await.unwrap());
        let claims = service(&store);

        let err = claims.claim(&AccountId::new("u1"), CODE).await.unwrap_err();

        assert!(matches!(err, ClaimError::CorruptRegistry(_)));
    }
}
