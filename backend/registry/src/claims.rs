use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    RegistryError,
    codes::{AccountId, AdminCode, SEED_CODES},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimState {
    pub claimed_by: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

/// Result of checking one `(account, code)` pair against the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The code was unclaimed and now belongs to the caller.
    Granted,
    /// The caller already owns the code, e.g. a page refresh.
    AlreadyOwned,
    UnknownCode,
    /// Owned by a different account.
    AlreadyClaimed,
}

impl ClaimOutcome {
    pub fn is_granted(self) -> bool {
        matches!(self, ClaimOutcome::Granted | ClaimOutcome::AlreadyOwned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimOutcome::Granted => "granted",
            ClaimOutcome::AlreadyOwned => "already_owned",
            ClaimOutcome::UnknownCode => "unknown_code",
            ClaimOutcome::AlreadyClaimed => "already_claimed",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCodeRegistry {
    codes: BTreeMap<AdminCode, ClaimState>,
}

impl AdminCodeRegistry {
    pub fn seeded(now: DateTime<Utc>) -> Self {
        let codes = SEED_CODES
            .iter()
            .map(|code| {
                (
                    AdminCode::seed(code),
                    ClaimState {
                        claimed_by: None,
                        created_at: now,
                    },
                )
            })
            .collect();

        Self { codes }
    }

    /// Applies a claim attempt. The registry is only modified on [`ClaimOutcome::Granted`].
    pub fn claim(&mut self, account: &AccountId, code: &AdminCode) -> ClaimOutcome {
        let Some(state) = self.codes.get_mut(code) else {
            return ClaimOutcome::UnknownCode;
        };

        match &state.claimed_by {
            Some(owner) if owner == account => ClaimOutcome::AlreadyOwned,
            Some(_) => ClaimOutcome::AlreadyClaimed,
            None => {
                state.claimed_by = Some(account.clone());
                ClaimOutcome::Granted
            }
        }
    }

    pub fn claimant(&self, code: &AdminCode) -> Option<&AccountId> {
        self.codes.get(code)?.claimed_by.as_ref()
    }

    pub fn is_claimed_by(&self, account: &AccountId) -> bool {
        self.codes
            .values()
            .any(|state| state.claimed_by.as_ref() == Some(account))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AdminCode, &ClaimState)> {
        self.codes.iter()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn encode(&self) -> Result<String, RegistryError> {
        serde_json::to_string(self).map_err(RegistryError::Encode)
    }

    pub fn decode(raw: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> AdminCode {
        AdminCode::parse(s).unwrap()
    }

    #[test]
    fn test_seeded_holds_exactly_the_seed_set() {
        let registry = AdminCodeRegistry::seeded(Utc::now());

        let keys: Vec<&str> = registry.iter().map(|(code, _)| code.as_str()).collect();
        let mut expected = SEED_CODES.to_vec();
        expected.sort();

        assert_eq!(keys, expected);
        assert!(registry.iter().all(|(_, state)| state.claimed_by.is_none()));
    }

    #[test]
    fn test_unknown_code() {
        let mut registry = AdminCodeRegistry::seeded(Utc::now());
        let before = registry.clone();

        let outcome = registry.claim(&AccountId::new("u1"), &code("bl00m-adm-0000"));

        assert_eq!(outcome, ClaimOutcome::UnknownCode);
        assert!(!outcome.is_granted());
        assert_eq!(registry, before);
    }

    #[test]
    fn test_claim_then_reclaim_same_account() {
        let mut registry = AdminCodeRegistry::seeded(Utc::now());
        let u1 = AccountId::new("u1");
        let c = code("bl00m-adm-8c2e");

        assert_eq!(registry.claim(&u1, &c), ClaimOutcome::Granted);
        assert_eq!(registry.claim(&u1, &c), ClaimOutcome::AlreadyOwned);
        assert!(ClaimOutcome::AlreadyOwned.is_granted());
        assert_eq!(registry.claimant(&c), Some(&u1));
        assert!(registry.is_claimed_by(&u1));
    }

    #[test]
    fn test_claimed_code_never_changes_owner() {
        let mut registry = AdminCodeRegistry::seeded(Utc::now());
        let u1 = AccountId::new("u1");
        let u2 = AccountId::new("u2");
        let c = code("bl00m-adm-8c2e");

        registry.claim(&u1, &c);

        assert_eq!(registry.claim(&u2, &c), ClaimOutcome::AlreadyClaimed);
        assert_eq!(registry.claimant(&c), Some(&u1));
        assert!(!registry.is_claimed_by(&u2));
    }

    #[test]
    fn test_other_codes_stay_unclaimed() {
        let mut registry = AdminCodeRegistry::seeded(Utc::now());
        registry.claim(&AccountId::new("u1"), &code("bl00m-adm-8c2e"));

        let claimed = registry
            .iter()
            .filter(|(_, state)| state.claimed_by.is_some())
            .count();
        assert_eq!(claimed, 1);
    }

    #[test]
    fn test_document_shape() {
        let mut registry = AdminCodeRegistry::seeded(Utc::now());
        registry.claim(&AccountId::new("u1"), &code("bl00m-adm-8c2e"));

        let json = serde_json::to_value(&registry).unwrap();
        let entry = &json["codes"]["bl00m-adm-8c2e"];

        assert_eq!(entry["claimedBy"], "u1");
        assert!(entry["createdAt"].is_string());
        assert!(json["codes"]["bl00m-adm-31f7"]["claimedBy"].is_null());

        let decoded = AdminCodeRegistry::decode(&registry.encode().unwrap()).unwrap();
        assert_eq!(decoded, registry);
    }

    #[test]
    fn test_decode_corrupt_document() {
        for raw in ["", "not json", r#"{"codes": 42}"#, r#"{"codes": {"x": {"claimedBy": 1}}}"#] {
            assert!(matches!(
                AdminCodeRegistry::decode(raw),
                Err(RegistryError::Corrupt(_))
            ));
        }
    }
}
