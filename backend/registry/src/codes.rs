use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pre-shared admin activation codes the registry is seeded with.
pub const SEED_CODES: [&str; 5] = [
    "bl00m-adm-8c2e",
    "bl00m-adm-31f7",
    "bl00m-adm-a94d",
    "bl00m-adm-6b0c",
    "bl00m-adm-e5d1",
];

const MAX_CODE_LEN: usize = 64;

static CODE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("code pattern is valid"));

/// Opaque identifier of an authenticated principal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminCode(String);

impl AdminCode {
    /// Pre-filter for caller-supplied input, taken verbatim.
    ///
    /// Anything that is empty, longer than 64 bytes, or contains characters outside `[a-z0-9-]`
    /// (whitespace included) returns `None`, since no seed code looks like that.
    pub fn parse(input: &str) -> Option<Self> {
        if input.is_empty() || input.len() > MAX_CODE_LEN || !CODE_SHAPE.is_match(input) {
            return None;
        }

        Some(Self(input.to_string()))
    }

    pub(crate) fn seed(code: &str) -> Self {
        Self(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Log-safe rendering: first and last two characters, the rest starred out.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let len = chars.len();
        if len <= 4 {
            return "*".repeat(len);
        }

        let head: String = chars[..2].iter().collect();
        let tail: String = chars[len - 2..].iter().collect();
        format!("{head}{}{tail}", "*".repeat(len - 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_codes() {
        for code in SEED_CODES {
            assert_eq!(AdminCode::parse(code).unwrap().as_str(), code);
        }
    }

    #[test]
    fn test_parse_rejects_padded_input() {
        assert!(AdminCode::parse(" bl00m-adm-8c2e\n").is_none());
        assert!(AdminCode::parse("bl00m-adm-8c2e ").is_none());
        assert!(AdminCode::parse("\tbl00m-adm-8c2e").is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AdminCode::parse("").is_none());
        assert!(AdminCode::parse("   ").is_none());
        assert!(AdminCode::parse("BL00M-ADM-8C2E").is_none());
        assert!(AdminCode::parse("bl00m adm").is_none());
        assert!(AdminCode::parse("bl00m-adm-8c2e'; DROP").is_none());
        assert!(AdminCode::parse(&"a".repeat(65)).is_none());
        assert!(AdminCode::parse(&"a".repeat(64)).is_some());
    }

    #[test]
    fn test_masked() {
        let code = AdminCode::parse("bl00m-adm-8c2e").unwrap();
        assert_eq!(code.masked(), "bl**********2e");
        assert_eq!(AdminCode::parse("abcd").unwrap().masked(), "****");
    }

    #[test]
    fn test_masked_stored_non_ascii_code() {
        let code: AdminCode = serde_json::from_str("\"éb00m-adm-8cé\"").unwrap();
        assert_eq!(code.masked(), "éb*********cé");

        let short: AdminCode = serde_json::from_str("\"éé\"").unwrap();
        assert_eq!(short.masked(), "**");
    }

    #[test]
    fn test_account_id_is_transparent() {
        let account = AccountId::new("u1");
        assert_eq!(serde_json::to_string(&account).unwrap(), "\"u1\"");
        assert_eq!(account.to_string(), "u1");
    }
}
