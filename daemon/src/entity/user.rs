use serde::{Deserialize, Serialize};

use custos_common::{crypto::Address, time::TimestampSeconds};

/// A principal holding an internal spendable balance and, optionally,
/// an on-chain wallet governed by a multisig.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Address>,
    // Internal spendable balance in atomic units; the reconciler may
    // overwrite it with the authoritative on-chain value
    pub balance: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_last_synced_at: Option<TimestampSeconds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisig_id: Option<u64>,
    // Users are never hard-deleted, only anonymized
    pub anonymized: bool,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

impl User {
    pub fn first_name(&self) -> &str {
        self.full_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(full_name: &str) -> User {
        User {
            id: 1,
            email: "a@b.c".to_string(),
            full_name: full_name.to_string(),
            phone_number: None,
            wallet: None,
            balance: 0,
            balance_last_synced_at: None,
            multisig_id: None,
            anonymized: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn first_name_is_leading_word() {
        assert_eq!(user("Bob Smith").first_name(), "Bob");
        assert_eq!(user("Bob").first_name(), "Bob");
        assert_eq!(user("  Bob  Smith ").first_name(), "Bob");
    }
}
