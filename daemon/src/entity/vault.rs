use serde::{Deserialize, Serialize};

use custos_common::{crypto::Address, currency::Currency, time::TimestampSeconds};

/// What a vault pools.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VaultKind {
    /// Fee aggregation, one per currency.
    Treasury,
    /// Deposits against a user's custodial wallet.
    Wallet,
}

/// Treasury or user-wallet pool aggregating funds in one currency.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub id: u64,
    pub address: Address,
    pub kind: VaultKind,
    pub currency: Currency,
    pub total_balance: u64,
    // Collected fees are tracked separately from the pooled funds
    pub fee_balance: u64,
    pub active: bool,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

/// How an inbound transfer was classified by the reconciler.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositKind {
    Airdrop,
    External,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
}

/// Ingress against a vault, deduplicated by tx hash within the vault.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: u64,
    pub vault_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    pub amount: u64,
    pub currency: Currency,
    pub status: SettlementStatus,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,
    pub kind: DepositKind,
    pub created_at: TimestampSeconds,
}

/// Egress against a vault.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: u64,
    pub vault_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    pub amount: u64,
    pub currency: Currency,
    pub status: SettlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub created_at: TimestampSeconds,
}
