use serde::{Deserialize, Serialize};

use custos_common::{crypto::Address, currency::Currency, time::TimestampSeconds};

/// Lifecycle of a transfer row.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Waiting on the governing proposal.
    PendingApproval,
    /// Settled; balances are posted.
    Completed,
    /// Governing proposal was rejected.
    Cancelled,
    /// Execution failed; terminal.
    Failed,
}

impl TransferStatus {
    pub fn is_posted(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }
}

/// Off-chain ledger transfer between two users. Never settles on-chain
/// and is not governed by a proposal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransfer {
    pub id: u64,
    pub sender_id: u64,
    pub receiver_id: u64,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
    pub currency: Currency,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

/// Governed wallet-to-wallet transfer. Stablecoin only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransfer {
    pub id: u64,
    pub from_wallet: Address,
    pub to_wallet: Address,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
    pub currency: Currency,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub requested_by: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<u64>,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

/// Governed transfer from a user's custodial wallet to an external address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransfer {
    pub id: u64,
    pub user_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_wallet: Option<Address>,
    pub to_wallet: Address,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
    pub currency: Currency,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<u64>,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

/// Which transfer row a fee was computed from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum FeeSource {
    Internal(u64),
    Wallet(u64),
    External(u64),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeStatus {
    Collected,
    /// The treasury leg failed after the main transfer settled; an
    /// operator task reconciles these later.
    Uncollected,
}

/// A collected (or pending-collection) fee routed to a treasury vault.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    pub id: u64,
    pub source: FeeSource,
    pub vault_id: u64,
    pub amount: u64,
    // Rate applied, expressed as the divisor of the gross amount
    pub rate_divisor: u64,
    pub status: FeeStatus,
    pub created_at: TimestampSeconds,
}
