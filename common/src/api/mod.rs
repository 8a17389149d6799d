// Typed request/response shapes for the control surface.
//
// Transport, authentication and CSRF enforcement live in the embedding
// HTTP layer; these types are the contract it mounts. Every mutating
// intent of the backend has a Params/Result pair here.

use serde::{Deserialize, Serialize};

use crate::{
    crypto::Address,
    currency::Currency,
    multisig::{ProposalStatus, TimeLockStatus},
    time::TimestampSeconds,
};

fn default_false() -> bool {
    false
}

// Users

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserParams {
    pub email: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResult {
    pub id: u64,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Address>,
    // Internal spendable balance in atomic units
    pub balance: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisig_pda: Option<Address>,
    pub created_at: TimestampSeconds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizeUserParams {
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizeUserResult {
    pub user_id: u64,
    // How many personal fields were replaced with placeholders
    pub fields_anonymized: usize,
}

// Transfers and proposals

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransferParams {
    pub sender_id: u64,
    // Receiver is looked up by first name; ambiguous matches are rejected
    pub receiver_first_name: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransferResult {
    pub transfer_id: u64,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
    pub sender_balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeWalletTransferParams {
    pub from_wallet: Address,
    pub to_wallet: Address,
    pub amount: u64,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub requested_by: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeExternalTransferParams {
    pub user_id: u64,
    // Defaults to the user's custodial wallet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_wallet: Option<Address>,
    pub to_wallet: Address,
    pub amount: u64,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeTransferResult {
    pub proposal_id: u64,
    pub multisig_pda: Address,
    pub status: ProposalStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveProposalParams {
    pub proposal_id: u64,
    pub member_key: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectProposalParams {
    pub proposal_id: u64,
    pub member_key: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    pub proposal_id: u64,
    pub status: ProposalStatus,
    pub approvals: usize,
    pub threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteProposalParams {
    pub proposal_id: u64,
    pub executor_key: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteProposalResult {
    pub proposal_id: u64,
    pub status: ProposalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTimeLockStatusParams {
    pub proposal_id: u64,
}

pub type GetTimeLockStatusResult = TimeLockStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProposalsParams {
    pub multisig_pda: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProposalStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSummary {
    pub id: u64,
    pub multisig_pda: Address,
    pub proposer: Address,
    pub status: ProposalStatus,
    pub approvals: usize,
    pub rejections: usize,
    pub threshold: u8,
    pub time_lock: u64,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProposalsResult {
    pub proposals: Vec<ProposalSummary>,
}

// Balance sync and monitoring

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserBalanceParams {
    pub user_id: u64,
    #[serde(default = "default_false")]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserBalanceResult {
    pub user_id: u64,
    pub balance: u64,
    // False when the cached balance was still fresh and no chain read happened
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatusResult {
    pub activity_sweeper_running: bool,
    pub reconciler_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReportResult {
    pub seen: usize,
    pub ingested: usize,
    pub errors: usize,
}

// Admin inactivity surface

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberActivity {
    pub member_key: Address,
    pub multisig_pda: Address,
    pub active: bool,
    pub last_activity: TimestampSeconds,
    pub hours_since_activity: u64,
    pub is_inactive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive_since: Option<TimestampSeconds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_eligible_at: Option<TimestampSeconds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InactivityStatusResult {
    pub members: Vec<MemberActivity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberParams {
    pub member_key: Address,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberResult {
    pub member_key: Address,
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_use_camel_case() -> Result<(), Box<dyn std::error::Error>> {
        let params: SyncUserBalanceParams = serde_json::from_str("{\"userId\": 3}")?;
        assert_eq!(params.user_id, 3);
        // force defaults off
        assert!(!params.force);
        Ok(())
    }

    #[test]
    fn optional_fields_are_omitted() -> Result<(), Box<dyn std::error::Error>> {
        let result = ExecuteProposalResult {
            proposal_id: 1,
            status: ProposalStatus::Executed,
            tx_hash: None,
        };
        let encoded = serde_json::to_string(&result)?;
        assert!(!encoded.contains("txHash"));
        Ok(())
    }
}
