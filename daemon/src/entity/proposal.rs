use serde::{Deserialize, Serialize};

use custos_common::{
    crypto::Address,
    multisig::{ApprovalKind, ProposalStatus},
    time::TimestampSeconds,
};

/// The domain object a proposal governs. Exactly one per proposal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum ProposalTarget {
    WalletTransfer(u64),
    ExternalTransfer(u64),
}

/// Unit of governance: a staged transfer awaiting member approvals.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: u64,
    pub multisig_id: u64,
    pub proposer: Address,
    pub status: ProposalStatus,
    pub target: ProposalTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    // Audit trail: rejection reasons and chain failure messages land here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: TimestampSeconds,
    // Status transitions bump this; for APPROVED it anchors the time lock
    pub updated_at: TimestampSeconds,
}

/// A member vote. At most one Approve and one Reject per (proposal, member).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub proposal_id: u64,
    pub member_id: u64,
    pub kind: ApprovalKind,
    pub created_at: TimestampSeconds,
}
