use serde::{Deserialize, Serialize};

use custos_common::{crypto::Address, multisig::PermissionSet, time::TimestampSeconds};

/// Governance record for a set of signing members.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Multisig {
    pub id: u64,
    // Program-derived address, unique per create key
    pub pda: Address,
    pub create_key: Address,
    pub name: String,
    // Distinct Approve votes required before the time lock starts
    pub threshold: u8,
    // Seconds between the latest approval and allowed execution
    pub time_lock: u64,
    pub is_main: bool,
    pub active: bool,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

/// Membership row. Retirement deactivates it; rows are never deleted so
/// the approval history keeps resolving.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MultisigMember {
    pub id: u64,
    pub multisig_id: u64,
    // Unique across all multisigs
    pub public_key: Address,
    pub permissions: PermissionSet,
    pub active: bool,
    pub last_activity_at: TimestampSeconds,
    pub is_inactive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inactive_since: Option<TimestampSeconds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_eligible_at: Option<TimestampSeconds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    pub created_at: TimestampSeconds,
    pub updated_at: TimestampSeconds,
}

impl MultisigMember {
    /// Clear the inactivity marks after an explicit member action.
    pub fn mark_active(&mut self, now: TimestampSeconds) {
        self.last_activity_at = now;
        self.is_inactive = false;
        self.inactive_since = None;
        self.removal_eligible_at = None;
        self.updated_at = now;
    }
}

/// Audit row written when a member is retired.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemovalEvent {
    pub id: u64,
    pub member_id: u64,
    pub multisig_id: u64,
    pub reason: String,
    pub created_at: TimestampSeconds,
}
