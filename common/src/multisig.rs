use serde::{Deserialize, Serialize};

use crate::time::TimestampSeconds;

/// What a multisig member is allowed to do.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    Propose,
    Vote,
    Execute,
}

impl Permission {
    const ALL: [Permission; 3] = [Permission::Propose, Permission::Vote, Permission::Execute];

    fn bit(self) -> u8 {
        match self {
            Permission::Propose => 0b001,
            Permission::Vote => 0b010,
            Permission::Execute => 0b100,
        }
    }
}

/// Subset of member permissions, serialized as the list of granted ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermissionSet(u8);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        let mut set = Self::empty();
        for permission in Permission::ALL {
            set = set.with(permission);
        }
        set
    }

    pub fn with(self, permission: Permission) -> Self {
        Self(self.0 | permission.bit())
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn permissions(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.contains(*p))
            .collect()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.permissions().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let permissions = Vec::<Permission>::deserialize(deserializer)?;
        let mut set = Self::empty();
        for permission in permissions {
            set = set.with(permission);
        }
        Ok(set)
    }
}

/// Lifecycle of a governed proposal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Created, accruing approvals.
    Pending,
    /// Threshold reached, time lock running from the latest approval.
    Approved,
    /// Execution in flight.
    Executing,
    /// Domain action completed.
    Executed,
    /// Rejected by a member vote.
    Rejected,
    /// Domain action failed; not reopenable.
    Failed,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Executed | ProposalStatus::Rejected | ProposalStatus::Failed
        )
    }
}

/// Direction of a member vote.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalKind {
    Approve,
    Reject,
}

/// On-demand answer to "can this proposal execute yet".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLockStatus {
    pub can_execute: bool,
    /// Configured lock duration of the owning multisig, in seconds.
    pub time_lock: u64,
    /// Whole seconds left before execution is allowed.
    pub time_remaining: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_approval: Option<TimestampSeconds>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_set_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let set = PermissionSet::empty()
            .with(Permission::Propose)
            .with(Permission::Execute);
        assert!(set.contains(Permission::Propose));
        assert!(!set.contains(Permission::Vote));

        let encoded = serde_json::to_string(&set)?;
        assert_eq!(encoded, "[\"propose\",\"execute\"]");
        let decoded: PermissionSet = serde_json::from_str(&encoded)?;
        assert_eq!(set, decoded);
        Ok(())
    }

    #[test]
    fn proposal_status_terminality() {
        assert!(!ProposalStatus::Pending.is_terminal());
        assert!(!ProposalStatus::Approved.is_terminal());
        assert!(!ProposalStatus::Executing.is_terminal());
        assert!(ProposalStatus::Executed.is_terminal());
        assert!(ProposalStatus::Rejected.is_terminal());
        assert!(ProposalStatus::Failed.is_terminal());
    }

    #[test]
    fn proposal_status_wire_format() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(
            serde_json::to_string(&ProposalStatus::Executing)?,
            "\"EXECUTING\""
        );
        Ok(())
    }
}
