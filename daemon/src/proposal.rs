// Proposal engine: lifecycle state machine, approval accounting against
// the multisig threshold, the time-lock gate and execution.
//
// Transitions are linearized by the store's single-writer unit of work;
// the approval that brings the count to the threshold performs the
// PENDING -> APPROVED transition, and the first execute to claim an
// APPROVED proposal moves it to EXECUTING before any chain call happens.

use custos_common::{
    crypto::Address,
    multisig::{ApprovalKind, Permission, ProposalStatus, TimeLockStatus},
    time::{get_current_time_in_seconds, TimestampSeconds},
};

use crate::{
    custodian::Custodian,
    entity::{Approval, Multisig, MultisigMember, Proposal, ProposalTarget, TransferStatus},
    error::CoreError,
    storage::{UnitOfWork, PROPOSALS},
    transfer::Settlement,
};

#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub proposal: Proposal,
    pub approvals: usize,
    pub threshold: u8,
}

#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub proposal: Proposal,
    pub tx_hash: Option<String>,
}

pub(crate) fn require_member(
    uow: &UnitOfWork<'_>,
    key: &Address,
    permission: Permission,
) -> Result<MultisigMember, CoreError> {
    let member_id = uow
        .member_id_by_key(key)?
        .ok_or_else(|| CoreError::not_found("member", key))?;
    let member = uow
        .get_member(member_id)?
        .ok_or_else(|| CoreError::not_found("member", member_id))?;
    if !member.active {
        return Err(CoreError::InvalidState(format!(
            "member {} is retired",
            key
        )));
    }
    if !member.permissions.contains(permission) {
        return Err(CoreError::Validation(format!(
            "member {} lacks the {:?} permission",
            key, permission
        )));
    }
    Ok(member)
}

fn distinct_approvals(approvals: &[Approval], kind: ApprovalKind) -> usize {
    // Distinctness per member is structural: one row per (proposal, member, kind)
    approvals.iter().filter(|vote| vote.kind == kind).count()
}

fn latest_approval(approvals: &[Approval]) -> Option<TimestampSeconds> {
    approvals
        .iter()
        .filter(|vote| vote.kind == ApprovalKind::Approve)
        .map(|vote| vote.created_at)
        .max()
}

/// Pure time-lock arithmetic; callers pass the approvals they already read.
pub fn compute_time_lock(
    proposal: &Proposal,
    multisig: &Multisig,
    approvals: &[Approval],
    now: TimestampSeconds,
) -> TimeLockStatus {
    let latest = latest_approval(approvals);

    if proposal.status != ProposalStatus::Approved {
        return TimeLockStatus {
            can_execute: false,
            time_lock: multisig.time_lock,
            time_remaining: 0,
            latest_approval: latest,
            reason: format!("proposal is {:?}", proposal.status),
        };
    }

    if multisig.time_lock == 0 {
        return TimeLockStatus {
            can_execute: true,
            time_lock: 0,
            time_remaining: 0,
            latest_approval: latest,
            reason: "no time lock configured".to_string(),
        };
    }

    // The clock anchors on the newest Approve vote, so a late approval
    // restarts the wait
    let anchor = match latest {
        Some(anchor) => anchor,
        None => {
            return TimeLockStatus {
                can_execute: true,
                time_lock: multisig.time_lock,
                time_remaining: 0,
                latest_approval: None,
                reason: "no approvals recorded".to_string(),
            }
        }
    };

    let elapsed = now.saturating_sub(anchor);
    let time_remaining = multisig.time_lock.saturating_sub(elapsed);
    TimeLockStatus {
        can_execute: time_remaining == 0,
        time_lock: multisig.time_lock,
        time_remaining,
        latest_approval: latest,
        reason: if time_remaining == 0 {
            "time lock elapsed".to_string()
        } else {
            format!("time lock active for another {}s", time_remaining)
        },
    }
}

impl Custodian {
    /// Create a proposal in PENDING inside an open unit of work. The
    /// linked transfer row is created by the caller in the same unit.
    pub(crate) fn create_proposal(
        &self,
        uow: &mut UnitOfWork<'_>,
        multisig: &Multisig,
        proposer_key: &Address,
        target: ProposalTarget,
    ) -> Result<Proposal, CoreError> {
        let mut proposer = require_member(uow, proposer_key, Permission::Propose)?;
        if proposer.multisig_id != multisig.id {
            return Err(CoreError::Validation(format!(
                "member {} does not belong to multisig {}",
                proposer_key, multisig.pda
            )));
        }

        let now = get_current_time_in_seconds();
        let proposal = Proposal {
            id: uow.next_id(PROPOSALS)?,
            multisig_id: multisig.id,
            proposer: *proposer_key,
            status: ProposalStatus::Pending,
            target,
            tx_hash: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        uow.put_proposal(&proposal)?;

        proposer.mark_active(now);
        uow.put_member(&proposer)?;

        debug!(
            "proposal {} created on multisig {} by {}",
            proposal.id, multisig.pda, proposer_key
        );
        Ok(proposal)
    }

    pub async fn approve_proposal(
        &self,
        proposal_id: u64,
        member_key: &Address,
    ) -> Result<VoteOutcome, CoreError> {
        let mut uow = self.store().begin().await;
        let mut proposal = uow
            .get_proposal(proposal_id)?
            .ok_or_else(|| CoreError::not_found("proposal", proposal_id))?;
        let mut member = require_member(&uow, member_key, Permission::Vote)?;
        if member.multisig_id != proposal.multisig_id {
            return Err(CoreError::Validation(format!(
                "member {} does not belong to the proposal's multisig",
                member_key
            )));
        }

        match proposal.status {
            ProposalStatus::Pending | ProposalStatus::Approved => {}
            other => {
                return Err(CoreError::InvalidState(format!(
                    "cannot approve proposal {} in status {:?}",
                    proposal_id, other
                )))
            }
        }

        if uow.has_approval(proposal_id, member.id, ApprovalKind::Approve)? {
            return Err(CoreError::DuplicateApproval {
                proposal: proposal_id,
                member: member_key.to_string(),
                kind: ApprovalKind::Approve,
            });
        }

        let now = get_current_time_in_seconds();
        uow.put_approval(&Approval {
            proposal_id,
            member_id: member.id,
            kind: ApprovalKind::Approve,
            created_at: now,
        })?;
        member.mark_active(now);
        uow.put_member(&member)?;

        let multisig = uow
            .get_multisig(proposal.multisig_id)?
            .ok_or_else(|| CoreError::not_found("multisig", proposal.multisig_id))?;
        let approvals = distinct_approvals(&uow.approvals_for(proposal_id)?, ApprovalKind::Approve);

        if proposal.status == ProposalStatus::Pending && approvals >= multisig.threshold as usize {
            proposal.status = ProposalStatus::Approved;
            info!(
                "proposal {} approved with {}/{} votes, time lock {}s starts",
                proposal_id, approvals, multisig.threshold, multisig.time_lock
            );
        }
        proposal.updated_at = now;
        uow.put_proposal(&proposal)?;
        uow.commit().await?;

        Ok(VoteOutcome {
            proposal,
            approvals,
            threshold: multisig.threshold,
        })
    }

    pub async fn reject_proposal(
        &self,
        proposal_id: u64,
        member_key: &Address,
        reason: Option<String>,
    ) -> Result<VoteOutcome, CoreError> {
        let mut uow = self.store().begin().await;
        let mut proposal = uow
            .get_proposal(proposal_id)?
            .ok_or_else(|| CoreError::not_found("proposal", proposal_id))?;
        let mut member = require_member(&uow, member_key, Permission::Vote)?;
        if member.multisig_id != proposal.multisig_id {
            return Err(CoreError::Validation(format!(
                "member {} does not belong to the proposal's multisig",
                member_key
            )));
        }

        match proposal.status {
            ProposalStatus::Pending | ProposalStatus::Approved => {}
            other => {
                return Err(CoreError::InvalidState(format!(
                    "cannot reject proposal {} in status {:?}",
                    proposal_id, other
                )))
            }
        }

        if uow.has_approval(proposal_id, member.id, ApprovalKind::Reject)? {
            return Err(CoreError::DuplicateApproval {
                proposal: proposal_id,
                member: member_key.to_string(),
                kind: ApprovalKind::Reject,
            });
        }

        let now = get_current_time_in_seconds();
        // Existing Approve rows stay in place for the audit trail
        uow.put_approval(&Approval {
            proposal_id,
            member_id: member.id,
            kind: ApprovalKind::Reject,
            created_at: now,
        })?;
        member.mark_active(now);
        uow.put_member(&member)?;

        proposal.status = ProposalStatus::Rejected;
        proposal.notes = reason;
        proposal.updated_at = now;
        uow.put_proposal(&proposal)?;
        self.set_target_status(&mut uow, proposal.target, TransferStatus::Cancelled)?;
        uow.commit().await?;

        info!("proposal {} rejected by {}", proposal_id, member_key);

        let multisig = self
            .store()
            .multisig(proposal.multisig_id)?
            .ok_or_else(|| CoreError::not_found("multisig", proposal.multisig_id))?;
        let approvals = distinct_approvals(
            &self.store().approvals_for(proposal_id)?,
            ApprovalKind::Approve,
        );
        Ok(VoteOutcome {
            proposal,
            approvals,
            threshold: multisig.threshold,
        })
    }

    pub async fn time_lock_status(&self, proposal_id: u64) -> Result<TimeLockStatus, CoreError> {
        let proposal = self
            .store()
            .proposal(proposal_id)?
            .ok_or_else(|| CoreError::not_found("proposal", proposal_id))?;
        let multisig = self
            .store()
            .multisig(proposal.multisig_id)?
            .ok_or_else(|| CoreError::not_found("multisig", proposal.multisig_id))?;
        let approvals = self.store().approvals_for(proposal_id)?;

        Ok(compute_time_lock(
            &proposal,
            &multisig,
            &approvals,
            get_current_time_in_seconds(),
        ))
    }

    pub async fn execute_proposal(
        &self,
        proposal_id: u64,
        executor_key: &Address,
    ) -> Result<ExecuteOutcome, CoreError> {
        // Claim and settle first: the proposal moves to EXECUTING and the
        // ledger posts in the same unit of work, committed before any
        // chain submission happens
        let (proposal, settlement) = {
            let mut uow = self.store().begin().await;
            let mut proposal = uow
                .get_proposal(proposal_id)?
                .ok_or_else(|| CoreError::not_found("proposal", proposal_id))?;
            let mut executor = require_member(&uow, executor_key, Permission::Execute)?;
            if executor.multisig_id != proposal.multisig_id {
                return Err(CoreError::Validation(format!(
                    "member {} does not belong to the proposal's multisig",
                    executor_key
                )));
            }

            if proposal.status != ProposalStatus::Approved {
                return Err(CoreError::InvalidState(format!(
                    "cannot execute proposal {} in status {:?}",
                    proposal_id, proposal.status
                )));
            }

            let multisig = uow
                .get_multisig(proposal.multisig_id)?
                .ok_or_else(|| CoreError::not_found("multisig", proposal.multisig_id))?;
            let approvals = uow.approvals_for(proposal_id)?;
            let now = get_current_time_in_seconds();
            let lock = compute_time_lock(&proposal, &multisig, &approvals, now);
            if !lock.can_execute {
                return Err(CoreError::TimeLockActive {
                    time_remaining: lock.time_remaining,
                });
            }

            proposal.status = ProposalStatus::Executing;
            proposal.updated_at = now;
            uow.put_proposal(&proposal)?;
            executor.mark_active(now);
            uow.put_member(&executor)?;

            match self.stage_target(&mut uow, &proposal) {
                Ok(settlement) => {
                    uow.commit().await?;
                    (proposal, settlement)
                }
                Err(err) => {
                    // Invalid domain object at execution time: the claim
                    // and any partial staging are discarded, the failure
                    // is recorded on its own
                    drop(uow);
                    warn!("proposal {} failed to settle: {}", proposal_id, err);
                    self.record_execution_failure(proposal_id, &err, None)
                        .await?;
                    return Err(err);
                }
            }
        };

        debug!("executing proposal {}", proposal_id);
        match self.submit_target(&proposal).await {
            Ok(tx_hash) => {
                // Follow-up transaction: stamp the tx hash, nothing else
                let mut uow = self.store().begin().await;
                let mut proposal = uow
                    .get_proposal(proposal_id)?
                    .ok_or_else(|| CoreError::not_found("proposal", proposal_id))?;
                proposal.status = ProposalStatus::Executed;
                proposal.tx_hash = tx_hash.clone();
                proposal.updated_at = get_current_time_in_seconds();
                uow.put_proposal(&proposal)?;
                if let Some(hash) = tx_hash.as_deref() {
                    self.stamp_target(&mut uow, proposal.target, &settlement, hash)?;
                }
                uow.commit().await?;

                info!(
                    "proposal {} executed{}",
                    proposal_id,
                    tx_hash
                        .as_deref()
                        .map(|hash| format!(", tx {}", hash))
                        .unwrap_or_default()
                );
                Ok(ExecuteOutcome { proposal, tx_hash })
            }
            Err(err) => {
                warn!("proposal {} execution failed: {}", proposal_id, err);
                self.record_execution_failure(proposal_id, &err, Some(&settlement))
                    .await?;
                Err(err)
            }
        }
    }

    // Mark the proposal and its domain object FAILED; when the ledger
    // already settled, reverse it from the recorded settlement
    async fn record_execution_failure(
        &self,
        proposal_id: u64,
        err: &CoreError,
        settlement: Option<&Settlement>,
    ) -> Result<(), CoreError> {
        let mut uow = self.store().begin().await;
        let mut proposal = uow
            .get_proposal(proposal_id)?
            .ok_or_else(|| CoreError::not_found("proposal", proposal_id))?;
        proposal.status = ProposalStatus::Failed;
        // Keep the failure in the audit trail
        proposal.notes = Some(err.to_string());
        proposal.updated_at = get_current_time_in_seconds();
        uow.put_proposal(&proposal)?;
        self.set_target_status(&mut uow, proposal.target, TransferStatus::Failed)?;
        if let Some(settlement) = settlement {
            self.revert_settlement(&mut uow, settlement)?;
        }
        uow.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_common::crypto::{derive_create_key, derive_program_address, Keypair};

    fn fixtures(status: ProposalStatus, time_lock: u64) -> (Proposal, Multisig) {
        let create_key = derive_create_key(&[Keypair::generate().address()]);
        let multisig = Multisig {
            id: 1,
            pda: derive_program_address(&create_key),
            create_key,
            name: "test".to_string(),
            threshold: 2,
            time_lock,
            is_main: true,
            active: true,
            created_at: 0,
            updated_at: 0,
        };
        let proposal = Proposal {
            id: 1,
            multisig_id: 1,
            proposer: Keypair::generate().address(),
            status,
            target: ProposalTarget::WalletTransfer(1),
            tx_hash: None,
            notes: None,
            created_at: 0,
            updated_at: 0,
        };
        (proposal, multisig)
    }

    fn approve_at(at: TimestampSeconds) -> Approval {
        Approval {
            proposal_id: 1,
            member_id: at,
            kind: ApprovalKind::Approve,
            created_at: at,
        }
    }

    #[test]
    fn pending_proposal_cannot_execute() {
        let (proposal, multisig) = fixtures(ProposalStatus::Pending, 5);
        let lock = compute_time_lock(&proposal, &multisig, &[approve_at(100)], 200);
        assert!(!lock.can_execute);
        assert_eq!(lock.time_remaining, 0);
    }

    #[test]
    fn zero_lock_executes_immediately_once_approved() {
        let (proposal, multisig) = fixtures(ProposalStatus::Approved, 0);
        let lock = compute_time_lock(&proposal, &multisig, &[approve_at(100)], 100);
        assert!(lock.can_execute);
        assert_eq!(lock.time_remaining, 0);
    }

    #[test]
    fn lock_counts_down_from_latest_approval() {
        let (proposal, multisig) = fixtures(ProposalStatus::Approved, 5);

        let lock = compute_time_lock(&proposal, &multisig, &[approve_at(100)], 101);
        assert!(!lock.can_execute);
        assert_eq!(lock.time_remaining, 4);
        assert_eq!(lock.latest_approval, Some(100));

        let lock = compute_time_lock(&proposal, &multisig, &[approve_at(100)], 105);
        assert!(lock.can_execute);
        assert_eq!(lock.time_remaining, 0);
    }

    #[test]
    fn late_approval_restarts_the_clock() {
        let (proposal, multisig) = fixtures(ProposalStatus::Approved, 5);
        let votes = [approve_at(100), approve_at(103)];

        let lock = compute_time_lock(&proposal, &multisig, &votes, 106);
        assert!(!lock.can_execute);
        assert_eq!(lock.time_remaining, 2);
        assert_eq!(lock.latest_approval, Some(103));
    }

    #[test]
    fn reject_votes_do_not_anchor_the_lock() {
        let (proposal, multisig) = fixtures(ProposalStatus::Approved, 5);
        let votes = [
            approve_at(100),
            Approval {
                proposal_id: 1,
                member_id: 9,
                kind: ApprovalKind::Reject,
                created_at: 200,
            },
        ];

        let lock = compute_time_lock(&proposal, &multisig, &votes, 105);
        assert!(lock.can_execute);
        assert_eq!(lock.latest_approval, Some(100));
    }
}
