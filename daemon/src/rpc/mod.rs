// Transport-agnostic control facade. One handler method per intent,
// typed params in, typed results out. The embedding HTTP layer owns
// transport, authentication, CSRF and CORS; it mounts these handlers
// and maps CoreError onto response statuses.

use std::sync::Arc;

use custos_common::{
    api::{
        AnonymizeUserParams, AnonymizeUserResult, ApproveProposalParams, CreateUserParams,
        ExecuteProposalParams, ExecuteProposalResult, GetTimeLockStatusParams,
        GetTimeLockStatusResult, InactivityStatusResult, InternalTransferParams,
        InternalTransferResult, ListProposalsParams, ListProposalsResult, MonitoringStatusResult,
        ProposalSummary, ProposeExternalTransferParams, ProposeTransferResult,
        ProposeWalletTransferParams, RejectProposalParams, RemoveMemberParams, RemoveMemberResult,
        SweepReportResult, SyncUserBalanceParams, SyncUserBalanceResult, UserResult, VoteResult,
    },
    multisig::ApprovalKind,
};

use crate::{
    custodian::Custodian,
    entity::{Multisig, Proposal, User},
    error::CoreError,
    scheduler::{JobKind, Scheduler, SchedulerError},
};

pub struct Handler {
    custodian: Arc<Custodian>,
    scheduler: Arc<Scheduler>,
}

impl Handler {
    pub fn new(custodian: Arc<Custodian>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            custodian,
            scheduler,
        }
    }

    // Users

    pub async fn create_user(&self, params: CreateUserParams) -> Result<UserResult, CoreError> {
        let user = self.custodian.create_user(params).await?;
        self.user_result(user)
    }

    pub async fn anonymize_user(
        &self,
        params: AnonymizeUserParams,
    ) -> Result<AnonymizeUserResult, CoreError> {
        self.custodian.anonymize_user(params.user_id).await
    }

    fn user_result(&self, user: User) -> Result<UserResult, CoreError> {
        let multisig_pda = match user.multisig_id {
            Some(id) => self
                .custodian
                .store()
                .multisig(id)?
                .map(|multisig| multisig.pda),
            None => None,
        };
        Ok(UserResult {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            wallet: user.wallet,
            balance: user.balance,
            multisig_pda,
            created_at: user.created_at,
        })
    }

    // Transfers

    pub async fn internal_transfer(
        &self,
        params: InternalTransferParams,
    ) -> Result<InternalTransferResult, CoreError> {
        let outcome = self
            .custodian
            .internal_transfer(
                params.sender_id,
                &params.receiver_first_name,
                params.amount,
                params.notes,
            )
            .await?;
        Ok(InternalTransferResult {
            transfer_id: outcome.transfer.id,
            gross: outcome.transfer.gross,
            fee: outcome.transfer.fee,
            net: outcome.transfer.net,
            sender_balance: outcome.sender_balance,
        })
    }

    pub async fn propose_wallet_transfer(
        &self,
        params: ProposeWalletTransferParams,
    ) -> Result<ProposeTransferResult, CoreError> {
        let (proposal, multisig) = self
            .custodian
            .propose_wallet_transfer(
                &params.from_wallet,
                &params.to_wallet,
                params.amount,
                params.currency,
                params.notes,
                &params.requested_by,
            )
            .await?;
        Ok(ProposeTransferResult {
            proposal_id: proposal.id,
            multisig_pda: multisig.pda,
            status: proposal.status,
        })
    }

    pub async fn propose_external_transfer(
        &self,
        params: ProposeExternalTransferParams,
    ) -> Result<ProposeTransferResult, CoreError> {
        let (proposal, multisig) = self
            .custodian
            .propose_external_transfer(
                params.user_id,
                params.from_wallet,
                &params.to_wallet,
                params.amount,
                params.currency,
                params.notes,
            )
            .await?;
        Ok(ProposeTransferResult {
            proposal_id: proposal.id,
            multisig_pda: multisig.pda,
            status: proposal.status,
        })
    }

    // Proposal lifecycle

    pub async fn approve_proposal(
        &self,
        params: ApproveProposalParams,
    ) -> Result<VoteResult, CoreError> {
        let outcome = self
            .custodian
            .approve_proposal(params.proposal_id, &params.member_key)
            .await?;
        Ok(VoteResult {
            proposal_id: outcome.proposal.id,
            status: outcome.proposal.status,
            approvals: outcome.approvals,
            threshold: outcome.threshold,
        })
    }

    pub async fn reject_proposal(
        &self,
        params: RejectProposalParams,
    ) -> Result<VoteResult, CoreError> {
        let outcome = self
            .custodian
            .reject_proposal(params.proposal_id, &params.member_key, params.reason)
            .await?;
        Ok(VoteResult {
            proposal_id: outcome.proposal.id,
            status: outcome.proposal.status,
            approvals: outcome.approvals,
            threshold: outcome.threshold,
        })
    }

    pub async fn execute_proposal(
        &self,
        params: ExecuteProposalParams,
    ) -> Result<ExecuteProposalResult, CoreError> {
        let outcome = self
            .custodian
            .execute_proposal(params.proposal_id, &params.executor_key)
            .await?;
        Ok(ExecuteProposalResult {
            proposal_id: outcome.proposal.id,
            status: outcome.proposal.status,
            tx_hash: outcome.tx_hash,
        })
    }

    pub async fn get_time_lock_status(
        &self,
        params: GetTimeLockStatusParams,
    ) -> Result<GetTimeLockStatusResult, CoreError> {
        self.custodian.time_lock_status(params.proposal_id).await
    }

    pub async fn list_proposals(
        &self,
        params: ListProposalsParams,
    ) -> Result<ListProposalsResult, CoreError> {
        let multisig = self
            .custodian
            .store()
            .multisig_by_pda(&params.multisig_pda)?
            .ok_or_else(|| CoreError::not_found("multisig", &params.multisig_pda))?;

        let mut proposals = Vec::new();
        for proposal in self.custodian.store().proposals_of(multisig.id)? {
            if let Some(status) = params.status {
                if proposal.status != status {
                    continue;
                }
            }
            proposals.push(self.summarize(&proposal, &multisig)?);
        }
        Ok(ListProposalsResult { proposals })
    }

    fn summarize(
        &self,
        proposal: &Proposal,
        multisig: &Multisig,
    ) -> Result<ProposalSummary, CoreError> {
        let votes = self.custodian.store().approvals_for(proposal.id)?;
        Ok(ProposalSummary {
            id: proposal.id,
            multisig_pda: multisig.pda,
            proposer: proposal.proposer,
            status: proposal.status,
            approvals: votes
                .iter()
                .filter(|vote| vote.kind == ApprovalKind::Approve)
                .count(),
            rejections: votes
                .iter()
                .filter(|vote| vote.kind == ApprovalKind::Reject)
                .count(),
            threshold: multisig.threshold,
            time_lock: multisig.time_lock,
            created_at: proposal.created_at,
            updated_at: proposal.updated_at,
            tx_hash: proposal.tx_hash.clone(),
        })
    }

    // Balance sync and monitoring control

    pub async fn sync_user_balance(
        &self,
        params: SyncUserBalanceParams,
    ) -> Result<SyncUserBalanceResult, CoreError> {
        self.custodian
            .sync_user_balance(params.user_id, params.force)
            .await
    }

    pub async fn start_monitoring(&self) -> Result<MonitoringStatusResult, CoreError> {
        for kind in [JobKind::ActivitySweep, JobKind::Reconcile] {
            match self.scheduler.start(kind).await {
                Ok(()) | Err(SchedulerError::AlreadyRunning(_)) => {}
                Err(err) => return Err(CoreError::InvalidState(err.to_string())),
            }
        }
        Ok(self.scheduler.status().await)
    }

    pub async fn stop_monitoring(&self) -> Result<MonitoringStatusResult, CoreError> {
        for kind in [JobKind::ActivitySweep, JobKind::Reconcile] {
            match self.scheduler.stop(kind).await {
                Ok(()) | Err(SchedulerError::NotRunning(_)) => {}
                Err(err) => return Err(CoreError::InvalidState(err.to_string())),
            }
        }
        Ok(self.scheduler.status().await)
    }

    pub async fn monitoring_status(&self) -> MonitoringStatusResult {
        self.scheduler.status().await
    }

    /// Kick both running jobs outside their schedule.
    pub async fn force_monitoring(&self) -> Result<MonitoringStatusResult, CoreError> {
        for kind in [JobKind::ActivitySweep, JobKind::Reconcile] {
            match self.scheduler.trigger(kind).await {
                Ok(()) => {}
                Err(SchedulerError::NotRunning(name)) => {
                    return Err(CoreError::InvalidState(format!(
                        "job {} is not running",
                        name
                    )))
                }
                Err(err) => return Err(CoreError::InvalidState(err.to_string())),
            }
        }
        Ok(self.scheduler.status().await)
    }

    /// Run one reconciliation pass inline and report it.
    pub async fn run_reconciliation(&self) -> Result<SweepReportResult, CoreError> {
        let report = self.custodian.reconcile_sweep().await?;
        Ok(SweepReportResult {
            seen: report.seen,
            ingested: report.ingested,
            errors: report.errors,
        })
    }

    // Admin inactivity surface

    pub async fn inactivity_status(&self) -> Result<InactivityStatusResult, CoreError> {
        Ok(InactivityStatusResult {
            members: self.custodian.inactivity_status()?,
        })
    }

    pub async fn removal_eligible(&self) -> Result<InactivityStatusResult, CoreError> {
        Ok(InactivityStatusResult {
            members: self.custodian.removal_eligible()?,
        })
    }

    pub async fn remove_member(
        &self,
        params: RemoveMemberParams,
    ) -> Result<RemoveMemberResult, CoreError> {
        self.custodian
            .remove_member(&params.member_key, &params.reason)
            .await
    }
}
