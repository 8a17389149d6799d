// Transfer orchestrator. Three entry points, one shape: validate, split
// the fee, then either settle in one unit of work (internal) or stage a
// proposal-governed transfer that settles at execution time.
//
// For governed transfers the authoritative state, balances included,
// commits in the unit of work that claims execution, before any chain
// submission. The follow-up transaction only stamps the resulting tx
// hash; a rejected submission is compensated from the recorded
// settlement.

use custos_common::{
    crypto::Address,
    currency::Currency,
    time::get_current_time_in_seconds,
};

use crate::{
    custodian::Custodian,
    entity::{
        ExternalTransfer, FeeRecord, FeeSource, FeeStatus, InternalTransfer, Multisig, Proposal,
        ProposalTarget, SettlementStatus, TransferStatus, User, Vault, VaultKind, Withdrawal,
    },
    error::CoreError,
    storage::{
        UnitOfWork, EXTERNAL_TRANSFERS, FEES, INTERNAL_TRANSFERS, VAULTS, WALLET_TRANSFERS,
        WITHDRAWALS,
    },
};

#[derive(Debug, Clone)]
pub struct InternalTransferOutcome {
    pub transfer: InternalTransfer,
    pub sender_balance: u64,
}

/// Ledger effects of a staged execution, recorded so a failed chain
/// submission can be compensated exactly.
#[derive(Debug, Clone, Default)]
pub(crate) struct Settlement {
    // user id and amount debited from the sender
    debit: Option<(u64, u64)>,
    // user id and amount credited to an in-ledger receiver
    credit: Option<(u64, u64)>,
    // treasury vault id and fee credited to it
    treasury_fee: Option<(u64, u64)>,
    // wallet vault id and total debited from it
    vault_egress: Option<(u64, u64)>,
    fee_record: Option<u64>,
    withdrawal: Option<u64>,
}

impl Custodian {
    /// Off-chain ledger transfer resolved by the receiver's first name.
    /// Settles immediately; no proposal is created.
    pub async fn internal_transfer(
        &self,
        sender_id: u64,
        receiver_first_name: &str,
        gross: u64,
        notes: Option<String>,
    ) -> Result<InternalTransferOutcome, CoreError> {
        self.fees().validate_amount(gross)?;

        let mut uow = self.store().begin().await;
        let sender = uow
            .get_user(sender_id)?
            .ok_or_else(|| CoreError::not_found("user", sender_id))?;
        if sender.anonymized {
            return Err(CoreError::Validation(format!(
                "user {} is anonymized",
                sender_id
            )));
        }

        let mut candidates: Vec<User> = uow
            .users_by_first_name(receiver_first_name)?
            .into_iter()
            .filter(|candidate| candidate.id != sender_id)
            .collect();
        if candidates.len() > 1 {
            return Err(CoreError::AmbiguousLookup {
                name: receiver_first_name.to_string(),
                matches: candidates.len(),
            });
        }
        let receiver = candidates
            .pop()
            .ok_or_else(|| CoreError::not_found("user", receiver_first_name))?;

        let split = self.fees().validate_sufficient(sender.balance, gross)?;
        let now = get_current_time_in_seconds();

        let sender = uow.debit_user_balance(sender_id, gross + split.fee)?;
        uow.credit_user_balance(receiver.id, split.net)?;

        let treasury = self.fees().ensure_treasury_vault(&mut uow, Currency::Usdc)?;
        uow.credit_vault_fee(treasury.id, split.fee)?;

        let transfer = InternalTransfer {
            id: uow.next_id(INTERNAL_TRANSFERS)?,
            sender_id,
            receiver_id: receiver.id,
            gross,
            fee: split.fee,
            net: split.net,
            currency: Currency::Usdc,
            status: TransferStatus::Completed,
            notes,
            created_at: now,
            updated_at: now,
        };
        uow.put_internal_transfer(&transfer)?;
        let fee_id = uow.next_id(FEES)?;
        uow.put_fee(&FeeRecord {
            id: fee_id,
            source: FeeSource::Internal(transfer.id),
            vault_id: treasury.id,
            amount: split.fee,
            rate_divisor: custos_common::config::FEE_RATE_DIVISOR,
            status: FeeStatus::Collected,
            created_at: now,
        })?;
        uow.commit().await?;

        info!(
            "internal transfer {}: user {} -> user {} gross {} fee {}",
            transfer.id, sender_id, receiver.id, gross, split.fee
        );
        Ok(InternalTransferOutcome {
            transfer,
            sender_balance: sender.balance,
        })
    }

    /// Stage a governed wallet-to-wallet transfer on the main multisig.
    pub async fn propose_wallet_transfer(
        &self,
        from_wallet: &Address,
        to_wallet: &Address,
        gross: u64,
        currency: Currency,
        notes: Option<String>,
        requested_by: &Address,
    ) -> Result<(Proposal, Multisig), CoreError> {
        if !currency.is_stablecoin() {
            return Err(CoreError::Validation(format!(
                "wallet transfers must be denominated in USDC, got {}",
                currency
            )));
        }
        if from_wallet == to_wallet {
            return Err(CoreError::Validation(
                "source and destination wallets are identical".to_string(),
            ));
        }
        self.fees().validate_amount(gross)?;

        let mut uow = self.store().begin().await;
        let multisig = uow
            .main_multisig()?
            .ok_or_else(|| CoreError::not_found("multisig", "main"))?;

        let split = self.fees().breakdown(gross);
        let now = get_current_time_in_seconds();
        let transfer_id = uow.next_id(WALLET_TRANSFERS)?;
        let proposal = self.create_proposal(
            &mut uow,
            &multisig,
            requested_by,
            ProposalTarget::WalletTransfer(transfer_id),
        )?;

        uow.put_wallet_transfer(&crate::entity::WalletTransfer {
            id: transfer_id,
            from_wallet: *from_wallet,
            to_wallet: *to_wallet,
            gross,
            fee: split.fee,
            net: split.net,
            currency,
            status: TransferStatus::PendingApproval,
            tx_hash: None,
            notes,
            requested_by: *requested_by,
            proposal_id: Some(proposal.id),
            created_at: now,
            updated_at: now,
        })?;
        uow.commit().await?;

        info!(
            "wallet transfer {} staged as proposal {} on multisig {}",
            transfer_id, proposal.id, multisig.pda
        );
        Ok((proposal, multisig))
    }

    /// Stage a governed transfer to an external wallet, provisioning the
    /// user's multisig on first use inside the same unit of work.
    pub async fn propose_external_transfer(
        &self,
        user_id: u64,
        from_wallet: Option<Address>,
        to_wallet: &Address,
        gross: u64,
        currency: Currency,
        notes: Option<String>,
    ) -> Result<(Proposal, Multisig), CoreError> {
        if !currency.is_stablecoin() {
            return Err(CoreError::Validation(format!(
                "external transfers must be denominated in USDC, got {}",
                currency
            )));
        }
        self.fees().validate_amount(gross)?;

        // One retry: a concurrent provisioning attempt surfaces as a
        // unique violation, after which the read path must succeed
        for attempt in 0..2 {
            let mut uow = self.store().begin().await;
            let mut user = uow
                .get_user(user_id)?
                .ok_or_else(|| CoreError::not_found("user", user_id))?;

            let multisig = match self.provision_in(&mut uow, &mut user) {
                Ok(multisig) => multisig,
                Err(CoreError::Storage(err)) if err.is_unique_violation() && attempt == 0 => {
                    debug!("provisioning raced during external transfer: {}", err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let proposer = self
                .config()
                .member_addresses()
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::Config("no multisig members configured".to_string()))?;

            let split = self.fees().breakdown(gross);
            let now = get_current_time_in_seconds();
            let transfer_id = uow.next_id(EXTERNAL_TRANSFERS)?;
            let proposal = self.create_proposal(
                &mut uow,
                &multisig,
                &proposer,
                ProposalTarget::ExternalTransfer(transfer_id),
            )?;

            uow.put_external_transfer(&ExternalTransfer {
                id: transfer_id,
                user_id,
                from_wallet: from_wallet.or(user.wallet),
                to_wallet: *to_wallet,
                gross,
                fee: split.fee,
                net: split.net,
                currency,
                status: TransferStatus::PendingApproval,
                tx_hash: None,
                notes,
                proposal_id: Some(proposal.id),
                created_at: now,
                updated_at: now,
            })?;
            uow.commit().await?;

            info!(
                "external transfer {} staged as proposal {} for user {}",
                transfer_id, proposal.id, user_id
            );
            return Ok((proposal, multisig));
        }

        Err(CoreError::InvalidState(
            "multisig provisioning kept conflicting".to_string(),
        ))
    }

    /// Mark the domain object of a proposal. Used on rejection and on
    /// execution failure.
    pub(crate) fn set_target_status(
        &self,
        uow: &mut UnitOfWork<'_>,
        target: ProposalTarget,
        status: TransferStatus,
    ) -> Result<(), CoreError> {
        let now = get_current_time_in_seconds();
        match target {
            ProposalTarget::WalletTransfer(id) => {
                if let Some(mut transfer) = uow.get_wallet_transfer(id)? {
                    transfer.status = status;
                    transfer.updated_at = now;
                    uow.put_wallet_transfer(&transfer)?;
                }
            }
            ProposalTarget::ExternalTransfer(id) => {
                if let Some(mut transfer) = uow.get_external_transfer(id)? {
                    transfer.status = status;
                    transfer.updated_at = now;
                    uow.put_external_transfer(&transfer)?;
                }
            }
        }
        Ok(())
    }

    /// Settle the domain object of a proposal inside the unit of work
    /// that claims execution: balances move and rows are written before
    /// any chain call. Returns what to undo if the submission fails.
    pub(crate) fn stage_target(
        &self,
        uow: &mut UnitOfWork<'_>,
        proposal: &Proposal,
    ) -> Result<Settlement, CoreError> {
        match proposal.target {
            ProposalTarget::WalletTransfer(id) => self.stage_wallet_transfer(uow, id),
            ProposalTarget::ExternalTransfer(id) => self.stage_external_transfer(uow, id),
        }
    }

    fn stage_wallet_transfer(
        &self,
        uow: &mut UnitOfWork<'_>,
        transfer_id: u64,
    ) -> Result<Settlement, CoreError> {
        let mut transfer = uow
            .get_wallet_transfer(transfer_id)?
            .ok_or_else(|| CoreError::not_found("wallet transfer", transfer_id))?;
        if transfer.status != TransferStatus::PendingApproval {
            return Err(CoreError::InvalidState(format!(
                "wallet transfer {} is already {:?}",
                transfer_id, transfer.status
            )));
        }

        let sender_id = uow
            .user_id_by_wallet(&transfer.from_wallet)?
            .ok_or_else(|| CoreError::not_found("user", &transfer.from_wallet))?;
        let sender = uow
            .get_user(sender_id)?
            .ok_or_else(|| CoreError::not_found("user", sender_id))?;
        self.fees()
            .validate_sufficient(sender.balance, transfer.gross)?;

        let charged = transfer.gross + transfer.fee;
        uow.debit_user_balance(sender_id, charged)?;
        let credit = match uow.user_id_by_wallet(&transfer.to_wallet)? {
            Some(receiver_id) => {
                uow.credit_user_balance(receiver_id, transfer.net)?;
                Some((receiver_id, transfer.net))
            }
            None => None,
        };

        let treasury = self.fees().ensure_treasury_vault(uow, transfer.currency)?;
        uow.credit_vault_fee(treasury.id, transfer.fee)?;

        let now = get_current_time_in_seconds();
        let fee_record = uow.next_id(FEES)?;
        uow.put_fee(&FeeRecord {
            id: fee_record,
            source: FeeSource::Wallet(transfer_id),
            vault_id: treasury.id,
            amount: transfer.fee,
            rate_divisor: custos_common::config::FEE_RATE_DIVISOR,
            status: FeeStatus::Collected,
            created_at: now,
        })?;

        // The tx hash lands in the follow-up once the submission is through
        transfer.status = TransferStatus::Completed;
        transfer.updated_at = now;
        uow.put_wallet_transfer(&transfer)?;

        Ok(Settlement {
            debit: Some((sender_id, charged)),
            credit,
            treasury_fee: Some((treasury.id, transfer.fee)),
            vault_egress: None,
            fee_record: Some(fee_record),
            withdrawal: None,
        })
    }

    fn stage_external_transfer(
        &self,
        uow: &mut UnitOfWork<'_>,
        transfer_id: u64,
    ) -> Result<Settlement, CoreError> {
        let mut transfer = uow
            .get_external_transfer(transfer_id)?
            .ok_or_else(|| CoreError::not_found("external transfer", transfer_id))?;
        if transfer.status != TransferStatus::PendingApproval {
            return Err(CoreError::InvalidState(format!(
                "external transfer {} is already {:?}",
                transfer_id, transfer.status
            )));
        }

        let user = uow
            .get_user(transfer.user_id)?
            .ok_or_else(|| CoreError::not_found("user", transfer.user_id))?;
        self.fees()
            .validate_sufficient(user.balance, transfer.gross)?;

        let charged = transfer.gross + transfer.fee;
        let user = uow.debit_user_balance(transfer.user_id, charged)?;
        let now = get_current_time_in_seconds();
        let mut settlement = Settlement {
            debit: Some((transfer.user_id, charged)),
            ..Settlement::default()
        };

        // Egress bookkeeping against the user's wallet vault
        if let Some(wallet) = user.wallet {
            let vault = self.ensure_wallet_vault(uow, &wallet, Some(user.id))?;
            let posted = vault.total_balance.min(transfer.net);
            if posted > 0 {
                uow.debit_vault_total(vault.id, posted)?;
                settlement.vault_egress = Some((vault.id, posted));
            }
            let withdrawal_id = uow.next_id(WITHDRAWALS)?;
            uow.put_withdrawal(&Withdrawal {
                id: withdrawal_id,
                vault_id: vault.id,
                user_id: Some(user.id),
                amount: transfer.net,
                currency: transfer.currency,
                status: SettlementStatus::Completed,
                tx_hash: None,
                created_at: now,
            })?;
            settlement.withdrawal = Some(withdrawal_id);
        }

        transfer.status = TransferStatus::Completed;
        transfer.updated_at = now;
        uow.put_external_transfer(&transfer)?;

        Ok(settlement)
    }

    /// Submit the chain side of an already-settled proposal. The
    /// authoritative ledger state committed before this runs.
    pub(crate) async fn submit_target(
        &self,
        proposal: &Proposal,
    ) -> Result<Option<String>, CoreError> {
        match proposal.target {
            ProposalTarget::WalletTransfer(id) => {
                let transfer = self
                    .store()
                    .wallet_transfer(id)?
                    .ok_or_else(|| CoreError::not_found("wallet transfer", id))?;
                let tx_hash = self
                    .chain()
                    .submit_transfer(
                        self.fees().treasury_keypair(),
                        &transfer.to_wallet,
                        transfer.net,
                        transfer.currency,
                    )
                    .await?;
                Ok(Some(tx_hash))
            }
            ProposalTarget::ExternalTransfer(id) => {
                let transfer = self
                    .store()
                    .external_transfer(id)?
                    .ok_or_else(|| CoreError::not_found("external transfer", id))?;
                let tx_hash = self
                    .chain()
                    .submit_transfer(
                        self.fees().treasury_keypair(),
                        &transfer.to_wallet,
                        transfer.net,
                        transfer.currency,
                    )
                    .await?;

                // Fee collection is a separate treasury transfer; its
                // failure is surfaced as a warning and an UNCOLLECTED row,
                // never as an error on the settled transfer
                if transfer.fee > 0 {
                    if let Err(err) = self.collect_external_fee(&transfer, id).await {
                        warn!(
                            "could not record fee collection for external transfer {}: {}",
                            id, err
                        );
                    }
                }
                Ok(Some(tx_hash))
            }
        }
    }

    /// Follow-up after a successful submission: stamp the tx hash on the
    /// settled rows. Nothing else moves here.
    pub(crate) fn stamp_target(
        &self,
        uow: &mut UnitOfWork<'_>,
        target: ProposalTarget,
        settlement: &Settlement,
        tx_hash: &str,
    ) -> Result<(), CoreError> {
        let now = get_current_time_in_seconds();
        match target {
            ProposalTarget::WalletTransfer(id) => {
                if let Some(mut transfer) = uow.get_wallet_transfer(id)? {
                    transfer.tx_hash = Some(tx_hash.to_string());
                    transfer.updated_at = now;
                    uow.put_wallet_transfer(&transfer)?;
                }
            }
            ProposalTarget::ExternalTransfer(id) => {
                if let Some(mut transfer) = uow.get_external_transfer(id)? {
                    transfer.tx_hash = Some(tx_hash.to_string());
                    transfer.updated_at = now;
                    uow.put_external_transfer(&transfer)?;
                }
            }
        }
        if let Some(withdrawal_id) = settlement.withdrawal {
            if let Some(mut withdrawal) = uow.get_withdrawal(withdrawal_id)? {
                withdrawal.tx_hash = Some(tx_hash.to_string());
                uow.put_withdrawal(&withdrawal)?;
            }
        }
        Ok(())
    }

    /// Undo a committed settlement after the chain rejected the
    /// submission. A receiver who already spent the credited funds is
    /// clamped and logged instead of driving the ledger negative.
    pub(crate) fn revert_settlement(
        &self,
        uow: &mut UnitOfWork<'_>,
        settlement: &Settlement,
    ) -> Result<(), CoreError> {
        if let Some((user_id, amount)) = settlement.debit {
            uow.credit_user_balance(user_id, amount)?;
        }
        if let Some((user_id, amount)) = settlement.credit {
            let receiver = uow
                .get_user(user_id)?
                .ok_or_else(|| CoreError::not_found("user", user_id))?;
            let reclaimed = receiver.balance.min(amount);
            if reclaimed < amount {
                warn!(
                    "receiver {} already spent {} of a reverted credit",
                    user_id,
                    amount - reclaimed
                );
            }
            if reclaimed > 0 {
                uow.debit_user_balance(user_id, reclaimed)?;
            }
        }
        if let Some((vault_id, amount)) = settlement.treasury_fee {
            uow.debit_vault_fee(vault_id, amount)?;
        }
        if let Some((vault_id, amount)) = settlement.vault_egress {
            uow.credit_vault_total(vault_id, amount)?;
        }
        if let Some(fee_id) = settlement.fee_record {
            uow.remove_fee(fee_id);
        }
        if let Some(withdrawal_id) = settlement.withdrawal {
            uow.remove_withdrawal(withdrawal_id);
        }
        Ok(())
    }

    async fn collect_external_fee(
        &self,
        transfer: &ExternalTransfer,
        transfer_id: u64,
    ) -> Result<(), CoreError> {
        let fee_result = self
            .chain()
            .submit_transfer(
                self.fees().treasury_keypair(),
                &self.fees().treasury_address(transfer.currency),
                transfer.fee,
                transfer.currency,
            )
            .await;

        let mut uow = self.store().begin().await;
        let treasury = self
            .fees()
            .ensure_treasury_vault(&mut uow, transfer.currency)?;
        let status = match &fee_result {
            Ok(_) => {
                uow.credit_vault_fee(treasury.id, transfer.fee)?;
                FeeStatus::Collected
            }
            Err(err) => {
                warn!(
                    "fee collection for external transfer {} failed, recorded as uncollected: {}",
                    transfer_id, err
                );
                FeeStatus::Uncollected
            }
        };
        let fee_id = uow.next_id(FEES)?;
        uow.put_fee(&FeeRecord {
            id: fee_id,
            source: FeeSource::External(transfer_id),
            vault_id: treasury.id,
            amount: transfer.fee,
            rate_divisor: custos_common::config::FEE_RATE_DIVISOR,
            status,
            created_at: get_current_time_in_seconds(),
        })?;
        uow.commit().await?;
        Ok(())
    }

    /// Wallet vault for a custodial address, created on first use.
    pub(crate) fn ensure_wallet_vault(
        &self,
        uow: &mut UnitOfWork<'_>,
        wallet: &Address,
        user_id: Option<u64>,
    ) -> Result<Vault, CoreError> {
        if let Some(id) = uow.vault_id_by_address(wallet)? {
            return uow
                .get_vault(id)?
                .ok_or_else(|| CoreError::not_found("vault", id));
        }

        let now = get_current_time_in_seconds();
        let vault = Vault {
            id: uow.next_id(VAULTS)?,
            address: *wallet,
            kind: VaultKind::Wallet,
            currency: Currency::Usdc,
            total_balance: 0,
            fee_balance: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };
        uow.put_vault(&vault)?;
        if let Some(user_id) = user_id {
            debug!("created wallet vault {} for user {}", vault.address, user_id);
        }
        Ok(vault)
    }
}
