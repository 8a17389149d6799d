// Balance reconciler. Periodically walks every wallet-bearing user,
// ingests inbound chain transfers as deposits and refreshes stale
// balances from the chain, which is the authoritative source for the
// stablecoin once a user has a wallet.
//
// Deposits are ingested before the balance overwrite so the chain value
// always wins within one pass; the ledger credit only matters for the
// window between syncs. Per-user failures are isolated and aggregated
// into the sweep report.

use lazy_static::lazy_static;

use custos_common::{
    api::SyncUserBalanceResult,
    config::{AIRDROP_MAX_AMOUNT, INBOUND_PAGE_SIZE, RECONCILE_OVERLAP_SECONDS, SYSTEM_PROGRAM_ADDRESS},
    crypto::Address,
    currency::Currency,
    time::get_current_time_in_seconds,
};

use crate::{
    chain::InboundTransfer,
    custodian::Custodian,
    entity::{Deposit, DepositKind, SettlementStatus, User},
    error::CoreError,
    storage::DEPOSITS,
};

lazy_static! {
    static ref SYSTEM_PROGRAM: Address = SYSTEM_PROGRAM_ADDRESS
        .parse()
        .expect("system program address is valid base58");
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub seen: usize,
    pub ingested: usize,
    pub errors: usize,
}

impl Custodian {
    pub async fn reconcile_sweep(&self) -> Result<SweepReport, CoreError> {
        self.reconcile_sweep_with(&|| false).await
    }

    /// One reconciliation pass. Cancellation is observed between users;
    /// the user currently being processed always completes.
    pub async fn reconcile_sweep_with(
        &self,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<SweepReport, CoreError> {
        let mut report = SweepReport::default();

        for user in self.store().users()? {
            if is_cancelled() {
                debug!("reconcile sweep cancelled after {} users", report.seen);
                break;
            }
            if user.wallet.is_none() || user.anonymized {
                continue;
            }
            report.seen += 1;

            match self.reconcile_user(&user).await {
                Ok(ingested) => report.ingested += ingested,
                Err(err) => {
                    report.errors += 1;
                    warn!("reconcile failed for user {}: {}", user.id, err);
                }
            }
        }

        info!(
            "reconcile sweep: {} wallets seen, {} deposits ingested, {} errors",
            report.seen, report.ingested, report.errors
        );
        Ok(report)
    }

    async fn reconcile_user(&self, user: &User) -> Result<usize, CoreError> {
        let wallet = user
            .wallet
            .ok_or_else(|| CoreError::Validation(format!("user {} has no wallet", user.id)))?;

        // Restart a little before the last sync point so transfers that
        // landed around it are never skipped; dedup absorbs the overlap
        let since = user
            .balance_last_synced_at
            .map(|at| at.saturating_sub(RECONCILE_OVERLAP_SECONDS))
            .unwrap_or(0);
        let inbound = self
            .chain()
            .list_inbound_transfers(&wallet, since, INBOUND_PAGE_SIZE)
            .await?;

        let mut ingested = 0;
        for transfer in &inbound {
            if self.ingest_deposit(user, &wallet, transfer).await? {
                ingested += 1;
            }
        }

        let now = get_current_time_in_seconds();
        let stale = user.balance_last_synced_at.map_or(true, |at| {
            now.saturating_sub(at) >= self.config().balance_stale_seconds
        });
        if stale {
            self.overwrite_balance_from_chain(user.id, &wallet).await?;
        }

        Ok(ingested)
    }

    /// Record one inbound transfer as a deposit. Returns false when it
    /// was already ingested or is not a currency we track.
    async fn ingest_deposit(
        &self,
        user: &User,
        wallet: &Address,
        transfer: &InboundTransfer,
    ) -> Result<bool, CoreError> {
        let currency = match transfer.mint {
            None => Currency::Sol,
            Some(mint) if mint == self.config().stablecoin_mint => Currency::Usdc,
            Some(mint) => {
                debug!("ignoring inbound transfer of unknown mint {}", mint);
                return Ok(false);
            }
        };

        let kind = self.classify_deposit(&transfer.sender, transfer.amount);

        let mut uow = self.store().begin().await;
        let vault = self.ensure_wallet_vault(&mut uow, wallet, Some(user.id))?;
        if uow.has_deposit(vault.id, &transfer.tx_hash)? {
            return Ok(false);
        }

        let deposit_id = uow.next_id(DEPOSITS)?;
        uow.put_deposit(&Deposit {
            id: deposit_id,
            vault_id: vault.id,
            user_id: Some(user.id),
            amount: transfer.amount,
            currency,
            status: SettlementStatus::Completed,
            tx_hash: transfer.tx_hash.clone(),
            sender: Some(transfer.sender),
            kind,
            created_at: get_current_time_in_seconds(),
        })?;

        // Only the stablecoin moves the custodial balances; native coin
        // deposits are recorded for audit
        if currency == Currency::Usdc {
            uow.credit_vault_total(vault.id, transfer.amount)?;
            uow.credit_user_balance(user.id, transfer.amount)?;
        }

        // Deposit ingest counts as activity for members tied to this user
        let now = get_current_time_in_seconds();
        for mut member in uow.members_linked_to(user.id)? {
            member.mark_active(now);
            uow.put_member(&member)?;
        }
        uow.commit().await?;

        info!(
            "ingested {:?} deposit of {} {} for user {} (tx {})",
            kind, transfer.amount, currency, user.id, transfer.tx_hash
        );
        Ok(true)
    }

    fn classify_deposit(&self, sender: &Address, amount: u64) -> DepositKind {
        let known_faucet =
            self.config().known_faucets.contains(sender) || *sender == *SYSTEM_PROGRAM;
        if amount <= AIRDROP_MAX_AMOUNT && known_faucet {
            DepositKind::Airdrop
        } else {
            DepositKind::External
        }
    }

    async fn overwrite_balance_from_chain(
        &self,
        user_id: u64,
        wallet: &Address,
    ) -> Result<u64, CoreError> {
        let balance = self
            .chain()
            .get_token_balance(wallet, &self.config().stablecoin_mint)
            .await?;

        let mut uow = self.store().begin().await;
        let mut user = uow
            .get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        let now = get_current_time_in_seconds();
        if user.balance != balance {
            debug!(
                "balance overwrite for user {}: {} -> {} (chain authoritative)",
                user_id, user.balance, balance
            );
        }
        user.balance = balance;
        user.balance_last_synced_at = Some(now);
        user.updated_at = now;
        uow.put_user(&user)?;
        uow.commit().await?;
        Ok(balance)
    }

    /// On-demand single-user sync, used by the control surface.
    pub async fn sync_user_balance(
        &self,
        user_id: u64,
        force: bool,
    ) -> Result<SyncUserBalanceResult, CoreError> {
        let user = self
            .store()
            .user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        let wallet = user
            .wallet
            .ok_or_else(|| CoreError::Validation(format!("user {} has no wallet", user_id)))?;

        let now = get_current_time_in_seconds();
        let fresh = user.balance_last_synced_at.map_or(false, |at| {
            now.saturating_sub(at) < self.config().balance_stale_seconds
        });
        if fresh && !force {
            return Ok(SyncUserBalanceResult {
                user_id,
                balance: user.balance,
                synced: false,
            });
        }

        let balance = self.overwrite_balance_from_chain(user_id, &wallet).await?;
        Ok(SyncUserBalanceResult {
            user_id,
            balance,
            synced: true,
        })
    }
}
