// End-to-end scenarios against in-memory storage and the simulated
// chain: threshold approval with the time-lock gate, terminal rejection,
// on-demand provisioning, deposit classification, inactivity retirement
// under the quorum guard, and the fee math of every transfer path.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;

use custos_common::{
    api::{CreateUserParams, ListProposalsParams, RemoveMemberParams},
    config::{COIN_VALUE, FEE_RATE_DIVISOR},
    crypto::{Address, Keypair},
    currency::Currency,
    multisig::ProposalStatus,
    time::get_current_time_in_seconds,
};
use custos_daemon::{
    chain::{ChainError, InboundTransfer, SimulatedChain},
    config::{Config, DEFAULT_NETWORK, DEFAULT_RPC_URL, DEFAULT_STABLECOIN_MINT},
    custodian::Custodian,
    entity::{DepositKind, FeeStatus, TransferStatus, User},
    error::CoreError,
    rpc::Handler,
    scheduler::Scheduler,
    storage::Store,
};

fn test_config(members: Vec<Keypair>, threshold: u8, time_lock: u64) -> Config {
    Config {
        rpc_url: DEFAULT_RPC_URL.to_string(),
        network: DEFAULT_NETWORK.to_string(),
        stablecoin_mint: DEFAULT_STABLECOIN_MINT.parse().unwrap(),
        member_keys: members,
        default_threshold: threshold,
        default_time_lock: time_lock,
        min_members: 2,
        max_members: 3,
        inactivity_threshold_hours: 24,
        removal_threshold_hours: 48,
        check_interval_minutes: 60,
        reconcile_interval_seconds: 300,
        balance_stale_seconds: 300,
        known_faucets: Vec::new(),
        auto_start_monitoring: false,
        fee_wallet: Keypair::generate().address(),
        treasury_key: Keypair::generate(),
        allowed_origins: Vec::new(),
    }
}

struct Harness {
    custodian: Arc<Custodian>,
    chain: Arc<SimulatedChain>,
    config: Arc<Config>,
    members: Vec<Keypair>,
    mint: Address,
}

impl Harness {
    fn new(member_count: usize, threshold: u8, time_lock: u64) -> Self {
        let members: Vec<Keypair> = (0..member_count).map(|_| Keypair::generate()).collect();
        Self::with_config(test_config(members.clone(), threshold, time_lock), members)
    }

    fn with_config(config: Config, members: Vec<Keypair>) -> Self {
        let config = Arc::new(config);
        let chain = Arc::new(SimulatedChain::new());
        let store = Arc::new(Store::memory().unwrap());
        let custodian = Arc::new(Custodian::new(store, chain.clone(), config.clone()));
        let mint = config.stablecoin_mint;
        Self {
            custodian,
            chain,
            config,
            members,
            mint,
        }
    }

    fn member(&self, index: usize) -> Address {
        self.members[index].address()
    }

    async fn user(&self, email: &str, full_name: &str, wallet: Option<Address>) -> User {
        self.custodian
            .create_user(CreateUserParams {
                email: email.to_string(),
                full_name: full_name.to_string(),
                phone_number: None,
                wallet,
            })
            .await
            .unwrap()
    }

    async fn fund(&self, user_id: u64, amount: u64) {
        let mut uow = self.custodian.store().begin().await;
        uow.credit_user_balance(user_id, amount).unwrap();
        uow.commit().await.unwrap();
    }

    fn treasury_fee_balance(&self) -> u64 {
        self.custodian
            .store()
            .vault_by_address(&self.config.fee_wallet)
            .unwrap()
            .map(|vault| vault.fee_balance)
            .unwrap_or(0)
    }

    fn balance_of(&self, user_id: u64) -> u64 {
        self.custodian.store().user(user_id).unwrap().unwrap().balance
    }
}

// S1: threshold approval, then the time-lock gate, then execution with
// fee routing
#[tokio::test]
async fn threshold_approval_and_time_lock_gate() {
    let h = Harness::new(2, 0, 3);
    let w1 = Keypair::generate().address();
    let w2 = Keypair::generate().address();
    let sender = h.user("w1@custos.test", "Wallet One", Some(w1)).await;
    let receiver = h.user("w2@custos.test", "Wallet Two", Some(w2)).await;
    // A provisioned multisig governs wallet transfers
    h.custodian.provision_for_user(sender.id).await.unwrap();

    let gross = 100 * COIN_VALUE;
    let fee = gross / FEE_RATE_DIVISOR;
    h.fund(sender.id, 2 * gross).await;

    let (proposal, multisig) = h
        .custodian
        .propose_wallet_transfer(&w1, &w2, gross, Currency::Usdc, None, &h.member(0))
        .await
        .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Pending);

    let vote = h
        .custodian
        .approve_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    assert_eq!(vote.proposal.status, ProposalStatus::Pending);
    assert_eq!(vote.approvals, 1);

    let vote = h
        .custodian
        .approve_proposal(proposal.id, &h.member(1))
        .await
        .unwrap();
    assert_eq!(vote.proposal.status, ProposalStatus::Approved);
    assert_eq!(vote.approvals, 2);
    assert_eq!(vote.threshold, multisig.threshold);

    // Right after approval the full lock is pending (modulo clock drift)
    let lock = h.custodian.time_lock_status(proposal.id).await.unwrap();
    assert!(!lock.can_execute);
    assert_eq!(lock.time_lock, 3);
    assert!(lock.time_remaining >= 2 && lock.time_remaining <= 3);
    assert!(lock.latest_approval.is_some());

    // Executing inside the lock is refused and reports the remaining wait
    let err = h
        .custodian
        .execute_proposal(proposal.id, &h.member(0))
        .await
        .unwrap_err();
    match err {
        CoreError::TimeLockActive { time_remaining } => assert!(time_remaining >= 1),
        other => panic!("expected TimeLockActive, got {other:?}"),
    }
    assert_eq!(
        h.custodian
            .store()
            .proposal(proposal.id)
            .unwrap()
            .unwrap()
            .status,
        ProposalStatus::Approved
    );

    sleep(Duration::from_millis(4100)).await;

    let outcome = h
        .custodian
        .execute_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    assert_eq!(outcome.proposal.status, ProposalStatus::Executed);
    let tx_hash = outcome.tx_hash.expect("wallet transfer submits on chain");

    // Ledger: sender pays gross + fee, receiver gets net, treasury keeps fee
    assert_eq!(h.balance_of(sender.id), 2 * gross - gross - fee);
    assert_eq!(h.balance_of(receiver.id), gross - fee);
    assert_eq!(h.treasury_fee_balance(), fee);

    let submitted = h.chain.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].to, w2);
    assert_eq!(submitted[0].amount, gross - fee);
    assert_eq!(submitted[0].tx_hash, tx_hash);

    let transfer = match proposal.target {
        custos_daemon::entity::ProposalTarget::WalletTransfer(id) => {
            h.custodian.store().wallet_transfer(id).unwrap().unwrap()
        }
        other => panic!("unexpected target {other:?}"),
    };
    assert_eq!(transfer.status, TransferStatus::Completed);
    assert_eq!(transfer.tx_hash.as_deref(), Some(tx_hash.as_str()));
}

// S2: rejection is terminal and cancels the linked transfer
#[tokio::test]
async fn reject_is_terminal() {
    let h = Harness::new(2, 0, 3);
    let sender = h
        .user("s2@custos.test", "Sender", Some(Keypair::generate().address()))
        .await;
    h.custodian.provision_for_user(sender.id).await.unwrap();

    let (proposal, _) = h
        .custodian
        .propose_wallet_transfer(
            &sender.wallet.unwrap(),
            &Keypair::generate().address(),
            10 * COIN_VALUE,
            Currency::Usdc,
            None,
            &h.member(0),
        )
        .await
        .unwrap();

    h.custodian
        .approve_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    let vote = h
        .custodian
        .reject_proposal(proposal.id, &h.member(1), Some("insufficient docs".to_string()))
        .await
        .unwrap();
    assert_eq!(vote.proposal.status, ProposalStatus::Rejected);
    assert_eq!(
        vote.proposal.notes.as_deref(),
        Some("insufficient docs")
    );

    // Terminal: further votes are invalid-state, not duplicate
    let err = h
        .custodian
        .approve_proposal(proposal.id, &h.member(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));

    // The earlier Approve stays in the audit log next to the Reject
    let votes = h.custodian.store().approvals_for(proposal.id).unwrap();
    assert_eq!(votes.len(), 2);

    let transfer = match proposal.target {
        custos_daemon::entity::ProposalTarget::WalletTransfer(id) => {
            h.custodian.store().wallet_transfer(id).unwrap().unwrap()
        }
        other => panic!("unexpected target {other:?}"),
    };
    assert_eq!(transfer.status, TransferStatus::Cancelled);
}

// S3: the first external transfer provisions the multisig on demand; a
// second caller adopts the existing row instead of duplicating it
#[tokio::test]
async fn on_demand_multisig_provisioning() {
    let h = Harness::new(2, 0, 5);
    let alice = h.user("alice@custos.test", "Alice", None).await;
    let bob = h.user("bob@custos.test", "Bob", None).await;

    assert!(matches!(
        h.custodian.get_main_multisig(),
        Err(CoreError::NotFound { .. })
    ));

    let (proposal, multisig) = h
        .custodian
        .propose_external_transfer(
            alice.id,
            None,
            &Keypair::generate().address(),
            5 * COIN_VALUE,
            Currency::Usdc,
            None,
        )
        .await
        .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert!(multisig.is_main);
    assert_eq!(
        h.custodian.store().members_of(multisig.id).unwrap().len(),
        2
    );

    // Second user: same deterministic PDA, no duplicate multisig
    let (_, second) = h
        .custodian
        .propose_external_transfer(
            bob.id,
            None,
            &Keypair::generate().address(),
            5 * COIN_VALUE,
            Currency::Usdc,
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.id, multisig.id);

    // Idempotent for the already-associated user as well
    let again = h.custodian.provision_for_user(alice.id).await.unwrap();
    assert_eq!(again.id, multisig.id);
    assert_eq!(
        h.custodian
            .store()
            .user(alice.id)
            .unwrap()
            .unwrap()
            .multisig_id,
        Some(multisig.id)
    );
}

// S4: deposits are classified and deduplicated; the chain balance is
// authoritative after a sync
#[tokio::test]
async fn deposit_classification_and_balance_sync() {
    let faucet = Keypair::generate().address();
    let members: Vec<Keypair> = (0..2).map(|_| Keypair::generate()).collect();
    let mut config = test_config(members.clone(), 0, 5);
    config.known_faucets = vec![faucet];
    let h = Harness::with_config(config, members);

    let wallet = Keypair::generate().address();
    let user = h.user("w@custos.test", "Wallet User", Some(wallet)).await;

    let now = get_current_time_in_seconds();
    h.chain.push_inbound(
        wallet,
        InboundTransfer {
            tx_hash: "faucet-drip".to_string(),
            sender: faucet,
            mint: Some(h.mint),
            amount: COIN_VALUE + COIN_VALUE / 2,
            timestamp: now,
        },
    );
    h.chain.push_inbound(
        wallet,
        InboundTransfer {
            tx_hash: "big-deposit".to_string(),
            sender: Keypair::generate().address(),
            mint: Some(h.mint),
            amount: 250 * COIN_VALUE,
            timestamp: now,
        },
    );
    h.chain
        .set_token_balance(wallet, h.mint, 251 * COIN_VALUE + COIN_VALUE / 2);

    let report = h.custodian.reconcile_sweep().await.unwrap();
    assert_eq!(report.seen, 1);
    assert_eq!(report.ingested, 2);
    assert_eq!(report.errors, 0);

    let deposits = h.custodian.store().deposits().unwrap();
    assert_eq!(deposits.len(), 2);
    let airdrop = deposits
        .iter()
        .find(|deposit| deposit.tx_hash == "faucet-drip")
        .unwrap();
    assert_eq!(airdrop.kind, DepositKind::Airdrop);
    let external = deposits
        .iter()
        .find(|deposit| deposit.tx_hash == "big-deposit")
        .unwrap();
    assert_eq!(external.kind, DepositKind::External);

    // Chain value wins after the sync
    assert_eq!(h.balance_of(user.id), 251 * COIN_VALUE + COIN_VALUE / 2);

    // Overlap re-reads the same transfers; dedup keeps them single
    let report = h.custodian.reconcile_sweep().await.unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(h.custodian.store().deposits().unwrap().len(), 2);
}

// S5: retirement is blocked while it would break the threshold, and
// proceeds once the operator lowers it
#[tokio::test]
async fn inactivity_retirement_with_quorum_guard() {
    let h = Harness::new(3, 0, 0);
    let user = h.user("s5@custos.test", "Owner", None).await;
    let multisig = h.custodian.provision_for_user(user.id).await.unwrap();
    assert_eq!(multisig.threshold, 3);

    // Age one member past both thresholds
    let stale = h.custodian.store().members_of(multisig.id).unwrap()[2].clone();
    {
        let mut uow = h.custodian.store().begin().await;
        let mut member = uow.get_member(stale.id).unwrap().unwrap();
        let now = get_current_time_in_seconds();
        member.last_activity_at = now - 60 * 3600;
        member.is_inactive = true;
        member.inactive_since = Some(now - 50 * 3600);
        member.removal_eligible_at = Some(now - 2 * 3600);
        uow.put_member(&member).unwrap();
        uow.commit().await.unwrap();
    }

    let outcome = h.custodian.activity_sweep().await.unwrap();
    assert_eq!(outcome.retired, 0);
    assert_eq!(outcome.quorum_blocked, 1);

    let member = h.custodian.store().member(stale.id).unwrap().unwrap();
    assert!(member.active, "quorum guard must keep the member active");
    assert!(member.is_inactive);

    // Operator lowers the threshold out of band; the next sweep retires
    h.custodian
        .set_multisig_threshold(multisig.id, 2)
        .await
        .unwrap();
    let outcome = h.custodian.activity_sweep().await.unwrap();
    assert_eq!(outcome.retired, 1);
    assert_eq!(outcome.quorum_blocked, 0);

    let member = h.custodian.store().member(stale.id).unwrap().unwrap();
    assert!(!member.active);

    let events = h.custodian.store().removal_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].member_id, stale.id);

    // The invariant the guard protects: active members >= threshold
    let active = h
        .custodian
        .store()
        .members_of(multisig.id)
        .unwrap()
        .iter()
        .filter(|m| m.active)
        .count();
    let multisig = h.custodian.store().multisig(multisig.id).unwrap().unwrap();
    assert!(active >= multisig.threshold as usize);
}

// S6: internal transfer fee math
#[tokio::test]
async fn internal_transfer_fee_math() {
    let h = Harness::new(2, 0, 5);
    let alice = h.user("alice6@custos.test", "Alice Doe", None).await;
    let bob = h.user("bob6@custos.test", "Bob Smith", None).await;
    h.fund(alice.id, 100 * COIN_VALUE).await;

    let outcome = h
        .custodian
        .internal_transfer(alice.id, "Bob", 10 * COIN_VALUE, None)
        .await
        .unwrap();

    // fee = 0.0001, net = 9.9999
    assert_eq!(outcome.transfer.fee, 10_000);
    assert_eq!(outcome.transfer.net, 10 * COIN_VALUE - 10_000);
    assert_eq!(outcome.transfer.status, TransferStatus::Completed);

    assert_eq!(outcome.sender_balance, 100 * COIN_VALUE - 10 * COIN_VALUE - 10_000);
    assert_eq!(h.balance_of(alice.id), outcome.sender_balance);
    assert_eq!(h.balance_of(bob.id), 10 * COIN_VALUE - 10_000);
    assert_eq!(h.treasury_fee_balance(), 10_000);

    let fees = h.custodian.store().fees().unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].amount, 10_000);
    assert_eq!(fees[0].status, FeeStatus::Collected);
}

#[tokio::test]
async fn duplicate_approval_leaves_state_unchanged() {
    let h = Harness::new(2, 0, 5);
    let sender = h
        .user("dup@custos.test", "Dup", Some(Keypair::generate().address()))
        .await;
    h.custodian.provision_for_user(sender.id).await.unwrap();

    let (proposal, _) = h
        .custodian
        .propose_wallet_transfer(
            &sender.wallet.unwrap(),
            &Keypair::generate().address(),
            COIN_VALUE,
            Currency::Usdc,
            None,
            &h.member(0),
        )
        .await
        .unwrap();

    h.custodian
        .approve_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    let err = h
        .custodian
        .approve_proposal(proposal.id, &h.member(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateApproval { .. }));

    // State is exactly as after the first approval
    let row = h.custodian.store().proposal(proposal.id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Pending);
    assert_eq!(h.custodian.store().approvals_for(proposal.id).unwrap().len(), 1);
}

#[tokio::test]
async fn internal_transfer_lookup_errors() {
    let h = Harness::new(2, 0, 5);
    let sender = h.user("look@custos.test", "Sender", None).await;
    h.user("b1@custos.test", "Bob One", None).await;
    h.user("b2@custos.test", "Bob Two", None).await;
    h.fund(sender.id, COIN_VALUE).await;

    let err = h
        .custodian
        .internal_transfer(sender.id, "Bob", COIN_VALUE, None)
        .await
        .unwrap_err();
    match err {
        CoreError::AmbiguousLookup { matches, .. } => assert_eq!(matches, 2),
        other => panic!("expected AmbiguousLookup, got {other:?}"),
    }

    let err = h
        .custodian
        .internal_transfer(sender.id, "Carol", COIN_VALUE, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn sufficiency_check_includes_fee() {
    let h = Harness::new(2, 0, 5);
    let sender = h.user("tight@custos.test", "Tight", None).await;
    h.user("rich@custos.test", "Recipient", None).await;
    let gross = 10 * COIN_VALUE;
    h.fund(sender.id, gross).await;

    let err = h
        .custodian
        .internal_transfer(sender.id, "Recipient", gross, None)
        .await
        .unwrap_err();
    match err {
        CoreError::InsufficientFunds {
            required,
            available,
        } => {
            assert_eq!(required, gross + gross / FEE_RATE_DIVISOR);
            assert_eq!(available, gross);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }
    // Nothing moved
    assert_eq!(h.balance_of(sender.id), gross);
}

#[tokio::test]
async fn wallet_transfers_must_be_stablecoin() {
    let h = Harness::new(2, 0, 5);
    let err = h
        .custodian
        .propose_wallet_transfer(
            &Keypair::generate().address(),
            &Keypair::generate().address(),
            COIN_VALUE,
            Currency::Sol,
            None,
            &h.member(0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn chain_failure_fails_the_proposal() {
    let h = Harness::new(2, 0, 0);
    let user = h
        .user("cf@custos.test", "Chain Fail", Some(Keypair::generate().address()))
        .await;
    h.fund(user.id, 100 * COIN_VALUE).await;

    let (proposal, _) = h
        .custodian
        .propose_external_transfer(
            user.id,
            None,
            &Keypair::generate().address(),
            10 * COIN_VALUE,
            Currency::Usdc,
            None,
        )
        .await
        .unwrap();
    h.custodian
        .approve_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    h.custodian
        .approve_proposal(proposal.id, &h.member(1))
        .await
        .unwrap();

    h.chain
        .fail_next_submit(ChainError::Rejected("blockhash expired".to_string()));
    let err = h
        .custodian
        .execute_proposal(proposal.id, &h.member(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Chain(ChainError::Rejected(_))));

    let row = h.custodian.store().proposal(proposal.id).unwrap().unwrap();
    assert_eq!(row.status, ProposalStatus::Failed);
    // The chain error lands in the audit notes
    assert!(row.notes.unwrap().contains("blockhash expired"));

    let transfer = match proposal.target {
        custos_daemon::entity::ProposalTarget::ExternalTransfer(id) => {
            h.custodian.store().external_transfer(id).unwrap().unwrap()
        }
        other => panic!("unexpected target {other:?}"),
    };
    assert_eq!(transfer.status, TransferStatus::Failed);

    // Balances rolled back with the failed unit of work
    assert_eq!(h.balance_of(user.id), 100 * COIN_VALUE);
}

#[tokio::test]
async fn failed_fee_leg_is_recorded_uncollected() {
    let h = Harness::new(2, 0, 0);
    let wallet = Keypair::generate().address();
    let user = h.user("fee@custos.test", "Fee Leg", Some(wallet)).await;
    h.fund(user.id, 100 * COIN_VALUE).await;

    let gross = 10 * COIN_VALUE;
    let fee = gross / FEE_RATE_DIVISOR;
    let (proposal, _) = h
        .custodian
        .propose_external_transfer(
            user.id,
            None,
            &Keypair::generate().address(),
            gross,
            Currency::Usdc,
            None,
        )
        .await
        .unwrap();
    h.custodian
        .approve_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    h.custodian
        .approve_proposal(proposal.id, &h.member(1))
        .await
        .unwrap();

    // Main submit goes through, the treasury fee transfer does not
    h.chain.allow_next_submit();
    h.chain.fail_next_submit(ChainError::Timeout);

    let outcome = h
        .custodian
        .execute_proposal(proposal.id, &h.member(0))
        .await
        .unwrap();
    assert_eq!(outcome.proposal.status, ProposalStatus::Executed);

    // The settled transfer is untouched by the fee failure
    let transfer = match proposal.target {
        custos_daemon::entity::ProposalTarget::ExternalTransfer(id) => {
            h.custodian.store().external_transfer(id).unwrap().unwrap()
        }
        other => panic!("unexpected target {other:?}"),
    };
    assert_eq!(transfer.status, TransferStatus::Completed);
    assert_eq!(h.balance_of(user.id), 100 * COIN_VALUE - gross - fee);

    // But the fee is waiting for operator reconciliation
    let fees = h.custodian.store().fees().unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].status, FeeStatus::Uncollected);
    assert_eq!(fees[0].amount, fee);
    assert_eq!(h.treasury_fee_balance(), 0);

    // Egress bookkeeping still happened
    let withdrawals = h.custodian.store().withdrawals().unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].amount, gross - fee);
}

#[tokio::test]
async fn anonymization_keeps_the_row_and_uniqueness() {
    let h = Harness::new(2, 0, 5);
    let wallet = Keypair::generate().address();
    let user = h
        .custodian
        .create_user(CreateUserParams {
            email: "gone@custos.test".to_string(),
            full_name: "Gone Person".to_string(),
            phone_number: Some("+123456".to_string()),
            wallet: Some(wallet),
        })
        .await
        .unwrap();

    let result = h.custodian.anonymize_user(user.id).await.unwrap();
    assert_eq!(result.fields_anonymized, 4);

    let row = h.custodian.store().user(user.id).unwrap().unwrap();
    assert!(row.anonymized);
    assert_eq!(row.email, format!("anonymized_{}@deleted.local", user.id));
    assert!(row.phone_number.is_none());
    assert_ne!(row.wallet, Some(wallet));

    // The original email is free again, the row itself is not reusable
    let err = h.custodian.anonymize_user(user.id).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
    h.user("gone@custos.test", "New Person", None).await;

    // Anonymized users are skipped by the reconciler
    let report = h.custodian.reconcile_sweep().await.unwrap();
    assert_eq!(report.seen, 0);
}

#[tokio::test]
async fn balance_sync_honors_staleness_and_force() {
    let h = Harness::new(2, 0, 5);
    let wallet = Keypair::generate().address();
    let user = h.user("sync@custos.test", "Sync", Some(wallet)).await;

    h.chain.set_token_balance(wallet, h.mint, 42 * COIN_VALUE);
    let result = h.custodian.sync_user_balance(user.id, false).await.unwrap();
    assert!(result.synced);
    assert_eq!(result.balance, 42 * COIN_VALUE);

    // Fresh: no chain read, cached value returned
    h.chain.set_token_balance(wallet, h.mint, 50 * COIN_VALUE);
    let result = h.custodian.sync_user_balance(user.id, false).await.unwrap();
    assert!(!result.synced);
    assert_eq!(result.balance, 42 * COIN_VALUE);

    // Force overrides staleness
    let result = h.custodian.sync_user_balance(user.id, true).await.unwrap();
    assert!(result.synced);
    assert_eq!(result.balance, 50 * COIN_VALUE);
}

#[tokio::test]
async fn operator_removal_respects_quorum() {
    let h = Harness::new(2, 0, 5);
    let user = h.user("op@custos.test", "Operator", None).await;
    let multisig = h.custodian.provision_for_user(user.id).await.unwrap();
    // threshold == member count, so any removal would break quorum
    let member_key = h.member(1);
    let err = h
        .custodian
        .remove_member(&member_key, "manual cleanup")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QuorumBlocked { .. }));

    h.custodian
        .set_multisig_threshold(multisig.id, 1)
        .await
        .unwrap();
    let result = h
        .custodian
        .remove_member(&member_key, "manual cleanup")
        .await
        .unwrap();
    assert!(result.removed);

    let events = h.custodian.store().removal_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "manual cleanup");
}

#[tokio::test]
async fn control_surface_round_trip() {
    let h = Harness::new(2, 0, 0);
    let scheduler = Scheduler::new(h.custodian.clone());
    let handler = Handler::new(h.custodian.clone(), scheduler);

    let status = handler.monitoring_status().await;
    assert!(!status.activity_sweeper_running);
    assert!(!status.reconciler_running);

    let status = handler.start_monitoring().await.unwrap();
    assert!(status.activity_sweeper_running);
    assert!(status.reconciler_running);
    handler.force_monitoring().await.unwrap();

    let user = h
        .user("rpc@custos.test", "Rpc User", Some(Keypair::generate().address()))
        .await;
    h.fund(user.id, 100 * COIN_VALUE).await;

    let proposed = handler
        .propose_external_transfer(custos_common::api::ProposeExternalTransferParams {
            user_id: user.id,
            from_wallet: None,
            to_wallet: Keypair::generate().address(),
            amount: 10 * COIN_VALUE,
            currency: Currency::Usdc,
            notes: Some("rent".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(proposed.status, ProposalStatus::Pending);

    for member in [h.member(0), h.member(1)] {
        handler
            .approve_proposal(custos_common::api::ApproveProposalParams {
                proposal_id: proposed.proposal_id,
                member_key: member,
            })
            .await
            .unwrap();
    }

    let lock = handler
        .get_time_lock_status(custos_common::api::GetTimeLockStatusParams {
            proposal_id: proposed.proposal_id,
        })
        .await
        .unwrap();
    assert!(lock.can_execute);

    let executed = handler
        .execute_proposal(custos_common::api::ExecuteProposalParams {
            proposal_id: proposed.proposal_id,
            executor_key: h.member(0),
        })
        .await
        .unwrap();
    assert_eq!(executed.status, ProposalStatus::Executed);
    assert!(executed.tx_hash.is_some());

    let listed = handler
        .list_proposals(ListProposalsParams {
            multisig_pda: proposed.multisig_pda,
            status: Some(ProposalStatus::Executed),
        })
        .await
        .unwrap();
    assert_eq!(listed.proposals.len(), 1);
    assert_eq!(listed.proposals[0].approvals, 2);

    let snapshot = handler.inactivity_status().await.unwrap();
    assert_eq!(snapshot.members.len(), 2);
    assert!(snapshot.members.iter().all(|m| !m.is_inactive));

    let err = handler
        .remove_member(RemoveMemberParams {
            member_key: h.member(0),
            reason: "test".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::QuorumBlocked { .. }));

    let report = handler.run_reconciliation().await.unwrap();
    assert_eq!(report.errors, 0);

    let status = handler.stop_monitoring().await.unwrap();
    assert!(!status.activity_sweeper_running);
    assert!(!status.reconciler_running);
}

#[tokio::test]
async fn sled_storage_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db").to_string_lossy().to_string();
    let members: Vec<Keypair> = (0..2).map(|_| Keypair::generate()).collect();

    let user_id = {
        let config = Arc::new(test_config(members.clone(), 0, 5));
        let store = Arc::new(Store::open(&path).unwrap());
        let chain = Arc::new(SimulatedChain::new());
        let custodian = Custodian::new(store, chain, config);
        let user = custodian
            .create_user(CreateUserParams {
                email: "durable@custos.test".to_string(),
                full_name: "Durable".to_string(),
                phone_number: None,
                wallet: None,
            })
            .await
            .unwrap();
        user.id
    };

    let store = Store::open(&path).unwrap();
    let user = store.user(user_id).unwrap().unwrap();
    assert_eq!(user.email, "durable@custos.test");
}
