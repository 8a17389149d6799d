// Typed accessors over the raw trees. UnitOfWork methods stage writes and
// observe earlier staged rows; Store methods read committed state only.

use custos_common::{crypto::Address, currency::Currency, multisig::ApprovalKind};

use crate::entity::{
    Approval, Deposit, ExternalTransfer, FeeRecord, InternalTransfer, Multisig, MultisigMember,
    Proposal, RemovalEvent, User, Vault, VaultKind, WalletTransfer, Withdrawal,
};

use super::{
    id_key, Store, StorageError, UnitOfWork, APPROVALS, DEPOSITS, EXTERNAL_TRANSFERS, FEES,
    IDX_DEPOSIT_HASH, IDX_MEMBER_KEY, IDX_MULTISIG_CREATE_KEY, IDX_MULTISIG_PDA, IDX_USER_EMAIL,
    IDX_USER_WALLET, IDX_VAULT_ADDRESS, INTERNAL_TRANSFERS, MEMBERS, MULTISIGS, PROPOSALS,
    REMOVAL_EVENTS, USERS, VAULTS, WALLET_TRANSFERS, WITHDRAWALS,
};

fn approval_key(proposal_id: u64, member_id: u64, kind: ApprovalKind) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.extend_from_slice(&proposal_id.to_be_bytes());
    key.extend_from_slice(&member_id.to_be_bytes());
    key.push(match kind {
        ApprovalKind::Approve => 0,
        ApprovalKind::Reject => 1,
    });
    key
}

fn deposit_hash_key(vault_id: u64, tx_hash: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + tx_hash.len());
    key.extend_from_slice(&vault_id.to_be_bytes());
    key.extend_from_slice(tx_hash.as_bytes());
    key
}

impl<'a> UnitOfWork<'a> {
    // Users

    pub fn get_user(&self, id: u64) -> Result<Option<User>, StorageError> {
        self.get(USERS, &id_key(id))
    }

    pub fn put_user(&mut self, user: &User) -> Result<(), StorageError> {
        let old: Option<User> = self.get(USERS, &id_key(user.id))?;
        if let Some(old) = &old {
            if old.email != user.email {
                self.del(IDX_USER_EMAIL, old.email.as_bytes().to_vec());
            }
            if old.wallet != user.wallet {
                if let Some(wallet) = &old.wallet {
                    self.del(IDX_USER_WALLET, wallet.as_bytes().to_vec());
                }
            }
        }

        self.claim_unique(
            IDX_USER_EMAIL,
            "users.email",
            user.email.as_bytes().to_vec(),
            &user.email,
            user.id,
        )?;
        if let Some(wallet) = &user.wallet {
            self.claim_unique(
                IDX_USER_WALLET,
                "users.wallet",
                wallet.as_bytes().to_vec(),
                wallet,
                user.id,
            )?;
        }
        self.put(USERS, id_key(user.id), user)
    }

    pub fn user_id_by_email(&self, email: &str) -> Result<Option<u64>, StorageError> {
        self.get(IDX_USER_EMAIL, email.as_bytes())
    }

    pub fn user_id_by_wallet(&self, wallet: &Address) -> Result<Option<u64>, StorageError> {
        self.get(IDX_USER_WALLET, wallet.as_bytes())
    }

    pub fn users_by_first_name(&self, first_name: &str) -> Result<Vec<User>, StorageError> {
        let rows: Vec<(Vec<u8>, User)> = self.scan(USERS)?;
        Ok(rows
            .into_iter()
            .map(|(_, user)| user)
            .filter(|user| !user.anonymized && user.first_name().eq_ignore_ascii_case(first_name))
            .collect())
    }

    /// Relative credit; overflow surfaces instead of wrapping.
    pub fn credit_user_balance(&mut self, id: u64, amount: u64) -> Result<User, StorageError> {
        let mut user = self
            .get_user(id)?
            .ok_or_else(|| StorageError::Backend(format!("credit on missing user {}", id)))?;
        user.balance = user
            .balance
            .checked_add(amount)
            .ok_or(StorageError::BalanceOverflow)?;
        self.put_user(&user)?;
        Ok(user)
    }

    /// Relative debit; callers validate sufficiency first, this is the backstop.
    pub fn debit_user_balance(&mut self, id: u64, amount: u64) -> Result<User, StorageError> {
        let mut user = self
            .get_user(id)?
            .ok_or_else(|| StorageError::Backend(format!("debit on missing user {}", id)))?;
        user.balance = user
            .balance
            .checked_sub(amount)
            .ok_or(StorageError::BalanceUnderflow)?;
        self.put_user(&user)?;
        Ok(user)
    }

    // Multisigs

    pub fn get_multisig(&self, id: u64) -> Result<Option<Multisig>, StorageError> {
        self.get(MULTISIGS, &id_key(id))
    }

    pub fn put_multisig(&mut self, multisig: &Multisig) -> Result<(), StorageError> {
        self.claim_unique(
            IDX_MULTISIG_PDA,
            "multisigs.pda",
            multisig.pda.as_bytes().to_vec(),
            &multisig.pda,
            multisig.id,
        )?;
        self.claim_unique(
            IDX_MULTISIG_CREATE_KEY,
            "multisigs.create_key",
            multisig.create_key.as_bytes().to_vec(),
            &multisig.create_key,
            multisig.id,
        )?;
        self.put(MULTISIGS, id_key(multisig.id), multisig)
    }

    pub fn multisig_id_by_pda(&self, pda: &Address) -> Result<Option<u64>, StorageError> {
        self.get(IDX_MULTISIG_PDA, pda.as_bytes())
    }

    pub fn main_multisig(&self) -> Result<Option<Multisig>, StorageError> {
        let rows: Vec<(Vec<u8>, Multisig)> = self.scan(MULTISIGS)?;
        Ok(rows
            .into_iter()
            .map(|(_, multisig)| multisig)
            .find(|multisig| multisig.is_main && multisig.active))
    }

    // Members

    pub fn get_member(&self, id: u64) -> Result<Option<MultisigMember>, StorageError> {
        self.get(MEMBERS, &id_key(id))
    }

    pub fn put_member(&mut self, member: &MultisigMember) -> Result<(), StorageError> {
        self.claim_unique(
            IDX_MEMBER_KEY,
            "multisig_members.public_key",
            member.public_key.as_bytes().to_vec(),
            &member.public_key,
            member.id,
        )?;
        self.put(MEMBERS, id_key(member.id), member)
    }

    pub fn member_id_by_key(&self, key: &Address) -> Result<Option<u64>, StorageError> {
        self.get(IDX_MEMBER_KEY, key.as_bytes())
    }

    pub fn members_of(&self, multisig_id: u64) -> Result<Vec<MultisigMember>, StorageError> {
        let rows: Vec<(Vec<u8>, MultisigMember)> = self.scan(MEMBERS)?;
        Ok(rows
            .into_iter()
            .map(|(_, member)| member)
            .filter(|member| member.multisig_id == multisig_id)
            .collect())
    }

    pub fn members_linked_to(&self, user_id: u64) -> Result<Vec<MultisigMember>, StorageError> {
        let rows: Vec<(Vec<u8>, MultisigMember)> = self.scan(MEMBERS)?;
        Ok(rows
            .into_iter()
            .map(|(_, member)| member)
            .filter(|member| member.user_id == Some(user_id) && member.active)
            .collect())
    }

    pub fn active_member_count(&self, multisig_id: u64) -> Result<usize, StorageError> {
        Ok(self
            .members_of(multisig_id)?
            .iter()
            .filter(|member| member.active)
            .count())
    }

    // Proposals and approvals

    pub fn get_proposal(&self, id: u64) -> Result<Option<Proposal>, StorageError> {
        self.get(PROPOSALS, &id_key(id))
    }

    pub fn put_proposal(&mut self, proposal: &Proposal) -> Result<(), StorageError> {
        self.put(PROPOSALS, id_key(proposal.id), proposal)
    }

    pub fn has_approval(
        &self,
        proposal_id: u64,
        member_id: u64,
        kind: ApprovalKind,
    ) -> Result<bool, StorageError> {
        Ok(self
            .get::<Approval>(APPROVALS, &approval_key(proposal_id, member_id, kind))?
            .is_some())
    }

    pub fn put_approval(&mut self, approval: &Approval) -> Result<(), StorageError> {
        self.put(
            APPROVALS,
            approval_key(approval.proposal_id, approval.member_id, approval.kind),
            approval,
        )
    }

    pub fn approvals_for(&self, proposal_id: u64) -> Result<Vec<Approval>, StorageError> {
        let rows: Vec<(Vec<u8>, Approval)> = self.scan(APPROVALS)?;
        Ok(rows
            .into_iter()
            .map(|(_, approval)| approval)
            .filter(|approval| approval.proposal_id == proposal_id)
            .collect())
    }

    // Transfer rows

    pub fn get_internal_transfer(&self, id: u64) -> Result<Option<InternalTransfer>, StorageError> {
        self.get(INTERNAL_TRANSFERS, &id_key(id))
    }

    pub fn put_internal_transfer(&mut self, row: &InternalTransfer) -> Result<(), StorageError> {
        self.put(INTERNAL_TRANSFERS, id_key(row.id), row)
    }

    pub fn get_wallet_transfer(&self, id: u64) -> Result<Option<WalletTransfer>, StorageError> {
        self.get(WALLET_TRANSFERS, &id_key(id))
    }

    pub fn put_wallet_transfer(&mut self, row: &WalletTransfer) -> Result<(), StorageError> {
        self.put(WALLET_TRANSFERS, id_key(row.id), row)
    }

    pub fn get_external_transfer(&self, id: u64) -> Result<Option<ExternalTransfer>, StorageError> {
        self.get(EXTERNAL_TRANSFERS, &id_key(id))
    }

    pub fn put_external_transfer(&mut self, row: &ExternalTransfer) -> Result<(), StorageError> {
        self.put(EXTERNAL_TRANSFERS, id_key(row.id), row)
    }

    pub fn put_fee(&mut self, fee: &FeeRecord) -> Result<(), StorageError> {
        self.put(FEES, id_key(fee.id), fee)
    }

    pub fn remove_fee(&mut self, id: u64) {
        self.del(FEES, id_key(id));
    }

    // Vaults

    pub fn get_vault(&self, id: u64) -> Result<Option<Vault>, StorageError> {
        self.get(VAULTS, &id_key(id))
    }

    pub fn put_vault(&mut self, vault: &Vault) -> Result<(), StorageError> {
        self.claim_unique(
            IDX_VAULT_ADDRESS,
            "vaults.address",
            vault.address.as_bytes().to_vec(),
            &vault.address,
            vault.id,
        )?;
        self.put(VAULTS, id_key(vault.id), vault)
    }

    pub fn vault_id_by_address(&self, address: &Address) -> Result<Option<u64>, StorageError> {
        self.get(IDX_VAULT_ADDRESS, address.as_bytes())
    }

    pub fn treasury_vault(&self, currency: Currency) -> Result<Option<Vault>, StorageError> {
        let rows: Vec<(Vec<u8>, Vault)> = self.scan(VAULTS)?;
        Ok(rows
            .into_iter()
            .map(|(_, vault)| vault)
            .find(|vault| {
                vault.kind == VaultKind::Treasury && vault.currency == currency && vault.active
            }))
    }

    pub fn credit_vault_total(&mut self, id: u64, amount: u64) -> Result<Vault, StorageError> {
        let mut vault = self
            .get_vault(id)?
            .ok_or_else(|| StorageError::Backend(format!("credit on missing vault {}", id)))?;
        vault.total_balance = vault
            .total_balance
            .checked_add(amount)
            .ok_or(StorageError::BalanceOverflow)?;
        self.put_vault(&vault)?;
        Ok(vault)
    }

    pub fn debit_vault_total(&mut self, id: u64, amount: u64) -> Result<Vault, StorageError> {
        let mut vault = self
            .get_vault(id)?
            .ok_or_else(|| StorageError::Backend(format!("debit on missing vault {}", id)))?;
        vault.total_balance = vault
            .total_balance
            .checked_sub(amount)
            .ok_or(StorageError::BalanceUnderflow)?;
        self.put_vault(&vault)?;
        Ok(vault)
    }

    pub fn credit_vault_fee(&mut self, id: u64, amount: u64) -> Result<Vault, StorageError> {
        let mut vault = self
            .get_vault(id)?
            .ok_or_else(|| StorageError::Backend(format!("fee credit on missing vault {}", id)))?;
        vault.fee_balance = vault
            .fee_balance
            .checked_add(amount)
            .ok_or(StorageError::BalanceOverflow)?;
        self.put_vault(&vault)?;
        Ok(vault)
    }

    pub fn debit_vault_fee(&mut self, id: u64, amount: u64) -> Result<Vault, StorageError> {
        let mut vault = self
            .get_vault(id)?
            .ok_or_else(|| StorageError::Backend(format!("fee debit on missing vault {}", id)))?;
        vault.fee_balance = vault
            .fee_balance
            .checked_sub(amount)
            .ok_or(StorageError::BalanceUnderflow)?;
        self.put_vault(&vault)?;
        Ok(vault)
    }

    // Deposits and withdrawals

    pub fn has_deposit(&self, vault_id: u64, tx_hash: &str) -> Result<bool, StorageError> {
        Ok(self
            .get::<u64>(IDX_DEPOSIT_HASH, &deposit_hash_key(vault_id, tx_hash))?
            .is_some())
    }

    pub fn put_deposit(&mut self, deposit: &Deposit) -> Result<(), StorageError> {
        self.claim_unique(
            IDX_DEPOSIT_HASH,
            "deposits.tx_hash",
            deposit_hash_key(deposit.vault_id, &deposit.tx_hash),
            &deposit.tx_hash,
            deposit.id,
        )?;
        self.put(DEPOSITS, id_key(deposit.id), deposit)
    }

    pub fn get_withdrawal(&self, id: u64) -> Result<Option<Withdrawal>, StorageError> {
        self.get(WITHDRAWALS, &id_key(id))
    }

    pub fn put_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StorageError> {
        self.put(WITHDRAWALS, id_key(withdrawal.id), withdrawal)
    }

    pub fn remove_withdrawal(&mut self, id: u64) {
        self.del(WITHDRAWALS, id_key(id));
    }

    pub fn put_removal_event(&mut self, event: &RemovalEvent) -> Result<(), StorageError> {
        self.put(REMOVAL_EVENTS, id_key(event.id), event)
    }
}

impl Store {
    pub fn user(&self, id: u64) -> Result<Option<User>, StorageError> {
        self.read_committed(USERS, &id_key(id))
    }

    pub fn users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self
            .scan_committed::<User>(USERS)?
            .into_iter()
            .map(|(_, user)| user)
            .collect())
    }

    pub fn multisig(&self, id: u64) -> Result<Option<Multisig>, StorageError> {
        self.read_committed(MULTISIGS, &id_key(id))
    }

    pub fn multisig_by_pda(&self, pda: &Address) -> Result<Option<Multisig>, StorageError> {
        match self.read_committed::<u64>(IDX_MULTISIG_PDA, pda.as_bytes())? {
            Some(id) => self.multisig(id),
            None => Ok(None),
        }
    }

    pub fn main_multisig(&self) -> Result<Option<Multisig>, StorageError> {
        Ok(self
            .scan_committed::<Multisig>(MULTISIGS)?
            .into_iter()
            .map(|(_, multisig)| multisig)
            .find(|multisig| multisig.is_main && multisig.active))
    }

    pub fn member(&self, id: u64) -> Result<Option<MultisigMember>, StorageError> {
        self.read_committed(MEMBERS, &id_key(id))
    }

    pub fn member_by_key(&self, key: &Address) -> Result<Option<MultisigMember>, StorageError> {
        match self.read_committed::<u64>(IDX_MEMBER_KEY, key.as_bytes())? {
            Some(id) => self.member(id),
            None => Ok(None),
        }
    }

    pub fn members(&self) -> Result<Vec<MultisigMember>, StorageError> {
        Ok(self
            .scan_committed::<MultisigMember>(MEMBERS)?
            .into_iter()
            .map(|(_, member)| member)
            .collect())
    }

    pub fn members_of(&self, multisig_id: u64) -> Result<Vec<MultisigMember>, StorageError> {
        Ok(self
            .members()?
            .into_iter()
            .filter(|member| member.multisig_id == multisig_id)
            .collect())
    }

    pub fn proposal(&self, id: u64) -> Result<Option<Proposal>, StorageError> {
        self.read_committed(PROPOSALS, &id_key(id))
    }

    pub fn proposals_of(&self, multisig_id: u64) -> Result<Vec<Proposal>, StorageError> {
        Ok(self
            .scan_committed::<Proposal>(PROPOSALS)?
            .into_iter()
            .map(|(_, proposal)| proposal)
            .filter(|proposal| proposal.multisig_id == multisig_id)
            .collect())
    }

    pub fn approvals_for(&self, proposal_id: u64) -> Result<Vec<Approval>, StorageError> {
        Ok(self
            .scan_committed::<Approval>(APPROVALS)?
            .into_iter()
            .map(|(_, approval)| approval)
            .filter(|approval| approval.proposal_id == proposal_id)
            .collect())
    }

    pub fn internal_transfer(&self, id: u64) -> Result<Option<InternalTransfer>, StorageError> {
        self.read_committed(INTERNAL_TRANSFERS, &id_key(id))
    }

    pub fn wallet_transfer(&self, id: u64) -> Result<Option<WalletTransfer>, StorageError> {
        self.read_committed(WALLET_TRANSFERS, &id_key(id))
    }

    pub fn external_transfer(&self, id: u64) -> Result<Option<ExternalTransfer>, StorageError> {
        self.read_committed(EXTERNAL_TRANSFERS, &id_key(id))
    }

    pub fn fees(&self) -> Result<Vec<FeeRecord>, StorageError> {
        Ok(self
            .scan_committed::<FeeRecord>(FEES)?
            .into_iter()
            .map(|(_, fee)| fee)
            .collect())
    }

    pub fn vault(&self, id: u64) -> Result<Option<Vault>, StorageError> {
        self.read_committed(VAULTS, &id_key(id))
    }

    pub fn vault_by_address(&self, address: &Address) -> Result<Option<Vault>, StorageError> {
        match self.read_committed::<u64>(IDX_VAULT_ADDRESS, address.as_bytes())? {
            Some(id) => self.vault(id),
            None => Ok(None),
        }
    }

    pub fn deposits(&self) -> Result<Vec<Deposit>, StorageError> {
        Ok(self
            .scan_committed::<Deposit>(DEPOSITS)?
            .into_iter()
            .map(|(_, deposit)| deposit)
            .collect())
    }

    pub fn withdrawals(&self) -> Result<Vec<Withdrawal>, StorageError> {
        Ok(self
            .scan_committed::<Withdrawal>(WITHDRAWALS)?
            .into_iter()
            .map(|(_, withdrawal)| withdrawal)
            .collect())
    }

    pub fn removal_events(&self) -> Result<Vec<RemovalEvent>, StorageError> {
        Ok(self
            .scan_committed::<RemovalEvent>(REMOVAL_EVENTS)?
            .into_iter()
            .map(|(_, event)| event)
            .collect())
    }
}
