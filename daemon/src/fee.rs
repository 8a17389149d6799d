// Fee engine. Pure integer math over atomic amounts; the one place the
// treasury keypair is held and the single authoritative balance check
// used by every transfer path.

use custos_common::{
    config::{FEE_RATE_DIVISOR, MAX_WALLET_TRANSFER},
    crypto::{Address, Keypair},
    currency::Currency,
    time::get_current_time_in_seconds,
    utils::format_coin,
};

use crate::{
    entity::{Vault, VaultKind},
    error::CoreError,
    storage::{StorageError, UnitOfWork},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
}

/// Split a gross amount into fee and net. The fee rounds down at atomic
/// precision, so fee + net always reconstructs the gross exactly.
pub fn breakdown(gross: u64) -> FeeBreakdown {
    let fee = gross / FEE_RATE_DIVISOR;
    FeeBreakdown {
        gross,
        fee,
        net: gross - fee,
    }
}

pub struct FeeEngine {
    // Held in process memory, used exclusively by fee routing
    treasury: Keypair,
    fee_wallet: Address,
}

impl FeeEngine {
    pub fn new(treasury: Keypair, fee_wallet: Address) -> Self {
        Self {
            treasury,
            fee_wallet,
        }
    }

    pub fn breakdown(&self, gross: u64) -> FeeBreakdown {
        breakdown(gross)
    }

    pub fn treasury_keypair(&self) -> &Keypair {
        &self.treasury
    }

    /// Treasury address fees are routed to, per currency.
    pub fn treasury_address(&self, currency: Currency) -> Address {
        match currency {
            Currency::Usdc => self.fee_wallet,
            Currency::Sol => self.treasury.address(),
        }
    }

    /// Bounds check shared by every transfer entry point.
    pub fn validate_amount(&self, gross: u64) -> Result<(), CoreError> {
        if gross == 0 {
            return Err(CoreError::Validation(
                "transfer amount must be positive".to_string(),
            ));
        }
        if gross > MAX_WALLET_TRANSFER {
            return Err(CoreError::Validation(format!(
                "transfer amount {} exceeds the ceiling of {}",
                format_coin(gross),
                format_coin(MAX_WALLET_TRANSFER)
            )));
        }
        Ok(())
    }

    /// The authoritative balance check: the sender must cover the gross
    /// amount plus the fee on top of it.
    pub fn validate_sufficient(
        &self,
        balance: u64,
        gross: u64,
    ) -> Result<FeeBreakdown, CoreError> {
        let split = breakdown(gross);
        let required = gross.checked_add(split.fee).ok_or_else(|| {
            CoreError::Validation("transfer amount overflows".to_string())
        })?;
        if balance < required {
            return Err(CoreError::InsufficientFunds {
                required,
                available: balance,
            });
        }
        Ok(split)
    }

    /// Treasury vault for a currency, created on first use.
    pub fn ensure_treasury_vault(
        &self,
        uow: &mut UnitOfWork<'_>,
        currency: Currency,
    ) -> Result<Vault, StorageError> {
        if let Some(vault) = uow.treasury_vault(currency)? {
            return Ok(vault);
        }

        let now = get_current_time_in_seconds();
        let vault = Vault {
            id: uow.next_id(crate::storage::VAULTS)?,
            address: self.treasury_address(currency),
            kind: VaultKind::Treasury,
            currency,
            total_balance: 0,
            fee_balance: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };
        uow.put_vault(&vault)?;
        debug!("created {} treasury vault {}", currency, vault.address);
        Ok(vault)
    }
}
