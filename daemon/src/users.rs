// User service: signup and anonymization. Users are never hard-deleted;
// anonymization replaces personal fields with deterministic placeholders
// so foreign keys and unique indexes stay valid.

use sha3::{Digest, Sha3_256};

use custos_common::{
    api::{AnonymizeUserResult, CreateUserParams},
    crypto::Address,
    time::get_current_time_in_seconds,
};

use crate::{custodian::Custodian, entity::User, error::CoreError, storage::USERS};

// Placeholder wallet for an anonymized user: deterministic per id, valid
// as an address, never colliding with a real key
fn deleted_wallet(user_id: u64) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(b"custos:deleted-wallet:v1");
    hasher.update(user_id.to_be_bytes());
    Address::new(hasher.finalize().into())
}

impl Custodian {
    pub async fn create_user(&self, params: CreateUserParams) -> Result<User, CoreError> {
        let email = params.email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation(format!(
                "invalid email: {}",
                params.email
            )));
        }
        let full_name = params.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(CoreError::Validation("full name is required".to_string()));
        }

        let mut uow = self.store().begin().await;
        if uow.user_id_by_email(&email)?.is_some() {
            return Err(CoreError::Validation(format!(
                "email already registered: {}",
                email
            )));
        }
        if let Some(wallet) = &params.wallet {
            if uow.user_id_by_wallet(wallet)?.is_some() {
                return Err(CoreError::Validation(format!(
                    "wallet already registered: {}",
                    wallet
                )));
            }
        }

        let now = get_current_time_in_seconds();
        let user = User {
            id: uow.next_id(USERS)?,
            email,
            full_name,
            phone_number: params.phone_number,
            wallet: params.wallet,
            balance: 0,
            balance_last_synced_at: None,
            multisig_id: None,
            anonymized: false,
            created_at: now,
            updated_at: now,
        };
        uow.put_user(&user)?;
        uow.commit().await?;

        info!("created user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Replace personal fields with placeholders, keeping the row.
    pub async fn anonymize_user(&self, user_id: u64) -> Result<AnonymizeUserResult, CoreError> {
        let mut uow = self.store().begin().await;
        let mut user = uow
            .get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        if user.anonymized {
            return Err(CoreError::InvalidState(format!(
                "user {} is already anonymized",
                user_id
            )));
        }

        let mut fields_anonymized = 2; // email and full name always change
        user.email = format!("anonymized_{}@deleted.local", user.id);
        user.full_name = format!("Deleted User {}", user.id);
        if user.phone_number.take().is_some() {
            fields_anonymized += 1;
        }
        if user.wallet.is_some() {
            user.wallet = Some(deleted_wallet(user.id));
            fields_anonymized += 1;
        }
        user.anonymized = true;
        user.updated_at = get_current_time_in_seconds();
        uow.put_user(&user)?;
        uow.commit().await?;

        info!("anonymized user {}", user_id);
        Ok(AnonymizeUserResult {
            user_id,
            fields_anonymized,
        })
    }
}
