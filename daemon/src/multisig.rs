// Multisig registry: resolves the main multisig and provisions a multisig
// on demand the first time a user needs governance.
//
// Provisioning is deterministic: the create key is derived from the
// configured member set, so every concurrent attempt computes the same
// PDA and the unique index on it serializes creation. Losers of that race
// retry the read path and associate with the existing row.

use custos_common::{
    crypto::{derive_create_key, derive_program_address},
    multisig::PermissionSet,
    time::{get_current_time_in_seconds, TimestampSeconds},
};

use crate::{
    custodian::Custodian,
    entity::{Multisig, MultisigMember, User},
    error::CoreError,
    storage::{UnitOfWork, MEMBERS, MULTISIGS},
};

impl Custodian {
    /// The single active multisig flagged as main.
    pub fn get_main_multisig(&self) -> Result<Multisig, CoreError> {
        self.store()
            .main_multisig()?
            .ok_or_else(|| CoreError::not_found("multisig", "main"))
    }

    /// The user's owning multisig, created on first use.
    pub async fn provision_for_user(&self, user_id: u64) -> Result<Multisig, CoreError> {
        let mut uow = self.store().begin().await;
        let mut user = uow
            .get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;

        match self.provision_in(&mut uow, &mut user) {
            Ok(multisig) => {
                uow.commit().await?;
                Ok(multisig)
            }
            Err(CoreError::Storage(err)) if err.is_unique_violation() => {
                // Another writer created the multisig first; fall back to
                // the read path against its committed row
                drop(uow);
                debug!("multisig provisioning raced, retrying read path: {}", err);
                self.adopt_existing(user_id).await
            }
            Err(err) => Err(err),
        }
    }

    /// Provision inside an already-open unit of work, so a caller can
    /// create the multisig and the proposal that needs it atomically.
    pub(crate) fn provision_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        user: &mut User,
    ) -> Result<Multisig, CoreError> {
        if let Some(multisig_id) = user.multisig_id {
            return uow
                .get_multisig(multisig_id)?
                .ok_or_else(|| CoreError::not_found("multisig", multisig_id));
        }

        let now = get_current_time_in_seconds();
        let members = self.config().member_addresses();
        if members.len() < self.config().min_members || members.len() > self.config().max_members {
            return Err(CoreError::Config(format!(
                "{} members configured, expected between {} and {}",
                members.len(),
                self.config().min_members,
                self.config().max_members
            )));
        }

        let create_key = derive_create_key(&members);
        let pda = derive_program_address(&create_key);

        let multisig = match uow.multisig_id_by_pda(&pda)? {
            Some(existing_id) => uow
                .get_multisig(existing_id)?
                .ok_or_else(|| CoreError::not_found("multisig", existing_id))?,
            None => self.create_multisig(uow, now)?,
        };

        user.multisig_id = Some(multisig.id);
        user.updated_at = now;
        uow.put_user(user)?;

        Ok(multisig)
    }

    fn create_multisig(
        &self,
        uow: &mut UnitOfWork<'_>,
        now: TimestampSeconds,
    ) -> Result<Multisig, CoreError> {
        let members = self.config().member_addresses();
        let create_key = derive_create_key(&members);
        let threshold = self.config().effective_threshold(members.len());

        let multisig = Multisig {
            id: uow.next_id(MULTISIGS)?,
            pda: derive_program_address(&create_key),
            create_key,
            name: "Custody Multisig".to_string(),
            threshold,
            time_lock: self.config().default_time_lock,
            // The first multisig provisioned from the configured keys
            // becomes the main one
            is_main: uow.main_multisig()?.is_none(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        uow.put_multisig(&multisig)?;

        for public_key in members {
            let member = MultisigMember {
                id: uow.next_id(MEMBERS)?,
                multisig_id: multisig.id,
                public_key,
                permissions: PermissionSet::all(),
                active: true,
                last_activity_at: now,
                is_inactive: false,
                inactive_since: None,
                removal_eligible_at: None,
                user_id: None,
                created_at: now,
                updated_at: now,
            };
            uow.put_member(&member)?;
        }

        info!(
            "provisioned multisig {} with {} members, threshold {}, time lock {}s",
            multisig.pda,
            self.config().member_keys.len(),
            multisig.threshold,
            multisig.time_lock
        );
        Ok(multisig)
    }

    async fn adopt_existing(&self, user_id: u64) -> Result<Multisig, CoreError> {
        let members = self.config().member_addresses();
        let pda = derive_program_address(&derive_create_key(&members));

        let mut uow = self.store().begin().await;
        let mut user = uow
            .get_user(user_id)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;
        let multisig_id = uow
            .multisig_id_by_pda(&pda)?
            .ok_or_else(|| CoreError::not_found("multisig", &pda))?;
        let multisig = uow
            .get_multisig(multisig_id)?
            .ok_or_else(|| CoreError::not_found("multisig", multisig_id))?;

        if user.multisig_id != Some(multisig.id) {
            user.multisig_id = Some(multisig.id);
            user.updated_at = get_current_time_in_seconds();
            uow.put_user(&user)?;
            uow.commit().await?;
        }
        Ok(multisig)
    }

    /// Operator control: adjust a multisig threshold, bounded by the
    /// currently active member count.
    pub async fn set_multisig_threshold(
        &self,
        multisig_id: u64,
        threshold: u8,
    ) -> Result<Multisig, CoreError> {
        let mut uow = self.store().begin().await;
        let mut multisig = uow
            .get_multisig(multisig_id)?
            .ok_or_else(|| CoreError::not_found("multisig", multisig_id))?;

        let active = uow.active_member_count(multisig_id)?;
        if threshold == 0 || threshold as usize > active {
            return Err(CoreError::Validation(format!(
                "threshold {} out of range for {} active members",
                threshold, active
            )));
        }

        multisig.threshold = threshold;
        multisig.updated_at = get_current_time_in_seconds();
        uow.put_multisig(&multisig)?;
        uow.commit().await?;

        info!("multisig {} threshold set to {}", multisig.pda, threshold);
        Ok(multisig)
    }
}
