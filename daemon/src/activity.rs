// Member activity sweeper. Activity bumps happen inside the proposal
// engine's units of work; this module owns the out-of-band sweep that
// flags stale members and retires them once the removal threshold has
// passed, always preserving the approval quorum.
//
// The sweep never reactivates a member: only an explicit member action
// (through the engine) or operator intervention does.

use custos_common::{
    api::{MemberActivity, RemoveMemberResult},
    crypto::Address,
    time::{get_current_time_in_seconds, TimestampSeconds},
};

use crate::{
    custodian::Custodian,
    entity::{MultisigMember, RemovalEvent},
    error::CoreError,
    storage::REMOVAL_EVENTS,
};

pub const SWEEP_REMOVAL_REASON: &str = "inactivity threshold exceeded";

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivitySweepOutcome {
    pub checked: usize,
    pub marked_inactive: usize,
    pub retired: usize,
    pub quorum_blocked: usize,
}

fn hours_since(now: TimestampSeconds, then: TimestampSeconds) -> u64 {
    now.saturating_sub(then) / 3600
}

impl Custodian {
    pub async fn activity_sweep(&self) -> Result<ActivitySweepOutcome, CoreError> {
        self.activity_sweep_with(&|| false).await
    }

    /// One sweep cycle. The cancellation predicate is consulted between
    /// members, so a stop finishes the current member and exits cleanly.
    pub async fn activity_sweep_with(
        &self,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<ActivitySweepOutcome, CoreError> {
        let mut outcome = ActivitySweepOutcome::default();
        let inactivity = self.config().inactivity_threshold_seconds();
        let removal = self.config().removal_threshold_seconds();

        for snapshot in self.store().members()? {
            if is_cancelled() {
                debug!("activity sweep cancelled after {} members", outcome.checked);
                break;
            }
            if !snapshot.active {
                continue;
            }
            outcome.checked += 1;

            let mut uow = self.store().begin().await;
            let mut member = match uow.get_member(snapshot.id)? {
                Some(member) if member.active => member,
                _ => continue,
            };
            let now = get_current_time_in_seconds();

            if !member.is_inactive {
                if now.saturating_sub(member.last_activity_at) >= inactivity {
                    member.is_inactive = true;
                    member.inactive_since = Some(now);
                    member.removal_eligible_at = Some(now + removal);
                    member.updated_at = now;
                    uow.put_member(&member)?;
                    uow.commit().await?;
                    outcome.marked_inactive += 1;
                    info!(
                        "member {} marked inactive after {}h, removal eligible in {}h",
                        member.public_key,
                        hours_since(now, member.last_activity_at),
                        removal / 3600
                    );
                }
                continue;
            }

            let eligible = member
                .removal_eligible_at
                .map_or(false, |eligible_at| now >= eligible_at);
            if !eligible {
                continue;
            }

            match self.retire_member(&mut uow, &mut member, SWEEP_REMOVAL_REASON, now)? {
                true => {
                    uow.commit().await?;
                    outcome.retired += 1;
                }
                false => {
                    // Quorum guard hit: nothing staged, leave the member
                    // active and flagged until an operator intervenes
                    outcome.quorum_blocked += 1;
                }
            }
        }

        debug!(
            "activity sweep done: {} checked, {} marked inactive, {} retired, {} quorum blocked",
            outcome.checked, outcome.marked_inactive, outcome.retired, outcome.quorum_blocked
        );
        Ok(outcome)
    }

    // Deactivate a member inside the open unit of work, unless doing so
    // would leave the multisig below its threshold. Returns whether the
    // retirement was staged.
    fn retire_member(
        &self,
        uow: &mut crate::storage::UnitOfWork<'_>,
        member: &mut MultisigMember,
        reason: &str,
        now: TimestampSeconds,
    ) -> Result<bool, CoreError> {
        let multisig = uow
            .get_multisig(member.multisig_id)?
            .ok_or_else(|| CoreError::not_found("multisig", member.multisig_id))?;
        let active = uow.active_member_count(member.multisig_id)?;
        let remaining = active.saturating_sub(1);

        if remaining < multisig.threshold as usize {
            warn!(
                "quorum blocked: retiring member {} would leave {} active members on multisig {} (threshold {})",
                member.public_key, remaining, multisig.pda, multisig.threshold
            );
            return Ok(false);
        }

        member.active = false;
        member.updated_at = now;
        uow.put_member(member)?;
        let removal_event_id = uow.next_id(REMOVAL_EVENTS)?;
        uow.put_removal_event(&RemovalEvent {
            id: removal_event_id,
            member_id: member.id,
            multisig_id: member.multisig_id,
            reason: reason.to_string(),
            created_at: now,
        })?;
        info!("member {} retired: {}", member.public_key, reason);
        Ok(true)
    }

    /// Operator removal. Quorum-guarded like the sweep, but the guard is
    /// surfaced as an error so the operator sees why nothing happened.
    pub async fn remove_member(
        &self,
        member_key: &Address,
        reason: &str,
    ) -> Result<RemoveMemberResult, CoreError> {
        let mut uow = self.store().begin().await;
        let member_id = uow
            .member_id_by_key(member_key)?
            .ok_or_else(|| CoreError::not_found("member", member_key))?;
        let mut member = uow
            .get_member(member_id)?
            .ok_or_else(|| CoreError::not_found("member", member_id))?;
        if !member.active {
            return Err(CoreError::InvalidState(format!(
                "member {} is already retired",
                member_key
            )));
        }

        let now = get_current_time_in_seconds();
        if !self.retire_member(&mut uow, &mut member, reason, now)? {
            let multisig = uow
                .get_multisig(member.multisig_id)?
                .ok_or_else(|| CoreError::not_found("multisig", member.multisig_id))?;
            let remaining = uow.active_member_count(member.multisig_id)?.saturating_sub(1);
            return Err(CoreError::QuorumBlocked {
                member: member_key.to_string(),
                remaining,
                threshold: multisig.threshold,
            });
        }
        uow.commit().await?;

        Ok(RemoveMemberResult {
            member_key: *member_key,
            removed: true,
        })
    }

    /// Activity snapshot of every non-retired member.
    pub fn inactivity_status(&self) -> Result<Vec<MemberActivity>, CoreError> {
        let now = get_current_time_in_seconds();
        let mut rows = Vec::new();
        for member in self.store().members()? {
            if !member.active {
                continue;
            }
            let multisig = self
                .store()
                .multisig(member.multisig_id)?
                .ok_or_else(|| CoreError::not_found("multisig", member.multisig_id))?;
            rows.push(MemberActivity {
                member_key: member.public_key,
                multisig_pda: multisig.pda,
                active: member.active,
                last_activity: member.last_activity_at,
                hours_since_activity: hours_since(now, member.last_activity_at),
                is_inactive: member.is_inactive,
                inactive_since: member.inactive_since,
                removal_eligible_at: member.removal_eligible_at,
            });
        }
        Ok(rows)
    }

    /// Members whose removal threshold has already passed.
    pub fn removal_eligible(&self) -> Result<Vec<MemberActivity>, CoreError> {
        let now = get_current_time_in_seconds();
        Ok(self
            .inactivity_status()?
            .into_iter()
            .filter(|member| {
                member
                    .removal_eligible_at
                    .map_or(false, |eligible_at| now >= eligible_at)
            })
            .collect())
    }
}
