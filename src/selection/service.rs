//! Selection lifecycle service
//!
//! Every operation follows the same shape: load the cycle's selection, ask
//! [`check_transition`] whether the event is legal, apply the change to a
//! copy, and write it back with a compare-and-swap on the version that was
//! read. A concurrent writer makes the write fail with
//! `ConcurrencyConflict`; nothing is partially applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SelectionConfig;
use crate::core::payout;
use crate::core::seal::{check_transition, SealConfirmation, SelectionEvent, TransitionContext};
use crate::core::selection::{select_winners, SelectedWinner, SelectionRequest, TierBreakdown};
use crate::error::{PayoutError, PayoutResult};
use crate::model::{
    AuditAction, Cycle, CycleId, CycleSelection, PayoutStatus, SelectionState, Tier, WinnerId,
    WinnerRecord,
};
use crate::providers::MemberSource;
use crate::storage::{UnifiedStorage, WriteGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSelectionResult {
    pub cycle_id: CycleId,
    pub winners_selected: usize,
    pub tier_breakdown: Vec<TierBreakdown>,
    pub seed: Option<u64>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    pub winner_count: usize,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealResult {
    pub winner_count: usize,
    pub sealed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsealResult {
    pub unsealed_at: DateTime<Utc>,
}

pub struct SelectionService {
    storage: Arc<dyn UnifiedStorage>,
    members: Arc<dyn MemberSource>,
    config: SelectionConfig,
}

impl SelectionService {
    pub fn new(
        storage: Arc<dyn UnifiedStorage>,
        members: Arc<dyn MemberSource>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            storage,
            members,
            config,
        }
    }

    /// Draw winners for the active cycle, replacing any existing draft
    pub async fn run_selection(
        &self,
        cycle_id: &CycleId,
        request: SelectionRequest,
        actor: &str,
    ) -> PayoutResult<RunSelectionResult> {
        let cycle = self.load_cycle(cycle_id).await?;
        if !cycle.is_active {
            return Err(PayoutError::InvalidCycle(format!(
                "cycle {} is not the active cycle",
                cycle_id
            )));
        }
        let current = self.load_selection(cycle_id).await?;
        let ctx = self.context(&current).await?;
        check_transition(cycle_id, current.state, SelectionEvent::Run, &ctx)?;

        let members = self.members.eligible_members(&cycle).await?;
        let seed = request
            .seed
            .or(self.config.seed)
            .unwrap_or_else(rand::random::<u64>);
        let outcome = select_winners(&members, &request, seed)?;

        let now = Utc::now();
        let winners = outcome
            .winners
            .iter()
            .map(|selected| winner_record(cycle_id, selected, now))
            .collect::<PayoutResult<Vec<_>>>()?;

        let expected = current.version;
        let mut next = current;
        next.state = SelectionState::Draft;
        next.mode = Some(request.mode);
        next.seed = outcome.seed;
        next.winners = winners;
        next.record(
            actor,
            AuditAction::Generated {
                mode: request.mode,
                winners: outcome.winners.len(),
                seed: outcome.seed,
            },
        );

        let stored = self.commit(next, expected).await?;
        info!(
            "Selected {} winners for cycle {} ({} mode, seed {:?})",
            stored.winners.len(),
            cycle_id,
            request.mode,
            outcome.seed
        );

        Ok(RunSelectionResult {
            cycle_id: cycle_id.clone(),
            winners_selected: stored.winners.len(),
            tier_breakdown: outcome.breakdown,
            seed: outcome.seed,
            version: stored.version,
        })
    }

    pub async fn save_selection(&self, cycle_id: &CycleId, actor: &str) -> PayoutResult<SaveResult> {
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        let to = check_transition(cycle_id, current.state, SelectionEvent::Save, &ctx)?;

        let now = Utc::now();
        let expected = current.version;
        let mut next = current;
        next.state = to;
        for winner in next.winners.iter_mut() {
            winner.saved_at = Some(now);
            winner.saved_by = Some(actor.to_string());
            winner.last_modified = now;
        }
        let winner_count = next.live_winners().count();
        next.record(actor, AuditAction::Saved { winners: winner_count });
        self.commit(next, expected).await?;

        info!("Saved {} winners for cycle {}", winner_count, cycle_id);
        Ok(SaveResult {
            winner_count,
            saved_at: now,
        })
    }

    /// Drop all winners. The audit log is kept.
    pub async fn clear_selection(&self, cycle_id: &CycleId, actor: &str) -> PayoutResult<()> {
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        let to = check_transition(cycle_id, current.state, SelectionEvent::Clear, &ctx)?;

        let expected = current.version;
        let mut next = current;
        next.state = to;
        next.mode = None;
        next.seed = None;
        next.winners.clear();
        next.record(actor, AuditAction::Cleared);
        self.commit(next, expected).await?;

        info!("Cleared selection for cycle {}", cycle_id);
        Ok(())
    }

    pub async fn seal(
        &self,
        cycle_id: &CycleId,
        confirmation: SealConfirmation,
        actor: &str,
    ) -> PayoutResult<SealResult> {
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        let to = check_transition(cycle_id, current.state, SelectionEvent::Seal, &ctx)?;
        confirmation.check()?;

        let now = Utc::now();
        let expected = current.version;
        let mut next = current;
        next.state = to;
        for winner in next.winners.iter_mut() {
            winner.is_sealed = true;
            winner.sealed_at = Some(now);
            winner.sealed_by = Some(actor.to_string());
        }
        next.record(actor, AuditAction::Sealed);
        let stored = self.commit(next, expected).await?;

        let winner_count = stored.live_winners().count();
        info!("Sealed {} winners for cycle {} by {}", winner_count, cycle_id, actor);
        Ok(SealResult {
            winner_count,
            sealed_at: now,
        })
    }

    /// Reopen a sealed selection for edits. Always audit-logged.
    pub async fn unseal(&self, cycle_id: &CycleId, actor: &str) -> PayoutResult<UnsealResult> {
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        let to = check_transition(cycle_id, current.state, SelectionEvent::Unseal, &ctx)?;

        let now = Utc::now();
        let expected = current.version;
        let mut next = current;
        next.state = to;
        for winner in next.winners.iter_mut() {
            winner.is_sealed = false;
            winner.sealed_at = None;
            winner.sealed_by = None;
        }
        next.record(actor, AuditAction::Unsealed);
        self.commit(next, expected).await?;

        warn!("Selection for cycle {} unsealed by {}", cycle_id, actor);
        Ok(UnsealResult { unsealed_at: now })
    }

    /// Set or clear the manual payout amount of one winner
    pub async fn update_override(
        &self,
        cycle_id: &CycleId,
        winner_id: &WinnerId,
        payout_override: Option<i64>,
        actor: &str,
    ) -> PayoutResult<WinnerRecord> {
        payout::validate_override(payout_override)?;
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        check_transition(cycle_id, current.state, SelectionEvent::Mutate, &ctx)?;

        let expected = current.version;
        let mut next = current;
        let processed = next.processed_count();
        let winner = editable_winner(&mut next, winner_id, processed)?;
        let previous = winner.payout_override;
        winner.payout_override = payout_override;
        winner.refresh_payout()?;
        winner.last_modified = Utc::now();
        let updated = winner.clone();

        next.record(
            actor,
            AuditAction::OverrideChanged {
                winner_id: winner_id.clone(),
                from: previous,
                to: payout_override,
            },
        );
        self.commit(next, expected).await?;

        debug!(
            "Override for winner {} changed from {:?} to {:?}",
            winner_id, previous, payout_override
        );
        Ok(updated)
    }

    /// Change the pool size and payout percentage of every winner in a tier
    pub async fn update_tier_settings(
        &self,
        cycle_id: &CycleId,
        tier: Tier,
        tier_pool_size: i64,
        payout_percentage: f64,
        actor: &str,
    ) -> PayoutResult<Vec<WinnerRecord>> {
        payout::payout_calculated(tier_pool_size, payout_percentage)?;
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        check_transition(cycle_id, current.state, SelectionEvent::Mutate, &ctx)?;

        let processed = current.processed_count();
        if current
            .winners
            .iter()
            .any(|w| w.tier == tier && w.payout_status == PayoutStatus::Processed)
        {
            return Err(PayoutError::PayoutsAlreadyProcessed {
                cycle_id: cycle_id.clone(),
                processed,
            });
        }

        let now = Utc::now();
        let expected = current.version;
        let mut next = current;
        let mut updated = Vec::new();
        for winner in next
            .winners
            .iter_mut()
            .filter(|w| w.tier == tier && w.payout_status == PayoutStatus::Pending)
        {
            winner.tier_pool_size = tier_pool_size;
            winner.payout_percentage = payout_percentage;
            winner.refresh_payout()?;
            winner.last_modified = now;
            updated.push(winner.clone());
        }
        next.record(
            actor,
            AuditAction::TierSettingsChanged {
                tier,
                tier_pool_size,
                payout_percentage,
            },
        );
        self.commit(next, expected).await?;

        info!(
            "Updated {} {} winners for cycle {}: pool {} at {}%",
            updated.len(),
            tier,
            cycle_id,
            tier_pool_size,
            payout_percentage
        );
        Ok(updated)
    }

    /// Exclude a winner from payout; the row is kept with status `removed`
    pub async fn remove_winner(
        &self,
        cycle_id: &CycleId,
        winner_id: &WinnerId,
        actor: &str,
    ) -> PayoutResult<WinnerRecord> {
        let (_, current) = self.load(cycle_id).await?;
        let ctx = self.context(&current).await?;
        check_transition(cycle_id, current.state, SelectionEvent::Mutate, &ctx)?;

        let expected = current.version;
        let mut next = current;
        let processed = next.processed_count();
        let winner = editable_winner(&mut next, winner_id, processed)?;
        winner.payout_status = PayoutStatus::Removed;
        winner.last_modified = Utc::now();
        let removed = winner.clone();

        next.record(
            actor,
            AuditAction::WinnerRemoved {
                winner_id: winner_id.clone(),
            },
        );
        self.commit(next, expected).await?;

        info!("Removed winner {} from cycle {}", winner_id, cycle_id);
        Ok(removed)
    }

    /// The cycle's selection; an empty one when nothing was selected yet
    pub async fn get_selection(&self, cycle_id: &CycleId) -> PayoutResult<CycleSelection> {
        let (_, selection) = self.load(cycle_id).await?;
        Ok(selection)
    }

    async fn load_cycle(&self, cycle_id: &CycleId) -> PayoutResult<Cycle> {
        self.storage
            .cycle_storage()
            .load_cycle(cycle_id)
            .await?
            .ok_or_else(|| PayoutError::InvalidCycle(format!("cycle {} not found", cycle_id)))
    }

    async fn load_selection(&self, cycle_id: &CycleId) -> PayoutResult<CycleSelection> {
        Ok(self
            .storage
            .selection_storage()
            .load_selection(cycle_id)
            .await?
            .unwrap_or_else(|| CycleSelection::empty(cycle_id.clone())))
    }

    async fn load(&self, cycle_id: &CycleId) -> PayoutResult<(Cycle, CycleSelection)> {
        let cycle = self.load_cycle(cycle_id).await?;
        let selection = self.load_selection(cycle_id).await?;
        Ok((cycle, selection))
    }

    async fn context(&self, selection: &CycleSelection) -> PayoutResult<TransitionContext> {
        let batch_in_flight = self
            .storage
            .batch_storage()
            .active_batch(&selection.cycle_id)
            .await?
            .is_some();
        Ok(TransitionContext {
            winner_count: selection.live_winners().count(),
            processed_count: selection.processed_count(),
            batch_in_flight,
            // Only consulted by the disbursement path
            allow_unsealed_disbursement: false,
        })
    }

    /// Versioned write that also refuses to land while a batch is in flight
    async fn commit(&self, selection: CycleSelection, expected: u64) -> PayoutResult<CycleSelection> {
        let cycle_id = selection.cycle_id.clone();
        self.storage
            .selection_storage()
            .store_selection(selection, WriteGuard::version(expected).idle())
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    warn!("Lost concurrent update on selection for cycle {}: {}", cycle_id, e);
                }
                e.into()
            })
    }
}

/// A live, unprocessed winner of `selection`
fn editable_winner<'a>(
    selection: &'a mut CycleSelection,
    winner_id: &WinnerId,
    processed: usize,
) -> PayoutResult<&'a mut WinnerRecord> {
    let cycle_id = selection.cycle_id.clone();
    let winner = selection
        .winner_mut(winner_id)
        .filter(|w| w.payout_status != PayoutStatus::Removed)
        .ok_or_else(|| PayoutError::WinnerNotFound(winner_id.clone()))?;
    if winner.payout_status == PayoutStatus::Processed {
        return Err(PayoutError::PayoutsAlreadyProcessed { cycle_id, processed });
    }
    Ok(winner)
}

fn winner_record(
    cycle_id: &CycleId,
    selected: &SelectedWinner,
    now: DateTime<Utc>,
) -> PayoutResult<WinnerRecord> {
    let amounts = payout::resolve_payout(selected.tier_pool_size, selected.payout_percentage, None)?;
    Ok(WinnerRecord {
        id: WinnerId::generate(),
        cycle_id: cycle_id.clone(),
        user_id: selected.user_id.clone(),
        tier: selected.tier,
        overall_rank: selected.overall_rank,
        tier_rank: selected.tier_rank,
        points_at_selection: selected.points,
        tier_pool_size: selected.tier_pool_size,
        payout_percentage: selected.payout_percentage,
        payout_override: None,
        payout_final: amounts.final_amount,
        payout_status: PayoutStatus::Pending,
        destination: selected.destination.clone(),
        provider_reference: None,
        processed_at: None,
        is_sealed: false,
        sealed_at: None,
        sealed_by: None,
        saved_at: None,
        saved_by: None,
        last_modified: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selection::TierSettings;
    use crate::error::ErrorKind;
    use crate::model::SelectionMode;
    use crate::testing::fixtures::{active_cycle_with_roster, roster};
    use crate::testing::mocks::StaticMemberSource;
    use crate::storage::StorageFactory;

    async fn service() -> (SelectionService, CycleId) {
        let storage = StorageFactory::memory();
        let cycle_id = active_cycle_with_roster(storage.as_ref(), "c1", 6).await;
        let members = Arc::new(StaticMemberSource::new(roster(6)));
        (
            SelectionService::new(storage, members, SelectionConfig::default()),
            cycle_id,
        )
    }

    fn top(n: usize) -> SelectionRequest {
        SelectionRequest::new(SelectionMode::TopPerformers).with_tier(
            Tier::Tier1,
            TierSettings {
                winner_count: Some(n),
                tier_pool_size: 825_000,
                payout_percentage: 50.0,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_rerun_replaces_draft() {
        let (service, cycle) = service().await;
        service.run_selection(&cycle, top(2), "admin").await.unwrap();
        service.run_selection(&cycle, top(3), "admin").await.unwrap();

        let selection = service.get_selection(&cycle).await.unwrap();
        assert_eq!(selection.state, SelectionState::Draft);
        assert_eq!(selection.winners.len(), 3);
        assert_eq!(selection.winners[0].payout_final, 412_500);
    }

    #[tokio::test]
    async fn test_seed_is_recorded_for_random_modes() {
        let (service, cycle) = service().await;
        let request = SelectionRequest::new(SelectionMode::Random)
            .with_tier(Tier::Tier1, TierSettings { winner_count: Some(2), ..Default::default() });

        let first = service.run_selection(&cycle, request.clone(), "admin").await.unwrap();
        let seed = first.seed.unwrap();
        let first_ids: Vec<_> = service
            .get_selection(&cycle)
            .await
            .unwrap()
            .winners
            .into_iter()
            .map(|w| w.user_id)
            .collect();

        service
            .run_selection(&cycle, request.with_seed(seed), "admin")
            .await
            .unwrap();
        let second_ids: Vec<_> = service
            .get_selection(&cycle)
            .await
            .unwrap()
            .winners
            .into_iter()
            .map(|w| w.user_id)
            .collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_seal_requires_confirmation_and_blocks_edits() {
        let (service, cycle) = service().await;
        service.run_selection(&cycle, top(2), "admin").await.unwrap();
        service.save_selection(&cycle, "admin").await.unwrap();

        let err = service
            .seal(&cycle, SealConfirmation::default(), "admin")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfirmationRequired);

        service.seal(&cycle, SealConfirmation::all(), "admin").await.unwrap();
        let selection = service.get_selection(&cycle).await.unwrap();
        assert!(selection.winners.iter().all(|w| w.is_sealed));

        let winner = selection.winners[0].id.clone();
        let err = service
            .update_override(&cycle, &winner, Some(1), "admin")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelectionSealed);
        let err = service.clear_selection(&cycle, "admin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelectionSealed);
    }

    #[tokio::test]
    async fn test_override_and_tier_settings() {
        let (service, cycle) = service().await;
        service.run_selection(&cycle, top(2), "admin").await.unwrap();
        let selection = service.get_selection(&cycle).await.unwrap();
        let winner = selection.winners[0].id.clone();

        let updated = service
            .update_override(&cycle, &winner, Some(500_000), "admin")
            .await
            .unwrap();
        assert_eq!(updated.payout_final, 500_000);

        let tier = service
            .update_tier_settings(&cycle, Tier::Tier1, 1_000_000, 10.0, "admin")
            .await
            .unwrap();
        assert_eq!(tier.len(), 2);
        let overridden = tier.iter().find(|w| w.id == winner).unwrap();
        assert_eq!(overridden.payout_final, 500_000);
        let other = tier.iter().find(|w| w.id != winner).unwrap();
        assert_eq!(other.payout_final, 100_000);

        let cleared = service
            .update_override(&cycle, &winner, None, "admin")
            .await
            .unwrap();
        assert_eq!(cleared.payout_final, 100_000);
    }

    #[tokio::test]
    async fn test_remove_winner() {
        let (service, cycle) = service().await;
        service.run_selection(&cycle, top(2), "admin").await.unwrap();
        let winner = service.get_selection(&cycle).await.unwrap().winners[1].id.clone();

        let removed = service.remove_winner(&cycle, &winner, "admin").await.unwrap();
        assert_eq!(removed.payout_status, PayoutStatus::Removed);

        let err = service.remove_winner(&cycle, &winner, "admin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WinnerNotFound);
        let saved = service.save_selection(&cycle, "admin").await.unwrap();
        assert_eq!(saved.winner_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_cycles() {
        let (service, _) = service().await;
        let err = service
            .run_selection(&CycleId::from("nope"), top(1), "admin")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCycle);
    }

    #[tokio::test]
    async fn test_audit_log_survives_clear() {
        let (service, cycle) = service().await;
        service.run_selection(&cycle, top(1), "alice").await.unwrap();
        service.clear_selection(&cycle, "bob").await.unwrap();

        let selection = service.get_selection(&cycle).await.unwrap();
        assert_eq!(selection.state, SelectionState::Empty);
        assert!(selection.winners.is_empty());
        let actors: Vec<&str> = selection.audit.iter().map(|e| e.actor.as_str()).collect();
        assert_eq!(actors, vec!["alice", "bob"]);
        assert_eq!(selection.audit[1].action, AuditAction::Cleared);
    }
}
